//! HTTP request handlers.

use super::state::BookSummary;
use crate::error::{AppError, Result};
use crate::export::assets::image_mime;
use crate::export::toc::{self, FlatTocEntry};
use crate::export::{ExportFormat, ExportResult, MarkdownMode};
use crate::library::book::Book;
use crate::library::store::{IMAGES_DIR, is_valid_id};
use crate::server::AppState;
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

/// Run blocking library work off the async runtime.
async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| AppError::Internal(format!("Worker task failed: {}", e)))?
}

/// Load a book through the cache without blocking the runtime.
async fn load_book(state: &AppState, id: &str) -> Result<Arc<Book>> {
    let state = state.clone();
    let id = id.to_string();
    blocking(move || {
        state
            .get_book(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", id)))
    })
    .await
}

// ============================================================================
// LIBRARY
// ============================================================================

/// Health check.
pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// API: List all books.
pub async fn list_books(State(state): State<AppState>) -> Result<Json<Vec<BookSummary>>> {
    let books = blocking(move || Ok(state.list_books())).await?;
    Ok(Json(books))
}

/// Book detail with flattened TOC.
#[derive(Debug, Serialize)]
pub struct BookDetail {
    #[serde(flatten)]
    summary: BookSummary,
    toc: Vec<FlatTocEntry>,
}

/// API: Book detail.
pub async fn book_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookDetail>> {
    let detail = blocking(move || {
        let book = state
            .get_book(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", id)))?;

        Ok(BookDetail {
            summary: state.summary(&id, &book),
            toc: toc::flatten(&book),
        })
    })
    .await?;

    Ok(Json(detail))
}

/// One chapter as served to the reader.
#[derive(Debug, Serialize)]
pub struct ChapterView {
    id: String,
    title: String,
    order: usize,
    html: String,
}

/// API: Chapter HTML with image links pointing at the image route.
pub async fn book_chapter(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<ChapterView>> {
    let book = load_book(&state, &id).await?;

    let chapter = book
        .spine
        .get(index)
        .ok_or_else(|| AppError::NotFound(format!("Chapter not found: {}", index)))?;

    let prefix = format!("/books/{}/{}/", id, IMAGES_DIR);
    let html = chapter
        .content
        .replace("src=\"images/", &format!("src=\"{}", prefix))
        .replace("src='images/", &format!("src='{}", prefix));

    Ok(Json(ChapterView {
        id: chapter.id.clone(),
        title: chapter.title.clone(),
        order: chapter.order,
        html,
    }))
}

/// Book image file.
pub async fn book_image(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Response<Body>> {
    if !is_valid_id(&id) || !is_valid_id(&name) {
        return Err(AppError::NotFound(format!("Image not found: {}", name)));
    }

    let path = state.store().images_dir(&id).join(&name);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!("Image not found: {}", name)));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, image_mime(&name))
        .header(header::CACHE_CONTROL, "public, max-age=86400")
        .body(Body::from_stream(ReaderStream::new(file)))
        .unwrap_or_else(|_| Response::default()))
}

// ============================================================================
// IMPORT
// ============================================================================

/// Query parameters for an upload.
#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    /// Original file name of the upload.
    pub filename: String,
}

/// API: Import an uploaded source file (raw request body).
pub async fn import_book(
    State(state): State<AppState>,
    Query(params): Query<ImportQuery>,
    body: Bytes,
) -> Result<Json<BookSummary>> {
    let importer = state
        .importer()
        .ok_or_else(|| AppError::Import("No book parser installed".into()))?;

    let summary = blocking(move || {
        let imported = importer.import(&body[..], &params.filename)?;
        let book = state.get_book(&imported.id).ok_or_else(|| {
            AppError::Import(format!("Imported book unreadable: {}", imported.id))
        })?;
        Ok(state.summary(&imported.id, &book))
    })
    .await?;

    Ok(Json(summary))
}

// ============================================================================
// EXPORT
// ============================================================================

/// Query parameters for Markdown export.
#[derive(Debug, Deserialize)]
pub struct MarkdownQuery {
    /// `single` (default) or `chapters`.
    pub mode: Option<String>,
}

/// Export: Markdown document or chapter archive.
pub async fn export_markdown(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<MarkdownQuery>,
) -> Result<Response<Body>> {
    // Unknown modes are rejected here, before the exporter's lenient default applies.
    let mode = params
        .mode
        .as_deref()
        .map(str::parse::<MarkdownMode>)
        .transpose()?
        .unwrap_or_default();
    let mode = match mode {
        MarkdownMode::Single => "single",
        MarkdownMode::Chapters => "chapters",
    };

    export_response(state, id, ExportFormat::Markdown, Some(mode)).await
}

/// Export: PDF.
pub async fn export_pdf(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response<Body>> {
    export_response(state, id, ExportFormat::Pdf, None).await
}

fn format_name(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Markdown => "markdown",
        ExportFormat::Pdf => "pdf",
    }
}

async fn export_response(
    state: AppState,
    id: String,
    format: ExportFormat,
    mode: Option<&'static str>,
) -> Result<Response<Body>> {
    let exporter = state.exporter.clone();
    let (result, bytes) = blocking(move || {
        let result: ExportResult = exporter.export(&id, format_name(format), mode)?;
        let bytes = result.clone().into_bytes()?;
        Ok((result, bytes))
    })
    .await?;

    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(&result.filename)
    );

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, result.content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes))
        .unwrap_or_else(|_| Response::default()))
}
