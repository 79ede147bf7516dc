//! Export orchestration.
//!
//! [`Exporter::export`] validates the request, reads the book through the
//! cache and runs one [`Encoder`]. Every run stages its output in a fresh
//! `exports/<uuid>/` folder owned by that run alone; the artifact appears
//! under its final name only once the encoder has succeeded.

pub mod assets;
pub mod markdown;
pub mod pdf;
pub mod toc;

use crate::error::{AppError, Result};
use crate::library::book::Book;
use crate::library::cache::BookCache;
use crate::sanitize::sanitize_filename;
use assets::AssetEmbedder;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Markdown, single document or chapter archive.
    Markdown,
    /// Paginated PDF.
    Pdf,
}

impl ExportFormat {
    /// Parse a format name. Only the exact names `markdown` and `pdf` are accepted.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "markdown" => Ok(Self::Markdown),
            "pdf" => Ok(Self::Pdf),
            _ => Err(AppError::UnsupportedFormat(name.to_string())),
        }
    }
}

/// Markdown layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkdownMode {
    /// One document.
    #[default]
    Single,
    /// README plus one file per chapter, zipped.
    Chapters,
}

impl MarkdownMode {
    /// Lenient parse: absent or unknown modes mean [`MarkdownMode::Single`].
    pub fn lenient(mode: Option<&str>) -> Self {
        mode.and_then(|m| m.parse().ok()).unwrap_or_default()
    }
}

impl FromStr for MarkdownMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(Self::Single),
            "chapters" => Ok(Self::Chapters),
            other => Err(AppError::InvalidRequest(format!(
                "mode must be 'single' or 'chapters', got '{}'",
                other
            ))),
        }
    }
}

/// One concrete encoder choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Single Markdown document.
    MarkdownSingle,
    /// Zipped chapter files.
    MarkdownChapters,
    /// PDF.
    Pdf,
}

impl ExportKind {
    /// Resolve a format and optional mode. The mode only matters for Markdown.
    pub fn resolve(format: ExportFormat, mode: Option<&str>) -> Self {
        match format {
            ExportFormat::Pdf => Self::Pdf,
            ExportFormat::Markdown => match MarkdownMode::lenient(mode) {
                MarkdownMode::Single => Self::MarkdownSingle,
                MarkdownMode::Chapters => Self::MarkdownChapters,
            },
        }
    }

    /// Strict variant of [`ExportKind::resolve`] for user input: an explicit
    /// mode must be `single` or `chapters`.
    pub fn parse(format: &str, mode: Option<&str>) -> Result<Self> {
        let format = ExportFormat::parse(format)?;
        if let Some(mode) = mode {
            mode.parse::<MarkdownMode>()?;
        }
        Ok(Self::resolve(format, mode))
    }

    /// Suffix appended to the sanitized title.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::MarkdownSingle => "_single.md",
            Self::MarkdownChapters => "_chapters.zip",
            Self::Pdf => ".pdf",
        }
    }

    /// Content type of the artifact.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::MarkdownSingle => "text/markdown",
            Self::MarkdownChapters => "application/zip",
            Self::Pdf => "application/pdf",
        }
    }

    /// Stage name used in conversion errors.
    pub fn stage(self) -> &'static str {
        match self {
            Self::MarkdownSingle => "markdown-single",
            Self::MarkdownChapters => "markdown-chapters",
            Self::Pdf => "pdf",
        }
    }

    /// Download name for a book titled `title`.
    pub fn filename(self, title: &str) -> String {
        format!("{}{}", sanitize_filename(title), self.suffix())
    }
}

/// Produces one artifact from a book.
pub trait Encoder: Send + Sync {
    /// Write the artifact for `book` into `out`.
    fn encode(&self, book: &Book, assets: &mut AssetEmbedder, out: &mut File) -> Result<()>;
}

/// Get the encoder for an export kind.
pub fn get_encoder(kind: ExportKind) -> Box<dyn Encoder> {
    match kind {
        ExportKind::MarkdownSingle => Box::new(markdown::SingleFileEncoder),
        ExportKind::MarkdownChapters => Box::new(markdown::ChapterArchiveEncoder),
        ExportKind::Pdf => Box::new(pdf::PdfEncoder),
    }
}

/// A generated artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    /// Artifact location.
    pub path: PathBuf,
    /// Suggested download name, not URL-encoded.
    pub filename: String,
    /// Content type tag.
    pub content_type: &'static str,
    /// Whether the artifact must be deleted once served.
    pub cleanup: bool,
}

impl ExportResult {
    /// Remove a transient artifact together with its staging folder.
    pub fn discard(&self) -> Result<()> {
        if !self.cleanup {
            return Ok(());
        }
        match self.path.parent() {
            Some(staging) => std::fs::remove_dir_all(staging)?,
            None => std::fs::remove_file(&self.path)?,
        }
        Ok(())
    }

    /// Read the artifact, then discard it if transient.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let bytes = std::fs::read(&self.path);
        if let Err(e) = self.discard() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove export");
        }
        Ok(bytes?)
    }

    /// Copy the artifact into `dir` under its suggested name, then discard it if transient.
    pub fn save_into(self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let target = dir.join(&self.filename);
        std::fs::copy(&self.path, &target)?;
        self.discard()?;
        Ok(target)
    }
}

/// Staging folder removed on drop unless kept.
struct Staging {
    path: PathBuf,
    keep: bool,
}

impl Staging {
    fn create(exports_dir: &Path) -> Result<Self> {
        let path = exports_dir.join(uuid::Uuid::new_v4().to_string());
        std::fs::create_dir_all(&path)?;
        Ok(Self { path, keep: false })
    }

    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if !self.keep
            && let Err(e) = std::fs::remove_dir_all(&self.path)
        {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staging folder");
        }
    }
}

/// Export orchestrator.
#[derive(Clone)]
pub struct Exporter {
    cache: Arc<BookCache>,
}

impl Exporter {
    /// Create an exporter reading books through `cache`.
    pub fn new(cache: Arc<BookCache>) -> Self {
        Self { cache }
    }

    /// Export a book by format name and optional Markdown mode.
    pub fn export(&self, book_id: &str, format: &str, mode: Option<&str>) -> Result<ExportResult> {
        let format = ExportFormat::parse(format)?;
        self.export_kind(book_id, ExportKind::resolve(format, mode))
    }

    /// Export a book with an already resolved encoder choice.
    pub fn export_kind(&self, book_id: &str, kind: ExportKind) -> Result<ExportResult> {
        let book = self
            .cache
            .get(book_id)
            .ok_or_else(|| AppError::NotFound(book_id.to_string()))?;

        tracing::info!(book_id = %book_id, format = ?kind, "Exporting book");
        let result = self.run(book_id, &book, kind, get_encoder(kind).as_ref());
        match &result {
            Ok(r) => tracing::info!(book_id = %book_id, filename = %r.filename, "Export finished"),
            Err(e) => tracing::error!(book_id = %book_id, format = ?kind, error = %e, "Export failed"),
        }
        result
    }

    fn run(
        &self,
        book_id: &str,
        book: &Book,
        kind: ExportKind,
        encoder: &dyn Encoder,
    ) -> Result<ExportResult> {
        let store = self.cache.store();
        let filename = kind.filename(&book.metadata.title);

        let staging = Staging::create(&store.exports_dir(book_id))
            .map_err(|e| AppError::conversion("prepare", e))?;
        let mut partial = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(&staging.path)
            .map_err(|e| AppError::conversion("prepare", e.into()))?;

        let mut assets = AssetEmbedder::new(store.images_dir(book_id));
        encoder
            .encode(book, &mut assets, partial.as_file_mut())
            .map_err(|e| AppError::conversion(kind.stage(), e))?;
        tracing::debug!(book_id = %book_id, images = assets.resolved_count(), "Encoded artifact");

        let path = staging.path.join(&filename);
        partial
            .persist(&path)
            .map_err(|e| AppError::conversion("finalize", e.error.into()))?;
        staging.keep();

        Ok(ExportResult {
            path,
            filename,
            content_type: kind.content_type(),
            cleanup: true,
        })
    }
}
