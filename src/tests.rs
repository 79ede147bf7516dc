use crate::config::Config;
use crate::error::{AppError, Result};
use crate::export::Exporter;
use crate::library::{
    Book, BookCache, BookMetadata, BookParser, BookStore, ChapterContent, Importer, TocEntry,
};
use crate::server::{AppState, create_router};
use axum::body::Body;
use axum::response::IntoResponse;
use axum::http::{Request, StatusCode, header};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn png_bytes() -> Vec<u8> {
    let mut png = Vec::new();
    image::RgbImage::from_pixel(8, 8, image::Rgb([10, 120, 200]))
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    png
}

fn sample_book(title: &str, chapters: usize) -> Book {
    let mut meta = BookMetadata::new(title);
    meta.authors = vec!["Ada Writer".to_string(), "Bo Editor".to_string()];
    meta.publisher = Some("Small Press".to_string());

    let mut book = Book::new(meta);
    for i in 0..chapters {
        let source = format!("text/ch{}.xhtml", i + 1);
        book.spine.push(ChapterContent {
            id: format!("ch{}", i + 1),
            title: format!("Part {}", i + 1),
            order: i,
            content: format!(
                "<h1>Heading {n}</h1><p>Body text of chapter {n}.</p><p><img src=\"images/fig.png\" alt=\"fig\"></p>",
                n = i + 1
            ),
            source: source.clone(),
        });
        book.toc.push(TocEntry::new(format!("Part {}", i + 1), source));
    }
    book
}

fn store_book(root: &Path, id: &str, book: &Book) -> PathBuf {
    let store = BookStore::new(root);
    let dir = store.book_dir(id);
    store.save(&dir, book).unwrap();
    std::fs::create_dir_all(store.images_dir(id)).unwrap();
    std::fs::write(store.images_dir(id).join("fig.png"), png_bytes()).unwrap();
    dir
}

fn exporter(root: &Path) -> Exporter {
    Exporter::new(Arc::new(BookCache::new(BookStore::new(root), 4)))
}

fn test_state(root: &Path) -> AppState {
    let mut config = Config::default();
    config.library.books_dir = root.to_path_buf();
    AppState::new(config)
}

fn staged_runs(book_dir: &Path) -> usize {
    match std::fs::read_dir(book_dir.join("exports")) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

// ============================================================================
// EXPORT
// ============================================================================

#[test]
fn export_single_markdown_keeps_spine_order() {
    let dir = TempDir::new().unwrap();
    store_book(dir.path(), "story_data", &sample_book("My Book: A Story", 3));

    let result = exporter(dir.path())
        .export("story_data", "markdown", Some("single"))
        .unwrap();
    assert_eq!(result.filename, "My_Book_A_Story_single.md");
    assert_eq!(result.content_type, "text/markdown");
    assert!(result.cleanup);

    let text = String::from_utf8(result.into_bytes().unwrap()).unwrap();
    assert!(text.starts_with("---\n"));
    assert!(text.contains("# My Book: A Story"));
    assert!(text.contains("## Table of Contents"));

    let first = text.find("## Chapter 1").unwrap();
    let second = text.find("## Chapter 2").unwrap();
    let third = text.find("## Chapter 3").unwrap();
    assert!(first < second && second < third);
    assert!(text.contains("Body text of chapter 2."));
    assert!(!text.contains("images/fig.png"));
}

#[test]
fn export_chapter_archive_has_readme_and_one_file_per_chapter() {
    let dir = TempDir::new().unwrap();
    store_book(dir.path(), "story_data", &sample_book("Archive", 3));

    let result = exporter(dir.path())
        .export("story_data", "markdown", Some("chapters"))
        .unwrap();
    assert_eq!(result.filename, "Archive_chapters.zip");
    assert_eq!(result.content_type, "application/zip");

    let file = std::fs::File::open(&result.path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    assert_eq!(archive.len(), 4);

    let mut names: Vec<String> = archive.file_names().map(String::from).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 4);
    assert!(names.iter().any(|n| n == "README.md"));

    let mut readme = String::new();
    archive
        .by_name("README.md")
        .unwrap()
        .read_to_string(&mut readme)
        .unwrap();
    assert!(readme.contains("# Archive"));

    result.discard().unwrap();
}

#[test]
fn export_pdf_produces_document() {
    let dir = TempDir::new().unwrap();
    store_book(dir.path(), "story_data", &sample_book("Printed", 3));

    let result = exporter(dir.path()).export("story_data", "pdf", None).unwrap();
    assert_eq!(result.filename, "Printed.pdf");
    assert_eq!(result.content_type, "application/pdf");

    let bytes = result.into_bytes().unwrap();
    assert!(bytes.starts_with(b"%PDF-"));
    assert!(bytes.len() > 1000);

    let doc = lopdf::Document::load_mem(&bytes).unwrap();
    // Title page plus one page per chapter at least.
    assert!(doc.get_pages().len() >= 4);
}

#[test]
fn export_missing_book_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    let exporter = exporter(dir.path());

    let err = exporter.export("ghost_data", "markdown", None).unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(!dir.path().join("ghost_data").exists());
}

#[test]
fn export_rejects_unknown_format_before_loading() {
    let dir = TempDir::new().unwrap();
    let book_dir = store_book(dir.path(), "story_data", &sample_book("T", 1));

    let err = exporter(dir.path())
        .export("story_data", "docx", None)
        .unwrap_err();
    assert!(matches!(err, AppError::UnsupportedFormat(f) if f == "docx"));

    let exporter = exporter(dir.path());
    for format in ["md", "PDF", "Markdown"] {
        let err = exporter.export("story_data", format, None).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat(f) if f == format));
    }
    assert_eq!(staged_runs(&book_dir), 0);
}

#[test]
fn export_failure_reports_stage_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let book_dir = store_book(dir.path(), "story_data", &sample_book("Blocked", 1));
    // A regular file where the exports folder belongs makes staging impossible.
    std::fs::write(book_dir.join("exports"), b"not a folder").unwrap();

    let err = exporter(dir.path())
        .export("story_data", "markdown", None)
        .unwrap_err();
    assert!(matches!(err, AppError::Conversion { stage: "prepare", .. }));

    let body = err.into_response();
    assert_eq!(body.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let leftovers: Vec<_> = std::fs::read_dir(&book_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".partial-") || name.ends_with(".md"))
        .collect();
    assert!(leftovers.is_empty());
    assert!(book_dir.join("exports").is_file());
}

#[test]
fn export_is_repeatable_and_runs_are_isolated() {
    let dir = TempDir::new().unwrap();
    let book_dir = store_book(dir.path(), "story_data", &sample_book("Again", 2));
    let exporter = exporter(dir.path());

    let first = exporter.export("story_data", "markdown", None).unwrap();
    let second = exporter.export("story_data", "markdown", None).unwrap();
    assert_ne!(first.path, second.path);
    assert_eq!(first.filename, second.filename);
    assert_eq!(staged_runs(&book_dir), 2);

    let a = first.into_bytes().unwrap();
    let b = second.into_bytes().unwrap();
    assert_eq!(a, b);
    assert_eq!(staged_runs(&book_dir), 0);
}

#[test]
fn export_concurrent_runs_do_not_collide() {
    let dir = TempDir::new().unwrap();
    store_book(dir.path(), "story_data", &sample_book("Parallel", 2));
    let exporter = exporter(dir.path());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let exporter = exporter.clone();
            std::thread::spawn(move || exporter.export("story_data", "markdown", None))
        })
        .collect();

    let outputs: Vec<Vec<u8>> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap().into_bytes().unwrap())
        .collect();
    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn export_save_into_copies_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let book_dir = store_book(dir.path(), "story_data", &sample_book("Saved", 1));

    let result = exporter(dir.path()).export("story_data", "markdown", None).unwrap();
    let saved = result.save_into(out.path()).unwrap();
    assert_eq!(saved, out.path().join("Saved_single.md"));
    assert!(saved.is_file());
    assert_eq!(staged_runs(&book_dir), 0);
}

#[test]
fn export_reads_legacy_tagged_book() {
    let dir = TempDir::new().unwrap();
    let book_dir = dir.path().join("old_data");
    std::fs::create_dir_all(&book_dir).unwrap();
    let legacy = serde_json::json!({
        "type": "reader.Book",
        "book": {
            "metadata": { "title": "Old Format", "authors": ["Someone"] },
            "spine": [
                { "id": "a", "title": "First", "order": 0, "content": "<p>legacy one</p>", "href": "a.xhtml" },
                { "id": "b", "title": "Second", "order": 1, "content": "<p>legacy two</p>", "href": "b.xhtml" }
            ],
            "toc": [
                { "title": "First", "file_href": "a.xhtml", "anchor": "" },
                { "title": "Second", "file_href": "b.xhtml", "anchor": "top" }
            ]
        }
    });
    std::fs::write(book_dir.join("book.json"), legacy.to_string()).unwrap();

    let bytes = exporter(dir.path())
        .export("old_data", "markdown", None)
        .unwrap()
        .into_bytes()
        .unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("# Old Format"));
    assert!(text.find("legacy one").unwrap() < text.find("legacy two").unwrap());
}

// ============================================================================
// IMPORT
// ============================================================================

struct StubParser;

impl BookParser for StubParser {
    fn parse(&self, source: &Path, _output_dir: &Path) -> Result<Book> {
        let bytes = std::fs::read(source)?;
        let title = String::from_utf8_lossy(&bytes).trim().to_string();
        Ok(sample_book(&title, 2))
    }
}

#[test]
fn import_then_export_and_reject_duplicate() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(BookCache::new(BookStore::new(dir.path()), 4));
    let importer = Importer::new(Arc::clone(&cache), Arc::new(StubParser));

    let imported = importer.import(&b"Imported Title"[..], "My Upload.epub").unwrap();
    assert_eq!(imported.id, "My_Upload_data");
    assert_eq!(imported.title, "Imported Title");

    let bytes = Exporter::new(Arc::clone(&cache))
        .export(&imported.id, "markdown", None)
        .unwrap()
        .into_bytes()
        .unwrap();
    assert!(String::from_utf8(bytes).unwrap().contains("# Imported Title"));

    let err = importer
        .import(&b"Imported Title"[..], "renamed.epub")
        .unwrap_err();
    match err {
        AppError::DuplicateImport { id, title } => {
            assert_eq!(id, "My_Upload_data");
            assert_eq!(title, "Imported Title");
        }
        other => panic!("expected duplicate, got {:?}", other),
    }
    assert!(!dir.path().join("renamed_data").exists());
}

// ============================================================================
// HTTP
// ============================================================================

async fn get(state: AppState, uri: &str) -> axum::response::Response {
    create_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn http_healthz() {
    let dir = TempDir::new().unwrap();
    let response = get(test_state(dir.path()), "/healthz").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn http_list_and_detail() {
    let dir = TempDir::new().unwrap();
    store_book(dir.path(), "story_data", &sample_book("Listed", 2));
    std::fs::write(
        dir.path().join("story_data").join("images").join("cover.png"),
        png_bytes(),
    )
    .unwrap();
    let state = test_state(dir.path());

    let books = body_json(get(state.clone(), "/api/books").await).await;
    assert_eq!(books.as_array().unwrap().len(), 1);
    assert_eq!(books[0]["id"], "story_data");
    assert_eq!(books[0]["author"], "Ada Writer, Bo Editor");
    assert_eq!(books[0]["chapters"], 2);
    assert_eq!(books[0]["coverUrl"], "/books/story_data/images/cover.png");

    let detail = body_json(get(state.clone(), "/api/books/story_data").await).await;
    assert_eq!(detail["title"], "Listed");
    assert_eq!(detail["toc"].as_array().unwrap().len(), 2);

    let missing = get(state.clone(), "/api/books/ghost_data").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let missing = get(state, "/api/books/ghost_data/chapters/0").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn http_chapter_rewrites_image_links() {
    let dir = TempDir::new().unwrap();
    store_book(dir.path(), "story_data", &sample_book("Reader", 2));
    let state = test_state(dir.path());

    let response = get(state.clone(), "/api/books/story_data/chapters/1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let chapter = body_json(response).await;
    assert_eq!(chapter["order"], 1);
    assert!(
        chapter["html"]
            .as_str()
            .unwrap()
            .contains("src=\"/books/story_data/images/fig.png\"")
    );

    let missing = get(state.clone(), "/api/books/story_data/chapters/9").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let image = get(state, "/books/story_data/images/fig.png").await;
    assert_eq!(image.status(), StatusCode::OK);
    assert_eq!(image.headers()[header::CONTENT_TYPE], "image/png");
}

#[tokio::test]
async fn http_export_sets_download_headers() {
    let dir = TempDir::new().unwrap();
    store_book(dir.path(), "story_data", &sample_book("Café Noir", 1));

    let response = get(test_state(dir.path()), "/export/story_data/markdown?mode=single").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/markdown");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename*=UTF-8''Caf%C3%A9_Noir_single.md"
    );
    assert_eq!(staged_runs(&dir.path().join("story_data")), 0);
}

#[tokio::test]
async fn http_export_errors() {
    let dir = TempDir::new().unwrap();
    store_book(dir.path(), "story_data", &sample_book("T", 1));
    let state = test_state(dir.path());

    let missing = get(state.clone(), "/export/ghost_data/pdf").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert!(body_json(missing).await["detail"].is_string());

    let bad_mode = get(state, "/export/story_data/markdown?mode=bogus").await;
    assert_eq!(bad_mode.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn http_import_conflict() {
    let dir = TempDir::new().unwrap();
    let state = test_state(dir.path()).with_parser(Arc::new(StubParser));

    let upload = |name: &str| {
        Request::builder()
            .method("POST")
            .uri(format!("/api/books/import?filename={}", name))
            .body(Body::from("Uploaded"))
            .unwrap()
    };

    let first = create_router(state.clone())
        .oneshot(upload("first.epub"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(body_json(first).await["id"], "first_data");

    let second = create_router(state)
        .oneshot(upload("second.epub"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = body_json(second).await;
    assert_eq!(body["id"], "first_data");
    assert_eq!(body["title"], "Uploaded");
}

#[tokio::test]
async fn http_import_without_parser_fails() {
    let dir = TempDir::new().unwrap();
    let response = create_router(test_state(dir.path()))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/books/import?filename=a.epub")
                .body(Body::from("x"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// ============================================================================
// CONFIG
// ============================================================================

#[test]
fn config_parse_toml() {
    let toml = r#"
[server]
bind = "0.0.0.0:9090"

[library]
books_dir = "/srv/books"

[cache]
max_books = 3
"#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.server.bind.port(), 9090);
    assert_eq!(config.library.books_dir, PathBuf::from("/srv/books"));
    assert_eq!(config.cache.max_books, 3);
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.server.bind.port(), 8123);
    assert_eq!(config.library.books_dir, PathBuf::from("books"));
    assert_eq!(config.cache.max_books, 10);

    let generated: Config = toml::from_str(&Config::generate_default()).unwrap();
    assert_eq!(generated.server.bind, config.server.bind);
    assert_eq!(generated.cache.max_books, config.cache.max_books);
}

#[test]
fn config_partial_file_uses_defaults() {
    let config: Config = toml::from_str("[cache]\nmax_books = 2\n").unwrap();
    assert_eq!(config.cache.max_books, 2);
    assert_eq!(config.server.bind.port(), 8123);
}
