//! Application state shared across handlers.

use crate::config::Config;
use crate::export::Exporter;
use crate::library::book::Book;
use crate::library::cache::BookCache;
use crate::library::import::{BookParser, Importer};
use crate::library::store::{BookStore, IMAGES_DIR};
use serde::Serialize;
use std::sync::Arc;

/// Listing entry for one book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    /// Folder identifier.
    pub id: String,
    /// Title.
    pub title: String,
    /// Authors joined with ", ".
    pub author: String,
    /// Number of spine chapters.
    pub chapters: usize,
    /// Cover image URL, if the book has a cover.
    pub cover_url: Option<String>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Parsed book cache.
    pub cache: Arc<BookCache>,
    /// Export orchestrator.
    pub exporter: Exporter,
    /// Import pipeline, present when a parser is installed.
    importer: Option<Arc<Importer>>,
}

impl AppState {
    /// Create state for `config`, without an import parser.
    pub fn new(config: Config) -> Self {
        let store = BookStore::new(&config.library.books_dir);
        let cache = Arc::new(BookCache::new(store, config.cache.max_books));

        Self {
            config: Arc::new(config),
            exporter: Exporter::new(Arc::clone(&cache)),
            cache,
            importer: None,
        }
    }

    /// Install the parser used by uploads.
    pub fn with_parser(mut self, parser: Arc<dyn BookParser>) -> Self {
        self.importer = Some(Arc::new(Importer::new(Arc::clone(&self.cache), parser)));
        self
    }

    /// Import pipeline, if a parser is installed.
    pub fn importer(&self) -> Option<Arc<Importer>> {
        self.importer.clone()
    }

    /// Book storage.
    pub fn store(&self) -> &BookStore {
        self.cache.store()
    }

    /// Get a book through the cache.
    pub fn get_book(&self, id: &str) -> Option<Arc<Book>> {
        self.cache.get(id)
    }

    /// Public URL of a book's cover image.
    pub fn cover_url(&self, id: &str) -> Option<String> {
        self.store()
            .find_cover(id)
            .map(|name| format!("/books/{}/{}/{}", id, IMAGES_DIR, name))
    }

    /// Listing entry for a loaded book.
    pub fn summary(&self, id: &str, book: &Book) -> BookSummary {
        BookSummary {
            id: id.to_string(),
            title: book.metadata.title.clone(),
            author: book.metadata.authors.join(", "),
            chapters: book.spine.len(),
            cover_url: self.cover_url(id),
        }
    }

    /// All loadable books, in folder order. Unreadable folders are skipped.
    pub fn list_books(&self) -> Vec<BookSummary> {
        let start = std::time::Instant::now();
        let books: Vec<BookSummary> = self
            .store()
            .list_ids()
            .into_iter()
            .filter_map(|id| {
                let book = self.get_book(&id)?;
                Some(self.summary(&id, &book))
            })
            .collect();

        tracing::debug!(books = books.len(), elapsed = ?start.elapsed(), "Listed books");
        books
    }
}
