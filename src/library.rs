//! Stored books: model, on-disk layout, cache and import.

pub mod book;
pub mod cache;
pub mod dedup;
pub mod import;
pub mod store;

pub use book::{Book, BookMetadata, ChapterContent, TocEntry};
pub use cache::BookCache;
pub use dedup::{Deduplicator, fingerprint};
pub use import::{BookParser, ImportedBook, Importer};
pub use store::BookStore;
