//! bookpress: export stored ebooks to Markdown, chapter archives and PDF.
//!
//! Books are imported once into a `<name>_data` folder holding the parsed
//! book document and its images. From there the crate produces:
//!
//! - A single Markdown file with YAML frontmatter and a linked TOC
//! - A ZIP of one Markdown file per chapter plus a README index
//! - A paginated A4 PDF with a title page, running header and page numbers
//!
//! Images are inlined as `data:` URIs in every format. Parsed books are kept
//! in a bounded LRU cache and repeated imports are detected by SHA-256.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration and CLI.
pub mod config;
/// Error types.
pub mod error;
/// Export formats and orchestration.
pub mod export;
/// Stored books, cache and import.
pub mod library;
/// HTML to PDF print engine.
pub mod print;
/// File name sanitization.
pub mod sanitize;
/// HTTP server.
pub mod server;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use error::{AppError, Result};
pub use export::{ExportResult, Exporter};
pub use server::AppState;
