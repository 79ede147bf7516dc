//! Import of uploaded source files into the books directory.
//!
//! The upload is streamed to a temporary file while it is fingerprinted, so
//! duplicates are rejected before the parser ever runs.

use crate::error::{AppError, Result};
use crate::library::book::Book;
use crate::library::cache::BookCache;
use crate::library::dedup::{Deduplicator, fingerprint};
use crate::sanitize::sanitize_book_name;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Accepted upload extension.
pub const SOURCE_EXTENSION: &str = "epub";

/// Converts a source file into a [`Book`], extracting its images below `output_dir`.
pub trait BookParser: Send + Sync {
    /// Parse `source`. Images go to `output_dir/images/`.
    fn parse(&self, source: &Path, output_dir: &Path) -> Result<Book>;
}

/// Outcome of a successful import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedBook {
    /// Folder identifier of the new book.
    pub id: String,
    /// Parsed title.
    pub title: String,
    /// Hex SHA-256 of the uploaded bytes.
    pub fingerprint: String,
}

/// Import pipeline: fingerprint, dedup check, parse, store.
pub struct Importer {
    cache: Arc<BookCache>,
    parser: Arc<dyn BookParser>,
    /// Digests being imported right now, with the folder reserved for each.
    in_flight: Mutex<HashMap<String, String>>,
}

/// Claim on a digest, released when the import finishes either way.
struct Claim<'a> {
    in_flight: &'a Mutex<HashMap<String, String>>,
    digest: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.digest);
    }
}

impl Importer {
    /// Create an importer writing into the cache's store.
    pub fn new(cache: Arc<BookCache>, parser: Arc<dyn BookParser>) -> Self {
        Self {
            cache,
            parser,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve a folder for `digest`, unless the same bytes are stored or being imported.
    fn claim(&self, digest: &str, filename: &str) -> Result<(String, Claim<'_>)> {
        let store = self.cache.store();
        let mut in_flight = self.in_flight.lock();

        if let Some(id) = in_flight.get(digest) {
            tracing::info!(book_id = %id, "Rejected concurrent duplicate import");
            return Err(AppError::DuplicateImport {
                id: id.clone(),
                title: id.clone(),
            });
        }

        if let Some(id) = Deduplicator::new(store.clone()).find_duplicate(digest) {
            drop(in_flight);
            let title = self
                .cache
                .get(&id)
                .map(|book| book.metadata.title.clone())
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| id.clone());
            tracing::info!(book_id = %id, "Rejected duplicate import");
            return Err(AppError::DuplicateImport { id, title });
        }

        // Created under the lock so two uploads never share a folder name.
        let id = store.unique_folder(&sanitize_book_name(filename));
        std::fs::create_dir_all(store.book_dir(&id))?;
        in_flight.insert(digest.to_string(), id.clone());

        Ok((
            id,
            Claim {
                in_flight: &self.in_flight,
                digest: digest.to_string(),
            },
        ))
    }

    /// Import an upload named `filename`.
    pub fn import<R: Read>(&self, reader: R, filename: &str) -> Result<ImportedBook> {
        let is_source = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(SOURCE_EXTENSION));
        if !is_source {
            return Err(AppError::InvalidRequest(format!(
                "Only .{} files are supported",
                SOURCE_EXTENSION
            )));
        }

        let store = self.cache.store();
        std::fs::create_dir_all(store.root())?;

        // Dropped (and removed) on every exit path.
        let mut upload = tempfile::Builder::new()
            .prefix(".upload-")
            .suffix(".epub")
            .tempfile_in(store.root())?;
        let digest = fingerprint(reader, upload.as_file_mut())?;
        tracing::debug!(filename, fingerprint = %digest, "Upload received");

        let (id, _claim) = self.claim(&digest, filename)?;
        let book_dir = store.book_dir(&id);

        let stored = self
            .parser
            .parse(upload.path(), &book_dir)
            .and_then(|book| {
                store.save(&book_dir, &book)?;
                store.write_fingerprint(&book_dir, &digest)?;
                Ok(book)
            });

        let book = match stored {
            Ok(book) => book,
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir_all(&book_dir) {
                    tracing::warn!(path = %book_dir.display(), error = %cleanup, "Failed to remove partial import");
                }
                tracing::error!(filename, error = %e, "Import failed");
                return Err(match e {
                    AppError::Import(_) => e,
                    other => AppError::Import(other.to_string()),
                });
            }
        };

        self.cache.invalidate(&id);
        tracing::info!(book_id = %id, title = %book.metadata.title, "Imported book");

        Ok(ImportedBook {
            id,
            title: book.metadata.title,
            fingerprint: digest,
        })
    }
}
