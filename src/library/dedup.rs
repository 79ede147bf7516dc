//! Duplicate import detection by content fingerprint.

use crate::library::store::BookStore;
use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};

/// Read size used while streaming an upload.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Copy `reader` into `sink` and return the hex SHA-256 of the bytes copied.
///
/// Single pass, fixed-size buffer: the upload is never held in memory whole.
pub fn fingerprint<R: Read, W: Write>(mut reader: R, mut sink: W) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        sink.write_all(&buf[..n])?;
    }
    sink.flush()?;

    Ok(hex::encode(hasher.finalize()))
}

/// Looks up stored fingerprints of imported books.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    store: BookStore,
}

impl Deduplicator {
    /// Create a deduplicator over `store`.
    pub fn new(store: BookStore) -> Self {
        Self { store }
    }

    /// Identifier of the first book (in folder order) whose fingerprint equals `digest`.
    pub fn find_duplicate(&self, digest: &str) -> Option<String> {
        let digest = digest.trim();
        if digest.is_empty() {
            return None;
        }

        self.store
            .list_ids()
            .into_iter()
            .find(|id| self.store.read_fingerprint(id).as_deref() == Some(digest))
    }
}
