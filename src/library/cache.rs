//! Bounded in-memory cache of parsed books.
//!
//! Lookups go through an LRU map guarded by a `parking_lot::Mutex`. The lock
//! only covers map bookkeeping: reading and decoding `book.json` on a miss
//! happens with the lock released, so two concurrent misses for the same id
//! may both load the book. Both copies are equal and the later insert wins.

use crate::error::AppError;
use crate::library::book::Book;
use crate::library::store::BookStore;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default number of resident books.
pub const DEFAULT_CAPACITY: usize = 10;

/// Read-through book cache.
pub struct BookCache {
    store: BookStore,
    entries: Mutex<LruCache<String, Arc<Book>>>,
}

impl BookCache {
    /// Create a cache holding at most `capacity` books (0 falls back to the default).
    pub fn new(store: BookStore, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            store,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Backing store.
    pub fn store(&self) -> &BookStore {
        &self.store
    }

    /// Get a book, loading it from storage on a miss.
    ///
    /// Missing and corrupt books both come back as `None`; the cause is logged.
    pub fn get(&self, id: &str) -> Option<Arc<Book>> {
        if let Some(book) = self.entries.lock().get(id) {
            return Some(Arc::clone(book));
        }

        let book = match self.store.load(id) {
            Ok(book) => Arc::new(book),
            Err(AppError::NotFound(_)) => {
                tracing::debug!(book_id = %id, "Book not in storage");
                return None;
            }
            Err(e) => {
                tracing::warn!(book_id = %id, error = %e, "Failed to load book");
                return None;
            }
        };

        let mut entries = self.entries.lock();
        if let Some((evicted, _)) = entries.push(id.to_string(), Arc::clone(&book))
            && evicted != id
        {
            tracing::debug!(book_id = %evicted, "Evicted book from cache");
        }
        tracing::debug!(book_id = %id, resident = entries.len(), "Cached book");

        Some(book)
    }

    /// Drop one book from the cache.
    pub fn invalidate(&self, id: &str) {
        self.entries.lock().pop(id);
    }

    /// Drop every cached book.
    pub fn invalidate_all(&self) {
        self.entries.lock().clear();
    }

    /// Number of resident books.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no book is resident.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether a book is resident, without touching recency.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().contains(id)
    }
}
