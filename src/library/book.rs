//! Parsed book model.
//!
//! A `Book` is produced once by the parser at import time and never mutated
//! afterwards; exporters only read it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Descriptive metadata of a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    /// Book title (may be blank; blank titles sanitize to a fallback filename).
    pub title: String,

    /// Authors in display order (may be empty).
    #[serde(default)]
    pub authors: Vec<String>,

    /// Language code (e.g., "en", "fr").
    #[serde(default = "default_language")]
    pub language: String,

    /// Publisher name.
    #[serde(default)]
    pub publisher: Option<String>,

    /// Publication date as found in the source.
    #[serde(default)]
    pub date: Option<String>,

    /// Book description or summary.
    #[serde(default)]
    pub description: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

impl BookMetadata {
    /// Create metadata with only a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            authors: Vec::new(),
            language: default_language(),
            publisher: None,
            date: None,
            description: None,
        }
    }

    /// Get display name for authors.
    pub fn authors_display(&self) -> String {
        if self.authors.is_empty() {
            "Unknown Author".to_string()
        } else {
            self.authors.join(", ")
        }
    }
}

/// One spine document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterContent {
    /// Manifest identifier.
    pub id: String,

    /// Chapter title (may be empty).
    #[serde(default)]
    pub title: String,

    /// Zero-based position in the spine.
    pub order: usize,

    /// Raw HTML body.
    pub content: String,

    /// Source href inside the original package, used to resolve TOC targets.
    pub source: String,
}

/// Table of contents node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Display title.
    pub title: String,

    /// Target reference: `file.xhtml`, `file.xhtml#anchor` or `#anchor`.
    #[serde(default)]
    pub href: String,

    /// Nested entries, in stored order.
    #[serde(default)]
    pub children: Vec<TocEntry>,
}

impl TocEntry {
    /// Create an entry without children.
    pub fn new(title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
            children: Vec::new(),
        }
    }

    /// Attach children, builder style.
    pub fn with_children(mut self, children: Vec<TocEntry>) -> Self {
        self.children = children;
        self
    }

    /// The spine file part of the target (empty for pure fragment targets).
    pub fn file_href(&self) -> &str {
        self.href
            .split_once('#')
            .map(|(file, _)| file)
            .unwrap_or(&self.href)
    }

    /// The fragment part of the target, if any.
    pub fn anchor(&self) -> Option<&str> {
        self.href
            .split_once('#')
            .map(|(_, anchor)| anchor)
            .filter(|a| !a.is_empty())
    }
}

/// A parsed book: metadata, spine, TOC forest and extracted images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Book metadata.
    pub metadata: BookMetadata,

    /// Chapters in canonical reading order. Never re-sorted.
    pub spine: Vec<ChapterContent>,

    /// Top-level TOC entries.
    #[serde(default)]
    pub toc: Vec<TocEntry>,

    /// Original image reference -> stored image path.
    #[serde(default)]
    pub images: BTreeMap<String, String>,
}

impl Book {
    /// Create an empty book with the given metadata.
    pub fn new(metadata: BookMetadata) -> Self {
        Self {
            metadata,
            spine: Vec::new(),
            toc: Vec::new(),
            images: BTreeMap::new(),
        }
    }

    /// Map of spine source href to spine index.
    pub fn spine_index(&self) -> HashMap<&str, usize> {
        self.spine
            .iter()
            .enumerate()
            .map(|(idx, chapter)| (chapter.source.as_str(), idx))
            .collect()
    }

    /// Resolve a TOC entry to its spine index. Dangling targets resolve to `None`.
    pub fn resolve(&self, entry: &TocEntry) -> Option<usize> {
        let file = entry.file_href();
        if file.is_empty() {
            return None;
        }
        self.spine.iter().position(|c| c.source == file)
    }
}
