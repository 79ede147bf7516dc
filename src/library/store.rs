//! On-disk book folders.
//!
//! Layout per book, under the configured books directory:
//!
//! ```text
//! <id>/book.json       serialized Book envelope
//! <id>/images/         extracted images
//! <id>/exports/        export staging area
//! <id>/source.sha256   fingerprint of the imported source
//! ```

use crate::error::{AppError, Result};
use crate::library::book::{Book, BookMetadata, ChapterContent, TocEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Serialized book file name.
pub const BOOK_FILE: &str = "book.json";
/// Image folder name.
pub const IMAGES_DIR: &str = "images";
/// Export staging folder name.
pub const EXPORTS_DIR: &str = "exports";
/// Fingerprint file name.
pub const FINGERPRINT_FILE: &str = "source.sha256";
/// Suffix marking a directory as a book folder.
pub const BOOK_DIR_SUFFIX: &str = "_data";

/// Type tag written with every stored book.
pub const CURRENT_TYPE_TAG: &str = "bookpress.Book";

/// Cover file names tried in order.
const COVER_NAMES: [&str; 3] = ["cover.jpeg", "cover.jpg", "cover.png"];

/// Stored layout a type tag decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Current,
    Legacy,
}

/// Type tags accepted on read. Old tags map onto the layout they were written with.
const TYPE_ALIASES: &[(&str, Layout)] = &[
    (CURRENT_TYPE_TAG, Layout::Current),
    ("reader.Book", Layout::Legacy),
    ("main.Book", Layout::Legacy),
];

fn layout_for(tag: &str) -> Option<Layout> {
    TYPE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == tag)
        .map(|(_, layout)| *layout)
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    book: &'a Book,
}

#[derive(Deserialize)]
struct LegacyChapter {
    id: String,
    #[serde(default)]
    title: String,
    order: usize,
    content: String,
    href: String,
}

#[derive(Deserialize)]
struct LegacyTocEntry {
    title: String,
    #[serde(default)]
    href: String,
    #[serde(default)]
    file_href: String,
    #[serde(default)]
    anchor: String,
    #[serde(default)]
    children: Vec<LegacyTocEntry>,
}

#[derive(Deserialize)]
struct LegacyBook {
    metadata: BookMetadata,
    spine: Vec<LegacyChapter>,
    #[serde(default)]
    toc: Vec<LegacyTocEntry>,
    #[serde(default)]
    images: BTreeMap<String, String>,
}

impl From<LegacyTocEntry> for TocEntry {
    fn from(entry: LegacyTocEntry) -> Self {
        let href = if !entry.href.is_empty() {
            entry.href
        } else if entry.anchor.is_empty() {
            entry.file_href
        } else {
            format!("{}#{}", entry.file_href, entry.anchor)
        };

        TocEntry {
            title: entry.title,
            href,
            children: entry.children.into_iter().map(TocEntry::from).collect(),
        }
    }
}

impl From<LegacyBook> for Book {
    fn from(legacy: LegacyBook) -> Self {
        Book {
            metadata: legacy.metadata,
            spine: legacy
                .spine
                .into_iter()
                .map(|c| ChapterContent {
                    id: c.id,
                    title: c.title,
                    order: c.order,
                    content: c.content,
                    source: c.href,
                })
                .collect(),
            toc: legacy.toc.into_iter().map(TocEntry::from).collect(),
            images: legacy.images,
        }
    }
}

/// Decode a stored book, remapping legacy type tags.
pub fn decode_book(bytes: &[u8]) -> Result<Book> {
    let mut value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| AppError::Storage(e.to_string()))?;

    let Some(tag) = value.get("type").and_then(|t| t.as_str()).map(String::from) else {
        // Untagged documents are plain current-layout books.
        return serde_json::from_value(value).map_err(|e| AppError::Storage(e.to_string()));
    };

    let layout = layout_for(&tag)
        .ok_or_else(|| AppError::Storage(format!("Unknown stored type: {}", tag)))?;
    let inner = value
        .get_mut("book")
        .map(serde_json::Value::take)
        .ok_or_else(|| AppError::Storage("Missing book payload".into()))?;

    match layout {
        Layout::Current => serde_json::from_value::<Book>(inner),
        Layout::Legacy => serde_json::from_value::<LegacyBook>(inner).map(Book::from),
    }
    .map_err(|e| AppError::Storage(format!("{} ({})", e, tag)))
}

/// Encode a book with the current type tag.
pub fn encode_book(book: &Book) -> Result<Vec<u8>> {
    serde_json::to_vec(&EnvelopeRef {
        kind: CURRENT_TYPE_TAG,
        book,
    })
    .map_err(|e| AppError::Storage(e.to_string()))
}

/// Check that an identifier names a single folder below the books directory.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\', '\0'])
}

/// Access to the books directory.
#[derive(Debug, Clone)]
pub struct BookStore {
    root: PathBuf,
}

impl BookStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Books directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder of a book.
    pub fn book_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Image folder of a book.
    pub fn images_dir(&self, id: &str) -> PathBuf {
        self.book_dir(id).join(IMAGES_DIR)
    }

    /// Export staging folder of a book.
    pub fn exports_dir(&self, id: &str) -> PathBuf {
        self.book_dir(id).join(EXPORTS_DIR)
    }

    /// Load a stored book.
    ///
    /// Missing books are `NotFound`; undecodable ones are `Storage`.
    pub fn load(&self, id: &str) -> Result<Book> {
        if !is_valid_id(id) {
            return Err(AppError::NotFound(id.to_string()));
        }

        let path = self.book_dir(id).join(BOOK_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        decode_book(&bytes)
    }

    /// Write `book.json` into `dir`, replacing any previous file atomically.
    pub fn save(&self, dir: &Path, book: &Book) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let bytes = encode_book(book)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(dir.join(BOOK_FILE))
            .map_err(|e| AppError::Io(e.error))?;

        Ok(())
    }

    /// Identifiers of all book folders, sorted.
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .filter(|name| name.ends_with(BOOK_DIR_SUFFIX))
            .collect();
        ids.sort();
        ids
    }

    /// Stored fingerprint of a book, if any.
    pub fn read_fingerprint(&self, id: &str) -> Option<String> {
        let path = self.book_dir(id).join(FINGERPRINT_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content.trim().to_string()),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), error = %e, "Unreadable fingerprint");
                }
                None
            }
        }
    }

    /// Write the fingerprint file into a book folder.
    pub fn write_fingerprint(&self, dir: &Path, digest: &str) -> Result<()> {
        std::fs::write(dir.join(FINGERPRINT_FILE), digest)?;
        Ok(())
    }

    /// Cover image file name, if the book has one.
    pub fn find_cover(&self, id: &str) -> Option<&'static str> {
        let images = self.images_dir(id);
        COVER_NAMES
            .into_iter()
            .find(|name| images.join(name).is_file())
    }

    /// Pick an unused folder name for `base`: `base_data`, then `base_2_data`, ...
    pub fn unique_folder(&self, base: &str) -> String {
        let candidate = format!("{}{}", base, BOOK_DIR_SUFFIX);
        if !self.root.join(&candidate).exists() {
            return candidate;
        }

        let mut suffix = 2;
        loop {
            let candidate = format!("{}_{}{}", base, suffix, BOOK_DIR_SUFFIX);
            if !self.root.join(&candidate).exists() {
                return candidate;
            }
            suffix += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_book() -> Book {
        let mut book = Book::new(BookMetadata::new("Stored"));
        book.spine.push(ChapterContent {
            id: "c1".into(),
            title: "One".into(),
            order: 0,
            content: "<p>one</p>".into(),
            source: "ch1.xhtml".into(),
        });
        book.toc.push(TocEntry::new("One", "ch1.xhtml"));
        book
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = BookStore::new(dir.path());
        let book = sample_book();

        store.save(&store.book_dir("a_data"), &book).unwrap();
        assert_eq!(store.load("a_data").unwrap(), book);
    }

    #[test]
    fn missing_book_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = BookStore::new(dir.path());

        assert!(matches!(store.load("nope_data"), Err(AppError::NotFound(_))));
        assert!(matches!(store.load("../etc"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn corrupt_book_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let store = BookStore::new(dir.path());
        std::fs::create_dir_all(store.book_dir("bad_data")).unwrap();
        std::fs::write(store.book_dir("bad_data").join(BOOK_FILE), b"\x80not json").unwrap();

        assert!(matches!(store.load("bad_data"), Err(AppError::Storage(_))));
    }

    #[test]
    fn legacy_tag_is_remapped() {
        let legacy = r##"{
            "type": "main.Book",
            "book": {
                "metadata": {"title": "Old", "authors": ["A"], "language": "de"},
                "spine": [{"id": "c1", "title": "", "order": 0, "content": "<p/>", "href": "ch1.xhtml"}],
                "toc": [{"title": "Start", "file_href": "ch1.xhtml", "anchor": "top",
                         "children": [{"title": "Inner", "href": "ch1.xhtml#in"}]}],
                "images": {}
            }
        }"##;

        let book = decode_book(legacy.as_bytes()).unwrap();
        assert_eq!(book.metadata.title, "Old");
        assert_eq!(book.spine[0].source, "ch1.xhtml");
        assert_eq!(book.toc[0].href, "ch1.xhtml#top");
        assert_eq!(book.toc[0].children[0].href, "ch1.xhtml#in");
        assert_eq!(book.resolve(&book.toc[0]), Some(0));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let doc = r#"{"type": "other.Thing", "book": {}}"#;
        assert!(matches!(decode_book(doc.as_bytes()), Err(AppError::Storage(_))));
    }

    #[test]
    fn untagged_document_is_current_layout() {
        let book = sample_book();
        let bytes = serde_json::to_vec(&book).unwrap();
        assert_eq!(decode_book(&bytes).unwrap(), book);
    }

    #[test]
    fn list_ids_only_book_folders() {
        let dir = TempDir::new().unwrap();
        let store = BookStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("b_data")).unwrap();
        std::fs::create_dir_all(dir.path().join("a_data")).unwrap();
        std::fs::create_dir_all(dir.path().join("misc")).unwrap();
        std::fs::write(dir.path().join("c_data"), b"file").unwrap();

        assert_eq!(store.list_ids(), vec!["a_data", "b_data"]);
    }

    #[test]
    fn unique_folder_adds_suffix() {
        let dir = TempDir::new().unwrap();
        let store = BookStore::new(dir.path());
        assert_eq!(store.unique_folder("novel"), "novel_data");

        std::fs::create_dir_all(dir.path().join("novel_data")).unwrap();
        std::fs::create_dir_all(dir.path().join("novel_2_data")).unwrap();
        assert_eq!(store.unique_folder("novel"), "novel_3_data");
    }

    #[test]
    fn fingerprint_is_trimmed() {
        let dir = TempDir::new().unwrap();
        let store = BookStore::new(dir.path());
        let book_dir = store.book_dir("x_data");
        std::fs::create_dir_all(&book_dir).unwrap();
        std::fs::write(book_dir.join(FINGERPRINT_FILE), "abc123\n").unwrap();

        assert_eq!(store.read_fingerprint("x_data").as_deref(), Some("abc123"));
        assert_eq!(store.read_fingerprint("y_data"), None);
    }
}
