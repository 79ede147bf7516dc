//! Inline image embedding.
//!
//! Images are looked up by basename in the book's image folder and turned
//! into `data:` URIs. One [`AssetEmbedder`] lives for one export run.

use crate::error::{AppError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// MIME type used when the extension is unknown.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Extension fallback when `mime_guess` has no image type for a name.
const IMAGE_MIME_TABLE: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
];

/// MIME type of an image file name.
pub fn image_mime(filename: &str) -> &'static str {
    if let Some(mime) = mime_guess::from_path(filename)
        .iter_raw()
        .find(|m| m.starts_with("image/"))
    {
        return mime;
    }

    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    IMAGE_MIME_TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_IMAGE_MIME)
}

/// Per-run image resolver with memoization of successful lookups.
#[derive(Debug)]
pub struct AssetEmbedder {
    images_dir: PathBuf,
    resolved: HashMap<String, String>,
}

impl AssetEmbedder {
    /// Create an embedder reading from `images_dir`.
    pub fn new(images_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
            resolved: HashMap::new(),
        }
    }

    /// Data URI for `filename`, or `None` when it cannot be read.
    pub fn embed(&mut self, filename: &str) -> Option<String> {
        if let Some(uri) = self.resolved.get(filename) {
            return Some(uri.clone());
        }

        // Only plain basenames are looked up.
        if filename.is_empty() || filename.contains(['/', '\\']) || filename == ".." {
            return None;
        }

        let path = self.images_dir.join(filename);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read image");
                }
                return None;
            }
        };

        let uri = format!("data:{};base64,{}", image_mime(filename), STANDARD.encode(&bytes));
        self.resolved.insert(filename.to_string(), uri.clone());
        Some(uri)
    }

    /// Number of distinct images resolved so far.
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }
}

/// Basename of an image reference, without query or fragment.
fn image_basename(src: &str) -> &str {
    let path = src.split(['?', '#']).next().unwrap_or(src);
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Point every `<img src>` in `html` at its embedded data URI.
///
/// Unresolvable images keep their original `src`.
pub fn rewrite_images(html: &str, embedder: &mut AssetEmbedder) -> Result<String> {
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img[src]", |el| {
                let Some(src) = el.get_attribute("src") else {
                    return Ok(());
                };
                if src.starts_with("data:") {
                    return Ok(());
                }

                let name = image_basename(&src);
                match embedder.embed(name) {
                    Some(uri) => el.set_attribute("src", &uri)?,
                    None => tracing::warn!(image = %name, "Image not found, keeping reference"),
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| AppError::Internal(format!("HTML rewrite failed: {}", e)))
}
