//! Markdown encoders: one document, or one file per chapter in a ZIP.

use super::Encoder;
use super::assets::{AssetEmbedder, rewrite_images};
use super::toc::{self, LinkMode};
use crate::error::{AppError, Result};
use crate::library::book::{Book, BookMetadata};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Name of the index file inside a chapter archive.
pub const README_NAME: &str = "README.md";

/// Divider written between two chapters of a single document.
pub const CHAPTER_DIVIDER: &str = "\n\n---\n\n";

#[derive(Serialize)]
struct Frontmatter<'a> {
    title: &'a str,
    authors: &'a [String],
    language: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    publisher: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// YAML frontmatter block, `---` delimited, followed by a blank line.
pub fn frontmatter(metadata: &BookMetadata) -> Result<String> {
    let yaml = serde_yaml::to_string(&Frontmatter {
        title: &metadata.title,
        authors: &metadata.authors,
        language: &metadata.language,
        publisher: non_empty(&metadata.publisher),
        date: non_empty(&metadata.date),
        description: non_empty(&metadata.description),
    })
    .map_err(|e| AppError::Internal(format!("Frontmatter encoding failed: {}", e)))?;

    Ok(format!("---\n{}---\n\n", yaml))
}

/// Convert chapter HTML to Markdown with images embedded.
pub fn html_to_markdown(html: &str, assets: &mut AssetEmbedder) -> Result<String> {
    let html = rewrite_images(html, assets)?;
    Ok(html2md::rewrite_html(&html, true))
}

fn document_header(book: &Book, mode: LinkMode) -> Result<String> {
    let mut out = frontmatter(&book.metadata)?;
    out.push_str(&format!("# {}\n\n", book.metadata.title));
    out.push_str("## Table of Contents\n\n");
    out.push_str(&toc::to_markdown(&toc::render(&book.toc, mode)));
    Ok(out)
}

/// Whole book as one Markdown document.
///
/// Chapter `i` (spine order) is preceded by anchor `chapter-i` and headed
/// `Chapter i+1`; chapters are separated by [`CHAPTER_DIVIDER`].
pub fn single_document(book: &Book, assets: &mut AssetEmbedder) -> Result<String> {
    let mut out = document_header(book, LinkMode::Anchor)?;
    out.push_str("\n---\n\n");

    for (i, chapter) in book.spine.iter().enumerate() {
        if i > 0 {
            out.push_str(CHAPTER_DIVIDER);
        }
        out.push_str(&format!("<a id=\"{}\"></a>\n\n", toc::chapter_anchor(i)));
        out.push_str(&format!("## Chapter {}\n\n", i + 1));
        out.push_str(&html_to_markdown(&chapter.content, assets)?);
    }

    Ok(out)
}

/// README plus one Markdown file per chapter, as (archive path, contents).
pub fn chapter_files(book: &Book, assets: &mut AssetEmbedder) -> Result<Vec<(String, String)>> {
    let mut files = Vec::with_capacity(book.spine.len() + 1);
    files.push((README_NAME.to_string(), document_header(book, LinkMode::Split)?));

    for (i, chapter) in book.spine.iter().enumerate() {
        let title = if chapter.title.trim().is_empty() {
            format!("Chapter_{}", i + 1)
        } else {
            chapter.title.clone()
        };

        let body = html_to_markdown(&chapter.content, assets)?;
        files.push((toc::chapter_filename(i, &title), format!("# {}\n\n{}", title, body)));
    }

    Ok(files)
}

/// Single-document encoder.
pub struct SingleFileEncoder;

impl Encoder for SingleFileEncoder {
    fn encode(&self, book: &Book, assets: &mut AssetEmbedder, out: &mut File) -> Result<()> {
        let document = single_document(book, assets)?;
        out.write_all(document.as_bytes())?;
        Ok(())
    }
}

/// Chapter-split encoder writing a deflated ZIP.
pub struct ChapterArchiveEncoder;

impl Encoder for ChapterArchiveEncoder {
    fn encode(&self, book: &Book, assets: &mut AssetEmbedder, out: &mut File) -> Result<()> {
        let files = chapter_files(book, assets)?;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut zip = ZipWriter::new(out);
        for (name, contents) in &files {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(contents.as_bytes())?;
        }
        zip.finish()?;

        tracing::debug!(entries = files.len(), "Wrote chapter archive");
        Ok(())
    }
}
