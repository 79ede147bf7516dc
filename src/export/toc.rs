//! Table of contents rendering.
//!
//! All traversals are pre-order, depth-first, in stored child order, with the
//! nesting depth carried explicitly (top level = 0).

use crate::library::book::{Book, TocEntry};
use crate::sanitize::sanitize_filename;
use serde::Serialize;
use std::collections::HashMap;

/// How TOC entries link to their targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// In-document anchors `#chapter-<n>`, `n` being the pre-order position.
    Anchor,
    /// Chapter files `<NN>_<title>.md`, `NN` being the position among siblings.
    ///
    /// Chapter files are named from the spine index and chapter title, so a
    /// link only resolves when a top-level entry lines up with its chapter.
    /// Nested entries and entries titled differently from their chapter
    /// point at files the archive does not contain.
    Split,
}

/// One rendered TOC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocLink {
    /// Entry title as stored.
    pub title: String,
    /// Link target.
    pub link: String,
    /// Nesting depth.
    pub depth: usize,
}

/// Anchor id for the `n`-th position.
pub fn chapter_anchor(n: usize) -> String {
    format!("chapter-{}", n)
}

/// File name of the `index`-th chapter file titled `title`.
pub fn chapter_filename(index: usize, title: &str) -> String {
    format!("{:02}_{}.md", index, sanitize_filename(title))
}

/// Render a TOC forest into links, one per entry.
///
/// Dangling targets are not an error: every visited entry gets a link.
pub fn render(forest: &[TocEntry], mode: LinkMode) -> Vec<TocLink> {
    let mut links = Vec::new();
    render_level(forest, mode, 0, &mut links);
    links
}

fn render_level(entries: &[TocEntry], mode: LinkMode, depth: usize, links: &mut Vec<TocLink>) {
    for (sibling, entry) in entries.iter().enumerate() {
        let link = match mode {
            LinkMode::Anchor => format!("#{}", chapter_anchor(links.len())),
            LinkMode::Split => chapter_filename(sibling, &entry.title),
        };
        links.push(TocLink {
            title: entry.title.clone(),
            link,
            depth,
        });
        render_level(&entry.children, mode, depth + 1, links);
    }
}

/// Markdown bullet list for rendered links, two spaces of indent per level.
pub fn to_markdown(links: &[TocLink]) -> String {
    links
        .iter()
        .map(|l| format!("{}- [{}]({})\n", "  ".repeat(l.depth), l.title, l.link))
        .collect()
}

/// Reader-facing TOC line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatTocEntry {
    /// Entry title.
    pub title: String,
    /// Spine index the entry points into, `None` when dangling.
    pub chapter_index: Option<usize>,
    /// Fragment inside the chapter.
    pub anchor: Option<String>,
    /// Nesting depth.
    pub depth: usize,
}

/// Flatten the book's TOC, resolving each entry against the spine.
pub fn flatten(book: &Book) -> Vec<FlatTocEntry> {
    let spine = book.spine_index();
    let mut out = Vec::new();
    flatten_level(&book.toc, &spine, 0, &mut out);
    out
}

fn flatten_level(
    entries: &[TocEntry],
    spine: &HashMap<&str, usize>,
    depth: usize,
    out: &mut Vec<FlatTocEntry>,
) {
    for entry in entries {
        out.push(FlatTocEntry {
            title: entry.title.clone(),
            chapter_index: spine.get(entry.file_href()).copied(),
            anchor: entry.anchor().map(String::from),
            depth,
        });
        flatten_level(&entry.children, spine, depth + 1, out);
    }
}
