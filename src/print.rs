//! Print-layout engine: one HTML document in, a paginated PDF out.
//!
//! Text is set in the standard Helvetica faces with WinAnsi encoding, images
//! are embedded as JPEG and every `h1`..`h6` becomes an outline entry.

mod blocks;
mod layout;
mod metrics;

pub use blocks::{Block, TextStyle, parse_blocks};
pub use layout::{A4_HEIGHT, A4_WIDTH, Composer, MARGIN_2CM, OutlineItem, PageStyle};

use crate::error::Result;

/// Render an HTML document to PDF bytes.
pub fn render(html: &str, style: &PageStyle) -> Result<Vec<u8>> {
    let blocks = parse_blocks(html);
    let mut composer = Composer::new(style);
    for block in &blocks {
        composer.push(block)?;
    }

    tracing::debug!(
        blocks = blocks.len(),
        pages = composer.page_count(),
        bookmarks = composer.outline().len(),
        "Laid out document"
    );

    composer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Document;

    #[test]
    fn render_html_document() {
        let html = "<html><body><h1>Title</h1><p>Some text.</p>\
                    <div class=\"page-break\"></div><h2>Next</h2><p>More.</p></body></html>";
        let bytes = render(html, &PageStyle::default()).unwrap();

        assert!(bytes.starts_with(b"%PDF-"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn render_empty_document() {
        let bytes = render("", &PageStyle::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
    }
}
