//! PDF encoder: title page plus chapters, printed through [`crate::print`].

use super::Encoder;
use super::assets::{AssetEmbedder, rewrite_images};
use crate::error::Result;
use crate::library::book::{Book, BookMetadata};
use crate::print::{self, PageStyle};
use html_escape::encode_text;
use std::fs::File;
use std::io::Write;

/// Title page markup.
pub fn title_page(metadata: &BookMetadata) -> String {
    let mut html = String::from("<div class=\"title-page\">\n");
    html.push_str(&format!(
        "<h1 class=\"book-title\">{}</h1>\n",
        encode_text(&metadata.title)
    ));
    html.push_str(&format!(
        "<p class=\"book-authors\">{}</p>\n",
        encode_text(&metadata.authors_display())
    ));

    for (class, value) in [
        ("book-publisher", &metadata.publisher),
        ("book-date", &metadata.date),
        ("book-description", &metadata.description),
    ] {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            html.push_str(&format!("<p class=\"{}\">{}</p>\n", class, encode_text(value)));
        }
    }

    html.push_str("</div>\n<div class=\"page-break\"></div>\n");
    html
}

/// The whole book as one printable HTML document, images embedded.
pub fn book_html(book: &Book, assets: &mut AssetEmbedder) -> Result<String> {
    let mut html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", encode_text(&book.metadata.title)));
    html.push_str("</head>\n<body>\n");
    html.push_str(&title_page(&book.metadata));

    for (i, chapter) in book.spine.iter().enumerate() {
        if i > 0 {
            html.push_str("<div class=\"page-break\"></div>\n");
        }
        html.push_str("<div class=\"chapter\">\n");
        html.push_str(&format!("<h2 class=\"chapter-title\">Chapter {}</h2>\n", i + 1));
        html.push_str(&rewrite_images(&chapter.content, assets)?);
        html.push_str("</div>\n");
    }

    html.push_str("</body>\n</html>");
    Ok(html)
}

/// Page setup for a book: A4, 2 cm margins, title in the running header.
pub fn page_style(metadata: &BookMetadata) -> PageStyle {
    PageStyle {
        running_title: Some(metadata.title.clone()),
        document_title: Some(metadata.title.clone()),
        ..PageStyle::default()
    }
}

/// PDF encoder.
pub struct PdfEncoder;

impl Encoder for PdfEncoder {
    fn encode(&self, book: &Book, assets: &mut AssetEmbedder, out: &mut File) -> Result<()> {
        let html = book_html(book, assets)?;
        let bytes = print::render(&html, &page_style(&book.metadata))?;
        out.write_all(&bytes)?;
        Ok(())
    }
}
