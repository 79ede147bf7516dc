//! HTML to flow blocks.
//!
//! Block-level elements become paragraphs, headings carry their outline
//! level, `<img>` data URIs become image blocks and `.page-break` elements
//! become explicit breaks. Inline markup is flattened to text.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use scraper::{ElementRef, Html};

/// Font sizes of `h1`..`h6`.
const HEADING_SIZES: [f32; 6] = [24.0, 20.0, 16.0, 14.0, 12.0, 11.0];

/// Body font size.
pub const BODY_SIZE: f32 = 11.0;

/// Elements that end the current paragraph.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "caption", "dd", "div", "dl", "dt",
    "figcaption", "figure", "footer", "header", "hr", "html", "li", "main", "nav", "ol", "p",
    "pre", "section", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

/// Elements whose content is never rendered.
const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style", "template", "title"];

/// Typography of a text block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    /// Font size in points.
    pub size: f32,
    /// Bold face.
    pub bold: bool,
    /// Grey instead of body colour.
    pub muted: bool,
    /// Centred lines.
    pub centered: bool,
    /// Extra space above the block, in points.
    pub space_before: f32,
}

impl TextStyle {
    /// Body text.
    pub fn body() -> Self {
        Self {
            size: BODY_SIZE,
            bold: false,
            muted: false,
            centered: false,
            space_before: BODY_SIZE * 0.5,
        }
    }

    /// Heading of `level` (1-6).
    pub fn heading(level: u8) -> Self {
        let size = HEADING_SIZES[usize::from(level.clamp(1, 6)) - 1];
        Self {
            size,
            bold: true,
            muted: false,
            centered: false,
            space_before: size,
        }
    }

    /// Apply the title page and chapter classes of an element.
    fn with_class(self, class: &str) -> Self {
        match class {
            "title-page" => Self { centered: true, ..self },
            "book-title" => Self {
                size: 32.0,
                bold: true,
                space_before: 0.0,
                ..self
            },
            "book-authors" => Self {
                size: 18.0,
                bold: false,
                space_before: 16.0,
                ..self
            },
            "book-publisher" | "book-date" => Self {
                size: 12.0,
                bold: false,
                muted: true,
                space_before: 4.0,
                ..self
            },
            "book-description" => Self {
                size: BODY_SIZE,
                bold: false,
                centered: false,
                space_before: 2.0 * BODY_SIZE,
                ..self
            },
            "chapter-title" => Self {
                size: 20.0,
                bold: true,
                space_before: 0.0,
                ..self
            },
            _ => self,
        }
    }
}

/// One unit of page flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Wrapped text. Headings carry their outline level.
    Text {
        /// Content, `\n` marking forced breaks.
        text: String,
        /// Typography.
        style: TextStyle,
        /// Outline level for headings.
        outline: Option<u8>,
    },
    /// Encoded image bytes from a data URI.
    Image(Vec<u8>),
    /// Start a new page.
    PageBreak,
    /// Vertical gap as a fraction of the content height.
    Gap(f32),
}

/// Split an HTML document into blocks.
pub fn parse_blocks(html: &str) -> Vec<Block> {
    let document = Html::parse_document(html);
    let mut blocks = Vec::new();
    let mut buf = String::new();

    walk(document.root_element(), TextStyle::body(), &mut blocks, &mut buf);
    flush(&mut buf, TextStyle::body(), &mut blocks);

    blocks
}

fn walk(el: ElementRef<'_>, style: TextStyle, out: &mut Vec<Block>, buf: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            push_text(buf, text);
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };

        let element = child.value();
        let name = element.name();
        let child_style = element.classes().fold(style, TextStyle::with_class);

        if SKIPPED_ELEMENTS.contains(&name) {
            continue;
        }

        if let Some(level) = heading_level(name) {
            flush(buf, style, out);
            let mut raw = String::new();
            child.text().for_each(|t| push_text(&mut raw, t));
            let text = normalize(&raw);
            if !text.is_empty() {
                let heading = element.classes().fold(
                    TextStyle {
                        centered: style.centered,
                        ..TextStyle::heading(level)
                    },
                    TextStyle::with_class,
                );
                out.push(Block::Text {
                    text,
                    style: heading,
                    outline: Some(level),
                });
            }
            continue;
        }

        match name {
            "br" => buf.push('\n'),
            "img" => {
                flush(buf, style, out);
                match element.attr("src").and_then(decode_data_uri) {
                    Some(data) => out.push(Block::Image(data)),
                    None => tracing::debug!(src = ?element.attr("src"), "Skipping non-embedded image"),
                }
            }
            _ if BLOCK_ELEMENTS.contains(&name) => {
                flush(buf, style, out);
                if element.classes().any(|c| c == "title-page") {
                    out.push(Block::Gap(0.3));
                }
                if name == "li" {
                    buf.push_str("• ");
                }

                walk(child, child_style, out, buf);
                flush(buf, child_style, out);

                if element.classes().any(|c| c == "page-break") {
                    out.push(Block::PageBreak);
                }
            }
            _ => walk(child, style, out, buf),
        }
    }
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Append source text; source newlines are plain whitespace.
fn push_text(buf: &mut String, text: &str) {
    buf.extend(text.chars().map(|c| if c == '\n' { ' ' } else { c }));
}

/// Collapse whitespace runs within each forced line.
fn normalize(text: &str) -> String {
    text.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn flush(buf: &mut String, style: TextStyle, out: &mut Vec<Block>) {
    let text = normalize(buf);
    buf.clear();
    if !text.is_empty() && text != "•" {
        out.push(Block::Text {
            text,
            style,
            outline: None,
        });
    }
}

/// Bytes of a base64 `data:` URI.
fn decode_data_uri(src: &str) -> Option<Vec<u8>> {
    let (header, payload) = src.strip_prefix("data:")?.split_once(',')?;
    if !header.ends_with(";base64") {
        return None;
    }
    STANDARD.decode(payload.trim()).ok()
}
