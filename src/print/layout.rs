//! Pagination of blocks and PDF assembly with lopdf.

use super::blocks::{BODY_SIZE, Block, TextStyle};
use super::metrics::{encode_win_ansi, text_width, wrap};
use crate::error::{AppError, Result};
use image::codecs::jpeg::JpegEncoder;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};

/// A4 width in points.
pub const A4_WIDTH: f32 = 595.28;
/// A4 height in points.
pub const A4_HEIGHT: f32 = 841.89;
/// 2 cm in points.
pub const MARGIN_2CM: f32 = 56.69;

/// JPEG quality for re-encoded images.
const IMAGE_QUALITY: u8 = 85;

/// Pixels to points, assuming 96 dpi sources.
const PX_TO_PT: f32 = 0.75;

/// Body text grey (#333).
const BODY_GRAY: f32 = 0.2;
/// Muted text grey (#666).
const MUTED_GRAY: f32 = 0.4;

/// Page geometry and running elements.
#[derive(Debug, Clone, PartialEq)]
pub struct PageStyle {
    /// Page width in points.
    pub width: f32,
    /// Page height in points.
    pub height: f32,
    /// Margin on all sides, in points.
    pub margin: f32,
    /// Line height as a multiple of the font size.
    pub line_height: f32,
    /// Size of the running header and footer.
    pub running_size: f32,
    /// Running header text, omitted on the first page.
    pub running_title: Option<String>,
    /// Page number in the footer, omitted on the first page.
    pub page_numbers: bool,
    /// Document info title.
    pub document_title: Option<String>,
}

impl Default for PageStyle {
    fn default() -> Self {
        Self {
            width: A4_WIDTH,
            height: A4_HEIGHT,
            margin: MARGIN_2CM,
            line_height: 1.6,
            running_size: 10.0,
            running_title: None,
            page_numbers: true,
            document_title: None,
        }
    }
}

impl PageStyle {
    fn content_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    fn content_height(&self) -> f32 {
        self.height - 2.0 * self.margin
    }

    fn top(&self) -> f32 {
        self.height - self.margin
    }
}

/// Heading position recorded for the outline.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineItem {
    /// Heading text.
    pub title: String,
    /// Heading level, 1-6.
    pub level: u8,
    /// Zero-based page index.
    pub page: usize,
    /// Top of the heading on its page.
    pub y: f32,
}

struct PlacedImage {
    jpeg: Vec<u8>,
    width_px: u32,
    height_px: u32,
}

#[derive(Default)]
struct Page {
    ops: Vec<Operation>,
    images: Vec<usize>,
    has_content: bool,
}

/// Flows blocks onto pages.
pub struct Composer<'a> {
    style: &'a PageStyle,
    pages: Vec<Page>,
    images: Vec<PlacedImage>,
    outline: Vec<OutlineItem>,
    cursor: f32,
}

impl<'a> Composer<'a> {
    /// Start with one empty page.
    pub fn new(style: &'a PageStyle) -> Self {
        Self {
            style,
            pages: vec![Page::default()],
            images: Vec::new(),
            outline: Vec::new(),
            cursor: style.top(),
        }
    }

    /// Number of pages so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Headings placed so far.
    pub fn outline(&self) -> &[OutlineItem] {
        &self.outline
    }

    fn current(&mut self) -> &mut Page {
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.cursor = self.style.top();
    }

    fn remaining(&self) -> f32 {
        self.cursor - self.style.margin
    }

    fn at_top(&self) -> bool {
        (self.cursor - self.style.top()).abs() < f32::EPSILON
    }

    /// Lay out one block.
    pub fn push(&mut self, block: &Block) -> Result<()> {
        match block {
            Block::Text {
                text,
                style,
                outline,
            } => self.push_text(text, style, *outline),
            Block::Image(data) => self.push_image(data),
            Block::PageBreak => {
                if self.pages.last().is_some_and(|p| p.has_content) {
                    self.new_page();
                }
                Ok(())
            }
            Block::Gap(fraction) => {
                let gap = self.style.content_height() * fraction;
                self.cursor = (self.cursor - gap).max(self.style.margin);
                self.current().has_content = true;
                Ok(())
            }
        }
    }

    fn push_text(&mut self, text: &str, style: &TextStyle, outline: Option<u8>) -> Result<()> {
        let lines = wrap(text, style.size, style.bold, self.style.content_width());
        if lines.is_empty() {
            return Ok(());
        }
        let line_height = style.size * self.style.line_height;

        if !self.at_top() {
            self.cursor -= style.space_before;
        }

        // Headings keep at least two body lines below them.
        if outline.is_some() {
            let needed = line_height * lines.len() as f32
                + 2.0 * BODY_SIZE * self.style.line_height;
            if needed < self.style.content_height() && self.remaining() < needed {
                self.new_page();
            }
        }

        for (i, line) in lines.iter().enumerate() {
            if self.remaining() < line_height {
                self.new_page();
            }

            if i == 0
                && let Some(level) = outline
            {
                self.outline.push(OutlineItem {
                    title: text.replace('\n', " "),
                    level,
                    page: self.pages.len() - 1,
                    y: self.cursor,
                });
            }

            let width = text_width(line, style.size, style.bold);
            let x = if style.centered {
                self.style.margin + (self.style.content_width() - width).max(0.0) / 2.0
            } else {
                self.style.margin
            };
            // Baseline sits one font size below the top of the line box.
            let baseline = self.cursor - style.size;
            let gray = if style.muted { MUTED_GRAY } else { BODY_GRAY };
            let font = if style.bold { "F2" } else { "F1" };

            let page = self.current();
            text_ops(&mut page.ops, font, style.size, gray, x, baseline, line);
            page.has_content = true;
            self.cursor -= line_height;
        }

        Ok(())
    }

    fn push_image(&mut self, data: &[u8]) -> Result<()> {
        let Some(image) = reencode_image(data) else {
            tracing::warn!(bytes = data.len(), "Skipping undecodable image");
            return Ok(());
        };

        let mut width = image.width_px as f32 * PX_TO_PT;
        let mut height = image.height_px as f32 * PX_TO_PT;
        let scale = (self.style.content_width() / width)
            .min(self.style.content_height() / height)
            .min(1.0);
        width *= scale;
        height *= scale;

        let gap = BODY_SIZE;
        if !self.at_top() {
            self.cursor -= gap;
        }
        if self.remaining() < height {
            self.new_page();
        }

        let x = self.style.margin + (self.style.content_width() - width) / 2.0;
        let y = self.cursor - height;
        let index = self.images.len();
        self.images.push(image);

        let page = self.current();
        page.ops.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![width.into(), 0.into(), 0.into(), height.into(), x.into(), y.into()],
            ),
            Operation::new("Do", vec![Object::Name(image_name(index).into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        page.images.push(index);
        page.has_content = true;
        self.cursor = y - gap;

        Ok(())
    }

    /// Serialize the laid-out pages.
    pub fn finish(self) -> Result<Vec<u8>> {
        let style = self.style;
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let regular_id = doc.add_object(font("Helvetica"));
        let bold_id = doc.add_object(font("Helvetica-Bold"));

        let image_ids: Vec<ObjectId> = self
            .images
            .into_iter()
            .map(|img| {
                doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => img.width_px as i64,
                        "Height" => img.height_px as i64,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8,
                        "Filter" => "DCTDecode",
                    },
                    img.jpeg,
                ))
            })
            .collect();

        let page_total = self.pages.len();
        let mut page_ids = Vec::with_capacity(page_total);

        for (number, mut page) in self.pages.into_iter().enumerate() {
            if number > 0 {
                running_ops(&mut page.ops, style, number + 1);
            }

            let content = Content {
                operations: page.ops,
            }
            .encode()
            .map_err(|e| AppError::Pdf(format!("Failed to encode page content: {}", e)))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));

            let mut xobjects = Dictionary::new();
            for index in &page.images {
                xobjects.set(image_name(*index), Object::Reference(image_ids[*index]));
            }

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => vec![0.into(), 0.into(), style.width.into(), style.height.into()],
                "Contents" => Object::Reference(content_id),
                "Resources" => dictionary! {
                    "Font" => dictionary! {
                        "F1" => Object::Reference(regular_id),
                        "F2" => Object::Reference(bold_id),
                    },
                    "XObject" => xobjects,
                },
            });
            page_ids.push(page_id);
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
                "Count" => page_total as i64,
            }),
        );

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        };
        if let Some(outlines_id) = write_outline(&mut doc, &self.outline, &page_ids) {
            catalog.set("Outlines", Object::Reference(outlines_id));
            catalog.set("PageMode", "UseOutlines");
        }
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut info = dictionary! {
            "Producer" => Object::string_literal("bookpress"),
        };
        if let Some(title) = &style.document_title {
            info.set("Title", text_string(title));
        }
        let info_id = doc.add_object(info);
        doc.trailer.set("Info", Object::Reference(info_id));

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| AppError::Pdf(format!("Failed to save PDF: {}", e)))?;

        Ok(bytes)
    }
}

fn font(base: &str) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Object::Name(base.as_bytes().to_vec()),
        "Encoding" => "WinAnsiEncoding",
    }
}

fn image_name(index: usize) -> String {
    format!("Im{}", index)
}

fn text_ops(
    ops: &mut Vec<Operation>,
    font: &str,
    size: f32,
    gray: f32,
    x: f32,
    y: f32,
    text: &str,
) {
    ops.extend([
        Operation::new("BT", vec![]),
        Operation::new("g", vec![gray.into()]),
        Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
    ]);
}

/// Header title and footer page number, centred in the margins.
fn running_ops(ops: &mut Vec<Operation>, style: &PageStyle, number: usize) {
    let size = style.running_size;
    let centre = |text: &str| (style.width - text_width(text, size, false)) / 2.0;

    if let Some(title) = style.running_title.as_deref().filter(|t| !t.trim().is_empty()) {
        let y = style.height - style.margin / 2.0 - size / 2.0;
        text_ops(ops, "F1", size, MUTED_GRAY, centre(title).max(style.margin), y, title);
    }
    if style.page_numbers {
        let label = number.to_string();
        let y = style.margin / 2.0 - size / 2.0;
        text_ops(ops, "F1", size, BODY_GRAY, centre(&label), y, &label);
    }
}

/// PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Decode any supported image and re-encode it as RGB JPEG.
fn reencode_image(data: &[u8]) -> Option<PlacedImage> {
    let rgb = image::load_from_memory(data).ok()?.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return None;
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, IMAGE_QUALITY)
        .encode_image(&rgb)
        .ok()?;

    Some(PlacedImage {
        jpeg,
        width_px: rgb.width(),
        height_px: rgb.height(),
    })
}

/// Write the outline tree, nesting items by heading level.
fn write_outline(doc: &mut Document, items: &[OutlineItem], page_ids: &[ObjectId]) -> Option<ObjectId> {
    if items.is_empty() {
        return None;
    }

    // Parent of each item: the nearest preceding item with a lower level.
    let mut parents: Vec<Option<usize>> = Vec::with_capacity(items.len());
    let mut stack: Vec<usize> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        while stack.last().is_some_and(|&top| items[top].level >= item.level) {
            stack.pop();
        }
        parents.push(stack.last().copied());
        stack.push(i);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
    let mut roots = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => children[*p].push(i),
            None => roots.push(i),
        }
    }

    let root_id = doc.new_object_id();
    let ids: Vec<ObjectId> = items.iter().map(|_| doc.new_object_id()).collect();

    let link_siblings = |dict: &mut Dictionary, siblings: &[usize], i: usize| {
        if let Some(pos) = siblings.iter().position(|&s| s == i) {
            if pos > 0 {
                dict.set("Prev", Object::Reference(ids[siblings[pos - 1]]));
            }
            if let Some(next) = siblings.get(pos + 1) {
                dict.set("Next", Object::Reference(ids[*next]));
            }
        }
    };

    for (i, item) in items.iter().enumerate() {
        let parent_id = parents[i].map(|p| ids[p]).unwrap_or(root_id);
        let siblings = parents[i].map(|p| children[p].as_slice()).unwrap_or(roots.as_slice());

        let mut dict = dictionary! {
            "Title" => text_string(&item.title),
            "Parent" => Object::Reference(parent_id),
            "Dest" => vec![
                Object::Reference(page_ids[item.page]),
                "XYZ".into(),
                Object::Null,
                item.y.into(),
                Object::Null,
            ],
        };
        link_siblings(&mut dict, siblings, i);
        if let (Some(first), Some(last)) = (children[i].first(), children[i].last()) {
            dict.set("First", Object::Reference(ids[*first]));
            dict.set("Last", Object::Reference(ids[*last]));
            dict.set("Count", children[i].len() as i64);
        }
        doc.objects.insert(ids[i], Object::Dictionary(dict));
    }

    let mut root = dictionary! {
        "Type" => "Outlines",
        "Count" => items.len() as i64,
    };
    if let (Some(first), Some(last)) = (roots.first(), roots.last()) {
        root.set("First", Object::Reference(ids[*first]));
        root.set("Last", Object::Reference(ids[*last]));
    }
    doc.objects.insert(root_id, Object::Dictionary(root));

    Some(root_id)
}
