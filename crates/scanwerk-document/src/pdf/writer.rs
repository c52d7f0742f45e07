// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer: one PDF page per scanned page, built object by object with
// `lopdf` so the output bytes depend only on the document and the export
// settings.
//
// Glyphs come from the standard Helvetica font. A run Helvetica cannot
// encode is wrapped in a `/Span` marked-content sequence whose `/ActualText`
// holds the exact Unicode text, so the text layer stays searchable and
// extractable in any script.

use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document as PdfDocument, Object, ObjectId, Stream, StringFormat, dictionary};
use scanwerk_core::error::EncodeError;
use scanwerk_core::model::{Document, Page, TextBlock};
use scanwerk_core::types::{ExportConfig, PageSizePolicy, PaperSize, TextLayerMode};
use tracing::{debug, info, instrument};

/// Page size used for text-only pages that have no image to inherit from.
const FALLBACK_PAPER: PaperSize = PaperSize::A4;

const FONT_RESOURCE: &str = "F1";
const IMAGE_RESOURCE: &str = "Im1";

// Text-flow layout, Helvetica 11/14 with 20 mm margins.
const FLOW_FONT_SIZE: f32 = 11.0;
const FLOW_LINE_HEIGHT: f32 = 14.0;
const FLOW_MARGIN_PT: f32 = 20.0 * 72.0 / 25.4;
/// Average Helvetica glyph width as a fraction of the font size.
const HELVETICA_AVG_WIDTH: f32 = 0.5;

/// Serializes a `Document` to PDF.
pub struct PdfWriter<'a> {
    config: &'a ExportConfig,
}

/// Placement of a page image on its PDF page, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    page_w: f32,
    page_h: f32,
    x: f32,
    y: f32,
    /// Points per image pixel.
    scale: f32,
}

impl<'a> PdfWriter<'a> {
    pub fn new(config: &'a ExportConfig) -> Self {
        Self { config }
    }

    /// Build the complete PDF file.
    #[instrument(skip_all, fields(document = %doc.id, pages = doc.pages().len()))]
    pub fn write(&self, doc: &Document) -> Result<Vec<u8>, EncodeError> {
        if doc.pages().is_empty() {
            return Err(EncodeError::EmptyDocument);
        }

        let mut pdf = PdfDocument::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let font_id = pdf.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut kids: Vec<Object> = Vec::new();
        for page in doc.pages() {
            for page_id in self.write_page(&mut pdf, pages_id, font_id, page)? {
                kids.push(page_id.into());
            }
        }

        let count = kids.len() as i64;
        pdf.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = pdf.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });

        let created = pdf_date(self.config.timestamp.unwrap_or(doc.modified_at));
        let info_id = pdf.add_object(dictionary! {
            "Title" => text_string(doc.title()),
            "Producer" => text_string("Scanwerk"),
            "CreationDate" => Object::String(created.clone().into_bytes(), StringFormat::Literal),
            "ModDate" => Object::String(created.into_bytes(), StringFormat::Literal),
        });
        pdf.trailer.set("Root", catalog_id);
        pdf.trailer.set("Info", info_id);

        pdf.compress();
        let mut output = Vec::new();
        pdf.save_to(&mut output)
            .map_err(|err| EncodeError::Pdf(format!("failed to serialise PDF: {err}")))?;

        info!(pdf_pages = count, bytes = output.len(), "PDF written");
        Ok(output)
    }

    /// Emit the PDF page(s) for one scanned page. A text-only page may flow
    /// onto continuation pages.
    fn write_page(
        &self,
        pdf: &mut PdfDocument,
        pages_id: ObjectId,
        font_id: ObjectId,
        page: &Page,
    ) -> Result<Vec<ObjectId>, EncodeError> {
        let with_image = self.config.include_original_image && !page.image().is_empty();
        if !with_image {
            return self.write_text_flow(pdf, pages_id, font_id, page);
        }

        let image = page.image();
        let placement = self.placement(image.width(), image.height());
        let image_id = pdf.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width() as i64,
                "Height" => image.height() as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
            },
            image.pixels().to_vec(),
        ));

        let mut ops = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(image.width() as f32 * placement.scale),
                    real(0.0),
                    real(0.0),
                    real(image.height() as f32 * placement.scale),
                    real(placement.x),
                    real(placement.y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_RESOURCE.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ];
        for block in page.blocks() {
            ops.extend(self.overlay_ops(block, image.height(), &placement));
        }

        let resources = dictionary! {
            "Font" => dictionary! { FONT_RESOURCE => font_id },
            "XObject" => dictionary! { IMAGE_RESOURCE => image_id },
        };
        let id = add_page(pdf, pages_id, resources, &placement, ops)?;
        debug!(page = %page.id(), blocks = page.blocks().len(), "image page written");
        Ok(vec![id])
    }

    /// Text drawn over the image at the block's bounding box.
    fn overlay_ops(&self, block: &TextBlock, image_h: u32, at: &Placement) -> Vec<Operation> {
        let bounds = block.polygon.bounds();
        let glyphs = block.text.chars().count();
        if glyphs == 0 || bounds.height() <= 0.0 {
            return Vec::new();
        }

        let box_w = bounds.width() * at.scale;
        let box_h = bounds.height() * at.scale;
        let font_size = (box_h * 0.8).max(1.0);
        let natural_w = glyphs as f32 * font_size * HELVETICA_AVG_WIDTH;
        // Horizontal scaling stretches the run to the box width.
        let stretch = if natural_w > 0.0 && box_w > 0.0 {
            (box_w / natural_w * 100.0).clamp(10.0, 1000.0)
        } else {
            100.0
        };
        let x = at.x + bounds.min_x * at.scale;
        let baseline = at.y + (image_h as f32 - bounds.max_y) * at.scale + box_h * 0.2;
        let render_mode = match self.config.text_layer {
            TextLayerMode::Embedded => 3,
            TextLayerMode::Visible => 0,
        };

        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(FONT_RESOURCE.as_bytes().to_vec()), real(font_size)]),
            Operation::new("Tr", vec![Object::Integer(render_mode)]),
            Operation::new("Tz", vec![real(stretch)]),
            Operation::new(
                "Tm",
                vec![real(1.0), real(0.0), real(0.0), real(1.0), real(x), real(baseline)],
            ),
        ];
        ops.extend(show_text(&block.text));
        ops.push(Operation::new("ET", vec![]));
        ops
    }

    /// Lay the page's text out top to bottom in Helvetica, word-wrapped and
    /// continued on further pages as needed.
    fn write_text_flow(
        &self,
        pdf: &mut PdfDocument,
        pages_id: ObjectId,
        font_id: ObjectId,
        page: &Page,
    ) -> Result<Vec<ObjectId>, EncodeError> {
        let placement = if page.image().is_empty() {
            let (w, h) = match self.config.page_size {
                PageSizePolicy::Fixed(paper) => paper.dimensions_pt(),
                PageSizePolicy::Inherit => FALLBACK_PAPER.dimensions_pt(),
            };
            Placement {
                page_w: w,
                page_h: h,
                x: 0.0,
                y: 0.0,
                scale: 1.0,
            }
        } else {
            self.placement(page.image().width(), page.image().height())
        };

        let usable_w = (placement.page_w - 2.0 * FLOW_MARGIN_PT).max(FLOW_FONT_SIZE);
        let usable_h = (placement.page_h - 2.0 * FLOW_MARGIN_PT).max(FLOW_LINE_HEIGHT);
        let max_chars = ((usable_w / (FLOW_FONT_SIZE * HELVETICA_AVG_WIDTH)) as usize).max(1);
        let lines_per_page = ((usable_h / FLOW_LINE_HEIGHT) as usize).max(1);

        let lines = wrap_text(&page.plain_text(), max_chars);
        let mut chunks: Vec<&[String]> = lines.chunks(lines_per_page).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }

        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let mut ops = Vec::new();
            for (i, line) in chunk.iter().enumerate() {
                if line.is_empty() {
                    continue;
                }
                let y = placement.page_h - FLOW_MARGIN_PT - FLOW_FONT_SIZE - i as f32 * FLOW_LINE_HEIGHT;
                ops.extend([
                    Operation::new("BT", vec![]),
                    Operation::new(
                        "Tf",
                        vec![Object::Name(FONT_RESOURCE.as_bytes().to_vec()), real(FLOW_FONT_SIZE)],
                    ),
                    Operation::new("Td", vec![real(FLOW_MARGIN_PT), real(y)]),
                ]);
                ops.extend(show_text(line));
                ops.push(Operation::new("ET", vec![]));
            }
            let resources = dictionary! {
                "Font" => dictionary! { FONT_RESOURCE => font_id },
            };
            ids.push(add_page(pdf, pages_id, resources, &placement, ops)?);
        }
        debug!(page = %page.id(), pdf_pages = ids.len(), lines = lines.len(), "text page written");
        Ok(ids)
    }

    /// Page box and image placement for a `width` x `height` pixel image.
    fn placement(&self, width: u32, height: u32) -> Placement {
        let dpi = if self.config.dpi > 0.0 { self.config.dpi } else { 150.0 };
        let native = 72.0 / dpi;
        let img_w = width as f32 * native;
        let img_h = height as f32 * native;
        match self.config.page_size {
            PageSizePolicy::Inherit => Placement {
                page_w: img_w,
                page_h: img_h,
                x: 0.0,
                y: 0.0,
                scale: native,
            },
            PageSizePolicy::Fixed(paper) => {
                // Letterbox: scale to fit, centred.
                let (page_w, page_h) = paper.dimensions_pt();
                let fit = (page_w / img_w).min(page_h / img_h);
                Placement {
                    page_w,
                    page_h,
                    x: (page_w - img_w * fit) / 2.0,
                    y: (page_h - img_h * fit) / 2.0,
                    scale: native * fit,
                }
            }
        }
    }
}

fn add_page(
    pdf: &mut PdfDocument,
    pages_id: ObjectId,
    resources: Dictionary,
    placement: &Placement,
    operations: Vec<Operation>,
) -> Result<ObjectId, EncodeError> {
    let content = Content { operations }
        .encode()
        .map_err(|err| EncodeError::Pdf(format!("failed to encode page content: {err}")))?;
    let content_id = pdf.add_object(Stream::new(Dictionary::new(), content));
    Ok(pdf.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![real(0.0), real(0.0), real(placement.page_w), real(placement.page_h)],
        "Contents" => content_id,
        "Resources" => resources,
    }))
}

/// Reals rounded to hundredths so layout noise never reaches the bytes.
fn real(value: f32) -> Object {
    Object::Real((value * 100.0).round() / 100.0)
}

/// PDF date string, `D:YYYYMMDDHHmmSSZ`.
fn pdf_date(at: DateTime<Utc>) -> String {
    at.format("D:%Y%m%d%H%M%SZ").to_string()
}

/// Text string for document-level metadata: literal when Latin-1 covers it,
/// UTF-16BE otherwise.
fn text_string(text: &str) -> Object {
    if is_win_ansi(text) {
        Object::String(win_ansi(text), StringFormat::Literal)
    } else {
        utf16_string(text)
    }
}

/// Operators that show `text` with the current font. Text outside Latin-1
/// carries its exact form as `/ActualText`.
fn show_text(text: &str) -> Vec<Operation> {
    let show = Operation::new("Tj", vec![Object::String(win_ansi(text), StringFormat::Literal)]);
    if is_win_ansi(text) {
        return vec![show];
    }
    vec![
        Operation::new(
            "BDC",
            vec![
                Object::Name(b"Span".to_vec()),
                Object::Dictionary(dictionary! { "ActualText" => utf16_string(text) }),
            ],
        ),
        show,
        Operation::new("EMC", vec![]),
    ]
}

/// Whether `win_ansi` encodes `text` without substitutions. Control
/// characters count as representable; they only ever become spaces.
pub fn is_win_ansi(text: &str) -> bool {
    text.chars()
        .all(|c| matches!(c as u32, 0x00..=0x7E | 0xA0..=0xFF))
}

/// Encode for the standard Helvetica font (Latin-1 subset of WinAnsi).
/// Characters outside it become `?`; control characters become spaces.
pub fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            0x00..=0x1F => b' ',
            _ => b'?',
        })
        .collect()
}

/// PDF text string in UTF-16BE with a byte-order mark.
fn utf16_string(text: &str) -> Object {
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend(unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

// -- Text wrapping helper -----------------------------------------------------

/// Wrap a multi-line string so that no line exceeds `max_width` characters.
///
/// Splits on existing newlines first, then performs simple word-wrap within
/// each paragraph. Words longer than `max_width` are force-broken.
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let max_width = max_width.max(1);
    let mut result = Vec::new();

    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            result.push(String::new());
            continue;
        }

        let mut current = String::new();
        let mut current_len = 0usize;
        for word in words {
            let word_len = word.chars().count();
            if word_len > max_width {
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                }
                let chars: Vec<char> = word.chars().collect();
                let mut pieces = chars.chunks(max_width).peekable();
                while let Some(piece) = pieces.next() {
                    if pieces.peek().is_some() {
                        result.push(piece.iter().collect());
                    } else {
                        current = piece.iter().collect();
                        current_len = piece.len();
                    }
                }
            } else if current.is_empty() {
                current.push_str(word);
                current_len = word_len;
            } else if current_len + 1 + word_len <= max_width {
                current.push(' ');
                current.push_str(word);
                current_len += 1 + word_len;
            } else {
                result.push(std::mem::replace(&mut current, word.to_owned()));
                current_len = word_len;
            }
        }
        if !current.is_empty() {
            result.push(current);
        }
    }

    // A trailing newline should not produce a trailing blank line.
    while result.last().is_some_and(String::is_empty) {
        result.pop();
    }
    result
}
