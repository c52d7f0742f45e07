// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: inspects exported files and reads back their text layer.
//
// Marked-content `/ActualText` replaces the glyph strings it encloses, the
// same way text extractors treat it.

use std::path::Path;

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use scanwerk_core::error::{Result, ScanwerkError};
use tracing::{debug, info, instrument};

/// What a single PDF page contains.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSummary {
    /// MediaBox width in points.
    pub width_pt: f32,
    /// MediaBox height in points.
    pub height_pt: f32,
    /// Text shown on the page, runs joined by single spaces.
    pub text: String,
    /// Number of XObjects painted (`Do` operators).
    pub images: usize,
    /// Whether any text run is drawn in render mode 3 (invisible).
    pub invisible_text: bool,
}

/// Reads existing PDF files.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = Document::load(path).map_err(|err| {
            ScanwerkError::PdfError(format!("failed to open {}: {err}", path.display()))
        })?;
        info!(pages = document.get_pages().len(), "PDF loaded");
        Ok(Self { document })
    }

    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            ScanwerkError::PdfError(format!("failed to load PDF from memory: {err}"))
        })?;
        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self { document })
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// The `/Info /CreationDate` string, if present.
    pub fn creation_date(&self) -> Option<String> {
        let info = match self.document.trailer.get(b"Info").ok()? {
            Object::Reference(id) => self.document.get_object(*id).ok()?,
            other => other,
        };
        let date = info.as_dict().ok()?.get(b"CreationDate").ok()?;
        match date {
            Object::String(bytes, _) => Some(text_string(bytes)),
            _ => None,
        }
    }

    /// Summaries of every page, in page order.
    pub fn pages(&self) -> Result<Vec<PageSummary>> {
        self.document
            .get_pages()
            .values()
            .map(|&id| self.summarize_page(id))
            .collect()
    }

    /// Text layer of every page.
    pub fn text_layer(&self) -> Result<Vec<String>> {
        Ok(self.pages()?.into_iter().map(|p| p.text).collect())
    }

    fn summarize_page(&self, page_id: ObjectId) -> Result<PageSummary> {
        let pdf_err = |what: &str, err: lopdf::Error| {
            ScanwerkError::PdfError(format!("{what} for page {page_id:?}: {err}"))
        };
        let raw = self
            .document
            .get_page_content(page_id)
            .map_err(|e| pdf_err("unreadable content", e))?;
        let content = Content::decode(&raw).map_err(|e| pdf_err("undecodable content", e))?;

        let mut runs: Vec<String> = Vec::new();
        let mut images = 0;
        let mut invisible_text = false;
        // One entry per open marked-content sequence: whether it carried
        // ActualText.
        let mut marked: Vec<bool> = Vec::new();
        for op in &content.operations {
            let replaced = marked.contains(&true);
            match op.operator.as_str() {
                "BDC" => {
                    let actual = op.operands.get(1).and_then(actual_text);
                    let has_actual = actual.is_some();
                    if let (Some(text), false) = (actual, replaced) {
                        runs.push(text);
                    }
                    marked.push(has_actual);
                }
                "BMC" => marked.push(false),
                "EMC" => {
                    marked.pop();
                }
                "Tj" | "'" | "\"" | "TJ" if replaced => {}
                "Tj" | "'" | "\"" => {
                    if let Some(Object::String(bytes, _)) = op.operands.last() {
                        runs.push(latin1(bytes));
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        let run: String = items
                            .iter()
                            .filter_map(|item| match item {
                                Object::String(bytes, _) => Some(latin1(bytes)),
                                _ => None,
                            })
                            .collect();
                        runs.push(run);
                    }
                }
                "Tr" => {
                    if let Some(Object::Integer(3)) = op.operands.first() {
                        invisible_text = true;
                    }
                }
                "Do" => images += 1,
                _ => {}
            }
        }

        let (width_pt, height_pt) = self.media_box(page_id).unwrap_or((0.0, 0.0));
        Ok(PageSummary {
            width_pt,
            height_pt,
            text: runs.join(" "),
            images,
            invisible_text,
        })
    }

    fn media_box(&self, page_id: ObjectId) -> Option<(f32, f32)> {
        let page = self.document.get_dictionary(page_id).ok()?;
        let values = page.get(b"MediaBox").ok()?.as_array().ok()?;
        let num = |o: &Object| match o {
            Object::Integer(i) => Some(*i as f32),
            Object::Real(r) => Some(*r),
            _ => None,
        };
        if values.len() != 4 {
            return None;
        }
        Some((
            num(&values[2])? - num(&values[0])?,
            num(&values[3])? - num(&values[1])?,
        ))
    }
}

/// Text layer of a PDF held in memory, one string per page.
pub fn extract_text_layer(data: &[u8]) -> Result<Vec<String>> {
    PdfReader::from_bytes(data)?.text_layer()
}

/// `/ActualText` of an inline marked-content property list.
fn actual_text(properties: &Object) -> Option<String> {
    match properties.as_dict().ok()?.get(b"ActualText").ok()? {
        Object::String(bytes, _) => Some(text_string(bytes)),
        _ => None,
    }
}

/// Bytes from a simple-font string; WinAnsi agrees with Latin-1 for
/// everything the writer emits.
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// PDF text string: UTF-16BE when it starts with a byte-order mark,
/// otherwise single-byte.
fn text_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => latin1(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_a_pdf_error() {
        assert!(matches!(
            PdfReader::from_bytes(b"definitely not a pdf"),
            Err(ScanwerkError::PdfError(_))
        ));
    }

    #[test]
    fn latin1_maps_high_bytes() {
        assert_eq!(latin1(b"Caf\xe9"), "Café");
    }

    #[test]
    fn text_strings_decode_utf16() {
        assert_eq!(text_string(&[0xFE, 0xFF, 0x05, 0xE9, 0x00, 0x20, 0x04, 0x1F]), "ש П");
        assert_eq!(text_string(b"D:2026"), "D:2026");
    }
}
