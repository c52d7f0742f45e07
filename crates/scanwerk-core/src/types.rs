// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Identifiers, paper sizes, rotations, and export settings shared by every
// Scanwerk crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a scanned document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the hyphenated UUID form produced by `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page identifier, unique and never reused within one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Placeholder for a page that has not been added to a document yet.
    pub const UNASSIGNED: PageId = PageId(0);
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Clockwise rotation needed to display a captured image upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Build from a degree value; only multiples of 90 are accepted.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> i32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Compose with a further clockwise rotation (the review screen's
    /// "rotate" button adds 90 each press).
    pub fn then(&self, other: Rotation) -> Rotation {
        Self::from_degrees(self.degrees() + other.degrees()).unwrap_or_default()
    }

    /// Whether width and height swap after applying this rotation.
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// Standard paper sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Custom { width_mm: u32, height_mm: u32 },
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::A4 => (210, 297),
            Self::A3 => (297, 420),
            Self::A5 => (148, 210),
            Self::Letter => (216, 279),
            Self::Legal => (216, 356),
            Self::Custom {
                width_mm,
                height_mm,
            } => (*width_mm, *height_mm),
        }
    }

    /// Dimensions in PDF points (1/72 inch).
    pub fn dimensions_pt(&self) -> (f32, f32) {
        let (w, h) = self.dimensions_mm();
        (mm_to_pt(w as f32), mm_to_pt(h as f32))
    }

    /// Height divided by width.
    pub fn aspect_ratio(&self) -> f32 {
        let (w, h) = self.dimensions_mm();
        h as f32 / w.max(1) as f32
    }

    /// Parse a CLI keyword such as `a4` or `letter`.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "a4" => Some(Self::A4),
            "a3" => Some(Self::A3),
            "a5" => Some(Self::A5),
            "letter" => Some(Self::Letter),
            "legal" => Some(Self::Legal),
            _ => None,
        }
    }
}

/// Millimetres to PDF points.
pub fn mm_to_pt(mm: f32) -> f32 {
    mm * 72.0 / 25.4
}

/// Classification of errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Network blip, timeout, or busy service. Safe to retry automatically.
    Transient,
    /// User must act (re-crop, resolve a conflict, free storage).
    UserAction,
    /// Retrying cannot help.
    Permanent,
}

// -- Export settings ----------------------------------------------------------

/// Output format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportFormat {
    #[default]
    Pdf,
    PlainText,
}

/// How PDF pages are sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSizePolicy {
    /// Each page takes its rectified image's size at the configured DPI.
    #[default]
    Inherit,
    /// Every page uses the given paper size; images are letterboxed.
    Fixed(PaperSize),
}

/// How recognized text is drawn over an embedded page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextLayerMode {
    /// Invisible but selectable text aligned to the scan.
    #[default]
    Embedded,
    /// Text painted on top of the scan.
    Visible,
}

/// Export configuration. Output bytes are a pure function of the document and
/// this value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    pub format: ExportFormat,
    pub page_size: PageSizePolicy,
    /// Embed the rectified bitmap behind the text.
    pub include_original_image: bool,
    pub text_layer: TextLayerMode,
    /// Resolution used to convert image pixels to page points.
    pub dpi: f32,
    /// Value written to the PDF `/CreationDate`. When `None` the document's
    /// modification time is used, keeping output fully reproducible.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::Pdf,
            page_size: PageSizePolicy::Inherit,
            include_original_image: true,
            text_layer: TextLayerMode::Embedded,
            dpi: 150.0,
            timestamp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_composes_modulo_full_turn() {
        assert_eq!(Rotation::Deg270.then(Rotation::Deg180), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn a4_in_points() {
        let (w, h) = PaperSize::A4.dimensions_pt();
        assert!((w - 595.28).abs() < 0.1);
        assert!((h - 841.89).abs() < 0.1);
    }

    #[test]
    fn document_id_round_trips_through_display() {
        let id = DocumentId::new();
        assert_eq!(DocumentId::parse(&id.to_string()), Some(id));
        assert_eq!(DocumentId::parse("not-a-uuid"), None);
    }
}
