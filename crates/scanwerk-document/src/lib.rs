// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-document: the per-page stages of the scan pipeline.
//
// Acquired photos are decoded (`capture`), cropped and perspective-corrected
// (`crop`), recognized (`ocr`), laid out into ordered text blocks
// (`assemble`), and finally exported as PDF or plain text (`export`, `pdf`).

pub mod assemble;
pub mod capture;
pub mod crop;
pub mod export;
pub mod ocr;
pub mod pdf;

pub use assemble::DocumentAssembler;
pub use capture::{ImageSource, RawImage};
pub use crop::{AspectPolicy, CropNormalizer, CropRegion};
pub use export::ExportEncoder;
pub use ocr::{ConfidenceGate, OcrAdapter, RecognitionResult, StaticOcr, TextFragment};
pub use pdf::{PdfReader, extract_text_layer};

#[cfg(feature = "ocr")]
pub use ocr::{OcrsAdapter, OcrsConfig};

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use image::{Rgb, RgbImage};
    use scanwerk_core::geometry::Polygon;
    use scanwerk_core::model::Document;
    use scanwerk_core::types::{ExportConfig, PageSizePolicy, PaperSize, Rotation};

    use super::*;

    /// Capture, crop, recognize, assemble, export, then read the text layer
    /// back.
    #[tokio::test]
    async fn scan_to_pdf_round_trip() {
        let photo = ImageSource::from_rgb(
            RgbImage::from_pixel(120, 90, Rgb([250, 250, 250])),
            Rotation::Deg0,
            Utc::now(),
        );
        let region = CropRegion::parse_corners("5,5, 115,8, 112,85, 8,82").expect("corners");
        let rectified = CropNormalizer::normalize(&photo, &region).expect("crop");

        let ocr = StaticOcr::new(RecognitionResult {
            fragments: vec![
                TextFragment {
                    polygon: Polygon::from_rect(60.0, 10.0, 40.0, 12.0),
                    text: "Total".into(),
                    confidence: 0.97,
                },
                TextFragment {
                    polygon: Polygon::from_rect(5.0, 10.0, 40.0, 12.0),
                    text: "Invoice".into(),
                    confidence: 0.99,
                },
                TextFragment {
                    polygon: Polygon::from_rect(5.0, 50.0, 40.0, 12.0),
                    text: "42.00".into(),
                    confidence: 0.9,
                },
            ],
            language: Some("en".into()),
        });
        let result = ocr.recognize(&rectified).await.expect("recognize");

        let mut doc = Document::new("owner", "Receipt");
        let page_id = doc
            .add_page(scanwerk_core::model::Page::new(rectified), None)
            .expect("add page");
        let pending = doc.remove_page(page_id).expect("take page");
        let page = DocumentAssembler::default().assemble(result, Some(pending));
        doc.add_page(page, None).expect("re-add");

        let expected = doc.plain_text();
        assert_eq!(expected, "Invoice Total\n42.00");

        let bytes = ExportEncoder::encode(&doc, &ExportConfig::default()).expect("encode");
        let layer = extract_text_layer(&bytes).expect("text layer").join("\n");
        let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(normalize(&layer), normalize(&expected));
    }

    /// Hebrew and Cyrillic text survives export in both layouts.
    #[tokio::test]
    async fn non_latin_text_round_trips() {
        let photo = ImageSource::from_rgb(
            RgbImage::from_pixel(120, 90, Rgb([250, 250, 250])),
            Rotation::Deg0,
            Utc::now(),
        );
        let rectified =
            CropNormalizer::normalize(&photo, &CropRegion::full_frame(120, 90)).expect("crop");
        let ocr = StaticOcr::new(RecognitionResult {
            fragments: vec![
                TextFragment {
                    polygon: Polygon::from_rect(10.0, 10.0, 60.0, 12.0),
                    text: "שלום".into(),
                    confidence: 0.95,
                },
                TextFragment {
                    polygon: Polygon::from_rect(10.0, 50.0, 60.0, 12.0),
                    text: "Привет".into(),
                    confidence: 0.95,
                },
            ],
            language: Some("he".into()),
        });
        let result = ocr.recognize(&rectified).await.expect("recognize");

        let mut doc = Document::new("owner", "Greetings");
        let page = DocumentAssembler::default()
            .assemble(result, Some(scanwerk_core::model::Page::new(rectified)));
        doc.add_page(page, None).expect("add page");
        let expected = doc.plain_text();
        assert!(expected.contains("שלום") && expected.contains("Привет"));

        let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        let text_only = ExportConfig {
            include_original_image: false,
            page_size: PageSizePolicy::Fixed(PaperSize::A4),
            ..ExportConfig::default()
        };
        for config in [ExportConfig::default(), text_only] {
            let bytes = ExportEncoder::encode(&doc, &config).expect("encode");
            let layer = extract_text_layer(&bytes).expect("text layer").join("\n");
            assert_eq!(normalize(&layer), normalize(&expected));
            assert!(!layer.contains('?'));
        }
    }
}
