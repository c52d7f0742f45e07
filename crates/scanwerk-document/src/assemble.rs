// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Layout analysis: unordered OCR fragments become a page's ordered text
// blocks.
//
// Fragments are grouped into visual lines by vertical overlap, lines run top
// to bottom, and fragments within a line run in the writing direction of the
// page language.

use scanwerk_core::config::AssemblerConfig;
use scanwerk_core::geometry::Rect;
use scanwerk_core::model::{Page, RectifiedImage, TextBlock, UNDETERMINED_LANGUAGE};
use tracing::{debug, instrument};

use crate::ocr::adapter::{RecognitionResult, TextFragment};
use crate::ocr::language::is_rtl;

/// Builds pages from recognition results.
#[derive(Debug, Clone, Default)]
pub struct DocumentAssembler {
    config: AssemblerConfig,
}

/// A visual line under construction.
struct Line {
    /// Indices into the fragment list.
    members: Vec<usize>,
    min_y: f32,
    max_y: f32,
}

impl DocumentAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    /// Produce a `Recognized` page from `result`.
    ///
    /// With `existing`, the page keeps its id and image and its blocks are
    /// replaced. Without it, a new unattached page with an empty image is
    /// returned. An empty result is a recognized page with no blocks.
    #[instrument(skip_all, fields(fragments = result.fragments.len()))]
    pub fn assemble(&self, result: RecognitionResult, existing: Option<Page>) -> Page {
        let language = result
            .language
            .clone()
            .filter(|l| !l.trim().is_empty())
            .or_else(|| self.config.language_hint.clone())
            .unwrap_or_else(|| UNDETERMINED_LANGUAGE.to_owned());

        let blocks = self.order_blocks(result.fragments, &language);
        debug!(blocks = blocks.len(), language = %language, "page assembled");

        let mut page = existing.unwrap_or_else(|| Page::new(RectifiedImage::default()));
        page.apply_recognition(blocks, language);
        page
    }

    /// Assign reading order and line indices.
    pub fn order_blocks(&self, fragments: Vec<TextFragment>, language: &str) -> Vec<TextBlock> {
        let bounds: Vec<Rect> = fragments.iter().map(|f| f.polygon.bounds()).collect();
        let mut lines = self.group_lines(&bounds);

        lines.sort_by(|a, b| a.min_y.total_cmp(&b.min_y));
        let rtl = is_rtl(language);
        for line in &mut lines {
            if rtl {
                line.members
                    .sort_by(|&a, &b| bounds[b].max_x.total_cmp(&bounds[a].max_x));
            } else {
                line.members
                    .sort_by(|&a, &b| bounds[a].min_x.total_cmp(&bounds[b].min_x));
            }
        }

        let mut slots: Vec<Option<TextFragment>> = fragments.into_iter().map(Some).collect();
        let mut blocks = Vec::with_capacity(slots.len());
        for (line_index, line) in lines.iter().enumerate() {
            for &member in &line.members {
                if let Some(fragment) = slots[member].take() {
                    blocks.push(TextBlock {
                        polygon: fragment.polygon,
                        text: fragment.text,
                        confidence: fragment.confidence.clamp(0.0, 1.0),
                        reading_order: blocks.len() as u32,
                        line: line_index as u32,
                    });
                }
            }
        }
        blocks
    }

    /// Greedy line grouping. Fragments are visited top to bottom; each joins
    /// the line it overlaps most, or starts a new one.
    fn group_lines(&self, bounds: &[Rect]) -> Vec<Line> {
        let mut order: Vec<usize> = (0..bounds.len()).collect();
        order.sort_by(|&a, &b| {
            bounds[a]
                .min_y
                .total_cmp(&bounds[b].min_y)
                .then(bounds[a].min_x.total_cmp(&bounds[b].min_x))
        });

        let mut lines: Vec<Line> = Vec::new();
        for index in order {
            let rect = bounds[index];
            let best = lines
                .iter()
                .enumerate()
                .filter_map(|(i, line)| {
                    let ratio = overlap_ratio(line.min_y, line.max_y, rect.min_y, rect.max_y);
                    (ratio > self.config.line_overlap).then_some((i, ratio))
                })
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i);

            match best {
                Some(i) => {
                    let line = &mut lines[i];
                    line.members.push(index);
                    line.min_y = line.min_y.min(rect.min_y);
                    line.max_y = line.max_y.max(rect.max_y);
                }
                None => lines.push(Line {
                    members: vec![index],
                    min_y: rect.min_y,
                    max_y: rect.max_y,
                }),
            }
        }
        lines
    }
}

/// Vertical overlap of two spans as a fraction of the smaller height.
/// Zero-height spans overlap fully when one lies within the other.
fn overlap_ratio(a_min: f32, a_max: f32, b_min: f32, b_max: f32) -> f32 {
    let overlap = a_max.min(b_max) - a_min.max(b_min);
    let smaller = (a_max - a_min).min(b_max - b_min);
    if smaller <= 0.0 {
        return if overlap >= 0.0 { 1.0 } else { 0.0 };
    }
    (overlap / smaller).max(0.0)
}

#[cfg(test)]
mod tests {
    use scanwerk_core::geometry::Polygon;
    use scanwerk_core::model::OcrStatus;

    use super::*;

    fn fragment(text: &str, x: f32, y: f32, w: f32, h: f32) -> TextFragment {
        TextFragment {
            polygon: Polygon::from_rect(x, y, w, h),
            text: text.into(),
            confidence: 0.95,
        }
    }

    fn result(fragments: Vec<TextFragment>, language: Option<&str>) -> RecognitionResult {
        RecognitionResult {
            fragments,
            language: language.map(str::to_owned),
        }
    }

    #[test]
    fn hello_world_goodbye() {
        let page = DocumentAssembler::default().assemble(
            result(
                vec![
                    fragment("Goodbye", 0.0, 100.0, 70.0, 20.0),
                    fragment("World", 50.0, 0.0, 45.0, 20.0),
                    fragment("Hello", 0.0, 0.0, 45.0, 20.0),
                ],
                Some("en"),
            ),
            None,
        );
        assert_eq!(page.plain_text(), "Hello World\nGoodbye");
        assert_eq!(page.ocr_status(), &OcrStatus::Recognized);
        let lines: Vec<u32> = page.blocks().iter().map(|b| b.line).collect();
        assert_eq!(lines, vec![0, 0, 1]);
    }

    #[test]
    fn distinct_bands_increase_top_to_bottom() {
        let page = DocumentAssembler::default().assemble(
            result(
                vec![
                    fragment("c", 0.0, 200.0, 10.0, 10.0),
                    fragment("a", 50.0, 0.0, 10.0, 10.0),
                    fragment("b", 0.0, 100.0, 10.0, 10.0),
                ],
                None,
            ),
            None,
        );
        let texts: Vec<&str> = page.blocks().iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        let orders: Vec<u32> = page.blocks().iter().map(|b| b.reading_order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn slight_baseline_skew_stays_on_one_line() {
        let page = DocumentAssembler::default().assemble(
            result(
                vec![
                    fragment("left", 0.0, 10.0, 30.0, 20.0),
                    fragment("right", 40.0, 14.0, 30.0, 20.0),
                ],
                None,
            ),
            None,
        );
        assert_eq!(page.plain_text(), "left right");
    }

    #[test]
    fn rtl_lines_read_right_to_left() {
        let page = DocumentAssembler::default().assemble(
            result(
                vec![
                    fragment("עולם", 0.0, 0.0, 40.0, 20.0),
                    fragment("שלום", 60.0, 0.0, 40.0, 20.0),
                ],
                Some("he"),
            ),
            None,
        );
        assert_eq!(page.plain_text(), "שלום עולם");
    }

    #[test]
    fn empty_result_is_recognized_with_no_blocks() {
        let page = DocumentAssembler::default().assemble(RecognitionResult::default(), None);
        assert!(page.blocks().is_empty());
        assert_eq!(page.ocr_status(), &OcrStatus::Recognized);
        assert_eq!(page.language(), "und");
    }

    #[test]
    fn language_falls_back_to_hint() {
        let assembler = DocumentAssembler::new(AssemblerConfig {
            language_hint: Some("de".into()),
            ..Default::default()
        });
        let page = assembler.assemble(result(vec![fragment("Hallo", 0.0, 0.0, 10.0, 10.0)], None), None);
        assert_eq!(page.language(), "de");
    }

    #[test]
    fn existing_page_keeps_its_image() {
        let image = RectifiedImage::from_rgb8(1, 1, vec![1, 2, 3]).expect("1x1");
        let mut existing = Page::new(image.clone());
        existing.begin_recognition().expect("pending -> recognizing");
        let page = DocumentAssembler::default().assemble(
            result(vec![fragment("x", 0.0, 0.0, 1.0, 1.0)], None),
            Some(existing),
        );
        assert_eq!(page.image(), &image);
        assert_eq!(page.plain_text(), "x");
    }
}
