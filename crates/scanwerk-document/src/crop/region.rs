// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// User-adjusted crop quadrilateral.

use scanwerk_core::error::CropError;
use scanwerk_core::geometry::{Point, segments_intersect, shoelace_area};
use scanwerk_core::types::PaperSize;
use serde::{Deserialize, Serialize};

/// Smallest quad area (square pixels) accepted as non-degenerate.
const MIN_AREA: f32 = 1.0;

/// How the output rectangle's proportions are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectPolicy {
    /// Use the measured edge lengths of the quad.
    #[default]
    Measured,
    /// Keep the measured width; take the height from the paper's ratio.
    Paper(PaperSize),
}

/// Four corners in the orientation-corrected frame, ordered top-left,
/// top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub corners: [Point; 4],
    pub aspect: AspectPolicy,
    /// Clamp the longer output edge to this many pixels.
    pub max_edge: Option<u32>,
}

impl CropRegion {
    /// Region from corners already in TL, TR, BR, BL order.
    pub fn new(corners: [Point; 4]) -> Self {
        Self {
            corners,
            aspect: AspectPolicy::Measured,
            max_edge: None,
        }
    }

    /// Region from four corners in any order (e.g. dragged handles).
    ///
    /// Corners are walked clockwise around their centroid, starting from the
    /// one with the smallest `x + y`. Rotated pages (a diamond at 45 degrees)
    /// keep four distinct corners.
    pub fn ordered(points: [Point; 4]) -> Self {
        let cx = points.iter().map(|p| p.x).sum::<f32>() / 4.0;
        let cy = points.iter().map(|p| p.y).sum::<f32>() / 4.0;
        let mut corners = points;
        // y grows downwards, so increasing angle is clockwise on screen.
        corners.sort_by(|a, b| {
            (a.y - cy)
                .atan2(a.x - cx)
                .total_cmp(&(b.y - cy).atan2(b.x - cx))
        });
        let start = corners
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (a.x + a.y).total_cmp(&(b.x + b.y)))
            .map_or(0, |(i, _)| i);
        corners.rotate_left(start);
        Self::new(corners)
    }

    /// The whole `width` x `height` frame, used when the user confirms
    /// without moving any handle.
    pub fn full_frame(width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self::new([
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ])
    }

    pub fn with_aspect(mut self, aspect: AspectPolicy) -> Self {
        self.aspect = aspect;
        self
    }

    pub fn with_max_edge(mut self, max_edge: u32) -> Self {
        self.max_edge = Some(max_edge);
        self
    }

    /// Parse `x,y,x,y,x,y,x,y` (CLI form). Points may be in any order.
    pub fn parse_corners(spec: &str) -> Option<Self> {
        let values: Vec<f32> = spec
            .split(',')
            .map(|v| v.trim().parse::<f32>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        if values.len() != 8 {
            return None;
        }
        Some(Self::ordered([
            Point::new(values[0], values[1]),
            Point::new(values[2], values[3]),
            Point::new(values[4], values[5]),
            Point::new(values[6], values[7]),
        ]))
    }

    /// Check the region against an oriented image of `width` x `height`.
    pub fn validate(&self, width: u32, height: u32) -> Result<(), CropError> {
        let (w, h) = (width as f32, height as f32);
        for (i, p) in self.corners.iter().enumerate() {
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err(CropError::InvalidRegion(format!("corner {i} is not a number")));
            }
            if p.x < 0.0 || p.y < 0.0 || p.x > w || p.y > h {
                return Err(CropError::InvalidRegion(format!(
                    "corner {i} ({}, {}) lies outside the {width}x{height} image",
                    p.x, p.y
                )));
            }
        }

        let [a, b, c, d] = self.corners;
        if segments_intersect(a, b, c, d) || segments_intersect(b, c, d, a) {
            return Err(CropError::InvalidRegion(
                "edges cross; the quadrilateral is self-intersecting".into(),
            ));
        }

        let area = shoelace_area(&self.corners);
        if area < MIN_AREA {
            return Err(CropError::InvalidRegion(format!(
                "area {area:.2} is too small"
            )));
        }
        Ok(())
    }

    /// Output size before any `max_edge` clamp: mean of opposite edges,
    /// rounded, at least 1.
    pub fn measured_size(&self) -> (u32, u32) {
        let [tl, tr, br, bl] = self.corners;
        let width = (tl.distance(&tr) + bl.distance(&br)) / 2.0;
        let height = (tl.distance(&bl) + tr.distance(&br)) / 2.0;
        let height = match self.aspect {
            AspectPolicy::Measured => height,
            AspectPolicy::Paper(paper) => width * paper.aspect_ratio(),
        };
        ((width.round() as u32).max(1), (height.round() as u32).max(1))
    }

    /// Final output size with the `max_edge` clamp applied proportionally.
    pub fn output_size(&self) -> (u32, u32) {
        let (w, h) = self.measured_size();
        match self.max_edge {
            Some(max) if w.max(h) > max && max > 0 => {
                let scale = max as f32 / w.max(h) as f32;
                (
                    ((w as f32 * scale).round() as u32).max(1),
                    ((h as f32 * scale).round() as u32).max(1),
                )
            }
            _ => (w, h),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(points: [(f32, f32); 4]) -> CropRegion {
        CropRegion::new(points.map(Point::from))
    }

    #[test]
    fn ordered_sorts_shuffled_corners() {
        let region = CropRegion::ordered([
            Point::new(90.0, 95.0),
            Point::new(10.0, 5.0),
            Point::new(12.0, 90.0),
            Point::new(95.0, 8.0),
        ]);
        assert_eq!(
            region.corners,
            [
                Point::new(10.0, 5.0),
                Point::new(95.0, 8.0),
                Point::new(90.0, 95.0),
                Point::new(12.0, 90.0),
            ]
        );
    }

    #[test]
    fn diamond_keeps_four_corners() {
        let region = CropRegion::parse_corners("50,100, 0,50, 100,50, 50,0").expect("parse");
        assert_eq!(
            region.corners,
            [
                Point::new(50.0, 0.0),
                Point::new(100.0, 50.0),
                Point::new(50.0, 100.0),
                Point::new(0.0, 50.0),
            ]
        );
        region.validate(100, 100).expect("diamond is valid");
    }

    #[test]
    fn bow_tie_is_rejected() {
        // TR and BR swapped: edges 1-2 and 3-0 cross.
        let region = quad([(0.0, 0.0), (10.0, 10.0), (10.0, 0.0), (0.0, 10.0)]);
        assert!(matches!(
            region.validate(20, 20),
            Err(CropError::InvalidRegion(_))
        ));
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let region = quad([(0.0, 0.0), (30.0, 0.0), (30.0, 10.0), (0.0, 10.0)]);
        assert!(region.validate(20, 20).is_err());
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let region = quad([(0.0, 0.0), (5.0, 0.0), (10.0, 0.0), (15.0, 0.0)]);
        assert!(region.validate(20, 20).is_err());
    }

    #[test]
    fn full_frame_is_valid_and_sized() {
        let region = CropRegion::full_frame(64, 48);
        region.validate(64, 48).expect("full frame is valid");
        assert_eq!(region.output_size(), (64, 48));
    }

    #[test]
    fn paper_policy_sets_height_from_ratio() {
        let region = CropRegion::full_frame(210, 100).with_aspect(AspectPolicy::Paper(PaperSize::A4));
        assert_eq!(region.output_size(), (210, 297));
    }

    #[test]
    fn max_edge_scales_proportionally() {
        let region = CropRegion::full_frame(400, 200).with_max_edge(100);
        assert_eq!(region.output_size(), (100, 50));
    }

    #[test]
    fn parses_cli_corners() {
        let region = CropRegion::parse_corners("0,0, 10,0, 10,10, 0,10").expect("parse");
        assert_eq!(region.corners[2], Point::new(10.0, 10.0));
        assert!(CropRegion::parse_corners("1,2,3").is_none());
    }
}
