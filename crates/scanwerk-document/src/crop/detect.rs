// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page-edge detection used to pre-position the crop handles.
//
// The result is only a suggestion for the crop widget; normalization always
// uses the region the user confirms.

use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::hough::{LineDetectionOptions, PolarLine, detect_lines};
use image::DynamicImage;
use scanwerk_core::geometry::{Point, shoelace_area};
use tracing::{debug, instrument, warn};

use crate::capture::RawImage;
use crate::crop::region::CropRegion;

/// Which document edge a line corresponds to.
#[derive(Debug, Clone, Copy)]
enum EdgeKind {
    Top,
    Bottom,
    Left,
    Right,
}

/// Suggest a crop region by finding the page's four dominant straight edges.
///
/// Grayscale, Gaussian blur, Canny, Hough lines; then the outermost
/// horizontal and vertical lines are intersected. Returns `None` when no
/// clean quadrilateral covering at least a tenth of the frame is found.
#[instrument(skip_all, fields(width = raw.width(), height = raw.height()))]
pub fn suggest_region(raw: &RawImage) -> Option<CropRegion> {
    let upright = DynamicImage::ImageRgb8(raw.oriented());
    let (width, height) = (upright.width(), upright.height());

    let gray = upright.to_luma8();
    let blurred = gaussian_blur_f32(&gray, 2.0);
    let edges = canny(&blurred, 50.0, 150.0);

    // Vote threshold proportional to the diagonal so detection scales with
    // resolution.
    let diagonal = ((width as f64).powi(2) + (height as f64).powi(2)).sqrt();
    let vote_threshold = (diagonal * 0.25).max(80.0) as u32;
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold,
            suppression_radius: 8,
        },
    );
    debug!(line_count = lines.len(), vote_threshold, "Hough lines detected");

    let (horizontal, vertical) = classify_lines(&lines);
    if horizontal.len() < 2 || vertical.len() < 2 {
        warn!(
            horizontal = horizontal.len(),
            vertical = vertical.len(),
            "not enough page edges found"
        );
        return None;
    }

    let top = extreme_line(&horizontal, EdgeKind::Top)?;
    let bottom = extreme_line(&horizontal, EdgeKind::Bottom)?;
    let left = extreme_line(&vertical, EdgeKind::Left)?;
    let right = extreme_line(&vertical, EdgeKind::Right)?;

    let corners = [
        intersect_polar_lines(&top, &left)?,
        intersect_polar_lines(&top, &right)?,
        intersect_polar_lines(&bottom, &right)?,
        intersect_polar_lines(&bottom, &left)?,
    ];
    // Intersections can land a fraction outside the frame.
    let clamp = |p: Point| Point::new(p.x.clamp(0.0, width as f32), p.y.clamp(0.0, height as f32));
    let region = CropRegion::ordered(corners.map(clamp));

    let area = shoelace_area(&region.corners);
    if area < width as f32 * height as f32 * 0.10 {
        warn!(area, "detected quadrilateral too small");
        return None;
    }
    region.validate(width, height).ok()?;
    debug!(corners = ?region.corners, "page edges found");
    Some(region)
}

/// Split lines into roughly horizontal (angle within 30 degrees of 0/180)
/// and roughly vertical (within 30 degrees of 90). Diagonals are dropped.
fn classify_lines(lines: &[PolarLine]) -> (Vec<PolarLine>, Vec<PolarLine>) {
    let mut horizontal = Vec::new();
    let mut vertical = Vec::new();
    for line in lines {
        let angle = line.angle_in_degrees;
        if angle <= 30 || angle >= 150 {
            horizontal.push(*line);
        } else if (60..=120).contains(&angle) {
            vertical.push(*line);
        }
    }
    (horizontal, vertical)
}

/// Outermost line for the requested edge, by signed distance `r`.
fn extreme_line(lines: &[PolarLine], kind: EdgeKind) -> Option<PolarLine> {
    let by_r = |a: &&PolarLine, b: &&PolarLine| a.r.total_cmp(&b.r);
    match kind {
        EdgeKind::Top | EdgeKind::Left => lines.iter().min_by(by_r).copied(),
        EdgeKind::Bottom | EdgeKind::Right => lines.iter().max_by(by_r).copied(),
    }
}

/// Intersection of two Hough lines `x cos(t) + y sin(t) = r`; `None` when
/// (nearly) parallel.
fn intersect_polar_lines(a: &PolarLine, b: &PolarLine) -> Option<Point> {
    let theta_a = (a.angle_in_degrees as f64).to_radians();
    let theta_b = (b.angle_in_degrees as f64).to_radians();
    let (sin_a, cos_a) = theta_a.sin_cos();
    let (sin_b, cos_b) = theta_b.sin_cos();

    let denom = cos_a * sin_b - sin_a * cos_b;
    if denom.abs() < 1e-6 {
        return None;
    }
    let (r_a, r_b) = (a.r as f64, b.r as f64);
    let x = (r_a * sin_b - r_b * sin_a) / denom;
    let y = (r_b * cos_a - r_a * cos_b) / denom;
    Some(Point::new(x as f32, y as f32))
}
