// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective normalization: the user's quad is warped onto an upright
// rectangle.

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use scanwerk_core::error::CropError;
use scanwerk_core::model::RectifiedImage;
use tracing::{debug, info, instrument};

use crate::capture::RawImage;
use crate::crop::region::CropRegion;

/// Fill used where the projection samples outside the source.
const FILL: Rgb<u8> = Rgb([255, 255, 255]);

pub struct CropNormalizer;

impl CropNormalizer {
    /// Apply orientation, validate the region, and warp it to an upright
    /// rectangle. Pure: the same inputs always give the same pixels.
    #[instrument(skip_all, fields(width = raw.width(), height = raw.height()))]
    pub fn normalize(raw: &RawImage, region: &CropRegion) -> Result<RectifiedImage, CropError> {
        let upright = raw.oriented();
        let (width, height) = upright.dimensions();
        region.validate(width, height)?;

        let (out_w, out_h) = region.output_size();
        let (w, h) = (out_w as f32, out_h as f32);
        let src: [(f32, f32); 4] = region.corners.map(|p| (p.x, p.y));
        let dest: [(f32, f32); 4] = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];

        let output = if is_identity(&src, &dest) {
            debug!("region covers the frame at native size, copying");
            upright
        } else {
            // from_control_points maps the quad onto the output rectangle.
            let projection = Projection::from_control_points(src, dest).ok_or_else(|| {
                CropError::InvalidRegion("corners do not define a perspective transform".into())
            })?;
            let mut output = RgbImage::new(out_w, out_h);
            warp_into(&upright, &projection, Interpolation::Bilinear, FILL, &mut output);
            output
        };

        info!(out_w, out_h, "Perspective correction applied");
        RectifiedImage::from_rgb8(out_w, out_h, output.into_raw())
            .map_err(|err| CropError::InvalidRegion(err.to_string()))
    }
}

fn is_identity(src: &[(f32, f32); 4], dest: &[(f32, f32); 4]) -> bool {
    src.iter()
        .zip(dest)
        .all(|(a, b)| (a.0 - b.0).abs() < f32::EPSILON && (a.1 - b.1).abs() < f32::EPSILON)
}
