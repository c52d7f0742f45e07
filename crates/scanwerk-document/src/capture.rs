// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image acquisition hand-off: camera or gallery bytes become a canonical RGB
// bitmap plus the rotation needed to display it upright.

use std::io::Cursor;
use std::path::Path;

use chrono::{DateTime, Utc};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage, imageops};
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::Rotation;
use tracing::{debug, info, instrument};

/// An acquired photo, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    bitmap: RgbImage,
    orientation: Rotation,
    captured_at: DateTime<Utc>,
}

impl RawImage {
    pub fn new(bitmap: RgbImage, orientation: Rotation, captured_at: DateTime<Utc>) -> Self {
        Self {
            bitmap,
            orientation,
            captured_at,
        }
    }

    /// Bitmap as stored, before orientation is applied.
    pub fn bitmap(&self) -> &RgbImage {
        &self.bitmap
    }

    pub fn width(&self) -> u32 {
        self.bitmap.width()
    }

    pub fn height(&self) -> u32 {
        self.bitmap.height()
    }

    pub fn orientation(&self) -> Rotation {
        self.orientation
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Width and height once orientation is applied.
    pub fn oriented_dimensions(&self) -> (u32, u32) {
        if self.orientation.swaps_axes() {
            (self.height(), self.width())
        } else {
            (self.width(), self.height())
        }
    }

    /// The upright bitmap.
    pub fn oriented(&self) -> RgbImage {
        match self.orientation {
            Rotation::Deg0 => self.bitmap.clone(),
            Rotation::Deg90 => imageops::rotate90(&self.bitmap),
            Rotation::Deg180 => imageops::rotate180(&self.bitmap),
            Rotation::Deg270 => imageops::rotate270(&self.bitmap),
        }
    }

    /// Same photo with a further clockwise turn (the review screen's rotate
    /// button). Pixels are untouched; only the metadata changes.
    pub fn rotated(&self, by: Rotation) -> Self {
        Self {
            bitmap: self.bitmap.clone(),
            orientation: self.orientation.then(by),
            captured_at: self.captured_at,
        }
    }
}

/// Decodes acquired photos.
pub struct ImageSource;

impl ImageSource {
    /// Decode encoded bytes (JPEG, PNG, ...). EXIF rotation is kept as
    /// metadata; mirrored orientations are baked into the pixels.
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8], captured_at: DateTime<Utc>) -> Result<RawImage> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|err| ScanwerkError::ImageError(format!("unreadable image data: {err}")))?;
        let mut decoder = reader
            .into_decoder()
            .map_err(|err| ScanwerkError::ImageError(format!("failed to decode image: {err}")))?;
        let exif = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let mut image = DynamicImage::from_decoder(decoder)
            .map_err(|err| ScanwerkError::ImageError(format!("failed to decode image: {err}")))?;

        let orientation = match exif {
            Orientation::NoTransforms => Rotation::Deg0,
            Orientation::Rotate90 => Rotation::Deg90,
            Orientation::Rotate180 => Rotation::Deg180,
            Orientation::Rotate270 => Rotation::Deg270,
            mirrored => {
                image.apply_orientation(mirrored);
                Rotation::Deg0
            }
        };

        let bitmap = image.to_rgb8();
        debug!(
            width = bitmap.width(),
            height = bitmap.height(),
            orientation = orientation.degrees(),
            "Image decoded from bytes"
        );
        Ok(RawImage::new(bitmap, orientation, captured_at))
    }

    /// Decode a file from disk, using its modification time as the capture
    /// time when available.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<RawImage> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let captured_at = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let raw = Self::from_bytes(&data, captured_at)?;
        info!(width = raw.width(), height = raw.height(), "Image loaded");
        Ok(raw)
    }

    /// Wrap an already-decoded bitmap (camera frames arrive this way).
    pub fn from_rgb(bitmap: RgbImage, orientation: Rotation, captured_at: DateTime<Utc>) -> RawImage {
        RawImage::new(bitmap, orientation, captured_at)
    }
}
