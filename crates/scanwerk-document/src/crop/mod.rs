// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Crop and perspective correction.

pub mod detect;
pub mod normalizer;
pub mod region;

pub use detect::suggest_region;
pub use normalizer::CropNormalizer;
pub use region::{AspectPolicy, CropRegion};
