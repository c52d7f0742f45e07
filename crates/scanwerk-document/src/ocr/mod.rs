// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Optical character recognition: the capability trait, adapters, and the
// language heuristic.

pub mod adapter;
#[cfg(feature = "ocr")]
pub mod engine;
pub mod language;

pub use adapter::{ConfidenceGate, OcrAdapter, RecognitionResult, StaticOcr, TextFragment};
#[cfg(feature = "ocr")]
pub use engine::{OcrsAdapter, OcrsConfig};
pub use language::{detect_language, is_rtl};
