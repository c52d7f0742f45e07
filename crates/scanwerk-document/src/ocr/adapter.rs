// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The OCR capability seam and the adapters that do not need a model.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use scanwerk_core::error::{OcrError, Result};
use scanwerk_core::geometry::Polygon;
use scanwerk_core::model::RectifiedImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// One recognized piece of text, unordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub polygon: Polygon,
    pub text: String,
    pub confidence: f32,
}

/// What an OCR engine reports for one page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub fragments: Vec<TextFragment>,
    /// Dominant language (ISO 639-1), when the engine can tell.
    #[serde(default)]
    pub language: Option<String>,
}

impl RecognitionResult {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// A text-recognition capability.
///
/// Implementations are stateless per call and safe to invoke more than once
/// for the same image.
#[async_trait]
pub trait OcrAdapter: Send + Sync {
    async fn recognize(&self, image: &RectifiedImage) -> std::result::Result<RecognitionResult, OcrError>;

    /// Short name for logs.
    fn engine_name(&self) -> &str;
}

#[async_trait]
impl<T: OcrAdapter + ?Sized> OcrAdapter for Arc<T> {
    async fn recognize(&self, image: &RectifiedImage) -> std::result::Result<RecognitionResult, OcrError> {
        (**self).recognize(image).await
    }

    fn engine_name(&self) -> &str {
        (**self).engine_name()
    }
}

// -- Static adapter -----------------------------------------------------------

/// Returns a fixed result for every image.
///
/// Used for pre-recognized pages (a sidecar JSON next to the photo) and in
/// tests.
#[derive(Debug, Clone, Default)]
pub struct StaticOcr {
    result: RecognitionResult,
}

impl StaticOcr {
    pub fn new(result: RecognitionResult) -> Self {
        Self { result }
    }

    /// Load a `RecognitionResult` serialized as JSON.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let result: RecognitionResult = serde_json::from_str(&json)?;
        debug!(fragments = result.fragments.len(), "static OCR result loaded");
        Ok(Self { result })
    }
}

#[async_trait]
impl OcrAdapter for StaticOcr {
    async fn recognize(&self, _image: &RectifiedImage) -> std::result::Result<RecognitionResult, OcrError> {
        Ok(self.result.clone())
    }

    fn engine_name(&self) -> &str {
        "static"
    }
}

// -- Confidence gate ----------------------------------------------------------

/// Drops fragments below a confidence floor.
///
/// A page whose engine found text but none of it above the floor is
/// `Unreadable`; a page with no text at all is a valid empty result.
pub struct ConfidenceGate<A> {
    inner: A,
    min_confidence: f32,
}

impl<A: OcrAdapter> ConfidenceGate<A> {
    pub fn new(inner: A, min_confidence: f32) -> Self {
        Self {
            inner,
            min_confidence,
        }
    }
}

#[async_trait]
impl<A: OcrAdapter> OcrAdapter for ConfidenceGate<A> {
    async fn recognize(&self, image: &RectifiedImage) -> std::result::Result<RecognitionResult, OcrError> {
        let mut result = self.inner.recognize(image).await?;
        if result.fragments.is_empty() {
            return Ok(result);
        }
        let before = result.fragments.len();
        result
            .fragments
            .retain(|f| f.confidence >= self.min_confidence && !f.text.trim().is_empty());
        debug!(
            kept = result.fragments.len(),
            dropped = before - result.fragments.len(),
            floor = self.min_confidence,
            "confidence gate applied"
        );
        if result.fragments.is_empty() {
            return Err(OcrError::Unreadable(format!(
                "all {before} fragment(s) fell below confidence {:.2}",
                self.min_confidence
            )));
        }
        Ok(result)
    }

    fn engine_name(&self) -> &str {
        self.inner.engine_name()
    }
}
