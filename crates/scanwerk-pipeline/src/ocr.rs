// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR orchestration: per-call timeout, confidence floor, retry with backoff
// for transient engine failures, and cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use scanwerk_core::config::OcrConfig;
use scanwerk_core::error::OcrError;
use scanwerk_core::model::RectifiedImage;
use scanwerk_core::retry::{RetryFailure, retry_with_backoff};
use scanwerk_document::ocr::{ConfidenceGate, OcrAdapter, RecognitionResult};

/// Why a recognition run produced no result.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrRunFailure {
    /// The token fired; the page goes back to `Pending`.
    Cancelled,
    /// The engine gave up or retries ran out; the page becomes `Failed`.
    Failed { attempts: u32, error: OcrError },
}

pub struct OcrRunner {
    engine: ConfidenceGate<Arc<dyn OcrAdapter>>,
    config: OcrConfig,
}

impl OcrRunner {
    pub fn new(adapter: Arc<dyn OcrAdapter>, config: OcrConfig) -> Self {
        Self {
            engine: ConfidenceGate::new(adapter, config.min_confidence),
            config,
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.engine_name()
    }

    #[instrument(skip_all, fields(engine = self.engine_name(), width = image.width(), height = image.height()))]
    pub async fn recognize(
        &self,
        image: &RectifiedImage,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult, OcrRunFailure> {
        let timeout = Duration::from_secs(self.config.timeout_secs.max(1));
        let engine = &self.engine;
        let attempt = move |attempt: u32| async move {
            match tokio::time::timeout(timeout, engine.recognize(image)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(attempt, timeout_secs = timeout.as_secs(), "OCR call timed out");
                    Err(OcrError::Timeout)
                }
            }
        };

        // The select drops an in-flight engine call as soon as the token
        // fires; the retry loop alone only notices between attempts.
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(RetryFailure::Cancelled),
            outcome = retry_with_backoff(&self.config.retry, cancel, attempt) => outcome,
        };

        match outcome {
            Ok(result) => {
                info!(fragments = result.fragments.len(), "page recognized");
                Ok(result)
            }
            Err(RetryFailure::Cancelled) => Err(OcrRunFailure::Cancelled),
            Err(RetryFailure::Exhausted { attempts, last }) => Err(OcrRunFailure::Failed {
                attempts,
                error: last,
            }),
            Err(RetryFailure::GaveUp { attempts, error }) => {
                Err(OcrRunFailure::Failed { attempts, error })
            }
        }
    }
}
