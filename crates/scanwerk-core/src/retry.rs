// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry engine with exponential backoff + jitter.
//
// Classifies errors into Transient (auto-retry), UserAction (surface to the
// user), and Permanent (give up). Only transient errors trigger automatic
// retries. Lower layers never retry on their own; OCR orchestration and the
// sync coordinator drive this module.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AssistantError, OcrError, RemoteError, ScanwerkError, SyncError};
use crate::types::ErrorClass;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Base delay between attempts (doubled each time).
    pub base_delay_ms: u64,
    /// Ceiling for a single delay.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts. Handy in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

/// Result of evaluating whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Do not retry; the error is permanent or needs the user.
    GiveUp(ErrorClass),
    /// Maximum attempts used up.
    Exhausted,
}

/// Errors that know their retry class.
pub trait Classify {
    fn error_class(&self) -> ErrorClass;
}

impl Classify for OcrError {
    fn error_class(&self) -> ErrorClass {
        match self {
            OcrError::Unavailable(_) | OcrError::Timeout => ErrorClass::Transient,
            OcrError::Unreadable(_) => ErrorClass::UserAction,
        }
    }
}

impl Classify for RemoteError {
    fn error_class(&self) -> ErrorClass {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout => ErrorClass::Transient,
            RemoteError::Unauthorized(_) | RemoteError::QuotaExceeded => ErrorClass::UserAction,
            RemoteError::Rejected(_) => ErrorClass::Permanent,
        }
    }
}

impl Classify for AssistantError {
    fn error_class(&self) -> ErrorClass {
        match self {
            // Assistant calls are single-attempt; the user decides to retry.
            AssistantError::Unavailable(_) | AssistantError::RateLimited { .. } => {
                ErrorClass::UserAction
            }
            AssistantError::EmptyInput | AssistantError::InvalidResponse(_) => {
                ErrorClass::Permanent
            }
        }
    }
}

impl Classify for SyncError {
    fn error_class(&self) -> ErrorClass {
        match self {
            SyncError::Unavailable { .. } => ErrorClass::Transient,
            SyncError::Unauthorized(_)
            | SyncError::QuotaExceeded { .. }
            | SyncError::UnresolvedConflict => ErrorClass::UserAction,
            SyncError::InvalidResolution(_) | SyncError::Rejected(_) | SyncError::Cancelled => {
                ErrorClass::Permanent
            }
        }
    }
}

impl Classify for ScanwerkError {
    fn error_class(&self) -> ErrorClass {
        match self {
            ScanwerkError::Ocr(e) => e.error_class(),
            ScanwerkError::Sync(e) => e.error_class(),
            ScanwerkError::Assistant(e) => e.error_class(),
            ScanwerkError::Database(_) | ScanwerkError::Worker(_) => ErrorClass::Transient,

            ScanwerkError::Crop(_)
            | ScanwerkError::DocumentNotFound(_)
            | ScanwerkError::PageNotFound(_)
            | ScanwerkError::Config(_) => ErrorClass::UserAction,

            ScanwerkError::Encode(_)
            | ScanwerkError::InvalidOperation(_)
            | ScanwerkError::ImageError(_)
            | ScanwerkError::PdfError(_)
            | ScanwerkError::Cancelled
            | ScanwerkError::Serialization(_)
            | ScanwerkError::IntegrityMismatch { .. } => ErrorClass::Permanent,

            // IO errors depend on the kind
            ScanwerkError::Io(io_err) => match io_err.kind() {
                std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::Interrupted => ErrorClass::Transient,
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    ErrorClass::UserAction
                }
                _ => ErrorClass::Permanent,
            },
        }
    }
}

/// Decide whether to retry after attempt number `attempt` (1-based) failed.
pub fn should_retry<E: Classify>(err: &E, attempt: u32, config: &RetryConfig) -> RetryDecision {
    match err.error_class() {
        ErrorClass::Permanent => {
            info!("permanent error, not retrying");
            RetryDecision::GiveUp(ErrorClass::Permanent)
        }
        ErrorClass::UserAction => {
            info!("user action required, not auto-retrying");
            RetryDecision::GiveUp(ErrorClass::UserAction)
        }
        ErrorClass::Transient => {
            if attempt >= config.max_attempts {
                warn!(attempt, max = config.max_attempts, "retry limit exhausted");
                RetryDecision::Exhausted
            } else {
                let delay = compute_delay(attempt - 1, config);
                debug!(attempt, delay_ms = delay.as_millis(), "scheduling retry");
                RetryDecision::RetryAfter(delay)
            }
        }
    }
}

/// Exponential backoff with jitter.
///
/// delay = min(base * 2^attempt + jitter, max_delay), jitter in [0, base).
pub fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_ms = config.base_delay_ms;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));
    let total_ms = exp_ms.saturating_add(jitter(base_ms, attempt));
    Duration::from_millis(total_ms.min(config.max_delay_ms))
}

/// Deterministic spread over `[0, base)` so concurrent retries of different
/// attempts do not line up.
fn jitter(base_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % base_ms.max(1)
}

/// How a retried operation ended without success.
#[derive(Debug)]
pub enum RetryFailure<E> {
    /// The last error after every allowed attempt.
    Exhausted { attempts: u32, last: E },
    /// A non-transient error, returned on the attempt it happened.
    GaveUp { attempts: u32, error: E },
    /// The token fired before or between attempts.
    Cancelled,
}

/// Run `op` until it succeeds, the error stops being transient, attempts run
/// out, or `cancel` fires.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut op: F,
) -> std::result::Result<T, RetryFailure<E>>
where
    E: Classify + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryFailure::Cancelled);
        }
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        warn!(attempt, error = %err, "attempt failed");
        match should_retry(&err, attempt, config) {
            RetryDecision::RetryAfter(delay) => {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetryFailure::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            RetryDecision::GiveUp(_) => {
                return Err(RetryFailure::GaveUp {
                    attempts: attempt,
                    error: err,
                });
            }
            RetryDecision::Exhausted => {
                return Err(RetryFailure::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }
        }
    }
}
