// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanwerk.
//
// Each pipeline stage has its own narrow error enum so callers can match on
// the failures that stage can actually produce. `ScanwerkError` wraps them
// all for the orchestration layer and the CLI.

use thiserror::Error;

use crate::types::{DocumentId, PageId};

/// Crop / perspective normalization failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CropError {
    #[error("invalid crop region: {0}")]
    InvalidRegion(String),
}

/// Failures reported by an OCR capability.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OcrError {
    /// Engine missing, not loaded, or unreachable. Retryable.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// Nothing legible above the confidence floor. Surfaced to the user.
    #[error("page is unreadable: {0}")]
    Unreadable(String),

    /// The call did not finish in time. Retryable with backoff.
    #[error("OCR timed out")]
    Timeout,
}

/// Export encoding failures.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("document has no pages to export")]
    EmptyDocument,

    #[error("export sink write failed: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("PDF serialization failed: {0}")]
    Pdf(String),
}

/// Failures reported by a remote document store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("remote store timed out")]
    Timeout,

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("remote rejected the request: {0}")]
    Rejected(String),
}

/// Synchronization failures surfaced by the sync coordinator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Transient failures persisted through every retry attempt.
    #[error("remote store unavailable after {attempts} attempt(s): {last_error}")]
    Unavailable { attempts: u32, last_error: String },

    #[error("not authorized to sync: {0}")]
    Unauthorized(String),

    #[error("storage quota exceeded: need {needed} bytes, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },

    #[error("document has an unresolved sync conflict")]
    UnresolvedConflict,

    #[error("conflict resolution is invalid: {0}")]
    InvalidResolution(String),

    #[error("remote store rejected the document: {0}")]
    Rejected(String),

    #[error("sync cancelled")]
    Cancelled,
}

/// Failures from the optional language-assistant API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssistantError {
    #[error("assistant unavailable: {0}")]
    Unavailable(String),

    #[error("assistant rate limit reached")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("there is no text to send to the assistant")]
    EmptyInput,

    #[error("assistant returned an unexpected response: {0}")]
    InvalidResponse(String),
}

/// Top-level error type for all Scanwerk operations.
#[derive(Debug, Error)]
pub enum ScanwerkError {
    // -- Pipeline stages --
    #[error(transparent)]
    Crop(#[from] CropError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Assistant(#[from] AssistantError),

    // -- Document model --
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),

    #[error("page {0} not found")]
    PageNotFound(PageId),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("PDF error: {0}")]
    PdfError(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("background worker failed: {0}")]
    Worker(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Broad families of failure, used to pick a recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad caller input; fix the input and try again. Never retried.
    Input,
    /// An external capability (OCR, remote store, assistant) failed.
    Capability,
    /// Local cache or export sink I/O failed.
    Persistence,
    /// A sync conflict needs an explicit user decision.
    Conflict,
    /// The user cancelled the operation.
    Cancelled,
}

impl ScanwerkError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Crop(_)
            | Self::DocumentNotFound(_)
            | Self::PageNotFound(_)
            | Self::InvalidOperation(_)
            | Self::ImageError(_)
            | Self::PdfError(_)
            | Self::Config(_) => ErrorCategory::Input,
            Self::Encode(EncodeError::EmptyDocument) => ErrorCategory::Input,
            Self::Encode(_) => ErrorCategory::Persistence,
            Self::Ocr(_) | Self::Assistant(_) | Self::Worker(_) => ErrorCategory::Capability,
            Self::Sync(SyncError::UnresolvedConflict) => ErrorCategory::Conflict,
            Self::Sync(SyncError::Cancelled) | Self::Cancelled => ErrorCategory::Cancelled,
            Self::Sync(SyncError::InvalidResolution(_)) => ErrorCategory::Input,
            Self::Sync(_) => ErrorCategory::Capability,
            Self::Database(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::IntegrityMismatch { .. } => ErrorCategory::Persistence,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanwerkError>;
