// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The taxonomy uses three severity levels that drive presentation.

use crate::error::{
    AssistantError, CropError, EncodeError, OcrError, ScanwerkError, SyncError,
};

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Network blip or timeout. Retrying is expected to help.
    Transient,
    /// User must do something (re-crop, rescan, resolve a conflict, free space).
    ActionRequired,
    /// Cannot be fixed by retrying or user action.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether trying the same thing again may succeed.
    pub retriable: bool,
    pub severity: Severity,
}

impl HumanError {
    fn new(message: &str, suggestion: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable: severity == Severity::Transient,
            severity,
        }
    }
}

/// Convert a `ScanwerkError` into a `HumanError`.
pub fn humanize_error(err: &ScanwerkError) -> HumanError {
    match err {
        // -- Scan pipeline --
        ScanwerkError::Crop(CropError::InvalidRegion(detail)) => HumanError::new(
            "The crop area doesn't fit the photo.",
            format!("Drag the corners so they sit on the page edges inside the photo, then confirm again. ({detail})"),
            Severity::ActionRequired,
        ),

        ScanwerkError::Ocr(e) => humanize_ocr_error(e),

        ScanwerkError::Encode(EncodeError::EmptyDocument) => HumanError::new(
            "This document has no pages yet.",
            "Scan at least one page before exporting.",
            Severity::ActionRequired,
        ),

        ScanwerkError::Encode(EncodeError::IoFailure(_)) => HumanError::new(
            "The export couldn't be saved.",
            "Check there is enough free space where you are saving, then export again.",
            Severity::ActionRequired,
        ),

        ScanwerkError::Encode(EncodeError::Pdf(_)) => HumanError::new(
            "The PDF couldn't be created.",
            "Try exporting as plain text instead. If this keeps happening, please report it.",
            Severity::Permanent,
        ),

        ScanwerkError::Sync(e) => humanize_sync_error(e),

        ScanwerkError::Assistant(e) => humanize_assistant_error(e),

        // -- Document model --
        ScanwerkError::DocumentNotFound(id) => HumanError::new(
            "That document doesn't exist.",
            format!("It may have been deleted. Check the document list for {id}."),
            Severity::ActionRequired,
        ),

        ScanwerkError::PageNotFound(id) => HumanError::new(
            "That page isn't in this document.",
            format!("Check the page list; page {id} may have been removed."),
            Severity::ActionRequired,
        ),

        ScanwerkError::InvalidOperation(detail) => HumanError::new(
            "That change can't be made.",
            detail.clone(),
            Severity::Permanent,
        ),

        ScanwerkError::ImageError(_) => HumanError::new(
            "There's a problem with this image.",
            "The image may be damaged or in an unusual format. Try saving it as a JPEG or PNG first.",
            Severity::Permanent,
        ),

        ScanwerkError::PdfError(_) => HumanError::new(
            "There's a problem with this PDF file.",
            "The file may be damaged or wasn't made by this app. Try exporting the document again.",
            Severity::Permanent,
        ),

        ScanwerkError::Cancelled => HumanError::new(
            "The operation was cancelled.",
            "Nothing was changed. Start it again when you're ready.",
            Severity::ActionRequired,
        ),

        ScanwerkError::Worker(_) => HumanError::new(
            "A background task stopped unexpectedly.",
            "Try again. Your document was not changed.",
            Severity::Transient,
        ),

        // -- Storage --
        ScanwerkError::Database(_) => HumanError::new(
            "The app's document storage had a problem.",
            "Try again. Your scanned documents should still be there.",
            Severity::Transient,
        ),

        ScanwerkError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError::new(
                "The file couldn't be found.",
                "It may have been moved or deleted. Try choosing the file again.",
                Severity::ActionRequired,
            ),
            std::io::ErrorKind::PermissionDenied => HumanError::new(
                "The app doesn't have permission to use that file.",
                "Check the file permissions, or try copying the file to a different location first.",
                Severity::ActionRequired,
            ),
            _ => HumanError::new(
                "There was a problem reading or writing a file.",
                "Try again. If this keeps happening, your device's storage may be full.",
                Severity::Transient,
            ),
        },

        ScanwerkError::Serialization(_) => HumanError::new(
            "The app had an internal data problem.",
            "If this keeps happening, please report it.",
            Severity::Permanent,
        ),

        ScanwerkError::IntegrityMismatch { .. } => HumanError::new(
            "A stored document has been changed outside the app.",
            "The saved copy doesn't match its fingerprint. Restore it from the cloud copy or scan it again.",
            Severity::Permanent,
        ),

        ScanwerkError::Config(detail) => HumanError::new(
            "The settings file has a problem.",
            format!("Fix or delete config.json to go back to the defaults. ({detail})"),
            Severity::ActionRequired,
        ),
    }
}

fn humanize_ocr_error(err: &OcrError) -> HumanError {
    match err {
        OcrError::Unavailable(_) => HumanError::new(
            "Text recognition isn't available right now.",
            "Your page was kept. Try recognizing it again in a moment.",
            Severity::Transient,
        ),
        OcrError::Timeout => HumanError::new(
            "Text recognition took too long.",
            "Your page was kept. Try again; a smaller crop can speed things up.",
            Severity::Transient,
        ),
        OcrError::Unreadable(_) => HumanError::new(
            "We couldn't read any text on this page.",
            "Try scanning again with better lighting, making sure the text is clear and in focus.",
            Severity::ActionRequired,
        ),
    }
}

fn humanize_sync_error(err: &SyncError) -> HumanError {
    match err {
        SyncError::Unavailable { .. } => HumanError::new(
            "We couldn't reach your cloud storage.",
            "Your document is saved on this device. Check your connection and sync again later.",
            Severity::Transient,
        ),
        SyncError::Unauthorized(_) => HumanError::new(
            "Your cloud account isn't signed in.",
            "Sign in again, then sync.",
            Severity::ActionRequired,
        ),
        SyncError::QuotaExceeded { needed, available } => HumanError::new(
            "Your cloud storage is full.",
            format!(
                "This document needs {} KB but only {} KB is free. Delete some documents, then sync again.",
                needed.div_ceil(1024),
                available / 1024
            ),
            Severity::ActionRequired,
        ),
        SyncError::UnresolvedConflict => HumanError::new(
            "This document was changed on another device too.",
            "Choose which version to keep, or combine pages from both, then sync again.",
            Severity::ActionRequired,
        ),
        SyncError::InvalidResolution(detail) => HumanError::new(
            "That combination of pages doesn't work.",
            format!("Pick each page from one of the two versions. ({detail})"),
            Severity::ActionRequired,
        ),
        SyncError::Rejected(_) => HumanError::new(
            "Your cloud storage refused this document.",
            "If this keeps happening, please report it.",
            Severity::Permanent,
        ),
        SyncError::Cancelled => HumanError::new(
            "Sync was cancelled.",
            "Your document is still saved on this device.",
            Severity::ActionRequired,
        ),
    }
}

fn humanize_assistant_error(err: &AssistantError) -> HumanError {
    match err {
        AssistantError::Unavailable(_) => HumanError::new(
            "The writing assistant isn't available.",
            "Check your connection and the assistant key, then try again.",
            Severity::ActionRequired,
        ),
        AssistantError::RateLimited {
            retry_after_secs: Some(secs),
        } => HumanError::new(
            "The writing assistant is busy.",
            format!("Wait about {secs} seconds, then try again."),
            Severity::ActionRequired,
        ),
        AssistantError::RateLimited {
            retry_after_secs: None,
        } => HumanError::new(
            "The writing assistant is busy.",
            "Wait a minute, then try again.",
            Severity::ActionRequired,
        ),
        AssistantError::EmptyInput => HumanError::new(
            "There's no text to summarize yet.",
            "Wait for text recognition to finish on at least one page.",
            Severity::ActionRequired,
        ),
        AssistantError::InvalidResponse(_) => HumanError::new(
            "The writing assistant sent back something unexpected.",
            "Try again later.",
            Severity::Permanent,
        ),
    }
}
