// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Export encoding: a document becomes PDF or plain-text bytes.
//
// Output is a pure function of the document content and the export config.
// The only time-dependent field is the PDF creation date, which comes from
// `ExportConfig::timestamp` or, when unset, the document's modification time.

use std::io::Write;

use scanwerk_core::error::EncodeError;
use scanwerk_core::model::Document;
use scanwerk_core::types::{ExportConfig, ExportFormat};
use tracing::{info, instrument};

use crate::pdf::writer::PdfWriter;

pub struct ExportEncoder;

impl ExportEncoder {
    /// Encode into memory.
    #[instrument(skip_all, fields(document = %doc.id, format = ?config.format))]
    pub fn encode(doc: &Document, config: &ExportConfig) -> Result<Vec<u8>, EncodeError> {
        if doc.pages().is_empty() {
            return Err(EncodeError::EmptyDocument);
        }
        match config.format {
            ExportFormat::Pdf => PdfWriter::new(config).write(doc),
            ExportFormat::PlainText => Ok(encode_text(doc)),
        }
    }

    /// Encode and write to `sink`. Returns the number of bytes written.
    /// A failed write is reported as `IoFailure` and is not retried.
    pub fn encode_to<W: Write>(
        doc: &Document,
        config: &ExportConfig,
        mut sink: W,
    ) -> Result<usize, EncodeError> {
        let bytes = Self::encode(doc, config)?;
        sink.write_all(&bytes)?;
        sink.flush()?;
        info!(bytes = bytes.len(), "export written to sink");
        Ok(bytes.len())
    }
}

/// UTF-8 plain text, terminated by a newline when non-empty.
fn encode_text(doc: &Document) -> Vec<u8> {
    let mut text = doc.plain_text();
    if !text.is_empty() {
        text.push('\n');
    }
    text.into_bytes()
}
