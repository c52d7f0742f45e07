// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF operations: deterministic export and text-layer inspection.

pub mod reader;
pub mod writer;

pub use reader::{PageSummary, PdfReader, extract_text_layer};
pub use writer::PdfWriter;
