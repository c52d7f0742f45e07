// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-pipeline: runs the document stages concurrently and safely.
//
// `DocumentWorkspace` is the entry point. It serializes writes per document
// (`locks`), bounds CPU-heavy work (`pool`), cancels running tasks when
// their page or document goes away (`cancel`), wraps the OCR engine in
// timeouts and retries (`ocr`), and talks to the optional language
// assistant (`assistant`).

pub mod assistant;
pub mod cancel;
pub mod locks;
pub mod ocr;
pub mod pool;
pub mod workspace;

pub use assistant::{Assistant, CannedAssistant, OpenAiAssistant};
pub use cancel::TaskTokens;
pub use locks::DocumentLocks;
pub use ocr::{OcrRunFailure, OcrRunner};
pub use pool::CpuPool;
pub use workspace::DocumentWorkspace;
