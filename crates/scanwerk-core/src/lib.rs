// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk core: document model, geometry, errors, and policies shared
// across all crates.

pub mod config;
pub mod error;
pub mod geometry;
pub mod human_errors;
pub mod integrity;
pub mod model;
pub mod retry;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, ScanwerkError};
pub use geometry::{Point, Polygon, Rect};
pub use model::{
    Document, OcrStatus, Page, RectifiedImage, SyncMetadata, SyncState, TextBlock,
};
pub use types::*;
