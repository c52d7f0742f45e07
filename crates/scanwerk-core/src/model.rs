// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The document aggregate: documents own pages, pages own their rectified
// image and recognized text blocks.
//
// All mutation goes through the methods below so the ordering invariants
// (gap-free page order, strictly increasing reading order, monotonic OCR
// status) cannot be broken from outside.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ScanwerkError};
use crate::geometry::Polygon;
use crate::integrity::hash_parts;
use crate::types::{DocumentId, PageId};

/// Language code used when nothing better is known.
pub const UNDETERMINED_LANGUAGE: &str = "und";

// -- Rectified image ----------------------------------------------------------

/// A perspective-corrected page bitmap (RGB8, row-major).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RectifiedImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RectifiedImage {
    /// Wrap an RGB8 buffer. Fails when the buffer length does not match the
    /// dimensions.
    pub fn from_rgb8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(ScanwerkError::ImageError(format!(
                "RGB8 buffer for {width}x{height} must be {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB8 bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// -- Text blocks --------------------------------------------------------------

/// A recognized fragment of text placed on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    /// Bounding polygon in page (rectified image) pixels.
    pub polygon: Polygon,
    pub text: String,
    /// Engine confidence in `[0, 1]`.
    pub confidence: f32,
    /// Position in natural reading order; strictly increasing within a page.
    pub reading_order: u32,
    /// Index of the visual line this block was grouped into.
    pub line: u32,
}

// -- Pages --------------------------------------------------------------------

/// OCR lifecycle of a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OcrStatus {
    Pending,
    Recognizing,
    Recognized,
    Failed { reason: String },
}

impl OcrStatus {
    /// Allowed transitions: the forward path, explicit retry
    /// (`Failed -> Pending`), and cancellation (`Recognizing -> Pending`).
    pub fn can_transition_to(&self, next: &OcrStatus) -> bool {
        matches!(
            (self, next),
            (OcrStatus::Pending, OcrStatus::Recognizing)
                | (OcrStatus::Recognizing, OcrStatus::Recognized)
                | (OcrStatus::Recognizing, OcrStatus::Failed { .. })
                | (OcrStatus::Recognizing, OcrStatus::Pending)
                | (OcrStatus::Failed { .. }, OcrStatus::Pending)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            OcrStatus::Pending => "pending",
            OcrStatus::Recognizing => "recognizing",
            OcrStatus::Recognized => "recognized",
            OcrStatus::Failed { .. } => "failed",
        }
    }
}

/// One scanned page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    id: PageId,
    /// Stored out of band by the local cache; not part of the JSON record.
    #[serde(skip)]
    image: RectifiedImage,
    blocks: Vec<TextBlock>,
    language: String,
    ocr_status: OcrStatus,
}

impl Page {
    /// A fresh page awaiting OCR. The id is assigned when the page is added
    /// to a document.
    pub fn new(image: RectifiedImage) -> Self {
        Self {
            id: PageId::UNASSIGNED,
            image,
            blocks: Vec::new(),
            language: UNDETERMINED_LANGUAGE.to_owned(),
            ocr_status: OcrStatus::Pending,
        }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn image(&self) -> &RectifiedImage {
        &self.image
    }

    /// Re-attach the bitmap after loading the page record from storage.
    pub fn attach_image(&mut self, image: RectifiedImage) {
        self.image = image;
    }

    pub fn blocks(&self) -> &[TextBlock] {
        &self.blocks
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn ocr_status(&self) -> &OcrStatus {
        &self.ocr_status
    }

    fn transition(&mut self, next: OcrStatus) -> Result<()> {
        if !self.ocr_status.can_transition_to(&next) {
            return Err(ScanwerkError::InvalidOperation(format!(
                "page {} cannot move from {} to {}",
                self.id,
                self.ocr_status.label(),
                next.label()
            )));
        }
        debug!(page = %self.id, from = self.ocr_status.label(), to = next.label(), "OCR status change");
        self.ocr_status = next;
        Ok(())
    }

    /// `Pending -> Recognizing`.
    pub fn begin_recognition(&mut self) -> Result<()> {
        self.transition(OcrStatus::Recognizing)
    }

    /// `Recognizing -> Failed`.
    pub fn fail_recognition(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(OcrStatus::Failed {
            reason: reason.into(),
        })
    }

    /// `Recognizing -> Pending`. Returns `false` when the page was not being
    /// recognized (nothing to undo).
    pub fn cancel_recognition(&mut self) -> bool {
        if self.ocr_status == OcrStatus::Recognizing {
            self.ocr_status = OcrStatus::Pending;
            true
        } else {
            false
        }
    }

    /// Explicit user retry: `Failed -> Pending`.
    pub fn reset_for_retry(&mut self) -> Result<()> {
        self.transition(OcrStatus::Pending)
    }

    /// Store recognized blocks and mark the page `Recognized`.
    ///
    /// Blocks are sorted by their reading order and renumbered `0..n`, so the
    /// index is strictly increasing whatever the caller passed. A fresh result
    /// for a failed page counts as that page's retry.
    pub fn apply_recognition(&mut self, mut blocks: Vec<TextBlock>, language: impl Into<String>) {
        if matches!(self.ocr_status, OcrStatus::Failed { .. }) {
            self.ocr_status = OcrStatus::Pending;
        }
        blocks.sort_by_key(|b| b.reading_order);
        for (index, block) in blocks.iter_mut().enumerate() {
            block.reading_order = index as u32;
        }
        self.blocks = blocks;
        self.language = language.into();
        self.ocr_status = OcrStatus::Recognized;
    }

    /// Plain-text rendering: blocks in reading order, a space between blocks
    /// on the same line and a newline whenever the line changes.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        let mut current_line: Option<u32> = None;
        for block in &self.blocks {
            match current_line {
                None => {}
                Some(line) if line == block.line => out.push(' '),
                Some(_) => out.push('\n'),
            }
            out.push_str(&block.text);
            current_line = Some(block.line);
        }
        out
    }
}

// -- Sync metadata ------------------------------------------------------------

/// Where a document stands relative to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncState {
    #[default]
    LocalOnly,
    Syncing,
    Synced,
    Conflict,
}

impl SyncState {
    /// `LocalOnly -> Syncing -> {Synced, Conflict}`, `Conflict -> Syncing`,
    /// and `Synced -> Syncing` for later rounds. A failed round returns to
    /// the state it started from.
    pub fn can_transition_to(&self, next: SyncState) -> bool {
        use SyncState::*;
        matches!(
            (self, next),
            (LocalOnly, Syncing)
                | (Synced, Syncing)
                | (Conflict, Syncing)
                | (Syncing, Synced)
                | (Syncing, Conflict)
                | (Syncing, LocalOnly)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncState::LocalOnly => "local-only",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
            SyncState::Conflict => "conflict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub state: SyncState,
    /// Remote version (modification time) last known to match local content.
    pub last_synced_at: Option<DateTime<Utc>>,
}

// -- Documents ----------------------------------------------------------------

/// A scanned document: the unit of persistence, export, and sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Owner (user id) the document is listed under.
    pub owner: String,
    title: String,
    pages: Vec<Page>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub sync: SyncMetadata,
    /// Assistant-derived summary of the recognized text.
    summary: Option<String>,
    next_page_id: u32,
}

impl Document {
    pub fn new(owner: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        let title = title.into();
        let title = if title.trim().is_empty() {
            default_title(now)
        } else {
            title.trim().to_owned()
        };
        Self {
            id: DocumentId::new(),
            owner: owner.into(),
            title,
            pages: Vec::new(),
            created_at: now,
            modified_at: now,
            sync: SyncMetadata::default(),
            summary: None,
            next_page_id: 1,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Re-attach a page bitmap loaded from storage. Does not count as an edit.
    pub fn attach_page_image(&mut self, id: PageId, image: RectifiedImage) -> Result<()> {
        let index = self.position_of(id)?;
        self.pages[index].attach_image(image);
        Ok(())
    }

    pub fn page(&self, id: PageId) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == id)
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Record a local edit.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.modified_at = if now > self.modified_at {
            now
        } else {
            self.modified_at + chrono::Duration::milliseconds(1)
        };
    }

    /// Whether local content changed since the last successful sync.
    pub fn has_unsynced_changes(&self) -> bool {
        match self.sync.last_synced_at {
            Some(synced) => self.modified_at > synced,
            None => true,
        }
    }

    pub fn rename(&mut self, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ScanwerkError::InvalidOperation(
                "document title cannot be empty".into(),
            ));
        }
        self.title = title.to_owned();
        self.touch();
        Ok(())
    }

    pub fn set_summary(&mut self, summary: Option<String>) {
        self.summary = summary;
        self.touch();
    }

    /// Add a page, appending unless `index` is given. Assigns and returns the
    /// page's id.
    pub fn add_page(&mut self, mut page: Page, index: Option<usize>) -> Result<PageId> {
        let index = index.unwrap_or(self.pages.len());
        if index > self.pages.len() {
            return Err(ScanwerkError::InvalidOperation(format!(
                "insertion index {index} is past the end ({} pages)",
                self.pages.len()
            )));
        }
        page.id = PageId(self.next_page_id);
        self.next_page_id += 1;
        let id = page.id;
        self.pages.insert(index, page);
        self.touch();
        Ok(id)
    }

    pub fn remove_page(&mut self, id: PageId) -> Result<Page> {
        let index = self.position_of(id)?;
        let page = self.pages.remove(index);
        self.touch();
        Ok(page)
    }

    /// Reorder pages. `order` must name every page exactly once.
    pub fn reorder_pages(&mut self, order: &[PageId]) -> Result<()> {
        if order.len() != self.pages.len() {
            return Err(ScanwerkError::InvalidOperation(format!(
                "new order lists {} pages but the document has {}",
                order.len(),
                self.pages.len()
            )));
        }
        let mut positions = Vec::with_capacity(order.len());
        for id in order {
            let index = self.position_of(*id).map_err(|_| {
                ScanwerkError::InvalidOperation(format!("page {id} is not in this document"))
            })?;
            if positions.contains(&index) {
                return Err(ScanwerkError::InvalidOperation(format!(
                    "page {id} is listed twice"
                )));
            }
            positions.push(index);
        }

        let mut slots: Vec<Option<Page>> = self.pages.drain(..).map(Some).collect();
        self.pages = positions
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect();
        self.touch();
        Ok(())
    }

    /// Explicit user retry of a failed page.
    pub fn retry_ocr(&mut self, id: PageId) -> Result<()> {
        self.update_page_status(id, Page::reset_for_retry)?
    }

    /// Revert pages an interrupted run left `Recognizing` back to `Pending`.
    /// Returns how many pages were reverted. Not counted as an edit.
    pub fn recover_interrupted_pages(&mut self) -> usize {
        self.pages
            .iter_mut()
            .map(Page::cancel_recognition)
            .filter(|reverted| *reverted)
            .count()
    }

    /// Run `f` on a page and record the edit.
    pub fn update_page<R>(&mut self, id: PageId, f: impl FnOnce(&mut Page) -> R) -> Result<R> {
        let result = self.update_page_status(id, f)?;
        self.touch();
        Ok(result)
    }

    /// Run `f` on a page without recording an edit. For OCR status moves
    /// that leave the page's image and text as they were.
    pub fn update_page_status<R>(
        &mut self,
        id: PageId,
        f: impl FnOnce(&mut Page) -> R,
    ) -> Result<R> {
        let index = self.position_of(id)?;
        Ok(f(&mut self.pages[index]))
    }

    fn position_of(&self, id: PageId) -> Result<usize> {
        self.pages
            .iter()
            .position(|p| p.id == id)
            .ok_or(ScanwerkError::PageNotFound(id))
    }

    /// Plain text of all pages, separated by a blank line. Pages without
    /// text are skipped.
    pub fn plain_text(&self) -> String {
        self.pages
            .iter()
            .map(Page::plain_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Approximate storage footprint (pixels plus text), used for quota checks.
    pub fn size_bytes(&self) -> u64 {
        self.pages
            .iter()
            .map(|p| {
                p.image.pixels.len() as u64
                    + p.blocks.iter().map(|b| b.text.len() as u64).sum::<u64>()
            })
            .sum()
    }

    /// SHA-256 over the user-visible content (title, page order, pixels, text).
    pub fn content_hash(&self) -> String {
        let mut parts: Vec<Vec<u8>> = vec![self.title.as_bytes().to_vec()];
        for page in &self.pages {
            parts.push(page.id.0.to_le_bytes().to_vec());
            parts.push(page.image.width.to_le_bytes().to_vec());
            parts.push(page.image.height.to_le_bytes().to_vec());
            parts.push(page.image.pixels.clone());
            for block in &page.blocks {
                parts.push(block.text.as_bytes().to_vec());
            }
        }
        hash_parts(parts.iter().map(Vec::as_slice))
    }
}

/// Default document name, `yyyyMMdd_HHmmss` of the creation time.
pub fn default_title(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}
