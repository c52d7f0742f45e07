// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DocumentWorkspace: the single entry point user actions go through.
//
// Every mutation of a document runs under that document's lock, against a
// fresh snapshot from the cache, and is written back before the lock is
// released. Recognition releases the lock while the engine runs and
// re-checks the page afterwards, so edits to other pages (or a rename) are
// never blocked by a slow OCR call. A recognition dropped while the lock is
// released puts its page back to `Pending`.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use scanwerk_core::config::AppConfig;
use scanwerk_core::error::{AssistantError, Result, ScanwerkError};
use scanwerk_core::model::{Document, OcrStatus, Page, RectifiedImage};
use scanwerk_core::types::{DocumentId, ExportConfig, PageId};
use scanwerk_document::{CropNormalizer, CropRegion, DocumentAssembler, ExportEncoder, OcrAdapter, RawImage};
use scanwerk_sync::{
    ConflictReport, DocumentEntry, LocalCache, MergeOutcome, Resolution, SyncCoordinator,
    SyncOutcome,
};

use crate::assistant::Assistant;
use crate::cancel::TaskTokens;
use crate::locks::DocumentLocks;
use crate::ocr::{OcrRunFailure, OcrRunner};
use crate::pool::CpuPool;

pub struct DocumentWorkspace {
    config: AppConfig,
    cache: Arc<dyn LocalCache>,
    locks: Arc<DocumentLocks>,
    tokens: Arc<TaskTokens>,
    pool: CpuPool,
    ocr: OcrRunner,
    assembler: DocumentAssembler,
    sync: Option<SyncCoordinator>,
    assistant: Option<Arc<dyn Assistant>>,
}

impl DocumentWorkspace {
    // -- Construction ---------------------------------------------------------

    /// Open a workspace over `cache`. Pages an earlier run left
    /// `Recognizing` are put back to `Pending`.
    #[instrument(skip_all, fields(owner = %config.owner, engine = ocr.engine_name()))]
    pub fn open(
        config: AppConfig,
        cache: Arc<dyn LocalCache>,
        ocr: Arc<dyn OcrAdapter>,
    ) -> Result<Self> {
        let workspace = Self {
            ocr: OcrRunner::new(ocr, config.ocr.clone()),
            assembler: DocumentAssembler::new(config.assembler.clone()),
            config,
            cache,
            locks: Arc::new(DocumentLocks::new()),
            tokens: Arc::new(TaskTokens::new()),
            pool: CpuPool::with_available_parallelism(),
            sync: None,
            assistant: None,
        };
        let recovered = workspace.recover_interrupted()?;
        if recovered > 0 {
            warn!(pages = recovered, "interrupted recognitions reset to pending");
        }
        info!(cpu_slots = workspace.pool.size(), "workspace opened");
        Ok(workspace)
    }

    pub fn with_sync(mut self, coordinator: SyncCoordinator) -> Self {
        self.sync = Some(coordinator);
        self
    }

    pub fn with_assistant(mut self, assistant: Arc<dyn Assistant>) -> Self {
        self.assistant = Some(assistant);
        self
    }

    pub fn with_cpu_pool(mut self, pool: CpuPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn recover_interrupted(&self) -> Result<usize> {
        let mut total = 0;
        for entry in self.cache.list_by_owner(&self.config.owner)? {
            let Some(mut doc) = self.cache.get(entry.id)? else {
                continue;
            };
            let reverted = doc.recover_interrupted_pages();
            if reverted > 0 {
                self.cache.upsert(&doc)?;
                debug!(document = %doc.id, pages = reverted, "recovered document");
                total += reverted;
            }
        }
        Ok(total)
    }

    // -- Reads ----------------------------------------------------------------

    /// Snapshot of a document.
    pub fn document(&self, id: DocumentId) -> Result<Document> {
        self.cache.get(id)?.ok_or(ScanwerkError::DocumentNotFound(id))
    }

    pub fn list(&self) -> Result<Vec<DocumentEntry>> {
        self.cache.list_by_owner(&self.config.owner)
    }

    pub fn search(&self, query: &str) -> Result<Vec<DocumentEntry>> {
        self.cache.search(&self.config.owner, query)
    }

    // -- Document edits -------------------------------------------------------

    /// Load, edit, and store a document under its lock.
    async fn mutate<R, F>(&self, id: DocumentId, edit: F) -> Result<R>
    where
        F: FnOnce(&mut Document) -> Result<R> + Send,
        R: Send,
    {
        let _guard = self.locks.lock(id).await;
        let mut doc = self.document(id)?;
        let out = edit(&mut doc)?;
        self.cache.upsert(&doc)?;
        Ok(out)
    }

    #[instrument(skip(self))]
    pub async fn create_document(&self, title: &str) -> Result<Document> {
        let doc = Document::new(self.config.owner.clone(), title);
        self.cache.upsert(&doc)?;
        info!(document = %doc.id, title = doc.title(), "document created");
        Ok(doc)
    }

    pub async fn rename(&self, id: DocumentId, title: &str) -> Result<()> {
        self.mutate(id, |doc| doc.rename(title)).await
    }

    pub async fn reorder_pages(&self, id: DocumentId, order: &[PageId]) -> Result<()> {
        self.mutate(id, |doc| doc.reorder_pages(order)).await
    }

    /// Remove a page, cancelling its recognition if one is running.
    pub async fn remove_page(&self, id: DocumentId, page: PageId) -> Result<()> {
        if self.tokens.cancel_page(id, page) {
            debug!(document = %id, %page, "cancelled recognition of removed page");
        }
        self.mutate(id, |doc| doc.remove_page(page).map(drop)).await
    }

    /// Delete a document locally and, if it was ever synced, remotely.
    /// Running tasks on it are cancelled first.
    #[instrument(skip(self))]
    pub async fn delete_document(&self, id: DocumentId) -> Result<()> {
        self.tokens.cancel_document(id);
        {
            let _guard = self.locks.lock(id).await;
            let doc = self.document(id)?;
            if let (Some(sync), Some(_)) = (&self.sync, doc.sync.last_synced_at) {
                sync.delete_remote(id).await?;
            }
            self.cache.delete(id)?;
        }
        self.tokens.forget_document(id);
        self.locks.forget(id);
        info!("document deleted");
        Ok(())
    }

    // -- Capture and recognition ----------------------------------------------

    /// Crop and rectify `raw`, then add it as a `Pending` page.
    #[instrument(skip(self, raw, region))]
    pub async fn capture_page(
        &self,
        id: DocumentId,
        raw: RawImage,
        region: CropRegion,
        index: Option<usize>,
    ) -> Result<PageId> {
        let rectified = self
            .pool
            .run(move || CropNormalizer::normalize(&raw, &region))
            .await??;
        let page = self
            .mutate(id, |doc| doc.add_page(Page::new(rectified), index))
            .await?;
        info!(%page, "page captured");
        Ok(page)
    }

    /// Capture a page and recognize it straight away.
    pub async fn scan_page(
        &self,
        id: DocumentId,
        raw: RawImage,
        region: CropRegion,
        index: Option<usize>,
    ) -> Result<(PageId, OcrStatus)> {
        let page = self.capture_page(id, raw, region, index).await?;
        let status = self.recognize_page(id, page).await?;
        Ok((page, status))
    }

    /// Run OCR on a `Pending` page.
    ///
    /// Returns the page's final status; an engine failure is recorded as
    /// `Failed` rather than returned as an error. Cancellation reverts the
    /// page to `Pending` and returns `ScanwerkError::Cancelled`.
    #[instrument(skip(self))]
    pub async fn recognize_page(&self, id: DocumentId, page: PageId) -> Result<OcrStatus> {
        let (image, token, claim) = {
            let _guard = self.locks.lock(id).await;
            let mut doc = self.document(id)?;
            let image = doc.update_page_status(page, |p| -> Result<RectifiedImage> {
                p.begin_recognition()?;
                Ok(p.image().clone())
            })??;
            self.cache.upsert(&doc)?;
            let claim = RecognitionClaim {
                cache: Arc::clone(&self.cache),
                locks: Arc::clone(&self.locks),
                tokens: Arc::clone(&self.tokens),
                document: id,
                page,
                armed: true,
            };
            (image, self.tokens.page_task(id, page), claim)
        };

        let outcome = self.ocr.recognize(&image, &token).await;
        self.tokens.finish_page_task(id, page);

        let _guard = self.locks.lock(id).await;
        // Nothing below awaits, so the page is settled before the lock drops.
        claim.settle();
        let Some(mut doc) = self.cache.get(id)? else {
            debug!("document deleted during recognition");
            return Err(ScanwerkError::Cancelled);
        };
        let Some(current) = doc.page(page) else {
            debug!("page removed during recognition");
            return Err(match outcome {
                Err(OcrRunFailure::Cancelled) => ScanwerkError::Cancelled,
                _ => ScanwerkError::PageNotFound(page),
            });
        };
        if *current.ocr_status() != OcrStatus::Recognizing {
            warn!(status = current.ocr_status().label(), "page changed during recognition, result discarded");
            return Ok(current.ocr_status().clone());
        }

        match outcome {
            Ok(result) => {
                let assembled = self.assembler.assemble(result, Some(current.clone()));
                doc.update_page(page, |p| *p = assembled)?;
            }
            Err(OcrRunFailure::Cancelled) => {
                doc.update_page_status(page, Page::cancel_recognition)?;
                self.cache.upsert(&doc)?;
                info!("recognition cancelled, page pending again");
                return Err(ScanwerkError::Cancelled);
            }
            Err(OcrRunFailure::Failed { attempts, error }) => {
                warn!(attempts, %error, "recognition failed");
                doc.update_page_status(page, |p| p.fail_recognition(error.to_string()))??;
            }
        }
        self.cache.upsert(&doc)?;

        let status = doc
            .page(page)
            .map(|p| p.ocr_status().clone())
            .ok_or(ScanwerkError::PageNotFound(page))?;
        info!(status = status.label(), "recognition applied");
        Ok(status)
    }

    /// Stop a running recognition. Returns whether one was running.
    pub fn cancel_recognition(&self, id: DocumentId, page: PageId) -> bool {
        self.tokens.cancel_page(id, page)
    }

    /// User retry of a `Failed` page.
    pub async fn retry_ocr(&self, id: DocumentId, page: PageId) -> Result<OcrStatus> {
        self.mutate(id, |doc| doc.retry_ocr(page)).await?;
        self.recognize_page(id, page).await
    }

    // -- Export ---------------------------------------------------------------

    /// Encode a snapshot of the document. Never mutates state.
    #[instrument(skip(self, config))]
    pub async fn export(&self, id: DocumentId, config: ExportConfig) -> Result<Vec<u8>> {
        let doc = self.document(id)?;
        let bytes = self
            .pool
            .run(move || ExportEncoder::encode(&doc, &config))
            .await??;
        info!(bytes = bytes.len(), "document exported");
        Ok(bytes)
    }

    /// Export into a file. Returns the number of bytes written.
    ///
    /// The output is encoded in full before anything touches `path`, then
    /// moved into place, so a failed export leaves an existing file intact.
    #[instrument(skip(self, config), fields(path = %path.display()))]
    pub async fn export_to_file(
        &self,
        id: DocumentId,
        config: ExportConfig,
        path: PathBuf,
    ) -> Result<usize> {
        let bytes = self.export(id, config).await?;
        let written = bytes.len();
        self.pool
            .run(move || -> std::io::Result<()> {
                let dir = match path.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                    _ => PathBuf::from("."),
                };
                let mut staged = tempfile::NamedTempFile::new_in(dir)?;
                staged.write_all(&bytes)?;
                staged.as_file().sync_all()?;
                staged.persist(&path).map_err(|e| e.error)?;
                Ok(())
            })
            .await??;
        Ok(written)
    }

    // -- Sync -----------------------------------------------------------------

    fn coordinator(&self, id: DocumentId) -> Result<SyncCoordinator> {
        let sync = self.sync.as_ref().ok_or_else(|| {
            ScanwerkError::InvalidOperation("no remote store is configured".into())
        })?;
        Ok(sync.with_cancellation(self.tokens.document_task(id)))
    }

    /// One sync round for a document. The result, conflicts included, is
    /// stored in the cache.
    pub async fn sync(&self, id: DocumentId) -> Result<SyncOutcome> {
        let coordinator = self.coordinator(id)?;
        let _guard = self.locks.lock(id).await;
        let mut doc = self.document(id)?;
        let result = coordinator.sync_up(&mut doc).await;
        self.cache.upsert(&doc)?;
        Ok(result?)
    }

    pub async fn pull(&self, id: DocumentId) -> Result<MergeOutcome> {
        let coordinator = self.coordinator(id)?;
        let _guard = self.locks.lock(id).await;
        let mut doc = self.document(id)?;
        let result = coordinator.pull(&mut doc).await;
        self.cache.upsert(&doc)?;
        Ok(result?)
    }

    pub async fn resolve_conflict(
        &self,
        id: DocumentId,
        report: ConflictReport,
        resolution: Resolution,
    ) -> Result<SyncOutcome> {
        let coordinator = self.coordinator(id)?;
        let _guard = self.locks.lock(id).await;
        let mut doc = self.document(id)?;
        let result = coordinator.resolve(&mut doc, report, resolution).await;
        self.cache.upsert(&doc)?;
        Ok(result?)
    }

    // -- Assistant ------------------------------------------------------------

    fn assistant(&self) -> Result<&Arc<dyn Assistant>> {
        self.assistant.as_ref().ok_or_else(|| {
            AssistantError::Unavailable("no language assistant is configured".into()).into()
        })
    }

    async fn ask<F, Fut>(&self, id: DocumentId, call: F) -> Result<String>
    where
        F: FnOnce(String) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<String, AssistantError>>,
    {
        let text = self.document(id)?.plain_text();
        if text.trim().is_empty() {
            return Err(AssistantError::EmptyInput.into());
        }
        let token = self.tokens.document_task(id);
        tokio::select! {
            _ = token.cancelled() => Err(ScanwerkError::Cancelled),
            reply = call(text) => Ok(reply?),
        }
    }

    /// Summarize the recognized text and store the summary on the document.
    #[instrument(skip(self))]
    pub async fn summarize(&self, id: DocumentId) -> Result<String> {
        let assistant = Arc::clone(self.assistant()?);
        let summary = self
            .ask(id, |text| async move { assistant.summarize(&text).await })
            .await?;
        let stored = summary.clone();
        self.mutate(id, move |doc| {
            doc.set_summary(Some(stored));
            Ok(())
        })
        .await?;
        info!(summary_len = summary.len(), "summary stored");
        Ok(summary)
    }

    /// Translate the recognized text. The document is not changed.
    #[instrument(skip(self))]
    pub async fn translate(&self, id: DocumentId, target_language: &str) -> Result<String> {
        let assistant = Arc::clone(self.assistant()?);
        let target = target_language.to_owned();
        self.ask(id, |text| async move { assistant.translate(&text, &target).await })
            .await
    }
}

/// A page moved to `Recognizing` whose result has not been applied yet.
///
/// Dropped unsettled (the caller's future was dropped mid-recognition), it
/// unregisters the page task and reverts the page to `Pending` on the
/// runtime.
struct RecognitionClaim {
    cache: Arc<dyn LocalCache>,
    locks: Arc<DocumentLocks>,
    tokens: Arc<TaskTokens>,
    document: DocumentId,
    page: PageId,
    armed: bool,
}

impl RecognitionClaim {
    fn settle(mut self) {
        self.armed = false;
    }
}

impl Drop for RecognitionClaim {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let (id, page) = (self.document, self.page);
        self.tokens.finish_page_task(id, page);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(document = %id, %page, "recognition dropped outside a runtime, page recovered on next open");
            return;
        };
        let cache = Arc::clone(&self.cache);
        let locks = Arc::clone(&self.locks);
        runtime.spawn(async move {
            let _guard = locks.lock(id).await;
            if let Err(error) = release_page(cache.as_ref(), id, page) {
                warn!(document = %id, %page, %error, "could not release abandoned page");
            }
        });
    }
}

/// Revert an abandoned `Recognizing` page to `Pending`.
fn release_page(cache: &dyn LocalCache, id: DocumentId, page: PageId) -> Result<()> {
    let Some(mut doc) = cache.get(id)? else {
        return Ok(());
    };
    if let Ok(true) = doc.update_page_status(page, Page::cancel_recognition) {
        cache.upsert(&doc)?;
        info!(document = %id, %page, "abandoned recognition, page pending again");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use image::{Rgb, RgbImage};
    use tokio::sync::Notify;

    use scanwerk_core::error::{EncodeError, OcrError};
    use scanwerk_core::geometry::Polygon;
    use scanwerk_core::model::SyncState;
    use scanwerk_core::retry::RetryConfig;
    use scanwerk_core::types::{ExportFormat, Rotation};
    use scanwerk_document::{ImageSource, RecognitionResult, StaticOcr, TextFragment};
    use scanwerk_sync::{InMemoryRemote, SqliteCache};

    use super::*;
    use crate::assistant::CannedAssistant;

    fn fragment(text: &str, x: f32, y: f32) -> TextFragment {
        TextFragment {
            polygon: Polygon::from_rect(x, y, 40.0, 12.0),
            text: text.into(),
            confidence: 0.95,
        }
    }

    fn hello() -> RecognitionResult {
        RecognitionResult {
            fragments: vec![
                fragment("Goodbye", 0.0, 100.0),
                fragment("World", 50.0, 0.0),
                fragment("Hello", 0.0, 0.0),
            ],
            language: Some("en".into()),
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.owner = "tester".into();
        config.ocr.retry = RetryConfig::immediate(2);
        config.sync.retry = RetryConfig::immediate(2);
        config
    }

    fn photo() -> RawImage {
        ImageSource::from_rgb(
            RgbImage::from_pixel(120, 160, Rgb([250, 250, 250])),
            Rotation::Deg0,
            Utc::now(),
        )
    }

    fn frame() -> CropRegion {
        CropRegion::full_frame(120, 160)
    }

    fn workspace_with(ocr: Arc<dyn OcrAdapter>) -> DocumentWorkspace {
        let cache = Arc::new(SqliteCache::open_in_memory().expect("cache"));
        DocumentWorkspace::open(config(), cache, ocr)
            .expect("workspace")
            .with_cpu_pool(CpuPool::new(2))
    }

    /// Signals when recognition starts, then waits to be released.
    struct GatedOcr {
        started: Notify,
        release: Notify,
    }

    impl GatedOcr {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                started: Notify::new(),
                release: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl OcrAdapter for GatedOcr {
        async fn recognize(
            &self,
            _image: &RectifiedImage,
        ) -> std::result::Result<RecognitionResult, OcrError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(hello())
        }

        fn engine_name(&self) -> &str {
            "gated"
        }
    }

    struct Unreadable {
        calls: AtomicU32,
    }

    #[async_trait]
    impl OcrAdapter for Unreadable {
        async fn recognize(
            &self,
            _image: &RectifiedImage,
        ) -> std::result::Result<RecognitionResult, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(OcrError::Unreadable("blurry".into()))
        }

        fn engine_name(&self) -> &str {
            "unreadable"
        }
    }

    #[tokio::test]
    async fn scan_assembles_reading_order_and_exports() {
        let ws = workspace_with(Arc::new(StaticOcr::new(hello())));
        let doc = ws.create_document("Letter").await.expect("create");

        let (page, status) = ws
            .scan_page(doc.id, photo(), frame(), None)
            .await
            .expect("scan");
        assert_eq!(status, OcrStatus::Recognized);

        let stored = ws.document(doc.id).expect("load");
        assert_eq!(stored.page(page).map(Page::language), Some("en"));
        assert_eq!(stored.plain_text(), "Hello World\nGoodbye");
        assert_eq!(stored.pages()[0].image().width(), 120);

        let text = ws
            .export(
                doc.id,
                ExportConfig {
                    format: ExportFormat::PlainText,
                    ..ExportConfig::default()
                },
            )
            .await
            .expect("export");
        assert_eq!(text, b"Hello World\nGoodbye\n");

        let pdf_a = ws.export(doc.id, ExportConfig::default()).await.expect("pdf");
        let pdf_b = ws.export(doc.id, ExportConfig::default()).await.expect("pdf");
        assert_eq!(pdf_a, pdf_b);
    }

    #[tokio::test]
    async fn export_to_file_writes_bytes() {
        let ws = workspace_with(Arc::new(StaticOcr::new(hello())));
        let doc = ws.create_document("On disk").await.expect("create");
        ws.scan_page(doc.id, photo(), frame(), None).await.expect("scan");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.pdf");
        let written = ws
            .export_to_file(doc.id, ExportConfig::default(), path.clone())
            .await
            .expect("export");
        assert_eq!(std::fs::read(&path).expect("read").len(), written);
    }

    #[tokio::test]
    async fn failed_export_keeps_the_existing_file() {
        let ws = workspace_with(Arc::new(StaticOcr::default()));
        let doc = ws.create_document("Nothing").await.expect("create");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"previous export").expect("seed");

        assert!(matches!(
            ws.export_to_file(doc.id, ExportConfig::default(), path.clone()).await,
            Err(ScanwerkError::Encode(EncodeError::EmptyDocument))
        ));
        assert_eq!(std::fs::read(&path).expect("read"), b"previous export");
        assert_eq!(std::fs::read_dir(dir.path()).expect("list").count(), 1);
    }

    #[tokio::test]
    async fn empty_document_export_fails() {
        let ws = workspace_with(Arc::new(StaticOcr::default()));
        let doc = ws.create_document("Nothing").await.expect("create");
        assert!(matches!(
            ws.export(doc.id, ExportConfig::default()).await,
            Err(ScanwerkError::Encode(EncodeError::EmptyDocument))
        ));
    }

    #[tokio::test]
    async fn opening_recovers_interrupted_pages() {
        let cache = Arc::new(SqliteCache::open_in_memory().expect("cache"));
        let mut doc = Document::new("tester", "Crashed");
        let page = doc
            .add_page(Page::new(RectifiedImage::default()), None)
            .expect("page");
        doc.update_page_status(page, Page::begin_recognition)
            .expect("page")
            .expect("begin");
        cache.upsert(&doc).expect("upsert");

        let ws = DocumentWorkspace::open(config(), cache, Arc::new(StaticOcr::new(hello())))
            .expect("workspace");
        let recovered = ws.document(doc.id).expect("load");
        assert_eq!(recovered.page(page).map(Page::ocr_status), Some(&OcrStatus::Pending));

        assert_eq!(
            ws.recognize_page(doc.id, page).await.expect("recognize"),
            OcrStatus::Recognized
        );
    }

    #[tokio::test]
    async fn cancelling_ocr_leaves_page_pending_with_image() {
        let gate = GatedOcr::new();
        let ws = Arc::new(workspace_with(gate.clone()));
        let doc = ws.create_document("Slow").await.expect("create");
        let page = ws
            .capture_page(doc.id, photo(), frame(), None)
            .await
            .expect("capture");

        let task = tokio::spawn({
            let ws = Arc::clone(&ws);
            async move { ws.recognize_page(doc.id, page).await }
        });
        gate.started.notified().await;

        // The document lock is free while the engine runs.
        ws.rename(doc.id, "Renamed meanwhile").await.expect("rename");

        assert!(ws.cancel_recognition(doc.id, page));
        let result = task.await.expect("join");
        assert!(matches!(result, Err(ScanwerkError::Cancelled)));

        let stored = ws.document(doc.id).expect("load");
        assert_eq!(stored.title(), "Renamed meanwhile");
        let stored_page = stored.page(page).expect("page");
        assert_eq!(*stored_page.ocr_status(), OcrStatus::Pending);
        assert_eq!(stored_page.image().width(), 120);
        assert_eq!(stored_page.image().height(), 160);
    }

    #[tokio::test]
    async fn cancelled_recognition_is_not_an_edit() {
        let gate = GatedOcr::new();
        let ws = Arc::new(workspace_with(gate.clone()));
        let doc = ws.create_document("Untouched").await.expect("create");
        let page = ws
            .capture_page(doc.id, photo(), frame(), None)
            .await
            .expect("capture");
        let before = ws.document(doc.id).expect("load").modified_at;

        let task = tokio::spawn({
            let ws = Arc::clone(&ws);
            async move { ws.recognize_page(doc.id, page).await }
        });
        gate.started.notified().await;
        assert!(ws.cancel_recognition(doc.id, page));
        assert!(matches!(task.await.expect("join"), Err(ScanwerkError::Cancelled)));

        assert_eq!(ws.document(doc.id).expect("load").modified_at, before);
    }

    #[tokio::test]
    async fn aborted_recognition_releases_the_page() {
        let gate = GatedOcr::new();
        let ws = Arc::new(workspace_with(gate.clone()));
        let doc = ws.create_document("Abandoned").await.expect("create");
        let page = ws
            .capture_page(doc.id, photo(), frame(), None)
            .await
            .expect("capture");

        let task = tokio::spawn({
            let ws = Arc::clone(&ws);
            async move { ws.recognize_page(doc.id, page).await }
        });
        gate.started.notified().await;
        task.abort();
        assert!(task.await.expect_err("aborted").is_cancelled());

        let status_of = || {
            ws.document(doc.id)
                .expect("load")
                .page(page)
                .map(|p| p.ocr_status().clone())
        };
        for _ in 0..200 {
            if status_of() == Some(OcrStatus::Pending) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(status_of(), Some(OcrStatus::Pending));
        assert!(!ws.tokens.is_running(doc.id, page));

        gate.release.notify_one();
        assert_eq!(
            ws.recognize_page(doc.id, page).await.expect("recognize again"),
            OcrStatus::Recognized
        );
    }

    #[tokio::test]
    async fn removing_a_page_during_ocr_discards_the_result() {
        let gate = GatedOcr::new();
        let ws = Arc::new(workspace_with(gate.clone()));
        let doc = ws.create_document("Removed").await.expect("create");
        let page = ws
            .capture_page(doc.id, photo(), frame(), None)
            .await
            .expect("capture");

        let task = tokio::spawn({
            let ws = Arc::clone(&ws);
            async move { ws.recognize_page(doc.id, page).await }
        });
        gate.started.notified().await;
        ws.remove_page(doc.id, page).await.expect("remove");
        gate.release.notify_one();

        assert!(matches!(
            task.await.expect("join"),
            Err(ScanwerkError::Cancelled)
        ));
        assert!(ws.document(doc.id).expect("load").pages().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_document_cancels_its_tasks() {
        let gate = GatedOcr::new();
        let ws = Arc::new(workspace_with(gate.clone()));
        let doc = ws.create_document("Doomed").await.expect("create");
        let page = ws
            .capture_page(doc.id, photo(), frame(), None)
            .await
            .expect("capture");

        let task = tokio::spawn({
            let ws = Arc::clone(&ws);
            async move { ws.recognize_page(doc.id, page).await }
        });
        gate.started.notified().await;
        ws.delete_document(doc.id).await.expect("delete");

        assert!(matches!(
            task.await.expect("join"),
            Err(ScanwerkError::Cancelled)
        ));
        assert!(matches!(
            ws.document(doc.id),
            Err(ScanwerkError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleted_documents_leave_no_tokens_behind() {
        let remote = Arc::new(InMemoryRemote::new());
        let ws = workspace_with(Arc::new(StaticOcr::new(hello())))
            .with_sync(SyncCoordinator::new(remote, &config().sync));
        let doc = ws.create_document("Gone").await.expect("create");
        ws.delete_document(doc.id).await.expect("delete");

        assert!(matches!(
            ws.sync(doc.id).await,
            Err(ScanwerkError::DocumentNotFound(_))
        ));
        assert_eq!(ws.tokens.tracked_documents(), 0);
    }

    #[tokio::test]
    async fn concurrent_pages_are_all_applied() {
        let ws = workspace_with(Arc::new(StaticOcr::new(hello())));
        let doc = ws.create_document("Parallel").await.expect("create");
        let first = ws.capture_page(doc.id, photo(), frame(), None).await.expect("capture");
        let second = ws.capture_page(doc.id, photo(), frame(), None).await.expect("capture");

        let (a, b) = tokio::join!(
            ws.recognize_page(doc.id, first),
            ws.recognize_page(doc.id, second)
        );
        assert_eq!(a.expect("first"), OcrStatus::Recognized);
        assert_eq!(b.expect("second"), OcrStatus::Recognized);
        let stored = ws.document(doc.id).expect("load");
        assert!(stored.pages().iter().all(|p| *p.ocr_status() == OcrStatus::Recognized));
    }

    #[tokio::test]
    async fn engine_failure_is_recorded_and_retryable() {
        let engine = Arc::new(Unreadable {
            calls: AtomicU32::new(0),
        });
        let ws = workspace_with(engine.clone());
        let doc = ws.create_document("Blurry").await.expect("create");

        let (page, status) = ws
            .scan_page(doc.id, photo(), frame(), None)
            .await
            .expect("scan");
        assert!(matches!(status, OcrStatus::Failed { .. }));
        // Unreadable needs the user; it is not retried automatically.
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

        let again = ws.retry_ocr(doc.id, page).await.expect("retry");
        assert!(matches!(again, OcrStatus::Failed { .. }));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
        assert_eq!(ws.document(doc.id).expect("load").pages().len(), 1);
    }

    #[tokio::test]
    async fn recognizing_twice_is_rejected() {
        let ws = workspace_with(Arc::new(StaticOcr::new(hello())));
        let doc = ws.create_document("Once").await.expect("create");
        let (page, _) = ws.scan_page(doc.id, photo(), frame(), None).await.expect("scan");
        assert!(matches!(
            ws.recognize_page(doc.id, page).await,
            Err(ScanwerkError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn sync_round_is_persisted() {
        let remote = Arc::new(InMemoryRemote::new());
        let ws = workspace_with(Arc::new(StaticOcr::new(hello())))
            .with_sync(SyncCoordinator::new(remote.clone(), &config().sync));
        let doc = ws.create_document("Synced").await.expect("create");
        ws.scan_page(doc.id, photo(), frame(), None).await.expect("scan");

        assert!(matches!(
            ws.sync(doc.id).await.expect("sync"),
            SyncOutcome::Pushed { .. }
        ));
        let entry = ws.list().expect("list").into_iter().next().expect("entry");
        assert_eq!(entry.sync_state, SyncState::Synced);
        assert!(!entry.unsynced);
        assert!(remote.stored(doc.id).is_some());

        ws.delete_document(doc.id).await.expect("delete");
        assert!(remote.stored(doc.id).is_none());
    }

    #[tokio::test]
    async fn sync_without_remote_is_invalid() {
        let ws = workspace_with(Arc::new(StaticOcr::new(hello())));
        let doc = ws.create_document("Local").await.expect("create");
        assert!(matches!(
            ws.sync(doc.id).await,
            Err(ScanwerkError::InvalidOperation(_))
        ));
        assert!(matches!(
            ws.pull(doc.id).await,
            Err(ScanwerkError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn summary_is_stored() {
        let ws = workspace_with(Arc::new(StaticOcr::new(hello())))
            .with_assistant(Arc::new(CannedAssistant::replying("A greeting.")));
        let doc = ws.create_document("Greeting").await.expect("create");
        ws.scan_page(doc.id, photo(), frame(), None).await.expect("scan");

        assert_eq!(ws.summarize(doc.id).await.expect("summary"), "A greeting.");
        assert_eq!(
            ws.document(doc.id).expect("load").summary(),
            Some("A greeting.")
        );
        assert_eq!(
            ws.translate(doc.id, "French").await.expect("translate"),
            "A greeting."
        );
    }

    #[tokio::test]
    async fn assistant_errors_surface() {
        let ws = workspace_with(Arc::new(StaticOcr::new(hello())))
            .with_assistant(Arc::new(CannedAssistant::failing(AssistantError::RateLimited {
                retry_after_secs: Some(5),
            })));
        let empty = ws.create_document("Empty").await.expect("create");
        assert!(matches!(
            ws.summarize(empty.id).await,
            Err(ScanwerkError::Assistant(AssistantError::EmptyInput))
        ));

        let doc = ws.create_document("Busy").await.expect("create");
        ws.scan_page(doc.id, photo(), frame(), None).await.expect("scan");
        assert!(matches!(
            ws.summarize(doc.id).await,
            Err(ScanwerkError::Assistant(AssistantError::RateLimited { .. }))
        ));
        assert_eq!(ws.document(doc.id).expect("load").summary(), None);
    }
}
