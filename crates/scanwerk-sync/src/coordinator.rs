// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sync coordinator: reconciles a local document with its remote copy.
//
// State machine:
//   LocalOnly -> Syncing -> {Synced, Conflict}
//   Synced    -> Syncing -> {Synced, Conflict}
//   Conflict  -> Syncing (after `resolve`) -> {Synced, Conflict}
//
// A conflict exists when the remote copy was modified strictly after the
// last synced version while the local copy also has unsynced edits. Both
// versions are handed back in a `ConflictReport`; nothing is auto-merged.
//
// Remote calls go through the shared retry engine: transient failures back
// off and retry, then surface as `SyncError::Unavailable`. Authorization
// and quota failures surface on the first attempt.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use scanwerk_core::config::SyncConfig;
use scanwerk_core::error::{RemoteError, SyncError};
use scanwerk_core::model::{Document, SyncMetadata, SyncState};
use scanwerk_core::retry::{RetryConfig, RetryFailure, retry_with_backoff};
use scanwerk_core::types::{DocumentId, PageId};

use crate::quota::StorageQuota;
use crate::remote::RemoteStore;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of a `sync_up` round.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Local content was uploaded; `version` is the remote version now held.
    Pushed { version: DateTime<Utc> },
    /// Nothing to do on either side.
    UpToDate,
    /// Local was clean and the remote newer; local adopted the remote copy.
    FastForwarded,
    Conflict(ConflictReport),
}

/// Result of applying a remote copy locally.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    AlreadyCurrent,
    FastForwarded,
    Conflict(ConflictReport),
}

/// Both sides of a conflict, for the user to choose from.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictReport {
    pub document_id: DocumentId,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub local: Document,
    pub remote: Document,
}

/// Where a page of a merged document comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageSource {
    Local(PageId),
    Remote(PageId),
}

impl std::fmt::Display for PageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageSource::Local(id) => write!(f, "local page {id}"),
            PageSource::Remote(id) => write!(f, "remote page {id}"),
        }
    }
}

/// The user's decision for a conflicted document.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    KeepLocal,
    KeepRemote,
    /// Build the page list from both versions, in the given order. Local
    /// pages keep their ids; remote pages get fresh ones. The local title
    /// is kept.
    MergePages(Vec<PageSource>),
}

enum Divergence {
    InSync,
    LocalAhead,
    RemoteAhead,
    Diverged,
}

fn divergence(local: &Document, remote: &Document) -> Divergence {
    let remote_ahead = local
        .sync
        .last_synced_at
        .is_none_or(|synced| remote.modified_at > synced);
    match (local.has_unsynced_changes(), remote_ahead) {
        (false, false) => Divergence::InSync,
        (true, false) => Divergence::LocalAhead,
        (false, true) => Divergence::RemoteAhead,
        (true, true) => Divergence::Diverged,
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SyncCoordinator {
    remote: Arc<dyn RemoteStore>,
    retry: RetryConfig,
    quota: StorageQuota,
    cancel: CancellationToken,
}

impl SyncCoordinator {
    pub fn new(remote: Arc<dyn RemoteStore>, config: &SyncConfig) -> Self {
        Self {
            remote,
            retry: config.retry.clone(),
            quota: StorageQuota::new(config.quota_bytes),
            cancel: CancellationToken::new(),
        }
    }

    /// A coordinator whose retries stop when `token` fires.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    // -- Operations -----------------------------------------------------------

    /// Reconcile `doc` with the remote: push local edits, adopt remote
    /// edits, or report a conflict.
    #[instrument(skip_all, fields(document = %doc.id))]
    pub async fn sync_up(&self, doc: &mut Document) -> Result<SyncOutcome, SyncError> {
        if doc.sync.state == SyncState::Conflict {
            return Err(SyncError::UnresolvedConflict);
        }
        self.round(doc).await
    }

    /// Apply an already-fetched remote copy to `doc`. Never uploads.
    #[instrument(skip_all, fields(document = %doc.id))]
    pub fn sync_down(
        &self,
        doc: &mut Document,
        remote: Option<Document>,
    ) -> Result<MergeOutcome, SyncError> {
        if doc.sync.state == SyncState::Conflict {
            return Err(SyncError::UnresolvedConflict);
        }
        let Some(remote) = remote else {
            debug!("no remote copy");
            return Ok(MergeOutcome::AlreadyCurrent);
        };
        if remote.id != doc.id {
            return Err(SyncError::Rejected(format!(
                "remote copy {} does not belong to document {}",
                remote.id, doc.id
            )));
        }

        match divergence(doc, &remote) {
            Divergence::InSync | Divergence::LocalAhead => Ok(MergeOutcome::AlreadyCurrent),
            Divergence::RemoteAhead => {
                adopt(doc, remote);
                Ok(MergeOutcome::FastForwarded)
            }
            Divergence::Diverged if doc.content_hash() == remote.content_hash() => {
                let version = doc.modified_at.max(remote.modified_at);
                mark_synced(doc, version);
                Ok(MergeOutcome::AlreadyCurrent)
            }
            Divergence::Diverged => Ok(MergeOutcome::Conflict(enter_conflict(doc, remote))),
        }
    }

    /// Fetch the remote copy and apply it with `sync_down`.
    #[instrument(skip_all, fields(document = %doc.id))]
    pub async fn pull(&self, doc: &mut Document) -> Result<MergeOutcome, SyncError> {
        if doc.sync.state == SyncState::Conflict {
            return Err(SyncError::UnresolvedConflict);
        }
        let remote = self.fetch(doc.id).await?;
        self.sync_down(doc, remote)
    }

    /// Apply the user's decision to a conflicted document, then sync again.
    /// The new round can itself end in a conflict if the remote moved on in
    /// the meantime.
    #[instrument(skip_all, fields(document = %doc.id))]
    pub async fn resolve(
        &self,
        doc: &mut Document,
        report: ConflictReport,
        resolution: Resolution,
    ) -> Result<SyncOutcome, SyncError> {
        if doc.sync.state != SyncState::Conflict {
            return Err(SyncError::InvalidResolution(
                "document is not in conflict".into(),
            ));
        }
        if report.document_id != doc.id {
            return Err(SyncError::InvalidResolution(format!(
                "conflict report is for document {}",
                report.document_id
            )));
        }

        let remote_version = report.remote.modified_at;
        match resolution {
            Resolution::KeepLocal => {
                doc.sync.last_synced_at = Some(remote_version);
                bump_past(doc, remote_version);
                info!("conflict resolved: keep local");
            }
            Resolution::KeepRemote => {
                let mut adopted = report.remote;
                adopted.sync = SyncMetadata {
                    state: SyncState::Conflict,
                    last_synced_at: Some(remote_version),
                };
                *doc = adopted;
                info!("conflict resolved: keep remote");
            }
            Resolution::MergePages(sources) => {
                let mut merged = merge_pages(doc, &report.remote, &sources)?;
                merged.sync.last_synced_at = Some(remote_version);
                bump_past(&mut merged, remote_version);
                *doc = merged;
                info!(pages = doc.pages().len(), "conflict resolved: merged pages");
            }
        }
        self.round(doc).await
    }

    /// Remove the remote copy of a document.
    #[instrument(skip(self))]
    pub async fn delete_remote(&self, id: DocumentId) -> Result<(), SyncError> {
        let remote = &self.remote;
        self.with_retry("delete", move |_| remote.delete(id)).await
    }

    // -- Rounds ---------------------------------------------------------------

    async fn round(&self, doc: &mut Document) -> Result<SyncOutcome, SyncError> {
        let previous = doc.sync.state;
        transition(doc, SyncState::Syncing);

        let result = self.exchange(doc).await;
        if let Err(err) = &result {
            // A resolved conflict must not fall back into Conflict.
            let fallback = match previous {
                SyncState::Conflict => SyncState::LocalOnly,
                other => other,
            };
            warn!(error = %err, state = fallback.label(), "sync round failed");
            transition(doc, fallback);
        }
        result
    }

    async fn exchange(&self, doc: &mut Document) -> Result<SyncOutcome, SyncError> {
        let Some(remote) = self.fetch(doc.id).await? else {
            return self.push(doc, 0).await;
        };

        match divergence(doc, &remote) {
            Divergence::InSync => {
                transition(doc, SyncState::Synced);
                debug!("already in sync");
                Ok(SyncOutcome::UpToDate)
            }
            Divergence::LocalAhead => self.push(doc, remote.size_bytes()).await,
            Divergence::RemoteAhead => {
                adopt(doc, remote);
                Ok(SyncOutcome::FastForwarded)
            }
            Divergence::Diverged if doc.content_hash() == remote.content_hash() => {
                let version = doc.modified_at.max(remote.modified_at);
                mark_synced(doc, version);
                Ok(SyncOutcome::UpToDate)
            }
            Divergence::Diverged => Ok(SyncOutcome::Conflict(enter_conflict(doc, remote))),
        }
    }

    async fn fetch(&self, id: DocumentId) -> Result<Option<Document>, SyncError> {
        let remote = &self.remote;
        self.with_retry("fetch", move |_| remote.fetch(id)).await
    }

    async fn push(&self, doc: &mut Document, replacing: u64) -> Result<SyncOutcome, SyncError> {
        let needed = doc.size_bytes();
        let remote = &self.remote;
        let snapshot: &Document = doc;

        let owner = snapshot.owner.as_str();
        let usage = self
            .with_retry("usage", move |_| remote.usage_bytes(owner))
            .await?;
        self.quota.check(usage, replacing, needed)?;

        let version = self
            .with_retry("push", move |_| remote.push(snapshot))
            .await
            .map_err(|err| match err {
                SyncError::QuotaExceeded { available, .. } => {
                    SyncError::QuotaExceeded { needed, available }
                }
                other => other,
            })?;

        mark_synced(doc, version);
        info!(%version, bytes = needed, "document pushed");
        Ok(SyncOutcome::Pushed { version })
    }

    async fn with_retry<T, F, Fut>(&self, call: &'static str, op: F) -> Result<T, SyncError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        retry_with_backoff(&self.retry, &self.cancel, op)
            .await
            .map_err(|failure| match failure {
                RetryFailure::Exhausted { attempts, last } => {
                    warn!(call, attempts, "remote store unavailable");
                    SyncError::Unavailable {
                        attempts,
                        last_error: last.to_string(),
                    }
                }
                RetryFailure::GaveUp { attempts, error } => remote_failure(error, attempts),
                RetryFailure::Cancelled => SyncError::Cancelled,
            })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn remote_failure(err: RemoteError, attempts: u32) -> SyncError {
    match err {
        RemoteError::Unauthorized(reason) => SyncError::Unauthorized(reason),
        RemoteError::QuotaExceeded => SyncError::QuotaExceeded {
            needed: 0,
            available: 0,
        },
        RemoteError::Rejected(reason) => SyncError::Rejected(reason),
        other @ (RemoteError::Network(_) | RemoteError::Timeout) => SyncError::Unavailable {
            attempts,
            last_error: other.to_string(),
        },
    }
}

fn transition(doc: &mut Document, next: SyncState) {
    if doc.sync.state != next && !doc.sync.state.can_transition_to(next) {
        warn!(
            from = doc.sync.state.label(),
            to = next.label(),
            "unexpected sync state transition"
        );
    }
    doc.sync.state = next;
}

/// Route a state change through `Syncing` when the caller did not start a
/// round.
fn settle(doc: &mut Document, next: SyncState) {
    if doc.sync.state != SyncState::Syncing {
        transition(doc, SyncState::Syncing);
    }
    transition(doc, next);
}

fn mark_synced(doc: &mut Document, version: DateTime<Utc>) {
    doc.sync.last_synced_at = Some(version);
    settle(doc, SyncState::Synced);
}

fn adopt(doc: &mut Document, remote: Document) {
    let version = remote.modified_at;
    let state = doc.sync.state;
    *doc = remote;
    doc.sync = SyncMetadata {
        state,
        last_synced_at: Some(version),
    };
    settle(doc, SyncState::Synced);
    info!(%version, "adopted remote copy");
}

fn enter_conflict(doc: &mut Document, remote: Document) -> ConflictReport {
    settle(doc, SyncState::Conflict);
    warn!(
        local_modified = %doc.modified_at,
        remote_modified = %remote.modified_at,
        "sync conflict"
    );
    ConflictReport {
        document_id: doc.id,
        last_synced_at: doc.sync.last_synced_at,
        local: doc.clone(),
        remote,
    }
}

/// Record an edit that is strictly newer than `version`, so the next round
/// uploads it even if the remote clock runs ahead of ours.
fn bump_past(doc: &mut Document, version: DateTime<Utc>) {
    doc.touch();
    if doc.modified_at <= version {
        doc.modified_at = version + Duration::milliseconds(1);
    }
}

fn merge_pages(
    local: &Document,
    remote: &Document,
    sources: &[PageSource],
) -> Result<Document, SyncError> {
    let invalid = |msg: String| SyncError::InvalidResolution(msg);
    if sources.is_empty() {
        return Err(invalid("a merge must keep at least one page".into()));
    }
    let mut seen = HashSet::new();
    for source in sources {
        if !seen.insert(*source) {
            return Err(invalid(format!("{source} is listed twice")));
        }
    }

    let mut merged = local.clone();
    for page in local.pages() {
        if !seen.contains(&PageSource::Local(page.id())) {
            merged
                .remove_page(page.id())
                .map_err(|e| invalid(e.to_string()))?;
        }
    }

    let mut order = Vec::with_capacity(sources.len());
    for source in sources {
        match *source {
            PageSource::Local(id) => {
                if local.page(id).is_none() {
                    return Err(invalid(format!("{source} does not exist")));
                }
                order.push(id);
            }
            PageSource::Remote(id) => {
                let page = remote
                    .page(id)
                    .ok_or_else(|| invalid(format!("{source} does not exist")))?
                    .clone();
                order.push(merged.add_page(page, None).map_err(|e| invalid(e.to_string()))?);
            }
        }
    }
    merged
        .reorder_pages(&order)
        .map_err(|e| invalid(e.to_string()))?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use scanwerk_core::geometry::Polygon;
    use scanwerk_core::model::{Page, RectifiedImage, TextBlock};

    use super::*;
    use crate::remote::{InMemoryRemote, RemoteCall};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("timestamp")
    }

    fn page(text: &str) -> Page {
        let image = RectifiedImage::from_rgb8(4, 2, vec![1; 24]).expect("image");
        let mut page = Page::new(image);
        page.apply_recognition(
            vec![TextBlock {
                polygon: Polygon::from_rect(0.0, 0.0, 4.0, 2.0),
                text: text.into(),
                confidence: 1.0,
                reading_order: 0,
                line: 0,
            }],
            "en",
        );
        page
    }

    fn setup(config: SyncConfig) -> (Arc<InMemoryRemote>, SyncCoordinator) {
        let remote = Arc::new(InMemoryRemote::new());
        let coordinator = SyncCoordinator::new(remote.clone(), &config);
        (remote, coordinator)
    }

    fn fast_config() -> SyncConfig {
        SyncConfig {
            retry: RetryConfig::immediate(3),
            ..SyncConfig::default()
        }
    }

    /// Local synced at t=10 and edited at t=15; the remote was edited at t=20.
    fn diverged(remote: &InMemoryRemote) -> Document {
        let mut local = Document::new("alice", "Draft");
        local.add_page(page("one"), None).expect("page");
        local.add_page(page("two"), None).expect("page");
        local.sync = SyncMetadata {
            state: SyncState::Synced,
            last_synced_at: Some(at(10)),
        };

        let mut theirs = local.clone();
        theirs.rename("Remote edit").expect("rename");
        theirs.add_page(page("three"), None).expect("page");
        theirs.modified_at = at(20);
        remote.seed(theirs);

        local.modified_at = at(15);
        local
    }

    #[tokio::test]
    async fn first_sync_pushes() {
        let (remote, coordinator) = setup(fast_config());
        let mut doc = Document::new("alice", "Fresh");
        doc.add_page(page("hello"), None).expect("page");

        let outcome = coordinator.sync_up(&mut doc).await.expect("sync");
        assert_eq!(outcome, SyncOutcome::Pushed { version: doc.modified_at });
        assert_eq!(doc.sync.state, SyncState::Synced);
        assert!(!doc.has_unsynced_changes());
        assert_eq!(remote.stored(doc.id).map(|d| d.plain_text()).as_deref(), Some("hello"));

        assert_eq!(coordinator.sync_up(&mut doc).await.expect("again"), SyncOutcome::UpToDate);
    }

    #[tokio::test]
    async fn local_edit_after_sync_is_pushed() {
        let (remote, coordinator) = setup(fast_config());
        let mut doc = Document::new("alice", "Fresh");
        coordinator.sync_up(&mut doc).await.expect("sync");

        doc.rename("Renamed").expect("rename");
        assert!(matches!(
            coordinator.sync_up(&mut doc).await.expect("sync"),
            SyncOutcome::Pushed { .. }
        ));
        assert_eq!(remote.stored(doc.id).expect("stored").title(), "Renamed");
    }

    #[tokio::test]
    async fn remote_newer_and_local_dirty_is_a_conflict() {
        let (remote, coordinator) = setup(fast_config());
        let mut local = diverged(&remote);

        let SyncOutcome::Conflict(report) = coordinator.sync_up(&mut local).await.expect("sync")
        else {
            panic!("expected a conflict");
        };
        assert_eq!(local.sync.state, SyncState::Conflict);
        assert_eq!(report.last_synced_at, Some(at(10)));
        assert_eq!(report.local.title(), "Draft");
        assert_eq!(report.remote.title(), "Remote edit");
        // The remote copy is untouched.
        assert_eq!(remote.stored(local.id).expect("stored").modified_at, at(20));

        assert_eq!(
            coordinator.sync_up(&mut local).await,
            Err(SyncError::UnresolvedConflict)
        );
    }

    #[tokio::test]
    async fn clean_local_fast_forwards() {
        let (remote, coordinator) = setup(fast_config());
        let mut local = diverged(&remote);
        local.modified_at = at(10);

        assert_eq!(
            coordinator.sync_up(&mut local).await.expect("sync"),
            SyncOutcome::FastForwarded
        );
        assert_eq!(local.title(), "Remote edit");
        assert_eq!(local.pages().len(), 3);
        assert_eq!(local.sync.last_synced_at, Some(at(20)));
        assert_eq!(local.sync.state, SyncState::Synced);
    }

    #[tokio::test]
    async fn keep_local_overwrites_remote() {
        let (remote, coordinator) = setup(fast_config());
        let mut local = diverged(&remote);
        let SyncOutcome::Conflict(report) = coordinator.sync_up(&mut local).await.expect("sync")
        else {
            panic!("expected a conflict");
        };

        let outcome = coordinator
            .resolve(&mut local, report, Resolution::KeepLocal)
            .await
            .expect("resolve");
        assert!(matches!(outcome, SyncOutcome::Pushed { .. }));
        assert_eq!(local.sync.state, SyncState::Synced);
        assert_eq!(remote.stored(local.id).expect("stored").title(), "Draft");
    }

    #[tokio::test]
    async fn keep_remote_adopts_remote() {
        let (remote, coordinator) = setup(fast_config());
        let mut local = diverged(&remote);
        let SyncOutcome::Conflict(report) = coordinator.sync_up(&mut local).await.expect("sync")
        else {
            panic!("expected a conflict");
        };

        let outcome = coordinator
            .resolve(&mut local, report, Resolution::KeepRemote)
            .await
            .expect("resolve");
        assert_eq!(outcome, SyncOutcome::UpToDate);
        assert_eq!(local.title(), "Remote edit");
        assert!(!local.has_unsynced_changes());
    }

    #[tokio::test]
    async fn merge_pages_combines_both_versions() {
        let (remote, coordinator) = setup(fast_config());
        let mut local = diverged(&remote);
        let SyncOutcome::Conflict(report) = coordinator.sync_up(&mut local).await.expect("sync")
        else {
            panic!("expected a conflict");
        };
        let remote_third = report.remote.pages()[2].id();
        let local_first = report.local.pages()[0].id();

        let outcome = coordinator
            .resolve(
                &mut local,
                report,
                Resolution::MergePages(vec![
                    PageSource::Remote(remote_third),
                    PageSource::Local(local_first),
                ]),
            )
            .await
            .expect("resolve");
        assert!(matches!(outcome, SyncOutcome::Pushed { .. }));
        assert_eq!(local.plain_text(), "three\n\none");
        assert_eq!(local.title(), "Draft");
        assert_eq!(local.pages()[1].id(), local_first);
        assert_eq!(
            remote.stored(local.id).expect("stored").plain_text(),
            "three\n\none"
        );
    }

    #[tokio::test]
    async fn invalid_merges_are_rejected() {
        let (remote, coordinator) = setup(fast_config());
        let mut local = diverged(&remote);
        let SyncOutcome::Conflict(report) = coordinator.sync_up(&mut local).await.expect("sync")
        else {
            panic!("expected a conflict");
        };

        for sources in [
            vec![],
            vec![PageSource::Local(PageId(99))],
            vec![PageSource::Local(PageId(1)), PageSource::Local(PageId(1))],
        ] {
            let result = coordinator
                .resolve(&mut local, report.clone(), Resolution::MergePages(sources))
                .await;
            assert!(matches!(result, Err(SyncError::InvalidResolution(_))));
            assert_eq!(local.sync.state, SyncState::Conflict);
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let (remote, coordinator) = setup(fast_config());
        remote.fail_next(RemoteCall::Fetch, RemoteError::Timeout);
        remote.fail_next(RemoteCall::Push, RemoteError::Network("reset".into()));
        let mut doc = Document::new("alice", "Flaky");

        assert!(matches!(
            coordinator.sync_up(&mut doc).await.expect("sync"),
            SyncOutcome::Pushed { .. }
        ));
    }

    #[tokio::test]
    async fn persistent_outage_is_unavailable() {
        let (remote, coordinator) = setup(fast_config());
        for _ in 0..3 {
            remote.fail_next(RemoteCall::Any, RemoteError::Network("offline".into()));
        }
        let mut doc = Document::new("alice", "Offline");

        let err = coordinator.sync_up(&mut doc).await.unwrap_err();
        assert!(matches!(err, SyncError::Unavailable { attempts: 3, .. }));
        assert_eq!(doc.sync.state, SyncState::LocalOnly);
        assert_eq!(remote.calls(), 3);
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let (remote, coordinator) = setup(fast_config());
        remote.fail_next(RemoteCall::Fetch, RemoteError::Unauthorized("expired".into()));
        let mut doc = Document::new("alice", "Locked");

        assert_eq!(
            coordinator.sync_up(&mut doc).await,
            Err(SyncError::Unauthorized("expired".into()))
        );
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn quota_is_checked_before_pushing() {
        let (remote, coordinator) = setup(SyncConfig {
            quota_bytes: 10,
            ..fast_config()
        });
        let mut doc = Document::new("alice", "Big");
        doc.add_page(page("abc"), None).expect("page");

        assert_eq!(
            coordinator.sync_up(&mut doc).await,
            Err(SyncError::QuotaExceeded {
                needed: 27,
                available: 10
            })
        );
        assert!(remote.stored(doc.id).is_none());
        assert_eq!(doc.sync.state, SyncState::LocalOnly);
    }

    #[tokio::test]
    async fn pull_fast_forwards_or_reports_current() {
        let (remote, coordinator) = setup(fast_config());
        let mut lonely = Document::new("alice", "Only here");
        assert_eq!(
            coordinator.pull(&mut lonely).await.expect("pull"),
            MergeOutcome::AlreadyCurrent
        );

        let mut local = diverged(&remote);
        local.modified_at = at(10);
        assert_eq!(
            coordinator.pull(&mut local).await.expect("pull"),
            MergeOutcome::FastForwarded
        );
        assert_eq!(local.title(), "Remote edit");
    }

    #[tokio::test]
    async fn sync_down_detects_conflict() {
        let (remote, coordinator) = setup(fast_config());
        let mut local = diverged(&remote);
        let theirs = remote.stored(local.id);

        assert!(matches!(
            coordinator.sync_down(&mut local, theirs),
            Ok(MergeOutcome::Conflict(_))
        ));
        assert_eq!(local.sync.state, SyncState::Conflict);
    }

    #[tokio::test]
    async fn cancelled_sync_reverts_state() {
        let (_remote, coordinator) = setup(fast_config());
        let token = CancellationToken::new();
        token.cancel();
        let mut doc = Document::new("alice", "Stop");

        assert_eq!(
            coordinator.with_cancellation(token).sync_up(&mut doc).await,
            Err(SyncError::Cancelled)
        );
        assert_eq!(doc.sync.state, SyncState::LocalOnly);
    }
}
