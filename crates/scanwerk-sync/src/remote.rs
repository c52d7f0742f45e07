// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Remote document store abstraction.
//
// Documents are keyed by id and versioned by their modification timestamp.
// Transport, authentication and server-side storage are out of scope; the
// sync coordinator only needs these four calls.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use scanwerk_core::error::RemoteError;
use scanwerk_core::model::Document;
use scanwerk_core::types::DocumentId;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// The remote copy of a document, if there is one.
    async fn fetch(&self, id: DocumentId) -> Result<Option<Document>, RemoteError>;

    /// Store `doc`, replacing any previous copy. Returns the stored version.
    async fn push(&self, doc: &Document) -> Result<DateTime<Utc>, RemoteError>;

    async fn delete(&self, id: DocumentId) -> Result<(), RemoteError>;

    /// Total bytes stored for `owner`.
    async fn usage_bytes(&self, owner: &str) -> Result<u64, RemoteError>;
}

/// Which calls an injected failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCall {
    Fetch,
    Push,
    Delete,
    Usage,
    Any,
}

/// Process-local `RemoteStore` with scripted failures, for tests and offline
/// sessions.
#[derive(Default)]
pub struct InMemoryRemote {
    documents: Mutex<HashMap<DocumentId, Document>>,
    failures: Mutex<VecDeque<(RemoteCall, RemoteError)>>,
    calls: AtomicU32,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a document directly in the store, as if another device had
    /// pushed it.
    pub fn seed(&self, doc: Document) {
        self.documents_guard().insert(doc.id, doc);
    }

    /// Make the next matching call fail with `error`. Failures queue up and
    /// are consumed in order.
    pub fn fail_next(&self, call: RemoteCall, error: RemoteError) {
        self.failures_guard().push_back((call, error));
    }

    /// Number of calls received so far, failed ones included.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stored(&self, id: DocumentId) -> Option<Document> {
        self.documents_guard().get(&id).cloned()
    }

    fn documents_guard(&self) -> std::sync::MutexGuard<'_, HashMap<DocumentId, Document>> {
        self.documents.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn failures_guard(&self) -> std::sync::MutexGuard<'_, VecDeque<(RemoteCall, RemoteError)>> {
        self.failures.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn enter(&self, call: RemoteCall) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut failures = self.failures_guard();
        let due = failures
            .front()
            .is_some_and(|(target, _)| *target == call || *target == RemoteCall::Any);
        if due {
            if let Some((_, error)) = failures.pop_front() {
                debug!(?call, %error, "injected remote failure");
                return Err(error);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn fetch(&self, id: DocumentId) -> Result<Option<Document>, RemoteError> {
        self.enter(RemoteCall::Fetch)?;
        Ok(self.stored(id))
    }

    async fn push(&self, doc: &Document) -> Result<DateTime<Utc>, RemoteError> {
        self.enter(RemoteCall::Push)?;
        let version = doc.modified_at;
        self.documents_guard().insert(doc.id, doc.clone());
        Ok(version)
    }

    async fn delete(&self, id: DocumentId) -> Result<(), RemoteError> {
        self.enter(RemoteCall::Delete)?;
        self.documents_guard().remove(&id);
        Ok(())
    }

    async fn usage_bytes(&self, owner: &str) -> Result<u64, RemoteError> {
        self.enter(RemoteCall::Usage)?;
        Ok(self
            .documents_guard()
            .values()
            .filter(|doc| doc.owner == owner)
            .map(Document::size_bytes)
            .sum())
    }
}
