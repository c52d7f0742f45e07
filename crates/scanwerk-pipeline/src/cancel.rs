// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cancellation tokens for in-flight work.
//
// Every document has one parent token; each task on that document gets a
// child. Cancelling the parent (document deleted) reaches every task;
// cancelling a page token (page removed, user pressed stop) reaches only
// that page's recognition. Deleted documents are remembered so late callers
// get a cancelled token instead of a fresh entry.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use scanwerk_core::types::{DocumentId, PageId};

#[derive(Default)]
struct DocumentTasks {
    parent: CancellationToken,
    pages: HashMap<PageId, CancellationToken>,
}

#[derive(Default)]
struct Registry {
    documents: HashMap<DocumentId, DocumentTasks>,
    deleted: HashSet<DocumentId>,
}

impl Registry {
    /// Tasks of a live document; `None` once it was deleted.
    fn tasks(&mut self, doc: DocumentId) -> Option<&mut DocumentTasks> {
        if self.deleted.contains(&doc) {
            return None;
        }
        Some(self.documents.entry(doc).or_default())
    }
}

fn cancelled() -> CancellationToken {
    let token = CancellationToken::new();
    token.cancel();
    token
}

#[derive(Default)]
pub struct TaskTokens {
    registry: Mutex<Registry>,
}

impl TaskTokens {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// A token for document-wide work such as sync or summarizing.
    pub fn document_task(&self, doc: DocumentId) -> CancellationToken {
        match self.registry().tasks(doc) {
            Some(tasks) => tasks.parent.child_token(),
            None => cancelled(),
        }
    }

    /// Register recognition of `page`, replacing any stale registration.
    pub fn page_task(&self, doc: DocumentId, page: PageId) -> CancellationToken {
        let mut registry = self.registry();
        let Some(tasks) = registry.tasks(doc) else {
            return cancelled();
        };
        let token = tasks.parent.child_token();
        if let Some(stale) = tasks.pages.insert(page, token.clone()) {
            stale.cancel();
        }
        token
    }

    /// Unregister a finished page task.
    pub fn finish_page_task(&self, doc: DocumentId, page: PageId) {
        if let Some(tasks) = self.registry().documents.get_mut(&doc) {
            tasks.pages.remove(&page);
        }
    }

    /// Cancel recognition of one page. Returns whether a task was running.
    pub fn cancel_page(&self, doc: DocumentId, page: PageId) -> bool {
        let token = self
            .registry()
            .documents
            .get_mut(&doc)
            .and_then(|tasks| tasks.pages.remove(&page));
        match token {
            Some(token) => {
                token.cancel();
                debug!(document = %doc, %page, "page task cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel everything running for a document and drop its tokens.
    pub fn cancel_document(&self, doc: DocumentId) {
        if let Some(tasks) = self.registry().documents.remove(&doc) {
            tasks.parent.cancel();
            debug!(document = %doc, pages = tasks.pages.len(), "document tasks cancelled");
        }
    }

    /// The document is gone: cancel its tasks and hand out only cancelled
    /// tokens for it from now on.
    pub fn forget_document(&self, doc: DocumentId) {
        self.cancel_document(doc);
        self.registry().deleted.insert(doc);
    }

    pub fn is_running(&self, doc: DocumentId, page: PageId) -> bool {
        self.registry()
            .documents
            .get(&doc)
            .is_some_and(|tasks| tasks.pages.contains_key(&page))
    }

    /// Documents with registered tokens.
    pub fn tracked_documents(&self) -> usize {
        self.registry().documents.len()
    }
}
