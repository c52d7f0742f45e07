// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Single writer per document.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use scanwerk_core::types::DocumentId;

/// One async mutex per document. Mutations of the same document queue up;
/// different documents never wait on each other.
#[derive(Default)]
pub struct DocumentLocks {
    locks: Mutex<HashMap<DocumentId, Arc<AsyncMutex<()>>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`. Access lasts until the guard drops.
    pub async fn lock(&self, id: DocumentId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop the entry for a deleted document. Holders keep their guard.
    pub fn forget(&self, id: DocumentId) {
        self.locks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_document_is_serialized() {
        let locks = DocumentLocks::new();
        let id = DocumentId::new();
        let _held = locks.lock(id).await;

        let second = tokio::time::timeout(Duration::from_millis(50), locks.lock(id)).await;
        assert!(second.is_err(), "second writer must wait");
    }

    #[tokio::test]
    async fn different_documents_proceed() {
        let locks = DocumentLocks::new();
        let _a = locks.lock(DocumentId::new()).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(DocumentId::new())).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn forget_removes_entry() {
        let locks = DocumentLocks::new();
        let id = DocumentId::new();
        drop(locks.lock(id).await);
        locks.forget(id);
        assert!(locks.is_empty());
    }
}
