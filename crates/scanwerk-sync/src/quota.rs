// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-owner remote storage quota.

use scanwerk_core::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageQuota {
    limit_bytes: u64,
}

impl StorageQuota {
    pub fn new(limit_bytes: u64) -> Self {
        Self { limit_bytes }
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    /// Bytes still free given the owner's current remote usage.
    pub fn available(&self, usage_bytes: u64) -> u64 {
        self.limit_bytes.saturating_sub(usage_bytes)
    }

    /// Check that storing `needed` bytes fits. `replacing` is the size of the
    /// remote copy the push will overwrite, which is freed by the push.
    pub fn check(&self, usage_bytes: u64, replacing: u64, needed: u64) -> Result<(), SyncError> {
        let available = self.available(usage_bytes.saturating_sub(replacing));
        if needed > available {
            return Err(SyncError::QuotaExceeded { needed, available });
        }
        Ok(())
    }
}
