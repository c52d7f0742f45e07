// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-sync: document persistence. A local SQLite cache holds every
// document; the sync coordinator reconciles it with an optional remote
// store under a per-owner quota.

pub mod cache;
pub mod coordinator;
pub mod quota;
pub mod remote;

pub use cache::{DocumentEntry, LocalCache, SqliteCache};
pub use coordinator::{
    ConflictReport, MergeOutcome, PageSource, Resolution, SyncCoordinator, SyncOutcome,
};
pub use quota::StorageQuota;
pub use remote::{InMemoryRemote, RemoteCall, RemoteStore};
