// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded pool for CPU-heavy stages (crop warping, PDF encoding).

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use scanwerk_core::error::{Result, ScanwerkError};

/// Runs closures on tokio's blocking threads, at most `permits` at a time.
#[derive(Clone)]
pub struct CpuPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl CpuPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// One slot per available core.
    pub fn with_available_parallelism() -> Self {
        Self::new(std::thread::available_parallelism().map_or(1, |n| n.get()))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `f` once a slot is free. A panic inside `f` becomes
    /// `ScanwerkError::Worker`.
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| ScanwerkError::Worker(e.to_string()))?;
        debug!(free = self.permits.available_permits(), "cpu slot acquired");

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(|e| ScanwerkError::Worker(e.to_string()))
    }
}

impl Default for CpuPool {
    fn default() -> Self {
        Self::with_available_parallelism()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn runs_closure() {
        let pool = CpuPool::new(2);
        assert_eq!(pool.run(|| 6 * 7).await.expect("run"), 42);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let pool = CpuPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    pool.run(move || {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(10));
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("join").expect("run");
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn panic_is_a_worker_error() {
        let pool = CpuPool::new(1);
        let result: Result<()> = pool.run(|| panic!("boom")).await;
        assert!(matches!(result, Err(ScanwerkError::Worker(_))));
        // The slot is released.
        assert_eq!(pool.run(|| 1).await.expect("run"), 1);
    }

    #[test]
    fn zero_size_is_clamped() {
        assert_eq!(CpuPool::new(0).size(), 1);
    }
}
