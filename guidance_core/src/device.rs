//! Accelerator execution model.
//!
//! The fusion and perception engines queue their work on a single [`Stream`]:
//! an ordered execution context. Work enqueued on one stream completes in
//! order, so the projection kernel, preprocessing, inference, and the output
//! copy need no cross-stream dependencies — exactly one `synchronize` per
//! tick, issued by the detector adapter after the output copy.
//!
//! This build executes kernels on the host, so enqueued work is complete by
//! the time it returns; the stream still carries the ordering contract and
//! counts synchronizations so tests can assert the one-sync-per-tick rule.

use std::sync::atomic::{AtomicU64, Ordering};

/// An ordered accelerator execution context.
#[derive(Debug, Default)]
pub struct Stream {
    enqueued: AtomicU64,
    synced: AtomicU64,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one unit of enqueued work.
    pub fn record(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Block until all enqueued work is complete.
    pub fn synchronize(&self) {
        self.synced.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of synchronizations issued (diagnostics/tests).
    pub fn sync_count(&self) -> u64 {
        self.synced.load(Ordering::Relaxed)
    }

    /// Number of work items enqueued (diagnostics).
    pub fn enqueued_count(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }
}
