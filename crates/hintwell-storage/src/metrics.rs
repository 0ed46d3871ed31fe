//! Shard-Wide Hint Statistics
//!
//! One `ShardStats` instance lives in the shard manager and is shared by
//! every endpoint writer and sender on the shard. The four counters are
//! monotone; `size_of_hints_in_progress` is a live gauge of bytes admitted
//! to the write path but not yet durable.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ShardStats {
    size_of_hints_in_progress: AtomicU64,
    written: AtomicU64,
    errors: AtomicU64,
    dropped: AtomicU64,
    sent: AtomicU64,
}

/// Point-in-time copy of the shard counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub size_of_hints_in_progress: u64,
    pub written: u64,
    pub errors: u64,
    pub dropped: u64,
    pub sent: u64,
}

impl ShardStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_in_progress(&self, bytes: u64) {
        self.size_of_hints_in_progress
            .fetch_add(bytes, Ordering::Relaxed);
    }

    /// Atomically admit `bytes` to the in-progress gauge unless doing so
    /// would push it past `cap`. Concurrent admissions can therefore never
    /// overshoot the cap between a check and an add.
    pub fn try_add_in_progress(&self, bytes: u64, cap: u64) -> bool {
        self.size_of_hints_in_progress
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current.saturating_add(bytes);
                (next <= cap).then_some(next)
            })
            .is_ok()
    }

    pub fn sub_in_progress(&self, bytes: u64) {
        self.size_of_hints_in_progress
            .fetch_sub(bytes, Ordering::Relaxed);
    }

    pub fn size_of_hints_in_progress(&self) -> u64 {
        self.size_of_hints_in_progress.load(Ordering::Relaxed)
    }

    pub fn record_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            size_of_hints_in_progress: self.size_of_hints_in_progress(),
            written: self.written(),
            errors: self.errors(),
            dropped: self.dropped(),
            sent: self.sent(),
        }
    }
}
