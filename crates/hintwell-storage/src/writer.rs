//! Endpoint Hint Writer
//!
//! The write-path half of one endpoint's hint machinery. Responsibilities:
//! - admission: refuse hints while stopping, while the space watchdog has
//!   the endpoint forbidden, or while too many admitted bytes are still in
//!   flight to the disk
//! - accounting: the shard-wide `size_of_hints_in_progress` byte gauge and
//!   the per-endpoint in-progress hint count move together with every
//!   admission/completion
//! - durability: each admitted hint is appended to the endpoint's segment
//!   log by a background task, bounded by `hint_file_write_timeout`
//! - flush: seal the active segment and hand newly-sealed filenames to the
//!   replay queue
//!
//! ## Concurrency
//!
//! Appends take the endpoint's file-update lock in shared mode; flush,
//! rotation and deletion take it exclusively. `store_hint` itself never
//! does I/O - it only runs the admission check and spawns the append, so
//! the caller is never blocked on disk.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use hintwell_core::{EndpointId, FrozenMutation};

use crate::config::HintConfig;
use crate::log::HintLog;
use crate::metrics::ShardStats;
use crate::sender::SegmentQueue;

pub struct EndpointWriter {
    endpoint: EndpointId,
    config: Arc<HintConfig>,
    stats: Arc<ShardStats>,
    log: Arc<HintLog>,
    queue: Arc<SegmentQueue>,
    file_update_lock: Arc<RwLock<()>>,

    can_hint: AtomicBool,
    stopping: AtomicBool,
    hints_in_progress: AtomicU64,

    // Gate over in-flight appends; drained on stop.
    pending_appends: Mutex<JoinSet<()>>,
}

impl EndpointWriter {
    pub fn new(
        endpoint: EndpointId,
        config: Arc<HintConfig>,
        stats: Arc<ShardStats>,
        log: Arc<HintLog>,
        queue: Arc<SegmentQueue>,
        file_update_lock: Arc<RwLock<()>>,
    ) -> Self {
        Self {
            endpoint,
            config,
            stats,
            log,
            queue,
            file_update_lock,
            can_hint: AtomicBool::new(true),
            stopping: AtomicBool::new(false),
            hints_in_progress: AtomicU64::new(0),
            pending_appends: Mutex::new(JoinSet::new()),
        }
    }

    /// Admit one hint for durable storage.
    ///
    /// Returns `false` (counting the hint as dropped) when the writer is
    /// stopping, when hinting is forbidden, or when the shard's in-flight
    /// byte budget is exhausted. On `true` the durable append proceeds in
    /// the background; the caller is never blocked on I/O.
    pub fn store_hint(self: &Arc<Self>, mutation: FrozenMutation) -> bool {
        let size = mutation.estimated_size() as u64;

        if self.stopping.load(Ordering::Acquire) || !self.can_hint() {
            self.stats.record_dropped();
            return false;
        }
        if !self
            .stats
            .try_add_in_progress(size, self.config.max_size_of_hints_in_progress)
        {
            debug!(
                endpoint = %self.endpoint,
                in_progress = self.stats.size_of_hints_in_progress(),
                "hint admission refused: in-flight byte budget exhausted"
            );
            self.stats.record_dropped();
            return false;
        }

        self.hints_in_progress.fetch_add(1, Ordering::AcqRel);

        let writer = self.clone();
        let mut pending = self.pending_appends.lock().unwrap();
        pending.spawn(async move {
            writer.append_one(mutation, size).await;
        });
        // Reap already-finished appends so the set stays small.
        while pending.try_join_next().is_some() {}

        true
    }

    async fn append_one(&self, mutation: FrozenMutation, size: u64) {
        let result = {
            let _shared = self.file_update_lock.read().await;
            tokio::time::timeout(
                self.config.hint_file_write_timeout,
                self.log.append(&mutation),
            )
            .await
        };

        match result {
            Ok(Ok(position)) => {
                self.stats.record_written();
                debug!(endpoint = %self.endpoint, position = %position, "hint written");
            }
            Ok(Err(err)) => {
                self.stats.record_error();
                warn!(endpoint = %self.endpoint, error = %err, "hint append failed");
            }
            Err(_) => {
                self.stats.record_error();
                warn!(
                    endpoint = %self.endpoint,
                    timeout_ms = self.config.hint_file_write_timeout.as_millis() as u64,
                    "hint append timed out"
                );
            }
        }

        self.stats.sub_in_progress(size);
        self.hints_in_progress.fetch_sub(1, Ordering::AcqRel);
    }

    /// Force a durability barrier on the active segment, then extend the
    /// replay queue with every newly-sealed segment. The queue extension
    /// stays under the exclusive lock so concurrent flushes cannot reorder
    /// segment names.
    pub async fn flush_current_hints(&self) -> crate::error::Result<()> {
        let _exclusive = self.file_update_lock.write().await;
        self.log.seal_active().await?;
        for name in self.log.take_sealed().await {
            self.queue.push_back(name);
        }
        Ok(())
    }

    /// Feed the replay queue with every segment already on disk, in
    /// ascending filename order. Called once at startup (crash recovery).
    pub async fn populate_segments_to_replay(&self) -> crate::error::Result<()> {
        let segments = self.log.list_segments().await?;
        if !segments.is_empty() {
            debug!(
                endpoint = %self.endpoint,
                segments = segments.len(),
                "recovered hint segments from previous run"
            );
        }
        for name in segments {
            self.queue.push_back(name);
        }
        Ok(())
    }

    pub fn hints_in_progress(&self) -> u64 {
        self.hints_in_progress.load(Ordering::Acquire)
    }

    pub fn can_hint(&self) -> bool {
        self.can_hint.load(Ordering::Acquire)
    }

    pub fn allow_hints(&self) {
        self.can_hint.store(true, Ordering::Release);
    }

    pub fn forbid_hints(&self) {
        self.can_hint.store(false, Ordering::Release);
    }

    /// Close the admission gate and wait for every in-flight append to
    /// resolve. After this returns the shard counters attributable to this
    /// endpoint are settled.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        let mut pending = {
            let mut guard = self.pending_appends.lock().unwrap();
            std::mem::take(&mut *guard)
        };
        while pending.join_next().await.is_some() {}
    }
}
