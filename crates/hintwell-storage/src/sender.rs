//! Endpoint Replay Sender
//!
//! The read-path half of one endpoint's hint machinery: a tick-driven state
//! machine that replays sealed segment files to the destination replica.
//!
//! ## Main Loop
//!
//! Each tick:
//! 1. exit if stopping
//! 2. sleep again if the destination is neither alive nor drained-by-policy
//! 3. flush the writer if `hints_flush_period` elapsed (this also extends
//!    the replay queue with newly-sealed segments)
//! 4. replay the oldest segments while time remains in the tick
//! 5. sleep until the earlier of the next flush and the next retry
//!
//! ## Per-File Replay
//!
//! `send_one_file` streams a segment, dispatching each entry as a detached
//! task under two budgets: the shard-wide in-flight byte semaphore and a
//! per-file queue-length semaphore. Entries older than the table's grace
//! period, and every entry once the destination has left the NORMAL ring
//! state, are drained by discard. The file is deleted only when every entry
//! it contained was acknowledged or deliberately dropped; partial replays
//! remember the delivered prefix so a retry skips it.
//!
//! ## Retargeting
//!
//! Topology may have moved ownership between capture and replay. If the
//! original destination is still a natural replica the mutation goes to it
//! directly (consistency ONE targeting that endpoint); otherwise it is
//! re-submitted through the coordinator write path with consistency ANY,
//! which may land it on any current replica or re-hint it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tokio::sync::{watch, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use hintwell_core::{ColumnMapping, EndpointId, FrozenMutation, ReplayPosition, SchemaVersion};

use crate::cluster::{ClusterHandles, EndpointState};
use crate::config::HintConfig;
use crate::error::{Error, Result};
use crate::log::HintLog;
use crate::metrics::ShardStats;
use crate::writer::EndpointWriter;

/// Ordered queue of segment filenames awaiting replay.
///
/// The writer pushes newly-sealed names to the back; the sender replays
/// from the front and removes a name only once its file is deleted.
#[derive(Default)]
pub struct SegmentQueue {
    inner: Mutex<VecDeque<String>>,
}

impl SegmentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&self, name: String) {
        self.inner.lock().unwrap().push_back(name);
    }

    pub fn front(&self) -> Option<String> {
        self.inner.lock().unwrap().front().cloned()
    }

    /// Remove `name` from the front of the queue, if it is still there.
    pub fn remove_front(&self, name: &str) {
        let mut queue = self.inner.lock().unwrap();
        if queue.front().is_some_and(|front| front == name) {
            queue.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

/// Shared context of one segment replay pass.
///
/// Lives as long as the longest holder: the enumerator loop or any detached
/// per-hint send task.
struct SendFileCtx {
    /// Positions dispatched and not yet acknowledged. After the file gate
    /// closes, whatever remains here is the set of failed sends.
    in_flight: Mutex<HashSet<ReplayPosition>>,

    /// Column mapping cache, rebuilt for each file.
    mappings: Mutex<HashMap<SchemaVersion, ColumnMapping>>,

    /// Bounds concurrent sends from this file.
    queue_slots: Arc<Semaphore>,

    /// At least one send in this file failed; the file must survive.
    replay_failed: AtomicBool,

    /// Position bookkeeping was lost; replay the whole file next pass.
    restart: AtomicBool,

    /// Gate: every dispatched send task, awaited at end-of-file.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SendFileCtx {
    fn new(queue_len: usize) -> Self {
        Self {
            in_flight: Mutex::new(HashSet::new()),
            mappings: Mutex::new(HashMap::new()),
            queue_slots: Arc::new(Semaphore::new(queue_len)),
            replay_failed: AtomicBool::new(false),
            restart: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn dispatch(&self, rp: ReplayPosition) {
        self.in_flight.lock().unwrap().insert(rp);
    }

    fn complete(&self, rp: ReplayPosition) {
        self.in_flight.lock().unwrap().remove(&rp);
    }

    fn mark_failed(&self) {
        self.replay_failed.store(true, Ordering::Release);
    }

    fn mark_restart(&self) {
        self.restart.store(true, Ordering::Release);
        self.replay_failed.store(true, Ordering::Release);
    }
}

pub struct EndpointSender {
    endpoint: EndpointId,
    config: Arc<HintConfig>,
    stats: Arc<ShardStats>,
    cluster: ClusterHandles,
    log: Arc<HintLog>,
    writer: Arc<EndpointWriter>,
    queue: Arc<SegmentQueue>,
    file_update_lock: Arc<RwLock<()>>,
    send_limiter: Arc<Semaphore>,

    stopping: AtomicBool,
    ep_not_normal: AtomicBool,
    last_complete_rp: Mutex<Option<ReplayPosition>>,

    shutdown: watch::Sender<bool>,
    loop_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl EndpointSender {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        endpoint: EndpointId,
        config: Arc<HintConfig>,
        stats: Arc<ShardStats>,
        cluster: ClusterHandles,
        log: Arc<HintLog>,
        writer: Arc<EndpointWriter>,
        queue: Arc<SegmentQueue>,
        file_update_lock: Arc<RwLock<()>>,
        send_limiter: Arc<Semaphore>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            endpoint,
            config,
            stats,
            cluster,
            log,
            writer,
            queue,
            file_update_lock,
            send_limiter,
            stopping: AtomicBool::new(false),
            ep_not_normal: AtomicBool::new(false),
            last_complete_rp: Mutex::new(None),
            shutdown,
            loop_handle: tokio::sync::Mutex::new(None),
        }
    }

    /// Spawn the replay loop.
    pub async fn start(self: &Arc<Self>) {
        let sender = self.clone();
        let handle = tokio::spawn(async move { sender.run().await });
        *self.loop_handle.lock().await = Some(handle);
    }

    /// Stop the sender: no new send attempts, current in-flight work drains.
    /// Idempotent - a second call returns immediately.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        let _ = self.shutdown.send(true);
        let handle = self.loop_handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn have_segments(&self) -> bool {
        !self.queue.is_empty()
    }

    fn stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Sending makes sense while the destination is ALIVE, or once it has
    /// left the NORMAL ring state (then "sending" degenerates to draining
    /// the backlog by discard).
    fn can_send(&self) -> bool {
        self.cluster.failure_detector.is_alive(&self.endpoint)
            || self.ep_not_normal.load(Ordering::Acquire)
    }

    async fn run(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown.subscribe();
        let flush_period = self.config.hints_flush_period;
        let mut next_flush = Instant::now() + flush_period;
        let mut next_retry = Instant::now();

        loop {
            if self.stopping() {
                break;
            }

            let state = self.cluster.failure_detector.state(&self.endpoint);
            let not_normal = state != EndpointState::Normal;
            let was_not_normal = self.ep_not_normal.swap(not_normal, Ordering::AcqRel);
            if not_normal && !was_not_normal {
                info!(
                    endpoint = %self.endpoint,
                    ?state,
                    "destination left NORMAL state, draining its hints by discard"
                );
            }

            let now = Instant::now();
            if self.can_send() && now >= next_retry {
                if now >= next_flush {
                    if let Err(err) = self.writer.flush_current_hints().await {
                        warn!(endpoint = %self.endpoint, error = %err, "hint flush failed");
                    }
                    next_flush = Instant::now() + flush_period;
                }

                let tick_started = Instant::now();
                let mut replay_failed = false;
                while let Some(name) = self.queue.front() {
                    if self.stopping() || tick_started.elapsed() >= flush_period {
                        break;
                    }
                    match self.send_one_file(&name, tick_started).await {
                        Ok(FileOutcome::Done) => self.queue.remove_front(&name),
                        // Ran out of tick time; pick the file up again on
                        // the next pass without a backoff.
                        Ok(FileOutcome::Incomplete) => break,
                        Ok(FileOutcome::Failed) => {
                            replay_failed = true;
                            break;
                        }
                        Err(err) => {
                            warn!(
                                endpoint = %self.endpoint,
                                segment = %name,
                                error = %err,
                                "segment replay error"
                            );
                            replay_failed = true;
                            break;
                        }
                    }
                }
                if replay_failed {
                    next_retry = Instant::now() + flush_period;
                }
            }

            let deadline = self.next_wakeup(next_flush, next_retry);
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = shutdown_rx.changed() => {}
            }
        }
    }

    /// Earliest of: next flush, next retry, or "right away" when there is
    /// replayable work and no backoff pending.
    fn next_wakeup(&self, next_flush: Instant, next_retry: Instant) -> Instant {
        let now = Instant::now();
        if self.can_send() && self.have_segments() && next_retry <= now {
            return now;
        }
        let mut deadline = next_flush;
        if next_retry > now {
            deadline = deadline.min(next_retry);
        }
        deadline
    }

    /// Replay one segment file.
    async fn send_one_file(&self, name: &str, tick_started: Instant) -> Result<FileOutcome> {
        let path = self.log.segment_path(name);
        let modified = tokio::fs::metadata(&path).await?.modified()?;

        let mut reader = self.log.read_segment(name).await?;
        let ctx = Arc::new(SendFileCtx::new(self.config.max_hints_send_queue_length));
        let resume_after = *self.last_complete_rp.lock().unwrap();
        let mut shutdown_rx = self.shutdown.subscribe();

        // Replay order bookkeeping for this pass; used to locate the
        // delivered prefix if some sends fail.
        let mut handled_in_order: Vec<ReplayPosition> = Vec::new();
        let mut reached_eof = false;

        loop {
            if self.stopping() || tick_started.elapsed() >= self.config.hints_flush_period {
                break;
            }

            let Some((rp, mutation)) = reader.next_entry().await? else {
                reached_eof = true;
                break;
            };

            // Prefix already delivered on an earlier pass of this file.
            if resume_after.is_some_and(|resume| rp <= resume) {
                continue;
            }

            // Shard-wide in-flight byte budget. The budget is clamped so a
            // single oversized mutation cannot exceed the whole semaphore.
            let budget = mutation
                .estimated_size()
                .max(self.config.min_send_hint_budget)
                .min(self.config.max_send_in_flight_memory) as u32;
            if *shutdown_rx.borrow() {
                break;
            }
            let memory_permit = tokio::select! {
                permit = self.send_limiter.clone().acquire_many_owned(budget) => {
                    match permit {
                        Ok(permit) => permit,
                        Err(_) => break, // semaphore closed at shard shutdown
                    }
                }
                _ = shutdown_rx.changed() => break,
            };

            // Per-file in-flight queue bound; waits for drains when full.
            let queue_permit = tokio::select! {
                permit = ctx.queue_slots.clone().acquire_owned() => permit.expect("file gate semaphore never closed"),
                _ = shutdown_rx.changed() => break,
            };

            handled_in_order.push(rp);

            let age = SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default();
            let grace = self.cluster.catalog.grace_period(&mutation.table);
            if age > grace || self.ep_not_normal.load(Ordering::Acquire) {
                // Expired, or the destination is gone from the ring:
                // drain by discard.
                self.stats.record_dropped();
                drop(memory_permit);
                drop(queue_permit);
                continue;
            }

            ctx.dispatch(rp);
            let task = {
                let sender = SendHintTask {
                    endpoint: self.endpoint.clone(),
                    cluster: self.cluster.clone(),
                    stats: self.stats.clone(),
                    ctx: ctx.clone(),
                };
                tokio::spawn(async move {
                    sender.send_one_hint(rp, mutation).await;
                    drop(memory_permit);
                    drop(queue_permit);
                })
            };
            ctx.tasks.lock().unwrap().push(task);
        }

        for _ in 0..reader.corrupt_entries() {
            self.stats.record_error();
        }

        // Close the file gate: every dispatched send resolves before the
        // fate of the file is decided.
        let tasks = std::mem::take(&mut *ctx.tasks.lock().unwrap());
        for outcome in futures::future::join_all(tasks).await {
            if outcome.is_err() {
                // The task panicked or was torn down before it could record
                // its outcome; its position state is unreliable.
                ctx.mark_restart();
            }
        }

        let failed = ctx.replay_failed.load(Ordering::Acquire);
        let restart = ctx.restart.load(Ordering::Acquire);

        if reached_eof && !failed && !restart {
            let _exclusive = self.file_update_lock.write().await;
            self.log.delete_segment(name).await?;
            *self.last_complete_rp.lock().unwrap() = None;
            debug!(endpoint = %self.endpoint, segment = %name, "segment fully replayed");
            return Ok(FileOutcome::Done);
        }

        let next_resume = if restart {
            // Unacknowledged positions were lost; replay from the start.
            None
        } else if failed {
            // Resume after the longest prefix whose entries all resolved.
            let remaining = ctx.in_flight.lock().unwrap();
            let earliest_failed = remaining.iter().min().copied();
            match earliest_failed
                .and_then(|rp| handled_in_order.iter().position(|handled| *handled == rp))
            {
                Some(0) | None => resume_after,
                Some(idx) => Some(handled_in_order[idx - 1]),
            }
        } else {
            // Ran out of tick time with every dispatched entry resolved.
            handled_in_order.last().copied().or(resume_after)
        };
        *self.last_complete_rp.lock().unwrap() = next_resume;

        debug!(
            endpoint = %self.endpoint,
            segment = %name,
            failed,
            restart,
            resume = ?next_resume,
            "segment replay incomplete, keeping file"
        );
        Ok(if failed {
            FileOutcome::Failed
        } else {
            FileOutcome::Incomplete
        })
    }
}

/// Result of one segment replay pass.
enum FileOutcome {
    /// Every entry acknowledged or deliberately dropped; the file is gone.
    Done,
    /// The pass was cut short (tick time, shutdown) with no send failures.
    Incomplete,
    /// At least one send failed; the file is kept and retried after a
    /// backoff.
    Failed,
}

/// State captured by one detached per-hint send task.
struct SendHintTask {
    endpoint: EndpointId,
    cluster: ClusterHandles,
    stats: Arc<ShardStats>,
    ctx: Arc<SendFileCtx>,
}

impl SendHintTask {
    async fn send_one_hint(&self, rp: ReplayPosition, mutation: FrozenMutation) {
        match self.dispatch(&mutation).await {
            Ok(()) => {
                self.ctx.complete(rp);
                self.stats.record_sent();
            }
            Err(err) => {
                debug!(
                    endpoint = %self.endpoint,
                    position = %rp,
                    error = %err,
                    "hint send failed"
                );
                self.ctx.mark_failed();
            }
        }
    }

    async fn dispatch(&self, mutation: &FrozenMutation) -> Result<()> {
        self.column_mapping(mutation)?;

        let natural = self
            .cluster
            .topology
            .natural_endpoints(&mutation.table, &mutation.partition_key)
            .await;

        if natural.contains(&self.endpoint) {
            self.cluster
                .proxy
                .mutate_directly(&self.endpoint, mutation)
                .await
        } else {
            debug!(
                endpoint = %self.endpoint,
                table = %mutation.table,
                "destination no longer a natural replica, rerouting with CL=ANY"
            );
            self.cluster.proxy.mutate_any(mutation).await
        }
    }

    /// Resolve (and cache per file) the column mapping the entry's payload
    /// was frozen against.
    fn column_mapping(&self, mutation: &FrozenMutation) -> Result<ColumnMapping> {
        let mut mappings = self.ctx.mappings.lock().unwrap();
        if let Some(mapping) = mappings.get(&mutation.schema_version) {
            return Ok(mapping.clone());
        }
        let mapping = self
            .cluster
            .catalog
            .column_mapping(&mutation.table, mutation.schema_version)
            .ok_or_else(|| Error::UnknownSchema {
                table: mutation.table.clone(),
                version: mutation.schema_version.0,
            })?;
        mappings.insert(mutation.schema_version, mapping.clone());
        Ok(mapping)
    }
}
