//! Endpoint Manager
//!
//! Facade owning the write path ([`EndpointWriter`]) and the replay path
//! ([`EndpointSender`]) for a single destination endpoint, plus the state
//! they share: the segment-log handle, the replay queue and the
//! file-update lock.
//!
//! ## Lifecycle
//!
//! created -> started -> stopping -> stopped. Stop order matters: first the
//! writer's admission gate closes and pending appends drain, then the
//! sender stops (awaiting its in-flight sends), and finally the factory's
//! log handle is released so the underlying files close once the last
//! holder drops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};
use tracing::info;

use hintwell_core::{EndpointId, FrozenMutation};

use crate::cluster::ClusterHandles;
use crate::config::HintConfig;
use crate::error::Result;
use crate::metrics::ShardStats;
use crate::sender::{EndpointSender, SegmentQueue};
use crate::store::HintLogFactory;
use crate::writer::EndpointWriter;

pub struct EndpointManager {
    endpoint: EndpointId,
    factory: Arc<HintLogFactory>,
    writer: Arc<EndpointWriter>,
    sender: Arc<EndpointSender>,
    stopped: AtomicBool,
}

impl EndpointManager {
    pub async fn new(
        endpoint: EndpointId,
        config: Arc<HintConfig>,
        stats: Arc<ShardStats>,
        cluster: ClusterHandles,
        factory: Arc<HintLogFactory>,
        send_limiter: Arc<Semaphore>,
    ) -> Result<Arc<Self>> {
        let log = factory.get_or_create(&endpoint).await?;
        let queue = Arc::new(SegmentQueue::new());
        let file_update_lock = Arc::new(RwLock::new(()));

        let writer = Arc::new(EndpointWriter::new(
            endpoint.clone(),
            config.clone(),
            stats.clone(),
            log.clone(),
            queue.clone(),
            file_update_lock.clone(),
        ));

        let sender = Arc::new(EndpointSender::new(
            endpoint.clone(),
            config,
            stats,
            cluster,
            log,
            writer.clone(),
            queue,
            file_update_lock,
            send_limiter,
        ));

        Ok(Arc::new(Self {
            endpoint,
            factory,
            writer,
            sender,
            stopped: AtomicBool::new(false),
        }))
    }

    /// Recover any surviving segments from a previous run and start the
    /// replay loop.
    pub async fn start(&self) -> Result<()> {
        self.writer.populate_segments_to_replay().await?;
        self.sender.start().await;
        Ok(())
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    pub fn store_hint(&self, mutation: FrozenMutation) -> bool {
        self.writer.store_hint(mutation)
    }

    pub fn can_hint(&self) -> bool {
        self.writer.can_hint()
    }

    pub fn allow_hints(&self) {
        self.writer.allow_hints();
    }

    pub fn forbid_hints(&self) {
        self.writer.forbid_hints();
    }

    pub fn hints_in_progress(&self) -> u64 {
        self.writer.hints_in_progress()
    }

    /// Force a flush of hints aggregated so far.
    pub async fn flush(&self) -> Result<()> {
        self.writer.flush_current_hints().await
    }

    /// Drain and shut down. Safe to call more than once.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.writer.stop().await;
        self.sender.stop().await;
        self.factory.release(&self.endpoint).await;
        info!(endpoint = %self.endpoint, "endpoint hints manager stopped");
    }
}
