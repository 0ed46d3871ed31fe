//! Shard Hint Manager
//!
//! Top-level coordinator for one shard's hinted handoff. It owns the
//! endpoint-manager registry, the shard-wide send-memory semaphore, the
//! disk-space watchdog and the statistics, and it is the only type the
//! write path talks to.
//!
//! ## Architecture
//!
//! ```text
//! HintManager
//!     │
//!     ├─ EndpointManager("10.0.0.1:7000")
//!     │    ├─ EndpointWriter   ── HintLog (segments on disk)
//!     │    └─ EndpointSender   ──┘
//!     │
//!     ├─ EndpointManager("10.0.0.2:7000")
//!     │    └─ ...
//!     │
//!     └─ SpaceWatchdog (one per shard)
//! ```
//!
//! Endpoint managers are created lazily on the first hint for a
//! destination and live until shard shutdown. On `start` the manager also
//! revives endpoint managers for every endpoint directory already on disk,
//! so segments surviving a restart are replayed in their original order.
//!
//! ## Thread Safety
//!
//! The manager is `Send + Sync` and meant to be shared via `Arc`; one
//! instance serves one shard directory and instances share nothing.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use tokio::sync::Semaphore;
use tracing::{info, warn};

use hintwell_core::{EndpointId, FrozenMutation};

use crate::cluster::{ClusterHandles, FailureDetector, SchemaCatalog, Snitch, StorageProxy, Topology};
use crate::config::HintConfig;
use crate::endpoint::EndpointManager;
use crate::error::Result;
use crate::metrics::{ShardStats, StatsSnapshot};
use crate::store::HintLogFactory;
use crate::watchdog::SpaceWatchdog;

type ManagerMap = Arc<RwLock<HashMap<EndpointId, Arc<EndpointManager>>>>;

pub struct HintManager {
    config: Arc<HintConfig>,
    stats: Arc<ShardStats>,
    factory: Arc<HintLogFactory>,
    send_limiter: Arc<Semaphore>,
    catalog: Arc<dyn SchemaCatalog>,
    topology: Arc<dyn Topology>,
    snitch: Arc<dyn Snitch>,
    cluster: OnceLock<ClusterHandles>,
    managers: ManagerMap,
    watchdog: Arc<SpaceWatchdog>,
    stopping: AtomicBool,
}

impl HintManager {
    pub fn new(
        config: HintConfig,
        catalog: Arc<dyn SchemaCatalog>,
        topology: Arc<dyn Topology>,
        snitch: Arc<dyn Snitch>,
    ) -> Self {
        let config = Arc::new(config);
        let managers: ManagerMap = Arc::new(RwLock::new(HashMap::new()));
        let factory = Arc::new(HintLogFactory::new(
            config.shard_dir(),
            config.hint_segment_size,
        ));
        let watchdog = Arc::new(SpaceWatchdog::new(
            config.shard_dir(),
            config.max_shard_disk_space_size,
            config.watchdog_period,
            managers.clone(),
        ));

        Self {
            send_limiter: Arc::new(Semaphore::new(config.max_send_in_flight_memory)),
            stats: Arc::new(ShardStats::new()),
            factory,
            catalog,
            topology,
            snitch,
            cluster: OnceLock::new(),
            managers,
            watchdog,
            stopping: AtomicBool::new(false),
            config,
        }
    }

    /// Wire in the send path and the failure detector, revive endpoint
    /// managers for hints surviving on disk, and start the watchdog.
    pub async fn start(
        &self,
        proxy: Arc<dyn StorageProxy>,
        gossiper: Arc<dyn FailureDetector>,
    ) -> Result<()> {
        let handles = ClusterHandles {
            failure_detector: gossiper,
            topology: self.topology.clone(),
            proxy,
            snitch: self.snitch.clone(),
            catalog: self.catalog.clone(),
        };
        if self.cluster.set(handles).is_err() {
            warn!("hint manager started twice, ignoring");
            return Ok(());
        }

        let shard_dir = self.config.shard_dir();
        tokio::fs::create_dir_all(&shard_dir).await?;

        // Crash recovery: an endpoint directory on disk means undelivered
        // hints; bring its manager up so the sender replays them.
        let mut recovered = 0usize;
        let mut entries = tokio::fs::read_dir(&shard_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                self.get_or_create(&EndpointId::new(name)).await?;
                recovered += 1;
            }
        }

        self.watchdog.start().await;

        info!(
            shard_dir = %shard_dir.display(),
            recovered_endpoints = recovered,
            "hint manager started"
        );
        Ok(())
    }

    /// Drain and shut down every endpoint manager. Idempotent: a second
    /// call returns immediately.
    pub async fn stop(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }

        self.watchdog.stop().await;

        // Wake any sender blocked on the send budget.
        self.send_limiter.close();

        let managers: Vec<_> = {
            let mut map = self.managers.write().unwrap();
            map.drain().map(|(_, manager)| manager).collect()
        };
        for manager in managers {
            manager.stop().await;
        }

        info!("hint manager stopped");
    }

    /// Durably record a hint for `endpoint`.
    ///
    /// Returns `false` when the hint is definitely not going to be stored
    /// (shutdown in progress, admission refused, or the endpoint store
    /// could not be created); the caller must then handle the write
    /// failure by other means.
    pub async fn store_hint(&self, endpoint: &EndpointId, mutation: FrozenMutation) -> bool {
        if self.stopping.load(Ordering::Acquire) || self.cluster.get().is_none() {
            self.stats.record_dropped();
            return false;
        }

        match self.get_or_create(endpoint).await {
            Ok(manager) => manager.store_hint(mutation),
            Err(err) => {
                warn!(endpoint = %endpoint, error = %err, "could not create endpoint hint store");
                self.stats.record_dropped();
                false
            }
        }
    }

    /// Should the write path generate a hint for `endpoint` if it becomes
    /// unavailable? True when the endpoint's datacenter is hintable and the
    /// peer has been seen recently enough to be plausibly recoverable.
    pub fn can_hint_for(&self, endpoint: &EndpointId) -> bool {
        let Some(cluster) = self.cluster.get() else {
            return false;
        };
        self.check_dc_for(endpoint)
            && cluster.failure_detector.last_seen(endpoint) <= self.config.max_hint_window
    }

    /// True when hints for `endpoint` are allowed but the shard already has
    /// too many bytes admitted and not yet durable. The write path backs
    /// off instead of queueing more; disk usage is deliberately not
    /// considered here because it cannot be expected to drop until the
    /// remote peer recovers.
    pub fn too_many_in_flight_hints_for(&self, endpoint: &EndpointId) -> bool {
        self.stats.size_of_hints_in_progress() > self.config.max_size_of_hints_in_progress
            && self.hints_in_progress_for(endpoint) > 0
    }

    /// Is the endpoint's datacenter in the configured hintable set?
    /// An empty set means every datacenter is hintable.
    pub fn check_dc_for(&self, endpoint: &EndpointId) -> bool {
        self.config.hinted_dcs.is_empty()
            || self
                .config
                .hinted_dcs
                .contains(&self.snitch.datacenter(endpoint))
    }

    /// Bytes of hints admitted to this shard and not yet durable.
    pub fn size_of_hints_in_progress(&self) -> u64 {
        self.stats.size_of_hints_in_progress()
    }

    /// Number of hints in flight to the disk for one endpoint.
    pub fn hints_in_progress_for(&self, endpoint: &EndpointId) -> u64 {
        let map = self.managers.read().unwrap();
        map.get(endpoint)
            .map(|manager| manager.hints_in_progress())
            .unwrap_or(0)
    }

    /// Point-in-time copy of the shard counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Reserved for cross-shard rebalancing of hint files.
    pub async fn rebalance(&self) -> Result<()> {
        Ok(())
    }

    async fn get_or_create(&self, endpoint: &EndpointId) -> Result<Arc<EndpointManager>> {
        if self.stopping.load(Ordering::Acquire) {
            return Err(crate::error::Error::Stopped);
        }
        {
            let map = self.managers.read().unwrap();
            if let Some(manager) = map.get(endpoint) {
                return Ok(manager.clone());
            }
        }

        let cluster = self
            .cluster
            .get()
            .cloned()
            .ok_or(crate::error::Error::Stopped)?;
        let built = EndpointManager::new(
            endpoint.clone(),
            self.config.clone(),
            self.stats.clone(),
            cluster,
            self.factory.clone(),
            self.send_limiter.clone(),
        )
        .await?;

        let (manager, fresh) = {
            let mut map = self.managers.write().unwrap();
            match map.entry(endpoint.clone()) {
                Entry::Occupied(entry) => (entry.get().clone(), false),
                Entry::Vacant(entry) => {
                    entry.insert(built.clone());
                    (built, true)
                }
            }
        };
        if fresh {
            manager.start().await?;
        }
        Ok(manager)
    }
}
