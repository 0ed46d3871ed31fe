//! Disk-Space Watchdog
//!
//! Periodic audit of the shard's hints root. Each tick sums the on-disk
//! bytes of every endpoint directory; when the shard total exceeds
//! `max_shard_disk_space_size`, every endpoint holding two or more segment
//! files loses its admission flag until a later audit brings the total back
//! under the cap.
//!
//! ## Fairness
//!
//! Endpoints with a single (currently active) segment are never forbidden:
//! every destination keeps at least one segment's worth of disk share, so a
//! single long-dead peer cannot starve hint generation for the others.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use hintwell_core::EndpointId;

use crate::endpoint::EndpointManager;
use crate::error::Result;
use crate::log::parse_segment_seq;

type ManagerMap = Arc<RwLock<HashMap<EndpointId, Arc<EndpointManager>>>>;

pub struct SpaceWatchdog {
    shard_dir: PathBuf,
    max_shard_disk_space_size: u64,
    period: Duration,
    managers: ManagerMap,
    shutdown: watch::Sender<bool>,
    loop_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SpaceWatchdog {
    pub fn new(
        shard_dir: PathBuf,
        max_shard_disk_space_size: u64,
        period: Duration,
        managers: ManagerMap,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shard_dir,
            max_shard_disk_space_size,
            period,
            managers,
            shutdown,
            loop_handle: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn start(self: &Arc<Self>) {
        let watchdog = self.clone();
        let handle = tokio::spawn(async move { watchdog.run().await });
        *self.loop_handle.lock().await = Some(handle);
    }

    /// Stop the watchdog, waiting out an audit already in progress.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.loop_handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn run(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval fires immediately; skip the initial tick
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => break,
            }
            if let Err(err) = self.audit_once().await {
                warn!(error = %err, "hints space audit failed");
            }
        }
    }

    async fn audit_once(&self) -> Result<()> {
        let mut total_size = 0u64;
        let mut eps_with_pending_hints = HashSet::new();

        let mut shard_entries = match tokio::fs::read_dir(&self.shard_dir).await {
            Ok(entries) => entries,
            // Nothing hinted yet on this shard
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = shard_entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let endpoint = EndpointId::new(name);
            let (dir_size, file_count) = self.scan_one_ep_dir(entry.path()).await?;
            total_size += dir_size;
            if file_count > 1 {
                eps_with_pending_hints.insert(endpoint);
            }
        }

        let over_cap = total_size > self.max_shard_disk_space_size;
        debug!(
            total_size,
            cap = self.max_shard_disk_space_size,
            pending_endpoints = eps_with_pending_hints.len(),
            over_cap,
            "hints space audit"
        );

        let managers: Vec<_> = {
            let map = self.managers.read().unwrap();
            map.values().cloned().collect()
        };

        if over_cap {
            for manager in &managers {
                if eps_with_pending_hints.contains(manager.endpoint()) && manager.can_hint() {
                    warn!(
                        endpoint = %manager.endpoint(),
                        total_size,
                        "hints disk budget exceeded, forbidding new hints"
                    );
                    manager.forbid_hints();
                }
            }
        } else {
            for manager in &managers {
                manager.allow_hints();
            }
        }

        Ok(())
    }

    /// Sum file sizes and count segment files in one endpoint directory.
    async fn scan_one_ep_dir(&self, path: PathBuf) -> Result<(u64, usize)> {
        let mut size = 0u64;
        let mut files = 0usize;
        let mut entries = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if parse_segment_seq(&name).is_none() {
                continue;
            }
            size += entry.metadata().await?.len();
            files += 1;
        }
        Ok((size, files))
    }
}
