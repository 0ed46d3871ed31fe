//! Segment Store Factory
//!
//! Maps a destination endpoint to its [`HintLog`] instance. The factory
//! guarantees at-most-one construction per endpoint under concurrent
//! lookup: the first caller builds the log (creating the endpoint directory
//! on demand), later callers get the same shared handle.
//!
//! Handles are reference counted. The factory keeps one reference of its
//! own until [`HintLogFactory::release`] is called at endpoint-manager
//! shutdown; the underlying files close when the last holder (typically the
//! replay sender finishing its in-flight work) drops its `Arc`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use hintwell_core::EndpointId;

use crate::error::Result;
use crate::log::HintLog;

pub struct HintLogFactory {
    shard_dir: PathBuf,
    segment_size: u64,
    logs: RwLock<HashMap<EndpointId, Arc<HintLog>>>,
}

impl HintLogFactory {
    pub fn new(shard_dir: PathBuf, segment_size: u64) -> Self {
        Self {
            shard_dir,
            segment_size,
            logs: RwLock::new(HashMap::new()),
        }
    }

    /// Get the log for `endpoint`, creating it (and its directory) if this
    /// is the first hint for that destination.
    pub async fn get_or_create(&self, endpoint: &EndpointId) -> Result<Arc<HintLog>> {
        // Fast path: read lock
        {
            let logs = self.logs.read().await;
            if let Some(log) = logs.get(endpoint) {
                return Ok(log.clone());
            }
        }

        // Slow path: write lock, with a double-check since another task may
        // have built the log while we waited.
        let mut logs = self.logs.write().await;
        if let Some(log) = logs.get(endpoint) {
            return Ok(log.clone());
        }

        let dir = self.shard_dir.join(endpoint.as_str());
        let log = Arc::new(HintLog::open(dir, self.segment_size).await?);
        logs.insert(endpoint.clone(), log.clone());

        info!(endpoint = %endpoint, "created hint store");

        Ok(log)
    }

    /// Drop the factory's handle for `endpoint`. The log closes once every
    /// outstanding holder releases its own handle.
    pub async fn release(&self, endpoint: &EndpointId) {
        self.logs.write().await.remove(endpoint);
    }
}
