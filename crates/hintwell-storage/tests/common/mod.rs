//! Shared fixtures for the hint store integration tests: mock cluster
//! collaborators, a fast-timer config, and polling helpers.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use hintwell_core::{ColumnMapping, EndpointId, FrozenMutation, SchemaVersion};
use hintwell_storage::{
    EndpointState, Error, FailureDetector, HintConfig, HintManager, Result, SchemaCatalog, Snitch,
    StorageProxy, Topology,
};

/// Failure detector with per-endpoint switches. Peers are DOWN, NORMAL and
/// recently-seen unless a test says otherwise.
#[derive(Default)]
pub struct MockGossiper {
    alive: Mutex<HashSet<EndpointId>>,
    states: Mutex<HashMap<EndpointId, EndpointState>>,
    last_seen: Mutex<HashMap<EndpointId, Duration>>,
}

impl MockGossiper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_alive(&self, endpoint: &EndpointId, alive: bool) {
        let mut set = self.alive.lock().unwrap();
        if alive {
            set.insert(endpoint.clone());
        } else {
            set.remove(endpoint);
        }
    }

    pub fn set_state(&self, endpoint: &EndpointId, state: EndpointState) {
        self.states.lock().unwrap().insert(endpoint.clone(), state);
    }

    pub fn set_last_seen(&self, endpoint: &EndpointId, age: Duration) {
        self.last_seen.lock().unwrap().insert(endpoint.clone(), age);
    }
}

impl FailureDetector for MockGossiper {
    fn is_alive(&self, endpoint: &EndpointId) -> bool {
        self.alive.lock().unwrap().contains(endpoint)
    }

    fn last_seen(&self, endpoint: &EndpointId) -> Duration {
        self.last_seen
            .lock()
            .unwrap()
            .get(endpoint)
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    fn state(&self, endpoint: &EndpointId) -> EndpointState {
        self.states
            .lock()
            .unwrap()
            .get(endpoint)
            .copied()
            .unwrap_or(EndpointState::Normal)
    }
}

/// Topology with a default owner set and optional per-table overrides.
#[derive(Default)]
pub struct MockTopology {
    default_owners: Mutex<Vec<EndpointId>>,
    per_table: Mutex<HashMap<String, Vec<EndpointId>>>,
}

impl MockTopology {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_default_owners(&self, owners: Vec<EndpointId>) {
        *self.default_owners.lock().unwrap() = owners;
    }

    pub fn set_owners(&self, table: &str, owners: Vec<EndpointId>) {
        self.per_table
            .lock()
            .unwrap()
            .insert(table.to_string(), owners);
    }
}

#[async_trait]
impl Topology for MockTopology {
    async fn natural_endpoints(&self, table: &str, _partition_key: &[u8]) -> Vec<EndpointId> {
        if let Some(owners) = self.per_table.lock().unwrap().get(table) {
            return owners.clone();
        }
        self.default_owners.lock().unwrap().clone()
    }
}

/// Write path that records every delivery and can be told to fail specific
/// attempts (1-based, counted across both delivery styles) exactly once.
#[derive(Default)]
pub struct RecordingProxy {
    direct: Mutex<Vec<(EndpointId, FrozenMutation)>>,
    any: Mutex<Vec<FrozenMutation>>,
    attempts: AtomicUsize,
    failing_attempts: Mutex<HashSet<usize>>,
}

impl RecordingProxy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_attempt(&self, attempt: usize) {
        self.failing_attempts.lock().unwrap().insert(attempt);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn direct_sends(&self) -> Vec<(EndpointId, FrozenMutation)> {
        self.direct.lock().unwrap().clone()
    }

    pub fn any_sends(&self) -> Vec<FrozenMutation> {
        self.any.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> usize {
        self.direct.lock().unwrap().len() + self.any.lock().unwrap().len()
    }

    fn next_attempt(&self, endpoint: &EndpointId) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_attempts.lock().unwrap().remove(&attempt) {
            return Err(Error::SendFailed {
                endpoint: endpoint.to_string(),
                reason: format!("injected failure at attempt {attempt}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProxy for RecordingProxy {
    async fn mutate_directly(
        &self,
        endpoint: &EndpointId,
        mutation: &FrozenMutation,
    ) -> Result<()> {
        self.next_attempt(endpoint)?;
        self.direct
            .lock()
            .unwrap()
            .push((endpoint.clone(), mutation.clone()));
        Ok(())
    }

    async fn mutate_any(&self, mutation: &FrozenMutation) -> Result<()> {
        self.next_attempt(&EndpointId::new("any"))?;
        self.any.lock().unwrap().push(mutation.clone());
        Ok(())
    }
}

/// Schema catalog with a configurable grace period.
pub struct StaticCatalog {
    default_grace: Mutex<Duration>,
    per_table_grace: Mutex<HashMap<String, Duration>>,
}

impl StaticCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            default_grace: Mutex::new(Duration::from_secs(10 * 24 * 60 * 60)),
            per_table_grace: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_default_grace(&self, grace: Duration) {
        *self.default_grace.lock().unwrap() = grace;
    }

    pub fn set_grace(&self, table: &str, grace: Duration) {
        self.per_table_grace
            .lock()
            .unwrap()
            .insert(table.to_string(), grace);
    }
}

impl SchemaCatalog for StaticCatalog {
    fn grace_period(&self, table: &str) -> Duration {
        self.per_table_grace
            .lock()
            .unwrap()
            .get(table)
            .copied()
            .unwrap_or(*self.default_grace.lock().unwrap())
    }

    fn column_mapping(&self, _table: &str, _version: SchemaVersion) -> Option<ColumnMapping> {
        Some(ColumnMapping {
            columns: vec!["key".to_string(), "value".to_string()],
        })
    }
}

/// Snitch with per-endpoint datacenter overrides; everything defaults to
/// "dc1".
#[derive(Default)]
pub struct StaticSnitch {
    dcs: Mutex<HashMap<EndpointId, String>>,
}

impl StaticSnitch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_dc(&self, endpoint: &EndpointId, dc: &str) {
        self.dcs
            .lock()
            .unwrap()
            .insert(endpoint.clone(), dc.to_string());
    }
}

impl Snitch for StaticSnitch {
    fn datacenter(&self, endpoint: &EndpointId) -> String {
        self.dcs
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .unwrap_or_else(|| "dc1".to_string())
    }
}

/// The full set of mock collaborators.
pub struct TestCluster {
    pub gossiper: Arc<MockGossiper>,
    pub topology: Arc<MockTopology>,
    pub proxy: Arc<RecordingProxy>,
    pub catalog: Arc<StaticCatalog>,
    pub snitch: Arc<StaticSnitch>,
}

pub fn test_cluster() -> TestCluster {
    TestCluster {
        gossiper: MockGossiper::new(),
        topology: MockTopology::new(),
        proxy: RecordingProxy::new(),
        catalog: StaticCatalog::new(),
        snitch: StaticSnitch::new(),
    }
}

/// Config with timers shrunk so flush/watchdog/retry fit in a test run.
pub fn fast_config(dir: &Path) -> HintConfig {
    let mut config = HintConfig::new(dir);
    config.hints_flush_period = Duration::from_millis(100);
    config.watchdog_period = Duration::from_millis(100);
    config
}

/// Opt-in log output for debugging test failures: `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub async fn start_manager(config: HintConfig, cluster: &TestCluster) -> Arc<HintManager> {
    init_tracing();
    let manager = Arc::new(HintManager::new(
        config,
        cluster.catalog.clone(),
        cluster.topology.clone(),
        cluster.snitch.clone(),
    ));
    manager
        .start(cluster.proxy.clone(), cluster.gossiper.clone())
        .await
        .unwrap();
    manager
}

pub fn mutation_for(n: usize, payload_len: usize) -> FrozenMutation {
    FrozenMutation::new(
        "ks.events",
        Bytes::from(format!("pk-{n}")),
        Bytes::from(vec![b'h'; payload_len]),
        SchemaVersion(1),
    )
}

/// Poll `predicate` every 20ms until it holds or `timeout` expires.
pub async fn eventually(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Count the segment files currently on disk for one endpoint.
pub fn segment_count(config: &HintConfig, endpoint: &EndpointId) -> usize {
    let dir = config.shard_dir().join(endpoint.as_str());
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with("hints-"))
            })
            .count(),
        Err(_) => 0,
    }
}
