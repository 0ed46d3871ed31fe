//! Cluster Collaborator Contracts
//!
//! The hint store consults four external services, all owned elsewhere in
//! the node and handed in as trait objects at construction:
//!
//! - [`FailureDetector`]: peer liveness and ring state (the gossip service)
//! - [`Topology`]: which replicas currently own a partition key
//! - [`StorageProxy`]: the mutation send path - either a direct send to one
//!   replica, or re-submission through the coordinator write machinery
//! - [`Snitch`]: endpoint-to-datacenter resolution for the DC allow-list
//!
//! The schema catalog ([`SchemaCatalog`]) stands in for the database handle:
//! it resolves table names to grace periods and schema versions to column
//! mappings during replay.
//!
//! All of these are read-only from the hint store's point of view except
//! `StorageProxy`, whose calls are the actual hint deliveries.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use hintwell_core::{ColumnMapping, EndpointId, FrozenMutation, SchemaVersion};

use crate::error::Result;

/// Ring membership state of a peer as reported by gossip.
///
/// Anything other than `Normal` means hints for the peer should be drained
/// by discard rather than delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Normal,
    Joining,
    Leaving,
    Left,
}

/// Peer liveness view, backed by the gossip/failure-detector service.
pub trait FailureDetector: Send + Sync {
    /// Is the peer currently reachable?
    fn is_alive(&self, endpoint: &EndpointId) -> bool;

    /// Time since the peer was last seen via gossip.
    fn last_seen(&self, endpoint: &EndpointId) -> Duration;

    /// Ring membership state of the peer.
    fn state(&self, endpoint: &EndpointId) -> EndpointState;
}

/// Replica placement view, backed by the replication/topology service.
#[async_trait]
pub trait Topology: Send + Sync {
    /// The replicas currently responsible for `partition_key` in `table`.
    async fn natural_endpoints(&self, table: &str, partition_key: &[u8]) -> Vec<EndpointId>;
}

/// The mutation send path.
#[async_trait]
pub trait StorageProxy: Send + Sync {
    /// Send the mutation to one specific replica (write consistency ONE
    /// targeting it alone).
    async fn mutate_directly(&self, endpoint: &EndpointId, mutation: &FrozenMutation)
        -> Result<()>;

    /// Submit the mutation through the coordinator write path with
    /// consistency ANY; it may land on any current replica or be re-hinted.
    async fn mutate_any(&self, mutation: &FrozenMutation) -> Result<()>;
}

/// Datacenter resolution for the hinted-DC allow-list.
pub trait Snitch: Send + Sync {
    fn datacenter(&self, endpoint: &EndpointId) -> String;
}

/// Table metadata needed at capture and replay time.
pub trait SchemaCatalog: Send + Sync {
    /// Per-table grace period; hints older than this are expired.
    fn grace_period(&self, table: &str) -> Duration;

    /// Column mapping for a table at a given schema version, or `None` if
    /// the version is unknown to this node.
    fn column_mapping(&self, table: &str, version: SchemaVersion) -> Option<ColumnMapping>;
}

/// Bundle of collaborator handles threaded through the engine.
#[derive(Clone)]
pub struct ClusterHandles {
    pub failure_detector: Arc<dyn FailureDetector>,
    pub topology: Arc<dyn Topology>,
    pub proxy: Arc<dyn StorageProxy>,
    pub snitch: Arc<dyn Snitch>,
    pub catalog: Arc<dyn SchemaCatalog>,
}
