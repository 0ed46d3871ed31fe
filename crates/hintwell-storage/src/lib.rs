//! Hintwell Storage Engine
//!
//! This crate implements the hinted-handoff lifecycle for one shard of a
//! sharded database coordinator: when a replica is unavailable at write
//! time, the coordinator durably parks the mutation here as a *hint* and a
//! background sender replays it once the peer is reachable again.
//!
//! ## Guarantees
//!
//! 1. A hint is persisted to the endpoint's segment log before it is
//!    counted as written; admission never blocks the caller on I/O.
//! 2. Memory and disk per shard stay bounded no matter how long peers are
//!    down: an admission byte cap, a per-segment in-flight send cap, a
//!    shard-wide in-flight send-memory semaphore, and a disk-space watchdog
//!    with a minimum one-segment fair share per endpoint.
//! 3. Every durable hint is eventually delivered to a currently-responsible
//!    replica, or discarded under explicit policy: grace expiry,
//!    destination decommission, or disk pressure.
//!
//! ## Architecture Overview
//!
//! ```text
//! write path ──► HintManager.store_hint(endpoint, mutation)
//!                    │ lazy
//!                    ▼
//!              EndpointManager ──► EndpointWriter ──► HintLog (append)
//!                                                        │ seal at 32 MiB
//!                                                        ▼
//!              EndpointSender ◄── replay queue ◄── sealed segments
//!                    │ tick: flush, replay oldest file
//!                    ▼
//!              FailureDetector? Topology? ──► StorageProxy
//!                                              (direct, or CL=ANY reroute)
//! ```
//!
//! ## Main Components
//!
//! - [`HintManager`]: public entry point; one per shard
//! - [`EndpointManager`]: writer + sender pair for one destination
//! - [`HintLog`]: append-only segment log under
//!   `<hints_dir>/<shard_id>/<endpoint>/`
//! - [`SpaceWatchdog`]: periodic disk audit flipping per-endpoint admission
//! - [`cluster`]: traits for the gossip, topology, send-path, snitch and
//!   schema collaborators the engine is wired to at construction
//!
//! ## Usage
//!
//! ```ignore
//! use hintwell_storage::{HintConfig, HintManager};
//!
//! let manager = Arc::new(HintManager::new(
//!     HintConfig::new("/var/lib/db/hints"),
//!     catalog,
//!     topology,
//!     snitch,
//! ));
//! manager.start(proxy, gossiper).await?;
//!
//! // On a failed replica write:
//! if manager.can_hint_for(&endpoint) && !manager.too_many_in_flight_hints_for(&endpoint) {
//!     if !manager.store_hint(&endpoint, mutation).await {
//!         // count the replica write as failed
//!     }
//! }
//!
//! // On shutdown:
//! manager.stop().await;
//! ```

pub mod cluster;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod log;
pub mod manager;
pub mod metrics;
pub mod sender;
pub mod store;
pub mod watchdog;
pub mod writer;

pub use cluster::{
    ClusterHandles, EndpointState, FailureDetector, SchemaCatalog, Snitch, StorageProxy, Topology,
};
pub use config::HintConfig;
pub use endpoint::EndpointManager;
pub use error::{Error, Result};
pub use log::{HintLog, SegmentReader};
pub use manager::HintManager;
pub use metrics::{ShardStats, StatsSnapshot};
pub use sender::EndpointSender;
pub use store::HintLogFactory;
pub use watchdog::SpaceWatchdog;
pub use writer::EndpointWriter;
