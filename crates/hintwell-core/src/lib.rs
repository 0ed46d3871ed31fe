//! Hintwell Core Types
//!
//! This crate defines the data model shared by the hintwell storage engine:
//! the hint record itself, the replay position that orders hints inside a
//! segment, and the binary framing used to persist hints on disk.
//!
//! ## What is a Hint?
//!
//! A hint is a durable record of a mutation that was intended for a replica
//! that was unavailable at write time. The coordinator parks the mutation on
//! local disk and a background sender replays it once the peer comes back.
//! Each hint carries:
//! - the destination table and partition key (for replica resolution at
//!   replay time - topology may have changed since capture)
//! - the frozen mutation payload (arbitrary bytes)
//! - the table-schema version the payload was encoded against
//!
//! ## Main Types
//!
//! - [`EndpointId`]: opaque address of the destination replica; doubles as
//!   the per-endpoint hint directory name
//! - [`FrozenMutation`]: one captured mutation plus its schema version
//! - [`ReplayPosition`]: monotone (segment, offset) pair assigned at append
//!   time and used for in-flight tracking during replay
//! - [`codec`]: length/CRC-framed entry encoding for segment files

pub mod codec;
pub mod error;
pub mod hint;
pub mod position;

pub use error::{Error, Result};
pub use hint::{ColumnMapping, EndpointId, FrozenMutation, SchemaVersion};
pub use position::ReplayPosition;
