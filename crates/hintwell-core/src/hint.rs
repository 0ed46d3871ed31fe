//! Hint Record Data Structures
//!
//! This module defines the hint record - the unit of data the storage engine
//! persists and replays - together with the endpoint identifier and the
//! schema-version tag that travels with every record.
//!
//! ## Design Decisions
//! - Uses `bytes::Bytes` for the partition key and payload so reads out of a
//!   segment file are zero-copy slices
//! - `EndpointId` is an opaque string: the engine never interprets the
//!   address, it only needs a stable map key and directory name
//! - `SchemaVersion` is a plain tag; resolving it to a concrete column
//!   layout is the schema catalog's job, done lazily at replay time

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque address of a destination replica.
///
/// The string form is used both as the map key inside the shard manager and
/// as the per-endpoint directory name under the shard's hints root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EndpointId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for EndpointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Version tag of the table schema a mutation payload was encoded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion(pub u64);

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The column layout for one schema version.
///
/// Replaying a hint written under an older schema requires the column
/// mapping that was current when the payload was frozen. The sender caches
/// one mapping per schema version per replayed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub columns: Vec<String>,
}

/// A single captured mutation, frozen at hint-store time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenMutation {
    /// Destination table name.
    pub table: String,

    /// Partition key bytes; used to resolve natural endpoints at replay time.
    pub partition_key: Bytes,

    /// Opaque serialized mutation payload.
    pub payload: Bytes,

    /// Schema version the payload was encoded against.
    pub schema_version: SchemaVersion,
}

impl FrozenMutation {
    pub fn new(
        table: impl Into<String>,
        partition_key: Bytes,
        payload: Bytes,
        schema_version: SchemaVersion,
    ) -> Self {
        Self {
            table: table.into(),
            partition_key,
            payload,
            schema_version,
        }
    }

    /// Size of this mutation for in-flight memory accounting.
    pub fn estimated_size(&self) -> usize {
        8 + // schema version
        self.table.len() +
        self.partition_key.len() +
        self.payload.len()
    }
}
