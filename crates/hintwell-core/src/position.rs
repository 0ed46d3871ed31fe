//! Replay Positions
//!
//! A replay position identifies one entry inside one segment file. The
//! segment log assigns positions at append time; the replay sender uses them
//! to track which entries of the currently-replaying file are still in
//! flight and to skip the already-delivered prefix when a file is retried.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotone identifier of an entry within an endpoint's segment log.
///
/// Ordering is lexicographic on `(segment, offset)`. Segment sequence
/// numbers are strictly increasing per endpoint, so positions are totally
/// ordered across all of an endpoint's segments as well as within one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReplayPosition {
    /// Sequence number of the segment file the entry lives in.
    pub segment: u64,

    /// Byte offset of the entry inside the segment file.
    pub offset: u64,
}

impl ReplayPosition {
    pub fn new(segment: u64, offset: u64) -> Self {
        Self { segment, offset }
    }
}

impl fmt::Display for ReplayPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.offset)
    }
}
