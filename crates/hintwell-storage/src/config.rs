//! Hint Store Configuration
//!
//! ## HintConfig
//!
//! Controls admission, segment sizing, replay throttling and the disk-space
//! watchdog for one shard's hint store:
//!
//! - **hints_dir / shard_id**: segments live under `<hints_dir>/<shard_id>/<endpoint>/`
//! - **hinted_dcs**: datacenters hints may be generated for (empty = all)
//! - **max_hint_window**: don't hint for peers unseen longer than this
//! - **max_shard_disk_space_size**: watchdog cap over all endpoint directories
//! - **max_size_of_hints_in_progress**: admission cap on not-yet-durable bytes (default: 10 MiB)
//! - **hint_segment_size**: seal the active segment at this size (default: 32 MiB)
//! - **max_hints_send_queue_length**: in-flight sends per segment (default: 128)
//! - **max_send_in_flight_memory / min_send_hint_budget**: byte budget for
//!   in-flight replayed mutations across the whole shard
//! - **hints_flush_period / hint_file_write_timeout / watchdog_period**: timers

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintConfig {
    /// Root directory for hint segments.
    pub hints_dir: PathBuf,

    /// Shard identifier; names the per-shard subdirectory.
    #[serde(default)]
    pub shard_id: u32,

    /// Datacenters hints may be generated for. Empty means every DC.
    #[serde(default)]
    pub hinted_dcs: HashSet<String>,

    /// Suppress hinting for peers unseen longer than this (default: 3 hours).
    #[serde(default = "default_max_hint_window", with = "duration_ms")]
    pub max_hint_window: Duration,

    /// Watchdog cap on the shard's total on-disk hint bytes (default: 1 GiB).
    #[serde(default = "default_max_shard_disk_space_size")]
    pub max_shard_disk_space_size: u64,

    /// Admission cap on bytes admitted but not yet durable (default: 10 MiB).
    #[serde(default = "default_max_size_of_hints_in_progress")]
    pub max_size_of_hints_in_progress: u64,

    /// Seal the active segment when it reaches this size (default: 32 MiB).
    #[serde(default = "default_hint_segment_size")]
    pub hint_segment_size: u64,

    /// Advisory per-endpoint fair share of disk (default: 128 MiB).
    #[serde(default = "default_max_hints_per_ep_size")]
    pub max_hints_per_ep_size: u64,

    /// Maximum in-flight sends from a single segment (default: 128).
    #[serde(default = "default_max_hints_send_queue_length")]
    pub max_hints_send_queue_length: usize,

    /// Byte budget for in-flight replayed mutations shard-wide (default: 64 MiB).
    #[serde(default = "default_max_send_in_flight_memory")]
    pub max_send_in_flight_memory: usize,

    /// Minimum budget charged per in-flight hint (default: 2 KiB).
    #[serde(default = "default_min_send_hint_budget")]
    pub min_send_hint_budget: usize,

    /// Flush aggregated hints to disk this often (default: 10 s).
    #[serde(default = "default_hints_flush_period", with = "duration_ms")]
    pub hints_flush_period: Duration,

    /// Bound on a single durable append (default: 2 s).
    #[serde(default = "default_hint_file_write_timeout", with = "duration_ms")]
    pub hint_file_write_timeout: Duration,

    /// Disk-space audit period (default: 10 s).
    #[serde(default = "default_watchdog_period", with = "duration_ms")]
    pub watchdog_period: Duration,
}

impl HintConfig {
    pub fn new(hints_dir: impl Into<PathBuf>) -> Self {
        Self {
            hints_dir: hints_dir.into(),
            shard_id: 0,
            hinted_dcs: HashSet::new(),
            max_hint_window: default_max_hint_window(),
            max_shard_disk_space_size: default_max_shard_disk_space_size(),
            max_size_of_hints_in_progress: default_max_size_of_hints_in_progress(),
            hint_segment_size: default_hint_segment_size(),
            max_hints_per_ep_size: default_max_hints_per_ep_size(),
            max_hints_send_queue_length: default_max_hints_send_queue_length(),
            max_send_in_flight_memory: default_max_send_in_flight_memory(),
            min_send_hint_budget: default_min_send_hint_budget(),
            hints_flush_period: default_hints_flush_period(),
            hint_file_write_timeout: default_hint_file_write_timeout(),
            watchdog_period: default_watchdog_period(),
        }
    }

    /// Directory holding this shard's per-endpoint hint directories.
    pub fn shard_dir(&self) -> PathBuf {
        self.hints_dir.join(self.shard_id.to_string())
    }
}

fn default_max_hint_window() -> Duration {
    Duration::from_secs(3 * 60 * 60)
}

fn default_max_shard_disk_space_size() -> u64 {
    1024 * 1024 * 1024
}

fn default_max_size_of_hints_in_progress() -> u64 {
    10 * 1024 * 1024
}

fn default_hint_segment_size() -> u64 {
    32 * 1024 * 1024
}

fn default_max_hints_per_ep_size() -> u64 {
    128 * 1024 * 1024
}

fn default_max_hints_send_queue_length() -> usize {
    128
}

fn default_max_send_in_flight_memory() -> usize {
    64 * 1024 * 1024
}

fn default_min_send_hint_budget() -> usize {
    2 * 1024
}

fn default_hints_flush_period() -> Duration {
    Duration::from_secs(10)
}

fn default_hint_file_write_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_watchdog_period() -> Duration {
    Duration::from_secs(10)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
