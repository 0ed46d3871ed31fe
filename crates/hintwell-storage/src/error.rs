//! Storage Error Types
//!
//! ## Error Categories
//!
//! ### Durability Errors
//! - `Io`: a segment append, sync or directory operation failed
//! - `WriteTimeout`: a durable append did not complete within
//!   `hint_file_write_timeout`
//!
//! ### Replay Errors
//! - `Codec`: an entry failed to decode during replay
//! - `SendFailed`: the destination (or the coordinator write path) rejected
//!   a replayed mutation
//! - `UnknownSchema`: the schema catalog has no column mapping for the
//!   version an entry was written under
//!
//! ### Lifecycle Errors
//! - `Stopped`: the operation raced with shutdown
//!
//! All storage operations return `Result<T>` aliased to `Result<T, Error>`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("hint write timed out after {0:?}")]
    WriteTimeout(std::time::Duration),

    #[error("hint entry codec error: {0}")]
    Codec(#[from] hintwell_core::Error),

    #[error("send to {endpoint} failed: {reason}")]
    SendFailed { endpoint: String, reason: String },

    #[error("no column mapping for table {table} at schema version {version}")]
    UnknownSchema { table: String, version: u64 },

    #[error("hint store is stopping")]
    Stopped,
}
