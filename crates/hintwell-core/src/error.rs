//! Codec error types.
//!
//! All encode/decode operations return `Result<T>` aliased to
//! `Result<T, Error>` so errors propagate cleanly with `?`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Checksum mismatch - the entry bytes are present but damaged.
    #[error("hint entry checksum mismatch (expected {expected:#010x}, got {actual:#010x})")]
    Corrupt { expected: u32, actual: u32 },

    /// The file ends in the middle of an entry (torn final write).
    #[error("truncated hint entry: needed {needed} bytes, {available} available")]
    TruncatedEntry { needed: usize, available: usize },

    /// Declared entry length exceeds the sanity limit.
    #[error("hint entry length {0} exceeds maximum {1}")]
    EntryTooLarge(usize, usize),

    /// The entry body passed its checksum but does not parse.
    #[error("malformed hint entry: {0}")]
    Malformed(&'static str),
}
