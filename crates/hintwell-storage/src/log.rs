//! Per-Endpoint Hint Segment Log
//!
//! An append-only log of hint entries for a single destination endpoint,
//! stored as a sequence of segment files under
//! `<hints_dir>/<shard_id>/<endpoint>/`.
//!
//! ## File Layout
//!
//! Segment files are named `hints-<seq>.log` with a zero-padded, strictly
//! increasing sequence number, so lexicographic filename order equals write
//! order. Each file is a run of CRC-framed entries (see
//! `hintwell_core::codec`); an entry's replay position is
//! `(segment seq, byte offset)`.
//!
//! ## Lifecycle
//!
//! - `append` writes to the active segment, sealing it and opening the next
//!   one when it reaches the configured segment size
//! - `seal_active` force-seals a non-empty active segment so its entries
//!   become replayable (used by the periodic flush)
//! - `take_sealed` drains the names of segments sealed since the last call -
//!   this is the sealed-segment notification consumed by the replay path
//! - `read_segment` replays a sealed file sequentially; a torn final write
//!   ends the iteration cleanly, a checksum-damaged entry is skipped
//! - `delete_segment` removes a fully-replayed file
//!
//! The log never deletes or rewrites data on its own; destructive operations
//! are driven by the replay sender under the endpoint's file-update mutex.

use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use hintwell_core::codec::{self, FRAME_HEADER_LEN, MAX_ENTRY_SIZE};
use hintwell_core::{FrozenMutation, ReplayPosition};

use crate::error::Result;

/// Fixed prefix of every segment filename.
pub const SEGMENT_PREFIX: &str = "hints-";

/// Suffix of every segment filename.
pub const SEGMENT_SUFFIX: &str = ".log";

/// Build the filename for segment `seq`. Zero-padding keeps lexicographic
/// order identical to numeric order.
pub fn segment_file_name(seq: u64) -> String {
    format!("{SEGMENT_PREFIX}{seq:020}{SEGMENT_SUFFIX}")
}

/// Extract the sequence number from a segment filename, or `None` if the
/// name does not belong to this log.
pub fn parse_segment_seq(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(SEGMENT_PREFIX)?.strip_suffix(SEGMENT_SUFFIX)?;
    digits.parse().ok()
}

struct ActiveSegment {
    seq: u64,
    name: String,
    file: File,
    len: u64,
}

#[derive(Default)]
struct LogInner {
    active: Option<ActiveSegment>,
    next_seq: u64,
    sealed: Vec<String>,
}

/// Append-only segment log for one endpoint's hints.
pub struct HintLog {
    dir: PathBuf,
    segment_size: u64,
    inner: Mutex<LogInner>,
}

impl HintLog {
    /// Open the log in `dir`, creating the directory (and parents) on
    /// demand. Surviving segment files from a previous run are left sealed
    /// on disk; new appends go to a fresh segment numbered after the
    /// highest survivor.
    pub async fn open(dir: impl Into<PathBuf>, segment_size: u64) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut next_seq = 0u64;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(seq) = entry.file_name().to_str().and_then(parse_segment_seq) {
                next_seq = next_seq.max(seq + 1);
            }
        }

        debug!(dir = %dir.display(), next_seq, "opened hint log");

        Ok(Self {
            dir,
            segment_size,
            inner: Mutex::new(LogInner {
                active: None,
                next_seq,
                sealed: Vec::new(),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn segment_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Append one mutation, rotating segments as needed. Returns the
    /// entry's replay position. The write is flushed but not synced; call
    /// [`HintLog::sync`] or [`HintLog::seal_active`] for a durability
    /// barrier.
    pub async fn append(&self, mutation: &FrozenMutation) -> Result<ReplayPosition> {
        let mut inner = self.inner.lock().await;

        if inner
            .active
            .as_ref()
            .is_some_and(|active| active.len >= self.segment_size)
        {
            Self::seal_locked(&mut inner).await?;
        }

        if inner.active.is_none() {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            let name = segment_file_name(seq);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(&name))
                .await?;
            debug!(segment = %name, "opened new hint segment");
            inner.active = Some(ActiveSegment {
                seq,
                name,
                file,
                len: 0,
            });
        }

        let active = inner.active.as_mut().unwrap();
        let position = ReplayPosition::new(active.seq, active.len);
        let frame = codec::encode_entry(mutation);
        active.file.write_all(&frame).await?;
        active.file.flush().await?;
        active.len += frame.len() as u64;

        Ok(position)
    }

    /// Durability barrier on the active segment.
    pub async fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(active) = inner.active.as_mut() {
            active.file.flush().await?;
            active.file.sync_data().await?;
        }
        Ok(())
    }

    /// Sync and seal the active segment (if it holds any data) so its
    /// entries become replayable. The sealed name is reported by the next
    /// [`HintLog::take_sealed`] call.
    pub async fn seal_active(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::seal_locked(&mut inner).await
    }

    async fn seal_locked(inner: &mut LogInner) -> Result<()> {
        if let Some(mut active) = inner.active.take() {
            if active.len == 0 {
                inner.active = Some(active);
                return Ok(());
            }
            active.file.flush().await?;
            active.file.sync_data().await?;
            debug!(segment = %active.name, bytes = active.len, "sealed hint segment");
            inner.sealed.push(active.name);
        }
        Ok(())
    }

    /// Drain the names of segments sealed since the last call, in write
    /// order.
    pub async fn take_sealed(&self) -> Vec<String> {
        let mut inner = self.inner.lock().await;
        std::mem::take(&mut inner.sealed)
    }

    /// Enumerate every segment file on disk in ascending (write) order,
    /// including any survivors from a previous run.
    pub async fn list_segments(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if parse_segment_seq(name).is_some() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Open a sealed segment for sequential replay.
    pub async fn read_segment(&self, name: &str) -> Result<SegmentReader> {
        let seq = parse_segment_seq(name).unwrap_or(0);
        let file = File::open(self.dir.join(name)).await?;
        Ok(SegmentReader {
            name: name.to_string(),
            seq,
            reader: BufReader::new(file),
            offset: 0,
            corrupt_entries: 0,
            done: false,
        })
    }

    /// Delete a fully-replayed segment file.
    pub async fn delete_segment(&self, name: &str) -> Result<()> {
        tokio::fs::remove_file(self.dir.join(name)).await?;
        debug!(segment = %name, "deleted hint segment");
        Ok(())
    }
}

/// Sequential reader over one segment file.
///
/// Yields `(replay position, mutation)` pairs in write order. A torn final
/// write terminates iteration; an entry with a bad checksum is skipped and
/// counted in [`SegmentReader::corrupt_entries`].
pub struct SegmentReader {
    name: String,
    seq: u64,
    reader: BufReader<File>,
    offset: u64,
    corrupt_entries: u64,
    done: bool,
}

impl SegmentReader {
    /// Number of checksum-damaged entries skipped so far.
    pub fn corrupt_entries(&self) -> u64 {
        self.corrupt_entries
    }

    pub async fn next_entry(&mut self) -> Result<Option<(ReplayPosition, FrozenMutation)>> {
        loop {
            if self.done {
                return Ok(None);
            }

            let entry_offset = self.offset;
            let mut header = [0u8; FRAME_HEADER_LEN];
            match self.reader.read_exact(&mut header).await {
                Ok(_) => {}
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    self.done = true;
                    return Ok(None);
                }
                Err(err) => return Err(err.into()),
            }

            let body_len = u32::from_be_bytes(header[0..4].try_into().unwrap()) as usize;
            let crc = u32::from_be_bytes(header[4..8].try_into().unwrap());
            if body_len > MAX_ENTRY_SIZE {
                // Frame boundary is unrecoverable; treat the rest of the
                // file as lost.
                warn!(
                    segment = %self.name,
                    offset = entry_offset,
                    body_len,
                    "unparseable hint frame length, abandoning rest of segment"
                );
                self.corrupt_entries += 1;
                self.done = true;
                return Ok(None);
            }

            let mut body = BytesMut::zeroed(body_len);
            match self.reader.read_exact(&mut body).await {
                Ok(_) => {}
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    // Torn final write: the entry never fully hit the disk.
                    debug!(
                        segment = %self.name,
                        offset = entry_offset,
                        "torn hint entry at end of segment"
                    );
                    self.done = true;
                    return Ok(None);
                }
                Err(err) => return Err(err.into()),
            }
            self.offset += (FRAME_HEADER_LEN + body_len) as u64;

            match codec::decode_body(crc, &body) {
                Ok(mutation) => {
                    return Ok(Some((ReplayPosition::new(self.seq, entry_offset), mutation)));
                }
                Err(err) => {
                    // Length framing is intact, so skip just this entry.
                    warn!(
                        segment = %self.name,
                        offset = entry_offset,
                        error = %err,
                        "skipping damaged hint entry"
                    );
                    self.corrupt_entries += 1;
                }
            }
        }
    }

}
