//! Hint Entry Wire Format
//!
//! Each entry in a segment file is a self-delimiting frame with a CRC32
//! checksum:
//!
//! ```text
//! ┌───────────┬──────────┬────────────────┬───────────┬───────┬──────────┬─────┬─────────┐
//! │ Body Size │ CRC32    │ Schema Version │ Table Len │ Table │ Key Len  │ Key │ Payload │
//! │ (4 bytes) │(4 bytes) │ (8 bytes)      │ (2 bytes) │(N)    │(4 bytes) │(M)  │(rest)   │
//! └───────────┴──────────┴────────────────┴───────────┴───────┴──────────┴─────┴─────────┘
//! ```
//!
//! All integers are big-endian. The checksum covers the body (everything
//! after the CRC field). A file that ends mid-frame yields
//! [`Error::TruncatedEntry`] so the segment reader can stop cleanly at a
//! torn final write instead of reporting corruption.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::hint::{FrozenMutation, SchemaVersion};

/// Size of the `[len][crc]` frame prefix.
pub const FRAME_HEADER_LEN: usize = 8;

/// Sanity cap on a single entry body; anything larger is corruption.
pub const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;

/// Number of bytes `mutation` occupies on disk, frame header included.
pub fn encoded_len(mutation: &FrozenMutation) -> usize {
    FRAME_HEADER_LEN + body_len(mutation)
}

fn body_len(mutation: &FrozenMutation) -> usize {
    8 + 2 + mutation.table.len() + 4 + mutation.partition_key.len() + mutation.payload.len()
}

/// Encode one mutation into a complete frame.
pub fn encode_entry(mutation: &FrozenMutation) -> Bytes {
    let body_len = body_len(mutation);
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + body_len);

    buf.put_u32(body_len as u32);
    buf.put_u32(0); // checksum backfilled below

    buf.put_u64(mutation.schema_version.0);
    buf.put_u16(mutation.table.len() as u16);
    buf.put_slice(mutation.table.as_bytes());
    buf.put_u32(mutation.partition_key.len() as u32);
    buf.put_slice(&mutation.partition_key);
    buf.put_slice(&mutation.payload);

    let crc = crc32fast::hash(&buf[FRAME_HEADER_LEN..]);
    buf[4..8].copy_from_slice(&crc.to_be_bytes());

    buf.freeze()
}

/// Verify the checksum and decode an entry body.
pub fn decode_body(expected_crc: u32, body: &[u8]) -> Result<FrozenMutation> {
    let actual = crc32fast::hash(body);
    if actual != expected_crc {
        return Err(Error::Corrupt {
            expected: expected_crc,
            actual,
        });
    }

    let mut offset = 0usize;
    let schema_version = SchemaVersion(read_u64(body, &mut offset)?);
    let table_len = read_u16(body, &mut offset)? as usize;
    let table = std::str::from_utf8(take(body, &mut offset, table_len)?)
        .map_err(|_| Error::Malformed("table name is not utf-8"))?
        .to_string();
    let key_len = read_u32(body, &mut offset)? as usize;
    let partition_key = Bytes::copy_from_slice(take(body, &mut offset, key_len)?);
    let payload = Bytes::copy_from_slice(&body[offset..]);

    Ok(FrozenMutation {
        table,
        partition_key,
        payload,
        schema_version,
    })
}

/// Decode one frame from the front of `buf`.
///
/// Returns the mutation and the number of bytes consumed.
pub fn decode_entry(buf: &[u8]) -> Result<(FrozenMutation, usize)> {
    if buf.len() < FRAME_HEADER_LEN {
        return Err(Error::TruncatedEntry {
            needed: FRAME_HEADER_LEN,
            available: buf.len(),
        });
    }
    let body_len = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
    if body_len > MAX_ENTRY_SIZE {
        return Err(Error::EntryTooLarge(body_len, MAX_ENTRY_SIZE));
    }
    let crc = u32::from_be_bytes(buf[4..8].try_into().unwrap());
    let frame_len = FRAME_HEADER_LEN + body_len;
    if buf.len() < frame_len {
        return Err(Error::TruncatedEntry {
            needed: frame_len,
            available: buf.len(),
        });
    }
    let mutation = decode_body(crc, &buf[FRAME_HEADER_LEN..frame_len])?;
    Ok((mutation, frame_len))
}

fn take<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    if *offset + len > data.len() {
        return Err(Error::TruncatedEntry {
            needed: *offset + len,
            available: data.len(),
        });
    }
    let slice = &data[*offset..*offset + len];
    *offset += len;
    Ok(slice)
}

fn read_u64(data: &[u8], offset: &mut usize) -> Result<u64> {
    Ok(u64::from_be_bytes(take(data, offset, 8)?.try_into().unwrap()))
}

fn read_u32(data: &[u8], offset: &mut usize) -> Result<u32> {
    Ok(u32::from_be_bytes(take(data, offset, 4)?.try_into().unwrap()))
}

fn read_u16(data: &[u8], offset: &mut usize) -> Result<u16> {
    Ok(u16::from_be_bytes(take(data, offset, 2)?.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FrozenMutation {
        FrozenMutation::new(
            "ks.events",
            Bytes::from("partition-7"),
            Bytes::from(vec![0xAB; 256]),
            SchemaVersion(42),
        )
    }

    #[test]
    fn roundtrip() {
        let m = sample();
        let frame = encode_entry(&m);
        assert_eq!(frame.len(), encoded_len(&m));
        let (decoded, consumed) = decode_entry(&frame).unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(decoded, m);
    }

    #[test]
    fn roundtrip_empty_key_and_payload() {
        let m = FrozenMutation::new("t", Bytes::new(), Bytes::new(), SchemaVersion(0));
        let frame = encode_entry(&m);
        let (decoded, _) = decode_entry(&frame).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn two_frames_back_to_back() {
        let a = sample();
        let b = FrozenMutation::new("other", Bytes::from("k"), Bytes::from("v"), SchemaVersion(1));
        let mut buf = Vec::new();
        buf.extend_from_slice(&encode_entry(&a));
        buf.extend_from_slice(&encode_entry(&b));

        let (first, consumed) = decode_entry(&buf).unwrap();
        assert_eq!(first, a);
        let (second, _) = decode_entry(&buf[consumed..]).unwrap();
        assert_eq!(second, b);
    }

    #[test]
    fn corrupt_body_detected() {
        let frame = encode_entry(&sample());
        let mut bad = frame.to_vec();
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        match decode_entry(&bad) {
            Err(Error::Corrupt { .. }) => {}
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn torn_tail_reported_as_truncated() {
        let frame = encode_entry(&sample());
        // Cut inside the body
        let cut = &frame[..frame.len() - 10];
        match decode_entry(cut) {
            Err(Error::TruncatedEntry { .. }) => {}
            other => panic!("expected TruncatedEntry, got {other:?}"),
        }
        // Cut inside the header
        match decode_entry(&frame[..4]) {
            Err(Error::TruncatedEntry { .. }) => {}
            other => panic!("expected TruncatedEntry, got {other:?}"),
        }
    }

    #[test]
    fn absurd_length_rejected() {
        let mut buf = vec![0u8; 16];
        buf[0..4].copy_from_slice(&(u32::MAX).to_be_bytes());
        match decode_entry(&buf) {
            Err(Error::EntryTooLarge(..)) => {}
            other => panic!("expected EntryTooLarge, got {other:?}"),
        }
    }
}
