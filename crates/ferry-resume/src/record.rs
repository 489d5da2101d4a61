//! One journal entry: a full-state upsert or a removal tombstone.
//!
//! On-disk layout of an encoded record: `[len: u32 BE][crc32(payload): u32
//! BE][payload: len bytes]`, where `payload` is the JSON encoding of
//! [`Record`]. The CRC covers the JSON payload only.

use ferry_core::error::{Error, Result};
use ferry_core::types::{TransferId, TransferState};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// One durable journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Record {
    /// Upsert a transfer's full state.
    Upsert(TransferState),
    /// Tombstone a transfer: it is no longer tracked.
    Remove(TransferId),
}

/// Encode a record as `[len][crc32][payload]`.
#[must_use]
pub fn encode(record: &Record) -> Vec<u8> {
    let payload = serde_json::to_vec(record).expect("Record serialization cannot fail");
    let crc = ferry_checksum::crc32_of(&payload);
    let mut buf = Vec::with_capacity(8 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&crc.to_be_bytes());
    buf.extend_from_slice(&payload);
    buf
}

/// Read and decode one record from `reader`.
///
/// Returns `Ok(None)` on a clean EOF (no bytes read at all). Returns
/// [`Error::Corrupt`] if the stream ends mid-record or the CRC does not
/// match — callers treat this as "truncate here and stop replaying",
/// never as a reason to abort the whole recovery pass.
pub fn decode_one(reader: &mut impl Read) -> Result<Option<Record>> {
    let mut len_buf = [0u8; 4];
    match read_exact_or_eof(reader, &mut len_buf)? {
        false => return Ok(None),
        true => {}
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut crc_buf = [0u8; 4];
    if !read_exact_or_eof(reader, &mut crc_buf)? {
        return Err(Error::Corrupt("journal record truncated after length".into()));
    }
    let expected_crc = u32::from_be_bytes(crc_buf);

    let mut payload = vec![0u8; len];
    if !read_exact_or_eof(reader, &mut payload)? {
        return Err(Error::Corrupt("journal record truncated in payload".into()));
    }

    let actual_crc = ferry_checksum::crc32_of(&payload);
    if actual_crc != expected_crc {
        return Err(Error::Corrupt(format!(
            "journal record CRC mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"
        )));
    }

    let record: Record = serde_json::from_slice(&payload)
        .map_err(|e| Error::Corrupt(format!("journal record is not valid JSON: {e}")))?;
    Ok(Some(record))
}

/// Like `Read::read_exact`, but returns `Ok(false)` instead of erroring when
/// zero bytes are available at the very start of the read (clean EOF).
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(Error::Corrupt("journal record truncated mid-field".into()));
        }
        filled += n;
    }
    Ok(true)
}
