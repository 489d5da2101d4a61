//! Binary wire framing.
//!
//! The chunk frame is a fixed 52-byte header (network byte order) followed
//! by the payload:
//!
//! ```text
//! offset  size  field
//! 0       16    transfer_id (uuid)
//! 16      8     index
//! 24      8     total_chunks
//! 32      8     offset
//! 40      4     payload_length
//! 44      4     flags (bitset; bit0 = last_chunk)
//! 48      4     crc32(payload)
//! 52      N     payload
//! ```
//!
//! The CRC covers only the payload. Metadata exchange (filename, file_size,
//! sha256) is a separate control message preceding the first chunk: a
//! length-delimited UTF-8 filename, followed by fixed-width `file_size`,
//! `chunk_size`, `total_chunks`, and a 32-byte SHA-256.

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkFlags, FileMetadata, TransferId};

/// Size of the fixed chunk frame header, in bytes.
pub const CHUNK_HEADER_LEN: usize = 52;

/// Encode a [`Chunk`] as a wire frame (header + payload).
#[must_use]
pub fn encode_chunk(chunk: &Chunk) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CHUNK_HEADER_LEN + chunk.data.len());
    buf.extend_from_slice(chunk.id.as_bytes());
    buf.extend_from_slice(&chunk.index.to_be_bytes());
    buf.extend_from_slice(&chunk.total_chunks.to_be_bytes());
    buf.extend_from_slice(&chunk.offset.to_be_bytes());
    buf.extend_from_slice(&(chunk.data.len() as u32).to_be_bytes());
    buf.extend_from_slice(&chunk.flags.0.to_be_bytes());
    buf.extend_from_slice(&chunk.checksum.to_be_bytes());
    buf.extend_from_slice(&chunk.data);
    buf
}

/// Decode a wire frame (header + payload) into a [`Chunk`].
///
/// # Errors
///
/// Returns [`Error::InvalidChunkIndex`] if `buf` is shorter than the header,
/// or shorter than `payload_length` declares.
pub fn decode_chunk(buf: &[u8]) -> Result<Chunk> {
    if buf.len() < CHUNK_HEADER_LEN {
        return Err(Error::InvalidChunkIndex(format!(
            "frame too short: {} bytes, need at least {CHUNK_HEADER_LEN}",
            buf.len()
        )));
    }

    let id = TransferId::from_bytes(buf[0..16].try_into().expect("16-byte slice"));
    let index = u64::from_be_bytes(buf[16..24].try_into().expect("8-byte slice"));
    let total_chunks = u64::from_be_bytes(buf[24..32].try_into().expect("8-byte slice"));
    let offset = u64::from_be_bytes(buf[32..40].try_into().expect("8-byte slice"));
    let payload_length = u32::from_be_bytes(buf[40..44].try_into().expect("4-byte slice")) as usize;
    let flags = ChunkFlags(u32::from_be_bytes(buf[44..48].try_into().expect("4-byte slice")));
    let checksum = u32::from_be_bytes(buf[48..52].try_into().expect("4-byte slice"));

    let payload_start = CHUNK_HEADER_LEN;
    let payload_end = payload_start
        .checked_add(payload_length)
        .ok_or_else(|| Error::InvalidChunkIndex("payload_length overflow".into()))?;
    if buf.len() < payload_end {
        return Err(Error::InvalidChunkIndex(format!(
            "frame declares {payload_length} byte payload but only {} bytes follow the header",
            buf.len() - payload_start
        )));
    }

    Ok(Chunk {
        id,
        index,
        total_chunks,
        offset,
        flags,
        checksum,
        data: buf[payload_start..payload_end].to_vec(),
    })
}

/// Encode a [`FileMetadata`] control message.
#[must_use]
pub fn encode_metadata(meta: &FileMetadata) -> Vec<u8> {
    let name_bytes = meta.filename.as_bytes();
    let mut buf = Vec::with_capacity(4 + name_bytes.len() + 8 + 4 + 8 + 32);
    buf.extend_from_slice(&(name_bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(name_bytes);
    buf.extend_from_slice(&meta.file_size.to_be_bytes());
    buf.extend_from_slice(&meta.chunk_size.to_be_bytes());
    buf.extend_from_slice(&meta.total_chunks.to_be_bytes());
    buf.extend_from_slice(&meta.sha256_hash);
    buf
}

/// Decode a [`FileMetadata`] control message.
///
/// # Errors
///
/// Returns [`Error::InvalidChunkIndex`] if `buf` is truncated or the
/// declared filename length does not fit.
pub fn decode_metadata(buf: &[u8]) -> Result<FileMetadata> {
    if buf.len() < 4 {
        return Err(Error::InvalidChunkIndex("metadata frame too short".into()));
    }
    let name_len = u32::from_be_bytes(buf[0..4].try_into().expect("4-byte slice")) as usize;
    let mut cursor = 4usize;

    let name_end = cursor
        .checked_add(name_len)
        .ok_or_else(|| Error::InvalidChunkIndex("filename length overflow".into()))?;
    let fixed_tail = 8 + 4 + 8 + 32;
    if buf.len() < name_end + fixed_tail {
        return Err(Error::InvalidChunkIndex("metadata frame truncated".into()));
    }

    let filename = String::from_utf8(buf[cursor..name_end].to_vec())
        .map_err(|e| Error::InvalidChunkIndex(format!("filename is not valid utf-8: {e}")))?;
    cursor = name_end;

    let file_size = u64::from_be_bytes(buf[cursor..cursor + 8].try_into().expect("8 bytes"));
    cursor += 8;
    let chunk_size = u32::from_be_bytes(buf[cursor..cursor + 4].try_into().expect("4 bytes"));
    cursor += 4;
    let total_chunks = u64::from_be_bytes(buf[cursor..cursor + 8].try_into().expect("8 bytes"));
    cursor += 8;
    let mut sha256_hash = [0u8; 32];
    sha256_hash.copy_from_slice(&buf[cursor..cursor + 32]);

    Ok(FileMetadata {
        filename,
        file_size,
        chunk_size,
        total_chunks,
        sha256_hash,
    })
}
