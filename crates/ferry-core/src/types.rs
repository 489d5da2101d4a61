//! The fixed vocabulary shared by every ferry component: transfer ids,
//! chunks, file metadata, chunk configuration and persisted transfer state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// A 128-bit opaque identifier, globally unique per transfer, generated by
/// the initiator. Used as the primary key throughout the system.
pub type TransferId = Uuid;

/// Default chunk size (256 KiB).
pub const DEFAULT_CHUNK_SIZE: u32 = 256 * 1024;

/// Minimum permitted chunk size (4 KiB).
pub const MIN_CHUNK_SIZE: u32 = 4 * 1024;

/// Maximum permitted chunk size (16 MiB).
pub const MAX_CHUNK_SIZE: u32 = 16 * 1024 * 1024;

/// Bitset of per-chunk flags carried on the wire.
///
/// Only `LAST_CHUNK` is currently defined; the type is a `u32` newtype
/// rather than a single bool so additional flags can be added without
/// breaking the wire layout in `crate::wire`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChunkFlags(pub u32);

impl ChunkFlags {
    /// No flags set.
    pub const NONE: ChunkFlags = ChunkFlags(0);
    /// Marks the final chunk of a transfer (bit 0).
    pub const LAST_CHUNK: ChunkFlags = ChunkFlags(1 << 0);

    /// Whether the `LAST_CHUNK` bit is set.
    #[must_use]
    pub fn is_last_chunk(self) -> bool {
        self.0 & Self::LAST_CHUNK.0 != 0
    }

    /// Combine two flag sets.
    #[must_use]
    pub fn union(self, other: ChunkFlags) -> ChunkFlags {
        ChunkFlags(self.0 | other.0)
    }
}

/// The wire-level unit of transfer: a framed, checksummed slice of a file's
/// bytes, indexed by position.
///
/// Invariant: `offset == index * chunk_size` for every non-final chunk;
/// `data.len() <= chunk_size`; the final chunk may be shorter. `checksum`
/// MUST equal the CRC-32 of `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Owning transfer.
    pub id: TransferId,
    /// 0-based chunk index.
    pub index: u64,
    /// Total number of chunks in the transfer.
    pub total_chunks: u64,
    /// Byte offset of this chunk in the assembled file.
    pub offset: u64,
    /// Per-chunk flags (at minimum, `last_chunk`).
    pub flags: ChunkFlags,
    /// CRC-32 (IEEE 802.3) of `data`.
    pub checksum: u32,
    /// The chunk's payload.
    pub data: Vec<u8>,
}

impl Chunk {
    /// Recompute the CRC-32 of `data` and compare it against `checksum`.
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        ferry_checksum::crc32_of(&self.data) == self.checksum
    }
}

/// Metadata describing a file ahead of / during a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Original file name (no directory components).
    pub filename: String,
    /// Total file size in bytes.
    pub file_size: u64,
    /// Configured chunk size in bytes.
    pub chunk_size: u32,
    /// `max(1, ceil(file_size / chunk_size))`.
    pub total_chunks: u64,
    /// SHA-256 of the whole file.
    pub sha256_hash: [u8; 32],
}

impl FileMetadata {
    /// Compute `total_chunks` for a file of `file_size` bytes split into
    /// `chunk_size`-byte chunks.
    ///
    /// An empty file still gets exactly one (empty) chunk: this is an
    /// explicit design choice that uniforms the protocol rather than
    /// special-casing the zero-chunk transfer.
    #[must_use]
    pub fn total_chunks_for(file_size: u64, chunk_size: u32) -> u64 {
        if file_size == 0 {
            return 1;
        }
        file_size.div_ceil(u64::from(chunk_size))
    }
}

/// Chunking configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Size of each chunk, in bytes. Valid range: 4 KiB..=16 MiB.
    pub chunk_size: u32,
    /// Whether `process_chunk` verifies the per-chunk CRC-32.
    pub verify_crc32: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            verify_crc32: true,
        }
    }
}

impl ChunkConfig {
    /// Reject chunk sizes outside `[MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `chunk_size` is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size < MIN_CHUNK_SIZE || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {} out of range [{MIN_CHUNK_SIZE}, {MAX_CHUNK_SIZE}]",
                self.chunk_size
            )));
        }
        Ok(())
    }

    /// Number of chunks a file of `file_size` bytes splits into under this
    /// configuration.
    #[must_use]
    pub fn chunk_count(&self, file_size: u64) -> u64 {
        FileMetadata::total_chunks_for(file_size, self.chunk_size)
    }
}

/// Lifecycle status of a persisted transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Transfer is actively receiving/sending chunks.
    Active,
    /// Transfer is paused; no chunks are being processed.
    Paused,
    /// Transfer finished and was verified.
    Completed,
    /// Transfer failed with an unrecoverable error.
    Failed,
}

/// Durable, serializable snapshot of an in-progress or finished transfer.
///
/// Invariant: `bytes_written == sum(size_of_chunk(i) for i where bitmap[i])`;
/// `received_count = popcount(bitmap) <= total_chunks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferState {
    /// Transfer identifier.
    pub id: TransferId,
    /// Destination file name.
    pub filename: String,
    /// Total file size in bytes.
    pub file_size: u64,
    /// Total number of chunks.
    pub total_chunks: u64,
    /// Expected SHA-256 of the whole file.
    pub sha256_hash: [u8; 32],
    /// Word-packed bitmap of received chunks (bit = 1 means received).
    pub received_bitmap: Vec<u64>,
    /// Total bytes written so far.
    pub bytes_written: u64,
    /// Seconds since the Unix epoch, updated on every mutation.
    pub updated_at: u64,
    /// Current lifecycle status.
    pub status: TransferStatus,
}

impl TransferState {
    /// Create a fresh, all-zero state for a new transfer.
    #[must_use]
    pub fn new(
        id: TransferId,
        filename: String,
        file_size: u64,
        total_chunks: u64,
        sha256_hash: [u8; 32],
    ) -> Self {
        let words = total_chunks.div_ceil(64) as usize;
        Self {
            id,
            filename,
            file_size,
            total_chunks,
            sha256_hash,
            received_bitmap: vec![0u64; words],
            bytes_written: 0,
            updated_at: now_unix(),
            status: TransferStatus::Active,
        }
    }

    /// Number of chunks received so far (popcount of the bitmap).
    #[must_use]
    pub fn received_count(&self) -> u64 {
        self.received_bitmap
            .iter()
            .map(|w| w.count_ones() as u64)
            .sum()
    }

    /// Whether `index` has already been marked received.
    #[must_use]
    pub fn has_chunk(&self, index: u64) -> bool {
        let word = (index / 64) as usize;
        let bit = index % 64;
        self.received_bitmap
            .get(word)
            .is_some_and(|w| (w >> bit) & 1 == 1)
    }

    /// Mark `index` received, refresh `updated_at`. Idempotent.
    pub fn mark_received(&mut self, index: u64, chunk_len: u64) {
        let word = (index / 64) as usize;
        let bit = index % 64;
        if let Some(w) = self.received_bitmap.get_mut(word) {
            if (*w >> bit) & 1 == 0 {
                *w |= 1 << bit;
                self.bytes_written += chunk_len;
            }
        }
        self.updated_at = now_unix();
    }

    /// Ascending list of chunk indices not yet received.
    #[must_use]
    pub fn missing_chunks(&self) -> Vec<u64> {
        let mut missing = Vec::new();
        for (word_idx, &word) in self.received_bitmap.iter().enumerate() {
            if word == u64::MAX {
                continue;
            }
            let mut unset = !word;
            while unset != 0 {
                let bit = unset.trailing_zeros() as u64;
                let idx = (word_idx as u64) * 64 + bit;
                if idx < self.total_chunks {
                    missing.push(idx);
                }
                unset &= unset - 1;
            }
        }
        missing
    }

    /// Whether every chunk has been received.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.received_count() == self.total_chunks
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A point-in-time snapshot of assembly progress, returned by
/// `ChunkAssembler::get_progress`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblyProgress {
    /// Chunks received so far.
    pub received_count: u64,
    /// Total chunks expected.
    pub total_chunks: u64,
    /// Bytes written so far.
    pub bytes_written: u64,
    /// `received_count / total_chunks`, in `[0.0, 1.0]`.
    pub percentage: f64,
}

impl AssemblyProgress {
    /// Derive a progress snapshot from raw counters.
    #[must_use]
    pub fn new(received_count: u64, total_chunks: u64, bytes_written: u64) -> Self {
        let percentage = if total_chunks == 0 {
            1.0
        } else {
            received_count as f64 / total_chunks as f64
        };
        Self {
            received_count,
            total_chunks,
            bytes_written,
            percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_chunks_empty_file_is_one() {
        assert_eq!(FileMetadata::total_chunks_for(0, DEFAULT_CHUNK_SIZE), 1);
    }

    #[test]
    fn total_chunks_rounds_up() {
        assert_eq!(FileMetadata::total_chunks_for(300 * 1024, 256 * 1024), 2);
        assert_eq!(FileMetadata::total_chunks_for(256 * 1024, 256 * 1024), 1);
    }

    #[test]
    fn chunk_config_validate_rejects_out_of_range() {
        let mut cfg = ChunkConfig::default();
        cfg.chunk_size = 1024;
        assert!(cfg.validate().is_err());
        cfg.chunk_size = 32 * 1024 * 1024;
        assert!(cfg.validate().is_err());
        cfg.chunk_size = DEFAULT_CHUNK_SIZE;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn transfer_state_bitmap_consistency() {
        let id = Uuid::new_v4();
        let mut state = TransferState::new(id, "f.bin".into(), 10 * 4096, 10, [0u8; 32]);
        state.mark_received(0, 4096);
        state.mark_received(2, 4096);
        state.mark_received(5, 4096);
        assert_eq!(state.received_count(), 3);
        assert_eq!(state.bytes_written, 3 * 4096);
        assert_eq!(state.missing_chunks(), vec![1, 3, 4, 6, 7, 8, 9]);
        assert!(!state.is_complete());

        // Duplicate mark does not double-count bytes_written.
        state.mark_received(0, 4096);
        assert_eq!(state.bytes_written, 3 * 4096);
    }

    #[test]
    fn transfer_state_complete_when_all_received() {
        let id = Uuid::new_v4();
        let mut state = TransferState::new(id, "f.bin".into(), 2 * 10, 2, [0u8; 32]);
        state.mark_received(0, 10);
        state.mark_received(1, 10);
        assert!(state.is_complete());
        assert!(state.missing_chunks().is_empty());
    }
}
