//! Reassembles chunks into complete files.
//!
//! Tolerates out-of-order, duplicate, and partial chunk arrivals and
//! produces a byte-exact reconstructed file. One [`ChunkAssembler`] can
//! drive many concurrent transfers: the context map is guarded by a
//! readers-writer lock (read for lookup, write for insert/remove) and each
//! transfer's context has its own mutex, so distinct transfers never
//! contend with each other.

use ferry_checksum::StreamingSha256;
use ferry_core::error::{Error, Result};
use ferry_core::types::{AssemblyProgress, Chunk, FileMetadata, TransferId, TransferState};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

struct AssemblyContext {
    file: File,
    temp_path: PathBuf,
    final_path: PathBuf,
    chunk_size: u32,
    state: TransferState,
}

/// Reassembles one or more in-progress transfers into files under a shared
/// output directory.
pub struct ChunkAssembler {
    output_dir: PathBuf,
    contexts: RwLock<HashMap<TransferId, Arc<Mutex<AssemblyContext>>>>,
}

impl ChunkAssembler {
    /// Create an assembler writing finished files into `output_dir`.
    ///
    /// Does not create the directory; callers are expected to have
    /// provisioned it (matching [`crate::buffer_pool::BufferPool`]'s
    /// fail-fast-on-missing-resources style rather than silently creating
    /// directories on the caller's behalf).
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            contexts: RwLock::new(HashMap::new()),
        }
    }

    /// Begin a new assembly session: creates `<id>.part` in the output
    /// directory and pre-extends it to `meta.file_size`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if a session for `meta`'s transfer
    /// id is already active, or [`Error::Io`] if the temp file cannot be
    /// created or extended.
    pub fn start_session(&self, id: TransferId, meta: &FileMetadata) -> Result<()> {
        {
            let contexts = self.contexts.read().expect("contexts lock poisoned");
            if contexts.contains_key(&id) {
                return Err(Error::AlreadyExists(id.to_string()));
            }
        }

        let temp_path = self.output_dir.join(format!("{id}.part"));
        let final_path = self.output_dir.join(&meta.filename);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.set_len(meta.file_size)?;

        let state = TransferState::new(
            id,
            meta.filename.clone(),
            meta.file_size,
            meta.total_chunks,
            meta.sha256_hash,
        );
        let ctx = AssemblyContext {
            file,
            temp_path,
            final_path,
            chunk_size: meta.chunk_size,
            state,
        };

        let mut contexts = self.contexts.write().expect("contexts lock poisoned");
        contexts.insert(id, Arc::new(Mutex::new(ctx)));
        Ok(())
    }

    /// Process one incoming chunk, in the order mandated by the protocol:
    /// look up the session, validate index/offset, verify CRC-32, drop
    /// duplicates, then write and mark the bitmap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSession`] if no session exists for `chunk.id`,
    /// [`Error::InvalidChunkIndex`] if the index or offset is out of
    /// range, or [`Error::ChecksumMismatch`] if the CRC-32 does not match
    /// (the chunk is dropped without updating the bitmap so the sender can
    /// retransmit).
    pub fn process_chunk(&self, chunk: &Chunk) -> Result<AssemblyProgress> {
        let ctx_arc = self.get_context(chunk.id)?;
        let mut ctx = ctx_arc.lock().expect("context mutex poisoned");

        if chunk.index >= ctx.state.total_chunks {
            return Err(Error::InvalidChunkIndex(format!(
                "index {} >= total_chunks {}",
                chunk.index, ctx.state.total_chunks
            )));
        }
        let expected_offset = chunk.index * u64::from(ctx.chunk_size);
        if chunk.offset != expected_offset {
            return Err(Error::InvalidChunkIndex(format!(
                "chunk {} declares offset {} but expected {}",
                chunk.index, chunk.offset, expected_offset
            )));
        }

        if !chunk.verify_checksum() {
            tracing::warn!(transfer_id = %chunk.id, index = chunk.index, "dropping chunk with bad checksum");
            return Err(Error::ChecksumMismatch { index: chunk.index });
        }

        if ctx.state.has_chunk(chunk.index) {
            return Ok(AssemblyProgress::new(
                ctx.state.received_count(),
                ctx.state.total_chunks,
                ctx.state.bytes_written,
            ));
        }

        ctx.file.seek(SeekFrom::Start(chunk.offset))?;
        ctx.file.write_all(&chunk.data)?;
        ctx.state.mark_received(chunk.index, chunk.data.len() as u64);

        Ok(AssemblyProgress::new(
            ctx.state.received_count(),
            ctx.state.total_chunks,
            ctx.state.bytes_written,
        ))
    }

    /// Whether every chunk of `id` has been received.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSession`] if no session exists for `id`.
    pub fn is_complete(&self, id: TransferId) -> Result<bool> {
        let ctx = self.get_context(id)?;
        let ctx = ctx.lock().expect("context mutex poisoned");
        Ok(ctx.state.is_complete())
    }

    /// Ascending list of chunk indices not yet received.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSession`] if no session exists for `id`.
    pub fn missing_chunks(&self, id: TransferId) -> Result<Vec<u64>> {
        let ctx = self.get_context(id)?;
        let ctx = ctx.lock().expect("context mutex poisoned");
        Ok(ctx.state.missing_chunks())
    }

    /// Point-in-time progress snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSession`] if no session exists for `id`.
    pub fn get_progress(&self, id: TransferId) -> Result<AssemblyProgress> {
        let ctx = self.get_context(id)?;
        let ctx = ctx.lock().expect("context mutex poisoned");
        Ok(AssemblyProgress::new(
            ctx.state.received_count(),
            ctx.state.total_chunks,
            ctx.state.bytes_written,
        ))
    }

    /// Whether a session for `id` is currently active.
    #[must_use]
    pub fn has_session(&self, id: TransferId) -> bool {
        self.contexts
            .read()
            .expect("contexts lock poisoned")
            .contains_key(&id)
    }

    /// Abort and clean up a session without finalizing: closes the file
    /// handle and unlinks the temp file. Idempotent.
    pub fn cancel_session(&self, id: TransferId) {
        let removed = self
            .contexts
            .write()
            .expect("contexts lock poisoned")
            .remove(&id);
        if let Some(ctx) = removed {
            let ctx = ctx.lock().expect("context mutex poisoned");
            let _ = fs::remove_file(&ctx.temp_path);
        }
    }

    /// Finalize a completed session: sync to durable storage, recompute the
    /// SHA-256 of the reassembled file, verify it against `expected_hash`
    /// if given, and atomically rename the temp file to its final name
    /// (suffixing on a name collision).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSession`] if no session exists for `id`,
    /// [`Error::Incomplete`] if chunks are still missing,
    /// [`Error::HashMismatch`] if the recomputed hash disagrees with
    /// `expected_hash`, or [`Error::RenameFailed`] if the atomic rename
    /// fails.
    pub fn finalize(&self, id: TransferId, expected_hash: Option<[u8; 32]>) -> Result<PathBuf> {
        let ctx_arc = self.get_context(id)?;
        let (final_path, temp_path) = {
            let mut ctx = ctx_arc.lock().expect("context mutex poisoned");

            if !ctx.state.is_complete() {
                return Err(Error::Incomplete {
                    received: ctx.state.received_count(),
                    total: ctx.state.total_chunks,
                });
            }

            ctx.file.sync_all()?;
            ctx.file.seek(SeekFrom::Start(0))?;
            let actual_hash = StreamingSha256::hash_reader(&mut ctx.file)?;
            if let Some(expected) = expected_hash {
                if actual_hash != expected {
                    return Err(Error::HashMismatch {
                        expected: hex::encode(expected),
                        actual: hex::encode(actual_hash),
                    });
                }
            }

            (unique_path(&ctx.final_path), ctx.temp_path.clone())
        };

        fs::rename(&temp_path, &final_path).map_err(|e| {
            Error::RenameFailed(format!(
                "{} -> {}: {e}",
                temp_path.display(),
                final_path.display()
            ))
        })?;

        self.contexts.write().expect("contexts lock poisoned").remove(&id);
        tracing::info!(transfer_id = %id, path = %final_path.display(), "transfer finalized");
        Ok(final_path)
    }

    fn get_context(&self, id: TransferId) -> Result<Arc<Mutex<AssemblyContext>>> {
        self.contexts
            .read()
            .expect("contexts lock poisoned")
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NoSession(id.to_string()))
    }
}

/// If `path` already exists, suffix the file stem with `~1`, `~2`, ... until
/// a free name is found.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

    for n in 1u32.. {
        let candidate_name = match &ext {
            Some(ext) => format!("{stem}~{n}.{ext}"),
            None => format!("{stem}~{n}"),
        };
        let candidate = parent.join(candidate_name);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("exhausted u32 suffixes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::types::{ChunkConfig, ChunkFlags};
    use tempfile::tempdir;

    fn chunk_of(id: TransferId, index: u64, total_chunks: u64, data: &[u8], last: bool) -> Chunk {
        Chunk {
            id,
            index,
            total_chunks,
            offset: index * 256 * 1024,
            flags: if last { ChunkFlags::LAST_CHUNK } else { ChunkFlags::NONE },
            checksum: ferry_checksum::crc32_of(data),
            data: data.to_vec(),
        }
    }

    #[test]
    fn out_of_order_reassembly_is_byte_exact() {
        let dir = tempdir().unwrap();
        let assembler = ChunkAssembler::new(dir.path());
        let id = TransferId::new_v4();
        let part_a = vec![0x41u8; 256 * 1024];
        let part_b = vec![0x41u8; 300 * 1024 - 256 * 1024];
        let mut whole = part_a.clone();
        whole.extend_from_slice(&part_b);

        let meta = FileMetadata {
            filename: "payload.bin".into(),
            file_size: whole.len() as u64,
            chunk_size: 256 * 1024,
            total_chunks: 2,
            sha256_hash: StreamingSha256::hash_reader(&whole[..]).unwrap(),
        };
        assembler.start_session(id, &meta).unwrap();

        let c1 = chunk_of(id, 1, 2, &part_b, true);
        let c0 = chunk_of(id, 0, 2, &part_a, false);
        assembler.process_chunk(&c1).unwrap();
        assert!(!assembler.is_complete(id).unwrap());
        assembler.process_chunk(&c0).unwrap();
        assert!(assembler.is_complete(id).unwrap());
        assert!(assembler.missing_chunks(id).unwrap().is_empty());

        let path = assembler.finalize(id, Some(meta.sha256_hash)).unwrap();
        let contents = fs::read(&path).unwrap();
        assert_eq!(contents, whole);
    }

    #[test]
    fn duplicate_chunk_is_dropped_idempotently() {
        let dir = tempdir().unwrap();
        let assembler = ChunkAssembler::new(dir.path());
        let id = TransferId::new_v4();
        let data = vec![0x11u8; 10];
        let meta = FileMetadata {
            filename: "one.bin".into(),
            file_size: data.len() as u64,
            chunk_size: 256 * 1024,
            total_chunks: 1,
            sha256_hash: StreamingSha256::hash_reader(&data[..]).unwrap(),
        };
        assembler.start_session(id, &meta).unwrap();
        let c0 = chunk_of(id, 0, 1, &data, true);
        assembler.process_chunk(&c0).unwrap();
        let progress = assembler.process_chunk(&c0).unwrap();
        assert_eq!(progress.received_count, 1);
    }

    #[test]
    fn corrupted_crc_is_rejected_without_marking_bitmap() {
        let dir = tempdir().unwrap();
        let assembler = ChunkAssembler::new(dir.path());
        let id = TransferId::new_v4();
        let data = vec![0x22u8; 10];
        let meta = FileMetadata {
            filename: "two.bin".into(),
            file_size: data.len() as u64,
            chunk_size: 256 * 1024,
            total_chunks: 1,
            sha256_hash: [0u8; 32],
        };
        assembler.start_session(id, &meta).unwrap();

        let mut bad = chunk_of(id, 0, 1, &data, true);
        bad.checksum ^= 0xFFFF_FFFF;
        assert!(assembler.process_chunk(&bad).is_err());
        assert_eq!(assembler.missing_chunks(id).unwrap(), vec![0]);
    }

    #[test]
    fn finalize_rejects_incomplete_transfer() {
        let dir = tempdir().unwrap();
        let assembler = ChunkAssembler::new(dir.path());
        let id = TransferId::new_v4();
        let meta = FileMetadata {
            filename: "incomplete.bin".into(),
            file_size: 10,
            chunk_size: 256 * 1024,
            total_chunks: 1,
            sha256_hash: [0u8; 32],
        };
        assembler.start_session(id, &meta).unwrap();
        assert!(assembler.finalize(id, None).is_err());
        assert!(assembler.has_session(id));
    }

    #[test]
    fn finalize_rejects_hash_mismatch() {
        let dir = tempdir().unwrap();
        let assembler = ChunkAssembler::new(dir.path());
        let id = TransferId::new_v4();
        let data = vec![0x33u8; 10];
        let meta = FileMetadata {
            filename: "three.bin".into(),
            file_size: data.len() as u64,
            chunk_size: 256 * 1024,
            total_chunks: 1,
            sha256_hash: [0u8; 32],
        };
        assembler.start_session(id, &meta).unwrap();
        let c0 = chunk_of(id, 0, 1, &data, true);
        assembler.process_chunk(&c0).unwrap();
        let err = assembler.finalize(id, Some([0xAA; 32])).unwrap_err();
        assert!(matches!(err, Error::HashMismatch { .. }));
    }

    #[test]
    fn finalize_suffixes_on_name_collision() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("dup.bin"), b"already here").unwrap();

        let assembler = ChunkAssembler::new(dir.path());
        let id = TransferId::new_v4();
        let data = vec![0x55u8; 8];
        let meta = FileMetadata {
            filename: "dup.bin".into(),
            file_size: data.len() as u64,
            chunk_size: 256 * 1024,
            total_chunks: 1,
            sha256_hash: StreamingSha256::hash_reader(&data[..]).unwrap(),
        };
        assembler.start_session(id, &meta).unwrap();
        let c0 = chunk_of(id, 0, 1, &data, true);
        assembler.process_chunk(&c0).unwrap();
        let path = assembler.finalize(id, Some(meta.sha256_hash)).unwrap();
        assert_ne!(path, dir.path().join("dup.bin"));
        assert!(path.to_string_lossy().contains("dup~1"));
    }

    #[test]
    fn cancel_session_removes_temp_file() {
        let dir = tempdir().unwrap();
        let assembler = ChunkAssembler::new(dir.path());
        let id = TransferId::new_v4();
        let meta = FileMetadata {
            filename: "gone.bin".into(),
            file_size: 10,
            chunk_size: 256 * 1024,
            total_chunks: 1,
            sha256_hash: [0u8; 32],
        };
        assembler.start_session(id, &meta).unwrap();
        let temp_path = dir.path().join(format!("{id}.part"));
        assert!(temp_path.exists());
        assembler.cancel_session(id);
        assert!(!temp_path.exists());
        assert!(!assembler.has_session(id));
        assembler.cancel_session(id); // idempotent
    }

    #[test]
    fn unknown_session_is_rejected() {
        let dir = tempdir().unwrap();
        let assembler = ChunkAssembler::new(dir.path());
        let data = vec![0u8; 4];
        let c0 = chunk_of(TransferId::new_v4(), 0, 1, &data, true);
        assert!(matches!(
            assembler.process_chunk(&c0),
            Err(Error::NoSession(_))
        ));
    }

    #[allow(dead_code)]
    fn _uses_chunk_config(_: ChunkConfig) {}
}
