//! Splits a file into checksummed chunks for streaming transfer.
//!
//! [`ChunkSplitter::split`] returns a [`ChunkCursor`], a move-only iterator
//! that reads the file sequentially without loading it into memory.

use crate::buffer_pool::BufferPool;
use ferry_checksum::{crc32_of, StreamingSha256};
use ferry_core::error::{Error, Result};
use ferry_core::types::{Chunk, ChunkConfig, ChunkFlags, FileMetadata, TransferId};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

/// Splits files into chunks according to a fixed [`ChunkConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkSplitter {
    config: ChunkConfig,
}

impl ChunkSplitter {
    /// Build a splitter using the given chunk configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` fails validation.
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration this splitter uses.
    #[must_use]
    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// Open `file_path` and return a cursor that reads it chunk by chunk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if the file does not exist, or
    /// [`Error::Io`] for other I/O failures.
    pub fn split(&self, file_path: impl AsRef<Path>, id: TransferId) -> Result<ChunkCursor> {
        let file_path = file_path.as_ref();
        let file = File::open(file_path).map_err(|e| open_error(file_path, e))?;
        let file_size = file.metadata()?.len();
        let total_chunks = FileMetadata::total_chunks_for(file_size, self.config.chunk_size);
        tracing::debug!(transfer_id = %id, file_size, total_chunks, "opened file for splitting");

        Ok(ChunkCursor {
            file,
            config: self.config,
            id,
            file_size,
            total_chunks,
            current_index: 0,
            buffer_pool: None,
        })
    }

    /// Compute [`FileMetadata`] for `file_path` without retaining any chunk
    /// state: streams the whole file once to derive `file_size` and the
    /// SHA-256 digest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if the file does not exist, or
    /// [`Error::Io`] for other I/O failures.
    pub fn calculate_metadata(&self, file_path: impl AsRef<Path>) -> Result<FileMetadata> {
        let file_path = file_path.as_ref();
        let mut file = File::open(file_path).map_err(|e| open_error(file_path, e))?;
        let file_size = file.metadata()?.len();
        let sha256_hash = StreamingSha256::hash_reader(&mut file)?;
        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(FileMetadata {
            filename,
            file_size,
            chunk_size: self.config.chunk_size,
            total_chunks: FileMetadata::total_chunks_for(file_size, self.config.chunk_size),
            sha256_hash,
        })
    }
}

fn open_error(path: &Path, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::FileNotFound(path.display().to_string())
    } else if e.kind() == std::io::ErrorKind::PermissionDenied {
        Error::FileAccessDenied(path.display().to_string())
    } else {
        Error::Io(e)
    }
}

/// Move-only, sequential reader over one file's chunks.
///
/// Not `Clone`: a cursor owns the open file handle and its position, so
/// duplicating it would silently diverge two readers over the same file.
pub struct ChunkCursor {
    file: File,
    config: ChunkConfig,
    id: TransferId,
    file_size: u64,
    total_chunks: u64,
    current_index: u64,
    buffer_pool: Option<BufferPool>,
}

impl ChunkCursor {
    /// Attach a buffer pool; subsequent `next()` calls acquire chunk
    /// buffers from it instead of allocating fresh `Vec`s.
    pub fn set_buffer_pool(&mut self, pool: BufferPool) {
        self.buffer_pool = Some(pool);
    }

    /// 0-based index of the next chunk `next()` will return.
    #[must_use]
    pub fn current_index(&self) -> u64 {
        self.current_index
    }

    /// Total number of chunks this file splits into.
    #[must_use]
    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    /// Size of the file being split, in bytes.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Whether another call to `next()` would return a chunk.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.current_index < self.total_chunks
    }

    /// Read, checksum and return the next chunk, or `None` once exhausted.
    ///
    /// Sets `flags.last_chunk` on the final chunk. An empty file yields
    /// exactly one empty chunk before exhausting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the underlying read fails or returns fewer
    /// bytes than the chunk boundary requires.
    pub fn next(&mut self) -> Result<Option<Chunk>> {
        if self.current_index >= self.total_chunks {
            return Ok(None);
        }

        let index = self.current_index;
        let offset = index * u64::from(self.config.chunk_size);
        let remaining = self.file_size.saturating_sub(offset);
        let chunk_len = remaining.min(u64::from(self.config.chunk_size)) as usize;

        let mut buffer = match &self.buffer_pool {
            Some(pool) => {
                let mut buf = pool.acquire();
                buf.resize(chunk_len, 0);
                buf
            }
            None => vec![0u8; chunk_len],
        };
        self.file.seek(std::io::SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buffer)?;

        let flags = if index + 1 == self.total_chunks {
            ChunkFlags::LAST_CHUNK
        } else {
            ChunkFlags::NONE
        };
        let checksum = crc32_of(&buffer);

        self.current_index += 1;

        Ok(Some(Chunk {
            id: self.id,
            index,
            total_chunks: self.total_chunks,
            offset,
            flags,
            checksum,
            data: buffer,
        }))
    }

    /// Return a chunk buffer to the attached pool, if any; otherwise drop it.
    pub fn release(&self, buffer: Vec<u8>) {
        if let Some(pool) = &self.buffer_pool {
            pool.release(buffer);
        }
    }
}
