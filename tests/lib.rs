//! Shared helpers for the integration test binaries in this crate.

use ferry_core::types::{ChunkConfig, FileMetadata, TransferId};
use ferry_files::splitter::ChunkSplitter;
use std::path::Path;

/// Write `data` to a fresh temp file and return the splitter/assembler
/// metadata for it, using `chunk_size` as the chunking boundary.
pub fn write_and_describe(dir: &Path, name: &str, data: &[u8], chunk_size: u32) -> (std::path::PathBuf, FileMetadata) {
    let path = dir.join(name);
    std::fs::write(&path, data).expect("write temp fixture");
    let splitter = ChunkSplitter::new(ChunkConfig {
        chunk_size,
        verify_crc32: true,
    })
    .expect("valid chunk config");
    let meta = splitter.calculate_metadata(&path).expect("calculate metadata");
    (path, meta)
}

/// Split `path` into every chunk, in order, using `chunk_size`.
pub fn split_all(path: &Path, id: TransferId, chunk_size: u32) -> Vec<ferry_core::types::Chunk> {
    let splitter = ChunkSplitter::new(ChunkConfig {
        chunk_size,
        verify_crc32: true,
    })
    .expect("valid chunk config");
    let mut cursor = splitter.split(path, id).expect("open file for splitting");
    let mut chunks = Vec::new();
    while let Some(chunk) = cursor.next().expect("read chunk") {
        chunks.push(chunk);
    }
    chunks
}
