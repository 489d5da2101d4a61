//! Streaming SHA-256 over a whole file, for end-to-end integrity.

use sha2::{Digest, Sha256};
use std::io::{self, Read};

/// A 32-byte SHA-256 digest.
pub type Sha256Digest = [u8; 32];

/// Incremental SHA-256 hasher.
///
/// The splitter uses this once, during `calculate_metadata`, to hash the
/// whole source file without buffering it; the assembler uses it again
/// during `finalize` to recompute the hash of the reassembled file.
#[derive(Default)]
pub struct StreamingSha256 {
    inner: Sha256,
}

impl StreamingSha256 {
    /// Create a fresh hasher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// Fold in another slice of bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Consume the hasher and return the final digest.
    #[must_use]
    pub fn finalize(self) -> Sha256Digest {
        self.inner.finalize().into()
    }

    /// Hash a `Read` stream to completion, in fixed-size chunks, without
    /// loading the whole stream into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from `reader` fails.
    pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<Sha256Digest> {
        let mut hasher = Self::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize())
    }
}
