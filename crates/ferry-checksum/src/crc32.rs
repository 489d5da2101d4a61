//! CRC-32 (IEEE 802.3 polynomial) over chunk payloads.

use crc32fast::Hasher;

/// Compute the CRC-32 (IEEE 802.3) of a single buffer.
///
/// The CRC of an empty buffer is `0x0000_0000`, per the IEEE 802.3 definition
/// and the convention this crate's callers rely on for the empty-file edge
/// case.
#[must_use]
pub fn crc32_of(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Incremental CRC-32 accumulator, for callers that see a payload in pieces.
#[derive(Debug, Default, Clone)]
pub struct Crc32Hasher {
    inner: Hasher,
}

impl Crc32Hasher {
    /// Create a fresh accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Hasher::new(),
        }
    }

    /// Fold in another slice of bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Consume the accumulator and return the final CRC-32.
    #[must_use]
    pub fn finalize(self) -> u32 {
        self.inner.finalize()
    }
}
