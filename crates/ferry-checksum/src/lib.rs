//! # Ferry Checksum
//!
//! Checksum primitives for the ferry file transfer engine.
//!
//! This crate provides:
//! - CRC-32 (IEEE 802.3) over a single chunk's payload, for fast per-chunk
//!   corruption detection
//! - Streaming SHA-256 over a whole file, for end-to-end integrity
//!   verification

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crc32;
pub mod sha256;

pub use crc32::crc32_of;
pub use sha256::{Sha256Digest, StreamingSha256};
