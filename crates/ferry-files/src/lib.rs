//! # Ferry Files
//!
//! Chunk splitting and reassembly for the ferry file transfer engine.
//!
//! This crate provides:
//! - [`splitter::ChunkSplitter`] — splits a file into checksummed chunks,
//!   streamed via a move-only [`splitter::ChunkCursor`]
//! - [`assembler::ChunkAssembler`] — reassembles chunks into a byte-exact
//!   file, tolerating out-of-order, duplicate, and partial arrivals, across
//!   many concurrent transfers
//! - [`buffer_pool::BufferPool`] — optional lock-free buffer reuse for
//!   high-throughput chunking

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod buffer_pool;
pub mod splitter;

pub use assembler::ChunkAssembler;
pub use buffer_pool::BufferPool;
pub use splitter::{ChunkCursor, ChunkSplitter};
