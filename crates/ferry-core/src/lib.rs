//! # Ferry Core
//!
//! Core protocol types for the ferry file transfer engine.
//!
//! This crate provides:
//! - The fixed vocabulary of transfer ids, chunks and metadata
//! - Wire framing for the chunk frame and metadata control message
//! - The per-transfer state machine (idle/active/paused/cancelled/completed/failed)
//! - A fan-out event dispatcher isolating the transfer path from subscriber latency
//! - A stable error taxonomy shared by every other `ferry-*` crate
//! - Runtime configuration matching the environment options ferry recognizes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod types;
pub mod wire;

pub use error::{Error, Result};
pub use types::{Chunk, ChunkConfig, ChunkFlags, FileMetadata, TransferId, TransferState};
