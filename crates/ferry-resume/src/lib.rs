//! # Ferry Resume
//!
//! Durable journal + snapshot persistence for in-progress transfers.
//!
//! This crate provides:
//! - [`handler::ResumeHandler`] — the public save/load/list/remove/compact API
//! - [`journal`] — the append-structured record log and crash recovery
//! - [`snapshot`] — the atomically-rewritten full-state snapshot
//! - [`record`] — the on-disk record format shared by both

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod handler;
pub mod journal;
pub mod record;
pub mod snapshot;

pub use handler::ResumeHandler;
