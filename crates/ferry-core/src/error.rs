//! The stable error taxonomy shared by every `ferry-*` crate.

use thiserror::Error;

/// Errors that can occur anywhere in the ferry transfer engine.
#[derive(Debug, Error)]
pub enum Error {
    // -- Input errors -----------------------------------------------------
    /// A chunk's index or offset did not match the transfer it claims to
    /// belong to.
    #[error("invalid chunk index: {0}")]
    InvalidChunkIndex(String),

    /// Chunking or runtime configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An illegal transfer-controller state transition was requested.
    #[error("invalid state transition: {0}")]
    InvalidState(String),

    // -- I/O errors ---------------------------------------------------------
    /// The source file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The source or destination file could not be opened due to permissions.
    #[error("file access denied: {0}")]
    FileAccessDenied(String),

    /// A read returned fewer bytes than expected (e.g. concurrent truncation).
    #[error("file read error: {0}")]
    FileReadError(String),

    /// A write to the assembled or persisted file failed.
    #[error("file write error: {0}")]
    FileWriteError(String),

    /// The atomic rename from temp file to final destination failed.
    #[error("rename failed: {0}")]
    RenameFailed(String),

    /// Generic I/O failure not covered by a more specific variant.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Integrity errors -----------------------------------------------------
    /// A chunk's CRC-32 did not match its payload. Recoverable: the sender
    /// is expected to retransmit.
    #[error("checksum mismatch for chunk {index}")]
    ChecksumMismatch {
        /// Index of the offending chunk.
        index: u64,
    },

    /// The reassembled file's SHA-256 did not match the expected hash.
    /// Fatal for the transfer.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Hex-encoded expected digest.
        expected: String,
        /// Hex-encoded actual digest.
        actual: String,
    },

    // -- Resource errors ------------------------------------------------------
    /// Admission would exceed the configured storage quota even after
    /// evicting every evictable object.
    #[error("quota exceeded: need {needed} bytes, have {available} available")]
    QuotaExceeded {
        /// Bytes required to admit the incoming object.
        needed: u64,
        /// Bytes available after maximal eviction.
        available: u64,
    },

    /// A file exceeds the configured per-file maximum size.
    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge {
        /// Size of the rejected file.
        size: u64,
        /// Configured per-file limit.
        limit: u64,
    },

    /// No assembly session or resume state exists for the given transfer id.
    #[error("no session for transfer {0}")]
    NoSession(String),

    /// A chunk or object key already has an active session / already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    // -- Resume / persistence errors -------------------------------------------
    /// `ResumeHandler::load` found no record for the requested id.
    #[error("resume state not found: {0}")]
    NotFound(String),

    /// A persisted record failed its CRC check and was discarded.
    #[error("corrupt resume record: {0}")]
    Corrupt(String),

    // -- Transport errors -----------------------------------------------------
    /// Surfaced verbatim from the pluggable transport; ferry does not
    /// interpret transport-layer failures.
    #[error("transport error: {0}")]
    Transport(String),

    /// Assembly was asked to finalize before every chunk arrived.
    #[error("incomplete transfer: {received}/{total} chunks received")]
    Incomplete {
        /// Chunks received so far.
        received: u64,
        /// Total chunks expected.
        total: u64,
    },
}

/// Result type used throughout the ferry workspace.
pub type Result<T> = std::result::Result<T, Error>;
