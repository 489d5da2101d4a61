//! Runtime configuration recognized by the ferry transfer engine.
//!
//! Every field here corresponds to an environment-recognized option; values
//! can be loaded from a TOML file, overridden by `FERRY_*` environment
//! variables, or taken from [`RuntimeConfig::default`].

use crate::error::{Error, Result};
use crate::types::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Eviction policy used by the storage manager once the configured quota
/// is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the least-recently-accessed object first.
    Lru,
    /// Evict the least-frequently-accessed object first.
    Lfu,
    /// Evict the oldest-stored object first.
    Fifo,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::Lru
    }
}

impl std::str::FromStr for EvictionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "lfu" => Ok(Self::Lfu),
            "fifo" => Ok(Self::Fifo),
            other => Err(Error::InvalidConfig(format!(
                "unknown eviction policy '{other}', expected one of lru, lfu, fifo"
            ))),
        }
    }
}

/// Every tunable the engine recognizes, with defaults matching the
/// documented spec values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Chunk size in bytes, 4 KiB..=16 MiB.
    pub chunk_size: u32,
    /// Maximum number of concurrent transfers accepted.
    pub max_connections: u32,
    /// Per-file size ceiling in bytes.
    pub max_file_size: u64,
    /// Aggregate storage quota in bytes.
    pub storage_quota: u64,
    /// Eviction policy applied once the quota is exceeded.
    pub eviction_policy: EvictionPolicy,
    /// Flush the resume journal to a snapshot every N chunks.
    pub resume_flush_every_chunks: u32,
    /// Flush the resume journal to a snapshot at least this often, in ms.
    pub resume_flush_interval_ms: u32,
    /// Whether to verify per-chunk CRC-32 on receipt.
    pub verify_crc32: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_connections: 100,
            max_file_size: u64::MAX,
            storage_quota: u64::MAX,
            eviction_policy: EvictionPolicy::default(),
            resume_flush_every_chunks: 64,
            resume_flush_interval_ms: 5000,
            verify_crc32: true,
        }
    }
}

impl RuntimeConfig {
    /// Load from a TOML file, falling back to defaults for any field the
    /// file omits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("reading config file {}: {e}", path.display()))
        })?;
        toml::from_str(&text)
            .map_err(|e| Error::InvalidConfig(format!("parsing config file {}: {e}", path.display())))
    }

    /// Apply `FERRY_*` environment variable overrides on top of `self`.
    ///
    /// Recognized variables: `FERRY_CHUNK_SIZE`, `FERRY_MAX_CONNECTIONS`,
    /// `FERRY_MAX_FILE_SIZE`, `FERRY_STORAGE_QUOTA`, `FERRY_EVICTION_POLICY`,
    /// `FERRY_RESUME_FLUSH_EVERY_CHUNKS`, `FERRY_RESUME_FLUSH_INTERVAL_MS`,
    /// `FERRY_VERIFY_CRC32`. Unset variables leave the existing value
    /// untouched; a set-but-unparsable variable is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a set environment variable fails
    /// to parse as its field's type.
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_var("FERRY_CHUNK_SIZE")? {
            self.chunk_size = v;
        }
        if let Some(v) = env_var("FERRY_MAX_CONNECTIONS")? {
            self.max_connections = v;
        }
        if let Some(v) = env_var("FERRY_MAX_FILE_SIZE")? {
            self.max_file_size = v;
        }
        if let Some(v) = env_var("FERRY_STORAGE_QUOTA")? {
            self.storage_quota = v;
        }
        if let Ok(raw) = std::env::var("FERRY_EVICTION_POLICY") {
            self.eviction_policy = raw.parse()?;
        }
        if let Some(v) = env_var("FERRY_RESUME_FLUSH_EVERY_CHUNKS")? {
            self.resume_flush_every_chunks = v;
        }
        if let Some(v) = env_var("FERRY_RESUME_FLUSH_INTERVAL_MS")? {
            self.resume_flush_interval_ms = v;
        }
        if let Some(v) = env_var("FERRY_VERIFY_CRC32")? {
            self.verify_crc32 = v;
        }
        Ok(self)
    }

    /// Load defaults, a TOML file if provided, then environment overrides.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::InvalidConfig`] from [`Self::from_file`] or
    /// [`Self::apply_env_overrides`].
    pub fn load(file: Option<impl AsRef<Path>>) -> Result<Self> {
        let base = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.apply_env_overrides()
    }

    /// Reject out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `chunk_size` is outside
    /// `MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE`, or `max_connections` is zero.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {} outside valid range {MIN_CHUNK_SIZE}..={MAX_CHUNK_SIZE}",
                self.chunk_size
            )));
        }
        if self.max_connections == 0 {
            return Err(Error::InvalidConfig("max_connections must be nonzero".into()));
        }
        Ok(())
    }
}

fn env_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::InvalidConfig(format!("{name}={raw}: {e}"))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => {
            Err(Error::InvalidConfig(format!("{name} is not valid unicode")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(cfg.max_connections, 100);
        assert_eq!(cfg.eviction_policy, EvictionPolicy::Lru);
        assert_eq!(cfg.resume_flush_every_chunks, 64);
        assert_eq!(cfg.resume_flush_interval_ms, 5000);
        assert!(cfg.verify_crc32);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn from_file_fills_only_provided_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferry.toml");
        std::fs::write(&path, "chunk_size = 8192\neviction_policy = \"fifo\"\n").unwrap();

        let cfg = RuntimeConfig::from_file(&path).unwrap();
        assert_eq!(cfg.chunk_size, 8192);
        assert_eq!(cfg.eviction_policy, EvictionPolicy::Fifo);
        assert_eq!(cfg.max_connections, 100);
    }

    #[test]
    fn validate_rejects_chunk_size_out_of_range() {
        let mut cfg = RuntimeConfig::default();
        cfg.chunk_size = 100;
        assert!(cfg.validate().is_err());

        cfg.chunk_size = MAX_CHUNK_SIZE + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn eviction_policy_parses_case_insensitively() {
        assert_eq!("LRU".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Lru);
        assert_eq!("lfu".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Lfu);
        assert!("bogus".parse::<EvictionPolicy>().is_err());
    }
}
