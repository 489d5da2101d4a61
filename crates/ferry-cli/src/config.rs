//! CLI-level configuration: the shared [`RuntimeConfig`] plus the
//! filesystem locations the CLI itself needs (state directory for resume
//! persistence).

use ferry_core::config::RuntimeConfig;
use ferry_core::error::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Everything `ferry-cli` needs beyond the library's own [`RuntimeConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chunking, quota, and resume-cadence options shared with every crate.
    pub runtime: RuntimeConfig,
    /// Directory holding `snapshot.dat`/`journal.log` for resumable
    /// transfers.
    pub state_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            state_dir: default_state_dir(),
        }
    }
}

impl Config {
    /// The conventional config file location: `~/.config/ferry/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ferry")
            .join("config.toml")
    }

    /// Load from an explicit TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ferry_core::error::Error::Io`] if `path` cannot be read, or
    /// [`ferry_core::error::Error::InvalidConfig`] if it is not valid TOML
    /// for this shape.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| ferry_core::error::Error::InvalidConfig(format!("{}: {e}", path.display())))
    }

    /// Load from [`Self::default_path`] if it exists, environment
    /// overrides applied on top either way, falling back to defaults
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ferry_core::error::Error::InvalidConfig`] if the file
    /// exists but is malformed, or an environment override fails to parse.
    pub fn load_or_default() -> Result<Self> {
        let mut config = if Self::default_path().exists() {
            Self::load(&Self::default_path())?
        } else {
            Self::default()
        };
        config.runtime = config.runtime.apply_env_overrides()?;
        Ok(config)
    }

    /// Validate the embedded [`RuntimeConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ferry_core::error::Error::InvalidConfig`] if any option is
    /// out of range.
    pub fn validate(&self) -> Result<()> {
        self.runtime.validate()
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ferry")
        .join("state")
}
