//! Resume engine configuration, stored as `resume.toml` in the user config dir.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::paths::AppPaths;

const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine {what} directory")]
    MissingDirectory { what: &'static str },

    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeConfig {
    /// Delay between the attach preconditions settling and the status check.
    pub settle_delay_ms: u64,

    /// Override for the cursor file location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_file: Option<PathBuf>,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            cursor_file: None,
        }
    }
}

impl ResumeConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        AppPaths::resume_config().ok_or(ConfigError::MissingDirectory { what: "config" })
    }

    /// Resolve where cursors are persisted.
    pub fn cursor_file_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.cursor_file {
            Some(path) => Ok(path.clone()),
            None => AppPaths::default_cursor_file()
                .ok_or(ConfigError::MissingDirectory { what: "data" }),
        }
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`, returning defaults when the file is missing or unparsable.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse resume config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}
