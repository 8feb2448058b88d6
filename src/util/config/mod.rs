//! fiberloom configuration
//!
//! One TOML file with a `[scheduler]` and a `[log]` section. Every key is
//! optional.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (FIBERLOOM_LOG)
//! 3. Config file (--config)
//! 4. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use fiberloom::util::config::Config;
//!
//! let config: Config = toml::from_str("[log]\nlevel = \"debug\"").unwrap();
//! assert_eq!(config.scheduler.frame_interval_ms, 5);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::SchedulerConfig;
use crate::util::logger::LogLevel;

/// Environment variable overriding `log.level`.
pub const LOG_ENV: &str = "FIBERLOOM_LOG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Scheduler time slicing and timeouts
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Logging
    #[serde(default)]
    pub log: LogConfig,
}

/// Log configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid FIBERLOOM_LOG value: {0}")]
    InvalidLevel(String),
}

impl Config {
    /// Apply environment overrides.
    pub fn with_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(level) = std::env::var(LOG_ENV) {
            self.apply_log_override(&level)?;
        }
        Ok(self)
    }

    fn apply_log_override(
        &mut self,
        level: &str,
    ) -> Result<(), ConfigError> {
        self.log.level = level.parse().map_err(ConfigError::InvalidLevel)?;
        Ok(())
    }
}

/// Parse configuration text.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load configuration from `path`.
/// Returns default config if the file doesn't exist
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}
