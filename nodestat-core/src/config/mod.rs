//! Node configuration
//!
//! A [`NodeConfig`] is stored as TOML, by default in
//! `<config dir>/nodestat/config.toml`:
//!
//! ```toml
//! os_family = "linux"
//!
//! [target]
//! host = "gpu-box.local"
//! username = "ops"
//!
//! [watch]
//! interval_ms = 2000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::metrics::{GpuQuerySchema, OsFamily};
use crate::transport::SshTarget;

/// Default polling interval (milliseconds)
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Shortest polling interval accepted (milliseconds)
pub const MIN_INTERVAL_MS: u64 = 100;

const CONFIG_DIR_NAME: &str = "nodestat";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Polling scheduler settings (stored under `[watch]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Delay between polling cycles in milliseconds (default: 1000)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Delay before the first cycle; the interval when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,
    /// Stop after this many failed cycles in a row (at least 1); never
    /// when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_consecutive_failures: Option<u32>,
}

const fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            initial_delay_ms: None,
            max_consecutive_failures: None,
        }
    }
}

impl WatchSettings {
    /// Returns the interval, raised to at least [`MIN_INTERVAL_MS`]
    #[must_use]
    pub fn effective_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(MIN_INTERVAL_MS))
    }

    /// Returns the configured first-cycle delay, if any
    #[must_use]
    pub fn initial_delay(&self) -> Option<Duration> {
        self.initial_delay_ms.map(Duration::from_millis)
    }
}

/// Everything needed to build a [`crate::Node`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Command dialect
    #[serde(default)]
    pub os_family: OsFamily,
    /// Remote host
    #[serde(default)]
    pub target: SshTarget,
    /// Polling scheduler
    #[serde(default)]
    pub watch: WatchSettings,
    /// GPU query fields, in column order
    #[serde(default)]
    pub gpu_query: GpuQuerySchema,
}

impl NodeConfig {
    /// Creates a config for `target` with default settings
    #[must_use]
    pub fn new(target: SshTarget) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    /// Parses a TOML document without validating it
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or an invalid GPU
    /// query schema.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Serializes to TOML. The password is never written.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if serialization fails.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Reads and parses a config file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, or a parse
    /// error.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded node config");
        Ok(config)
    }

    /// Loads the default config file if it exists, or returns defaults
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but cannot be loaded.
    pub fn load_default() -> ConfigResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/nodestat/config.toml`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Checks values a parse cannot reject on its own
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty host, zero timeouts or a
    /// zero failure limit.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.target.host.trim().is_empty() {
            return Err(ConfigError::Invalid("target host is not set".into()));
        }
        if self.target.connect_timeout_secs == 0 || self.target.exec_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least 1 second".into()));
        }
        if self.watch.max_consecutive_failures == Some(0) {
            return Err(ConfigError::Invalid(
                "watch.max_consecutive_failures must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
