//! Tuning configuration for sync-server.
//!
//! Unlike [`options`](crate::options), which resolves network settings from
//! explicit values, flags and environment, these knobs are loaded from a
//! TOML file (default: `server.toml`) and rarely change per deployment.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for sync-server.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Per-session timing limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Garbage-collection task configuration.
    #[serde(default)]
    pub gc: GcConfig,
}

/// Per-session timing limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Seconds a fresh connection may sit without a handshake frame
    /// (default: 10). Idle connections are closed.
    #[serde(default = "default_hello_timeout_secs")]
    pub hello_timeout_secs: u64,
    /// Seconds the authentication hook may take (default: 10). Exceeding
    /// it counts as a failed authentication.
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
    /// Milliseconds a superseded (zombie) session is kept open so in-flight
    /// acknowledgements can drain (default: 500).
    #[serde(default = "default_zombie_grace_ms")]
    pub zombie_grace_ms: u64,
}

/// Garbage-collection task configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GcConfig {
    /// Collection interval in seconds (default: 60).
    #[serde(default = "default_gc_interval")]
    pub interval_secs: u64,
    /// Enable the periodic collection task (default: true). Opportunistic
    /// collection after mutations runs regardless.
    #[serde(default = "default_gc_enabled")]
    pub enabled: bool,
}

fn default_hello_timeout_secs() -> u64 {
    10
}

fn default_auth_timeout_secs() -> u64 {
    10
}

fn default_zombie_grace_ms() -> u64 {
    500
}

fn default_gc_interval() -> u64 {
    60
}

fn default_gc_enabled() -> bool {
    true
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            hello_timeout_secs: default_hello_timeout_secs(),
            auth_timeout_secs: default_auth_timeout_secs(),
            zombie_grace_ms: default_zombie_grace_ms(),
        }
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_gc_interval(),
            enabled: default_gc_enabled(),
        }
    }
}

impl LimitsConfig {
    /// Handshake wait as a [`Duration`].
    pub fn hello_timeout(&self) -> Duration {
        Duration::from_secs(self.hello_timeout_secs)
    }

    /// Authentication wait as a [`Duration`].
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    /// Zombie grace delay as a [`Duration`].
    pub fn zombie_grace(&self) -> Duration {
        Duration::from_millis(self.zombie_grace_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
