//! Configuration loading for bidsync-client.
//!
//! Configuration is loaded from a TOML file (default: `bidsync.toml`). Every
//! field has a default, so an empty file is a valid configuration.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use sync_core::ThrottlePolicy;

use crate::retry::RetryPolicy;

/// Root configuration for the sync controller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Session, aggregate list and permission lookups.
    #[serde(default = "default_bootstrap")]
    pub bootstrap: CallConfig,
    /// Per-aggregate nested detail fetches.
    #[serde(default = "default_detail")]
    pub detail: CallConfig,
    /// Bids, contacts and status taxonomy.
    #[serde(default = "default_collections")]
    pub collections: CallConfig,
    /// Remote writes issued by mutations.
    #[serde(default = "default_writes")]
    pub writes: CallConfig,
    /// Outbound integration throttling.
    #[serde(default)]
    pub external_sync: ExternalSyncConfig,
}

/// Deadline and retry settings for one class of remote call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallConfig {
    /// Per-attempt deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Base backoff delay in milliseconds, doubled per retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl CallConfig {
    /// The retry policy described by this section.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            retries: self.retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

/// Outbound integration throttling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExternalSyncConfig {
    /// Minimum spacing between calls per aggregate, in seconds (default: 60).
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Window in which identical requests are dropped, in seconds (default: 15).
    #[serde(default = "default_dedupe_window_secs")]
    pub dedupe_window_secs: u64,
}

impl ExternalSyncConfig {
    /// The throttle policy described by this section.
    pub fn policy(&self) -> ThrottlePolicy {
        ThrottlePolicy {
            cooldown: Duration::from_secs(self.cooldown_secs),
            dedupe_window: Duration::from_secs(self.dedupe_window_secs),
        }
    }
}

impl Default for ExternalSyncConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            dedupe_window_secs: default_dedupe_window_secs(),
        }
    }
}

// Default value functions
fn default_timeout_ms() -> u64 {
    15_000
}

fn default_retries() -> u32 {
    1
}

fn default_base_delay_ms() -> u64 {
    300
}

fn default_bootstrap() -> CallConfig {
    CallConfig {
        timeout_ms: 12_000,
        retries: 1,
        base_delay_ms: default_base_delay_ms(),
    }
}

fn default_detail() -> CallConfig {
    CallConfig {
        timeout_ms: default_timeout_ms(),
        retries: default_retries(),
        base_delay_ms: default_base_delay_ms(),
    }
}

fn default_collections() -> CallConfig {
    default_detail()
}

fn default_writes() -> CallConfig {
    CallConfig {
        timeout_ms: default_timeout_ms(),
        retries: 0,
        base_delay_ms: default_base_delay_ms(),
    }
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_dedupe_window_secs() -> u64 {
    15
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bootstrap: default_bootstrap(),
            detail: default_detail(),
            collections: default_collections(),
            writes: default_writes(),
            external_sync: ExternalSyncConfig::default(),
        }
    }
}

impl ClientConfig {
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
