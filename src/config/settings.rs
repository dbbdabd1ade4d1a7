//! Configuration settings for tillsync.
//!
//! Settings are loaded from `~/.tillsync/config.yaml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Paths;
use crate::error::SyncError;
use crate::output::OutputFormat;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Queue and orchestrator settings.
    pub sync: SyncConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output format.
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Queue and orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between periodic passes while online.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Priority given to items enqueued without one.
    #[serde(default = "default_priority")]
    pub default_priority: i32,
    /// Retry ceiling given to items enqueued without one.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// Backoff after the first transient failure, in seconds.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    /// Upper bound on backoff, in seconds.
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    /// Timeout applied to one processor call, in seconds.
    #[serde(default = "default_apply_timeout_secs")]
    pub apply_timeout_secs: u64,
    /// How long synced items are kept before cleanup, in hours.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,
    /// Buffered events per subscriber before it starts lagging.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

const fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_interval_secs() -> u64 {
    30
}

const fn default_priority() -> i32 {
    5
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_backoff_base_secs() -> u64 {
    5
}

const fn default_backoff_max_secs() -> u64 {
    300
}

const fn default_apply_timeout_secs() -> u64 {
    30
}

const fn default_retention_hours() -> i64 {
    24 * 7
}

const fn default_event_capacity() -> usize {
    64
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: default_output_format(),
            log_level: default_log_level(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            default_priority: default_priority(),
            default_max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_max_secs: default_backoff_max_secs(),
            apply_timeout_secs: default_apply_timeout_secs(),
            retention_hours: default_retention_hours(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SyncConfig {
    /// Interval between periodic passes.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Timeout for one processor call.
    #[must_use]
    pub const fn apply_timeout(&self) -> Duration {
        Duration::from_secs(self.apply_timeout_secs)
    }

    /// Retention window for synced items.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` if `retention_hours` is negative or too
    /// large to represent.
    pub fn retention(&self) -> Result<chrono::Duration, SyncError> {
        retention_window(self.retention_hours)
    }

    /// Reject values the orchestrator and cleanup cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` naming the first offending setting.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.interval_secs == 0 {
            return Err(SyncError::Config(
                "sync.interval_secs must be at least 1".to_string(),
            ));
        }
        self.retention().map(|_| ())
    }
}

/// Build a retention window of `hours`.
///
/// # Errors
///
/// Returns `SyncError::Config` if `hours` is negative or out of range.
pub fn retention_window(hours: i64) -> Result<chrono::Duration, SyncError> {
    if hours < 0 {
        return Err(SyncError::Config(
            "retention window must not be negative".to_string(),
        ));
    }
    chrono::Duration::try_hours(hours)
        .ok_or_else(|| SyncError::Config("retention window out of range".to_string()))
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, SyncError> {
        let paths = Paths::new()?;
        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, SyncError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            SyncError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })?;
        config.sync.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), SyncError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| SyncError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            SyncError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }
}
