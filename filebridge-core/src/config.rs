//! Bridge configuration.
//!
//! Loaded from TOML or built in code. Every field except `files_dir` has a
//! default matching what the peer-side expert advisor expects.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating a [`BridgeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("files_dir is not set")]
    MissingFilesDir,

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Configuration for one bridge instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Root of the shared directory (the terminal's `MQL4/Files` or equivalent).
    pub files_dir: PathBuf,

    /// Sub-directory and file-name prefix, e.g. `DWX` -> `DWX/DWX_Orders.txt`.
    pub namespace: String,

    /// Sleep between two polls of a watched file.
    pub poll_interval_ms: u64,

    /// Upper bound of a random extra delay added to each poll sleep.
    pub poll_jitter_ms: u64,

    /// How long `send` keeps rescanning for a free command slot.
    pub max_retry_command_secs: u64,

    /// Number of rotating command slot files.
    pub command_slots: usize,

    /// Adopt the orders mirror as baseline on startup.
    pub restore_orders: bool,

    /// Quiet period after the startup `RESET_COMMAND_IDS` command.
    pub reset_quiet_period_ms: u64,

    /// Delay between launching the watchers and opening the readiness gate.
    pub start_settle_ms: u64,

    /// Log every added/removed order at info level.
    pub verbose: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            files_dir: PathBuf::new(),
            namespace: "DWX".to_string(),
            poll_interval_ms: 5,
            poll_jitter_ms: 0,
            max_retry_command_secs: 10,
            command_slots: 20,
            restore_orders: true,
            reset_quiet_period_ms: 500,
            start_settle_ms: 1000,
            verbose: true,
        }
    }
}

impl BridgeConfig {
    /// Default configuration rooted at `files_dir`.
    pub fn new(files_dir: impl Into<PathBuf>) -> Self {
        Self {
            files_dir: files_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Override the shared-directory root.
    pub fn with_files_dir(mut self, files_dir: impl Into<PathBuf>) -> Self {
        self.files_dir = files_dir.into();
        self
    }

    /// Check field values. Directory existence is checked at connect time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.files_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingFilesDir);
        }
        if self.namespace.is_empty() {
            return Err(invalid("namespace", "must not be empty"));
        }
        if self.namespace.contains(['/', '\\']) {
            return Err(invalid("namespace", "must not contain path separators"));
        }
        if matches!(self.namespace.as_str(), "." | "..") {
            return Err(invalid("namespace", "must name a directory below files_dir"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", "must be at least 1"));
        }
        if self.max_retry_command_secs == 0 {
            return Err(invalid("max_retry_command_secs", "must be at least 1"));
        }
        if self.command_slots == 0 {
            return Err(invalid("command_slots", "must be at least 1"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_jitter(&self) -> Duration {
        Duration::from_millis(self.poll_jitter_ms)
    }

    pub fn max_retry(&self) -> Duration {
        Duration::from_secs(self.max_retry_command_secs)
    }

    pub fn reset_quiet_period(&self) -> Duration {
        Duration::from_millis(self.reset_quiet_period_ms)
    }

    pub fn start_settle(&self) -> Duration {
        Duration::from_millis(self.start_settle_ms)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
