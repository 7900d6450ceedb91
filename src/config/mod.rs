//! Configuration file support.
//!
//! Settings come from three layers, lowest priority first: built-in defaults,
//! an optional TOML file, and command-line flags. The file is either the
//! path given with `--config` or `.progmon.toml` in the working directory.
//!
//! ```toml
//! [display]
//! bar_width = 60
//!
//! [timing]
//! tick_ms = 100
//! poll_ms = 200
//! done_wait_secs = 3.0
//! wait = "notify"
//!
//! [patterns]
//! done_pattern = "Billings calculated in"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::extract::DEFAULT_DONE_PATTERN;
use crate::render::{DEFAULT_BAR_WIDTH, MAX_BAR_WIDTH};
use crate::source::WaitStrategy;

/// Config file looked up in the working directory when no path is given.
pub const CONFIG_FILE: &str = ".progmon.toml";

/// Error loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Error reading the config file from disk.
    #[error("Failed to read config file {}: {source}", path.display())]
    ReadError {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Error parsing the config file TOML.
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("Invalid config value for {key}: {reason}")]
    InvalidValue {
        /// Dotted key of the offending value.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Display settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Progress bar width in cells.
    pub bar_width: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            bar_width: DEFAULT_BAR_WIDTH,
        }
    }
}

/// Timing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Render loop tick in milliseconds.
    pub tick_ms: u64,
    /// Follow-mode poll interval in milliseconds.
    pub poll_ms: u64,
    /// Grace period after completion before `monitor` exits, in seconds.
    pub done_wait_secs: f64,
    /// How followed files wait for new data.
    pub wait: WaitStrategy,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            poll_ms: 200,
            done_wait_secs: 3.0,
            wait: WaitStrategy::Poll,
        }
    }
}

impl TimingConfig {
    /// Render tick as a duration.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    /// Grace period as a duration.
    pub fn done_wait(&self) -> Duration {
        Duration::from_secs_f64(self.done_wait_secs)
    }
}

/// Pattern settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    /// Regex marking the monitored job as finished.
    pub done_pattern: String,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            done_pattern: DEFAULT_DONE_PATTERN.to_string(),
        }
    }
}

/// Root of `.progmon.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Display settings.
    pub display: DisplayConfig,
    /// Timing settings.
    pub timing: TimingConfig,
    /// Pattern settings.
    pub patterns: PatternsConfig,
}

impl MonitorConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `.progmon.toml` is used if
    /// present, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::ReadError {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: MonitorConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display.bar_width == 0 {
            return Err(ConfigError::InvalidValue {
                key: "display.bar_width",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.display.bar_width > MAX_BAR_WIDTH {
            return Err(ConfigError::InvalidValue {
                key: "display.bar_width",
                reason: format!(
                    "must be at most {MAX_BAR_WIDTH}, got {}",
                    self.display.bar_width
                ),
            });
        }
        if self.timing.tick_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timing.tick_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.timing.poll_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timing.poll_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        let wait = self.timing.done_wait_secs;
        if !wait.is_finite() || wait < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "timing.done_wait_secs",
                reason: format!("must be a non-negative number of seconds, got {wait}"),
            });
        }
        Ok(())
    }
}
