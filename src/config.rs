//! Configuration management for windowed queries
//!
//! TOML file support, environment variable overrides and defaults.
//!
//! ```toml
//! [query]
//! timestamp_precision = "ms"
//! max_windows = 1000000
//! parallel_columns = true
//!
//! [monitoring]
//! metrics_enabled = true
//! log_level = "info"
//! ```

use crate::error::{Error, Result};
use crate::query::validator::ParameterValidator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Query execution settings
    #[serde(default)]
    pub query: QueryConfig,

    /// Monitoring and observability
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Query execution configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Unit of stored timestamps, used to convert clause durations and datetimes
    #[serde(default)]
    pub timestamp_precision: TimestampPrecision,

    /// Maximum windows per query (0 = unlimited)
    #[serde(default = "default_max_windows")]
    pub max_windows: usize,

    /// Aggregate independent columns on the rayon pool
    #[serde(default = "default_true")]
    pub parallel_columns: bool,

    /// Row cap applied when a query sets no limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_limit: Option<usize>,
}

/// Monitoring configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Record Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Timestamp unit of the stored series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum TimestampPrecision {
    /// Milliseconds since the epoch
    #[default]
    #[serde(rename = "ms")]
    Milliseconds,
    /// Microseconds since the epoch
    #[serde(rename = "us")]
    Microseconds,
    /// Nanoseconds since the epoch
    #[serde(rename = "ns")]
    Nanoseconds,
}

impl TimestampPrecision {
    /// Nanoseconds in one timestamp unit
    pub fn nanos_per_unit(&self) -> i64 {
        match self {
            TimestampPrecision::Milliseconds => 1_000_000,
            TimestampPrecision::Microseconds => 1_000,
            TimestampPrecision::Nanoseconds => 1,
        }
    }

    /// Short unit name
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampPrecision::Milliseconds => "ms",
            TimestampPrecision::Microseconds => "us",
            TimestampPrecision::Nanoseconds => "ns",
        }
    }
}

impl fmt::Display for TimestampPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimestampPrecision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ms" | "millisecond" | "milliseconds" => Ok(TimestampPrecision::Milliseconds),
            "us" | "microsecond" | "microseconds" => Ok(TimestampPrecision::Microseconds),
            "ns" | "nanosecond" | "nanoseconds" => Ok(TimestampPrecision::Nanoseconds),
            other => Err(Error::Configuration(format!(
                "Unknown timestamp precision '{}', expected ms, us or ns",
                other
            ))),
        }
    }
}

// Default value functions
fn default_max_windows() -> usize {
    10_000_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timestamp_precision: TimestampPrecision::default(),
            max_windows: default_max_windows(),
            parallel_columns: true,
            default_limit: None,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Malformed values are rejected rather than silently ignored.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(precision) = std::env::var("WINDOW_TIMESTAMP_PRECISION") {
            self.query.timestamp_precision = precision.parse()?;
        }
        if let Ok(max_windows) = std::env::var("WINDOW_MAX_WINDOWS") {
            self.query.max_windows = max_windows.trim().parse().map_err(|_| {
                Error::Configuration(format!("Invalid WINDOW_MAX_WINDOWS: {}", max_windows))
            })?;
        }
        if let Ok(parallel) = std::env::var("WINDOW_PARALLEL_COLUMNS") {
            self.query.parallel_columns = parse_bool(&parallel).ok_or_else(|| {
                Error::Configuration(format!("Invalid WINDOW_PARALLEL_COLUMNS: {}", parallel))
            })?;
        }

        // Monitoring
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.monitoring.log_level = log_level;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.query.default_limit == Some(0) {
            return Err(Error::Configuration(
                "default_limit must be > 0 when set".to_string(),
            ));
        }

        if self.monitoring.log_level.trim().is_empty() {
            return Err(Error::Configuration("Log level cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Parameter validator carrying the configured window limit
    pub fn validator(&self) -> ParameterValidator {
        ParameterValidator::new().with_max_windows(self.query.max_windows)
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents).map_err(|e| {
            Error::Configuration(format!(
                "Failed to write config file {}: {}",
                path.display(),
                e
            ))
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
