//! Kuba Window - time-windowed GROUP BY aggregation for time series
//!
//! This library evaluates `GROUP BY ([start, end), interval[, sliding_step])`
//! queries over ascending point sources:
//! - Tumbling and sliding windows, with gaps between windows
//! - count, sum and avg plus pluggable aggregate functions
//! - Empty windows reported as rows (count 0, sum 0.0, avg null)
//! - Parameter validation before any data is read
//! - Predicates applied only to points that fall inside a window

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Windowed aggregation engine
/// Provides validation, window planning, per-column aggregation and result formatting
pub mod query;

// Re-export main types
pub use config::{Config, TimestampPrecision};
pub use error::{Error, ErrorKind, ExecutionError, ParameterError, Result, TypeError};
pub use query::{
    GroupByExecutor, GroupByQuery, GroupByResult, InMemoryCatalog, Predicate, WindowAggregator,
    WindowPlan,
};
pub use types::{DataPoint, DataType, IntervalSpec, TimeRange, Value, Window};
