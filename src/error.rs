//! Error types for windowed aggregation queries

use crate::types::DataType;
use std::fmt;
use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed range or window schedule
    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    /// Aggregate requested against an incompatible column
    #[error("Type error: {0}")]
    Type(#[from] TypeError),

    /// Point source failed while producing points
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Clause or predicate text could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse(message.into())
    }

    /// Category of this error for programmatic handling
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parameter(_) => ErrorKind::Parameter,
            Error::Type(_) => ErrorKind::Type,
            Error::Execution(_) => ErrorKind::Execution,
            Error::Parse(_) => ErrorKind::Parse,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

/// Parameter errors
///
/// Raised before planning or scanning. No rows are ever produced for a query
/// that fails with one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    /// Interval length is zero or negative
    #[error("Invalid interval: {interval} must be greater than 0")]
    InvalidInterval {
        /// The rejected interval length
        interval: i64,
    },

    /// Sliding step is shorter than the interval, windows would overlap
    #[error("Sliding step {sliding_step} is smaller than interval {interval}")]
    SlidingStepTooSmall {
        /// Interval length
        interval: i64,
        /// The rejected sliding step
        sliding_step: i64,
    },

    /// Time range is empty or inverted
    #[error("Invalid time range: start {start} must be less than end {end}")]
    InvalidRange {
        /// Start timestamp (inclusive)
        start: i64,
        /// End timestamp (exclusive)
        end: i64,
    },

    /// Schedule would produce more windows than the configured limit
    #[error("Too many windows: {windows} exceeds limit of {limit}")]
    TooManyWindows {
        /// Number of windows the schedule would produce
        windows: u128,
        /// Configured maximum
        limit: usize,
    },
}

/// Type errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// Function cannot aggregate values of the column's declared type
    #[error("Aggregate function {function} does not support {data_type} columns")]
    UnsupportedAggregateType {
        /// Function name
        function: String,
        /// Declared column type
        data_type: DataType,
    },

    /// No function is registered under the requested name
    #[error("Unknown aggregate function: {0}")]
    UnknownFunction(String),
}

/// Execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Point source reported a failure
    #[error("Point source failed for {series}: {message}")]
    SourceFailed {
        /// Series the source was reading
        series: String,
        /// Description of the failure
        message: String,
    },

    /// Source produced a value that does not fit the column's declared type
    #[error("Value at {timestamp} is {found}, column is declared {expected}")]
    ValueTypeMismatch {
        /// Timestamp of the offending point
        timestamp: i64,
        /// Declared column type
        expected: DataType,
        /// Type of the value actually read
        found: DataType,
    },

    /// Requested series does not exist in the catalog
    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    /// IO error raised by a source backed by a file or socket
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutionError {
    /// Create a source failure
    pub fn source_failed(series: impl Into<String>, message: impl Into<String>) -> Self {
        ExecutionError::SourceFailed {
            series: series.into(),
            message: message.into(),
        }
    }
}

/// Categories of errors, used for metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Parameter validation failed
    Parameter,
    /// Incompatible or unknown aggregate
    Type,
    /// Point source failed
    Execution,
    /// Clause text could not be parsed
    Parse,
    /// Invalid configuration
    Configuration,
    /// IO failure outside a point source
    Io,
}

impl ErrorKind {
    /// Stable lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Parameter => "parameter",
            ErrorKind::Type => "type",
            ErrorKind::Execution => "execution",
            ErrorKind::Parse => "parse",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
