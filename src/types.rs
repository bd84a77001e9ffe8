//! Core data types used throughout the aggregation engine
//!
//! # Key Types
//!
//! - **`DataPoint`**: A single measurement of one series (timestamp + value)
//! - **`Value`**: A typed value (boolean, integer, floating point or text)
//! - **`TimeRange`**: Half-open query range `[start, end)`
//! - **`IntervalSpec`**: Window length and sliding step
//! - **`Window`**: One planned aggregation window
//!
//! # Example
//!
//! ```rust
//! use kuba_window::types::{DataPoint, IntervalSpec, TimeRange};
//!
//! let point = DataPoint::new(1, 1.1);
//! assert_eq!(point.timestamp, 1);
//!
//! let range = TimeRange::new(1, 30).unwrap();
//! assert!(range.contains(1));
//! assert!(!range.contains(30));
//!
//! // Sliding step defaults to the interval
//! let spec = IntervalSpec::new(3, None);
//! assert_eq!(spec.sliding_step, 3);
//! ```

use crate::error::ParameterError;
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Declared type of a series column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    /// true / false
    Boolean,
    /// 64-bit signed integer
    Integer,
    /// IEEE 754 double
    Float,
    /// UTF-8 text
    Text,
}

impl DataType {
    /// Whether values of this type participate in numeric aggregates
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }

    /// Whether a value may appear in a column of this type
    ///
    /// Integers widen into float columns; every other kind must match exactly.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value.data_type()) {
            (DataType::Float, DataType::Integer) => true,
            (expected, found) => *expected == found,
        }
    }

    /// Parse a type name, accepting the common storage aliases
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "BOOLEAN" | "BOOL" => Some(DataType::Boolean),
            "INTEGER" | "INT" | "INT32" | "INT64" | "LONG" => Some(DataType::Integer),
            "FLOAT" | "DOUBLE" => Some(DataType::Float),
            "TEXT" | "STRING" => Some(DataType::Text),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Integer => "INTEGER",
            DataType::Float => "FLOAT",
            DataType::Text => "TEXT",
        };
        f.write_str(name)
    }
}

/// A typed value carried by a data point or produced by an aggregate
///
/// Serializes as a bare JSON scalar. Non-finite floats are written as the
/// strings `"NaN"`, `"inf"` and `"-inf"` so they stay distinct from the
/// `null` of an empty window; they read back as `Text`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Text value
    Text(String),
}

impl Value {
    /// Type of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::Text(_) => DataType::Text,
        }
    }

    /// Whether this value is numeric
    pub fn is_numeric(&self) -> bool {
        self.data_type().is_numeric()
    }

    /// Widen a numeric value to f64
    ///
    /// Returns `None` for booleans and text.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Boolean(_) | Value::Text(_) => None,
        }
    }

    /// Compare two values of compatible types
    ///
    /// Numeric values compare after widening, so `Integer(3)` equals
    /// `Float(3.0)`. Mismatched kinds and NaN are incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Boolean(v) => serializer.serialize_bool(*v),
            Value::Integer(v) => serializer.serialize_i64(*v),
            Value::Float(v) if v.is_finite() => serializer.serialize_f64(*v),
            Value::Float(v) => serializer.collect_str(v),
            Value::Text(v) => serializer.serialize_str(v),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            // Debug keeps the decimal point on whole numbers ("0.0", not "0")
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// A single data point of one series
///
/// Within one series' stream timestamps are strictly ascending and unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Timestamp in the configured precision
    pub timestamp: i64,

    /// Measured value
    pub value: Value,
}

impl DataPoint {
    /// Create a new data point
    pub fn new(timestamp: i64, value: impl Into<Value>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

/// Half-open time range `[start, end)` for a windowed query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive)
    pub start: i64,

    /// End timestamp (exclusive)
    pub end: i64,
}

impl TimeRange {
    /// Create a new time range, rejecting empty or inverted ranges
    ///
    /// ```rust
    /// use kuba_window::types::TimeRange;
    ///
    /// assert!(TimeRange::new(1, 30).is_ok());
    /// assert!(TimeRange::new(30, 30).is_err());
    /// ```
    pub fn new(start: i64, end: i64) -> Result<Self, ParameterError> {
        if start >= end {
            return Err(ParameterError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Create a range without validation
    ///
    /// The validator still rejects the range before any planning happens.
    pub fn new_unchecked(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Check if a timestamp falls within `[start, end)`
    #[inline]
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Length of the range in timestamp units
    ///
    /// Returns `None` if the subtraction overflows.
    pub fn duration(&self) -> Option<i64> {
        self.end.checked_sub(self.start)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Window schedule: window length and the distance between window starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntervalSpec {
    /// Length of every window
    pub interval: i64,

    /// Distance between consecutive window starts
    pub sliding_step: i64,
}

impl IntervalSpec {
    /// Create a schedule; an omitted sliding step defaults to the interval
    pub fn new(interval: i64, sliding_step: Option<i64>) -> Self {
        Self {
            interval,
            sliding_step: sliding_step.unwrap_or(interval),
        }
    }

    /// Gapless schedule with `sliding_step == interval`
    pub fn tumbling(interval: i64) -> Self {
        Self::new(interval, None)
    }

    /// Schedule with an explicit sliding step
    pub fn sliding(interval: i64, sliding_step: i64) -> Self {
        Self::new(interval, Some(sliding_step))
    }

    /// Whether consecutive windows touch with no gap
    pub fn is_tumbling(&self) -> bool {
        self.interval == self.sliding_step
    }

    /// Time between the end of one window and the start of the next
    pub fn gap(&self) -> i64 {
        self.sliding_step.saturating_sub(self.interval)
    }
}

impl fmt::Display for IntervalSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_tumbling() {
            write!(f, "{}", self.interval)
        } else {
            write!(f, "{}, {}", self.interval, self.sliding_step)
        }
    }
}

/// One planned aggregation window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// Zero-based ordinal in the plan
    pub index: usize,

    /// Start timestamp (inclusive), used as the output row label
    pub start: i64,

    /// End timestamp (exclusive), clipped to the range end
    pub end: i64,
}

impl Window {
    /// Check if a timestamp falls within this window
    #[inline]
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Length of this window (shorter than the interval for a clipped last window)
    pub fn duration(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_float_serialized_as_string() {
        let json = serde_json::to_string(&vec![
            Some(Value::Float(f64::NAN)),
            Some(Value::Float(f64::INFINITY)),
            Some(Value::Float(f64::NEG_INFINITY)),
            None,
            Some(Value::Float(2.5)),
        ])
        .unwrap();
        assert_eq!(json, r#"["NaN","inf","-inf",null,2.5]"#);
    }

    #[test]
    fn test_value_widening() {
        assert_eq!(Value::Integer(11).as_f64(), Some(11.0));
        assert_eq!(Value::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::Boolean(true).as_f64(), None);
        assert_eq!(Value::from("x").as_f64(), None);
    }

    #[test]
    fn test_value_compare_across_numeric_kinds() {
        assert_eq!(
            Value::Integer(3).compare(&Value::Float(3.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Float(3.3).compare(&Value::Integer(3)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Boolean(true).compare(&Value::Integer(1)), None);
        assert_eq!(Value::Float(f64::NAN).compare(&Value::Float(1.0)), None);
    }

    #[test]
    fn test_value_display_keeps_decimal_point() {
        assert_eq!(Value::Float(0.0).to_string(), "0.0");
        assert_eq!(Value::Float(6.6).to_string(), "6.6");
        assert_eq!(Value::Integer(3).to_string(), "3");
        assert_eq!(Value::Boolean(false).to_string(), "false");
    }

    #[test]
    fn test_time_range_is_half_open() {
        let range = TimeRange::new(1, 30).unwrap();
        assert!(range.contains(1));
        assert!(range.contains(29));
        assert!(!range.contains(30));
        assert_eq!(range.duration(), Some(29));
    }

    #[test]
    fn test_time_range_rejects_empty() {
        assert_eq!(
            TimeRange::new(5, 5),
            Err(ParameterError::InvalidRange { start: 5, end: 5 })
        );
        assert!(TimeRange::new(6, 5).is_err());
    }

    #[test]
    fn test_interval_spec_defaults() {
        let spec = IntervalSpec::new(3, None);
        assert!(spec.is_tumbling());
        assert_eq!(spec.gap(), 0);

        let spec = IntervalSpec::sliding(3, 5);
        assert!(!spec.is_tumbling());
        assert_eq!(spec.gap(), 2);
        assert_eq!(spec.to_string(), "3, 5");
    }

    #[test]
    fn test_data_type_accepts() {
        assert!(DataType::Float.accepts(&Value::Float(1.5)));
        assert!(DataType::Float.accepts(&Value::Integer(2)));
        assert!(!DataType::Integer.accepts(&Value::Float(2.0)));
        assert!(!DataType::Float.accepts(&Value::from("oops")));
        assert!(!DataType::Text.accepts(&Value::Boolean(true)));
        assert!(DataType::Text.accepts(&Value::from("ok")));
    }

    #[test]
    fn test_data_type_parse_aliases() {
        assert_eq!(DataType::parse("double"), Some(DataType::Float));
        assert_eq!(DataType::parse("INT32"), Some(DataType::Integer));
        assert_eq!(DataType::parse("bool"), Some(DataType::Boolean));
        assert_eq!(DataType::parse("blob"), None);
    }
}
