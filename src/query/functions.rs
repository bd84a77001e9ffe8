//! Aggregate function registry
//!
//! Every aggregate is described by the same three capabilities:
//!
//! - `init()` creates fresh per-window state
//! - `accumulate()` folds one qualifying value into the state
//! - `finalize()` turns the state into a value, or `None` (null)
//!
//! The window aggregator only ever talks to this contract, so new functions
//! are added by registering them here.
//!
//! Built-ins:
//! - `count`: number of qualifying points, any column type
//! - `sum`: total widened to f64, `0.0` for an empty window
//! - `avg`: `sum / count`, null for an empty window
//! - `min_value` / `max_value`: numeric extremes, null for an empty window
//! - `first_value` / `last_value`: earliest / latest value, any column type

use crate::error::TypeError;
use crate::types::{DataType, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Function Contract
// ============================================================================

/// Description of an aggregate function
pub trait AggregateFunction: Send + Sync + fmt::Debug {
    /// Name used in queries and result headers
    fn name(&self) -> &str;

    /// Whether the function can aggregate columns of this type
    fn supports(&self, data_type: DataType) -> bool;

    /// Create fresh state for one window
    fn init(&self) -> Box<dyn Accumulator>;
}

/// Per-window running state of one aggregate function
pub trait Accumulator: Send + fmt::Debug {
    /// Fold one qualifying value into the state
    ///
    /// Values arrive in ascending timestamp order within a window.
    fn accumulate(&mut self, timestamp: i64, value: &Value);

    /// Produce the window's result; `None` is null
    fn finalize(&self) -> Option<Value>;
}

// ============================================================================
// Built-in Functions
// ============================================================================

/// `count`: number of qualifying points
#[derive(Debug, Clone, Copy, Default)]
pub struct Count;

#[derive(Debug, Default)]
struct CountState(u64);

impl AggregateFunction for Count {
    fn name(&self) -> &str {
        "count"
    }

    fn supports(&self, _data_type: DataType) -> bool {
        true
    }

    fn init(&self) -> Box<dyn Accumulator> {
        Box::new(CountState::default())
    }
}

impl Accumulator for CountState {
    fn accumulate(&mut self, _timestamp: i64, _value: &Value) {
        self.0 += 1;
    }

    fn finalize(&self) -> Option<Value> {
        Some(Value::Integer(self.0 as i64))
    }
}

/// `sum`: total of qualifying values, widened to f64
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

#[derive(Debug, Default)]
struct SumState(f64);

impl AggregateFunction for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn supports(&self, data_type: DataType) -> bool {
        data_type.is_numeric()
    }

    fn init(&self) -> Box<dyn Accumulator> {
        Box::new(SumState::default())
    }
}

impl Accumulator for SumState {
    #[inline]
    fn accumulate(&mut self, _timestamp: i64, value: &Value) {
        if let Some(v) = value.as_f64() {
            self.0 += v;
        }
    }

    fn finalize(&self) -> Option<Value> {
        Some(Value::Float(self.0))
    }
}

/// `avg`: arithmetic mean, null when the window has no qualifying points
#[derive(Debug, Clone, Copy, Default)]
pub struct Avg;

#[derive(Debug, Default)]
struct AvgState {
    sum: f64,
    count: u64,
}

impl AggregateFunction for Avg {
    fn name(&self) -> &str {
        "avg"
    }

    fn supports(&self, data_type: DataType) -> bool {
        data_type.is_numeric()
    }

    fn init(&self) -> Box<dyn Accumulator> {
        Box::new(AvgState::default())
    }
}

impl Accumulator for AvgState {
    #[inline]
    fn accumulate(&mut self, _timestamp: i64, value: &Value) {
        if let Some(v) = value.as_f64() {
            self.sum += v;
            self.count += 1;
        }
    }

    fn finalize(&self) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        Some(Value::Float(self.sum / self.count as f64))
    }
}

/// `min_value` / `max_value`: numeric extremes
///
/// The result keeps the column's numeric kind. NaN values are skipped.
#[derive(Debug, Clone, Copy)]
pub struct Extreme {
    name: &'static str,
    keep: Ordering,
}

impl Extreme {
    /// Smallest value in the window
    pub const fn min() -> Self {
        Self {
            name: "min_value",
            keep: Ordering::Less,
        }
    }

    /// Largest value in the window
    pub const fn max() -> Self {
        Self {
            name: "max_value",
            keep: Ordering::Greater,
        }
    }
}

#[derive(Debug)]
struct ExtremeState {
    keep: Ordering,
    best: Option<Value>,
}

impl AggregateFunction for Extreme {
    fn name(&self) -> &str {
        self.name
    }

    fn supports(&self, data_type: DataType) -> bool {
        data_type.is_numeric()
    }

    fn init(&self) -> Box<dyn Accumulator> {
        Box::new(ExtremeState {
            keep: self.keep,
            best: None,
        })
    }
}

impl Accumulator for ExtremeState {
    fn accumulate(&mut self, _timestamp: i64, value: &Value) {
        if value.as_f64().map_or(true, f64::is_nan) {
            return;
        }
        let replace = match &self.best {
            None => true,
            Some(best) => value.compare(best) == Some(self.keep),
        };
        if replace {
            self.best = Some(value.clone());
        }
    }

    fn finalize(&self) -> Option<Value> {
        self.best.clone()
    }
}

/// `first_value` / `last_value`: earliest or latest qualifying value
#[derive(Debug, Clone, Copy)]
pub struct Positional {
    name: &'static str,
    last: bool,
}

impl Positional {
    /// Earliest value in the window
    pub const fn first() -> Self {
        Self {
            name: "first_value",
            last: false,
        }
    }

    /// Latest value in the window
    pub const fn last() -> Self {
        Self {
            name: "last_value",
            last: true,
        }
    }
}

#[derive(Debug)]
struct PositionalState {
    last: bool,
    value: Option<Value>,
}

impl AggregateFunction for Positional {
    fn name(&self) -> &str {
        self.name
    }

    fn supports(&self, _data_type: DataType) -> bool {
        true
    }

    fn init(&self) -> Box<dyn Accumulator> {
        Box::new(PositionalState {
            last: self.last,
            value: None,
        })
    }
}

impl Accumulator for PositionalState {
    fn accumulate(&mut self, _timestamp: i64, value: &Value) {
        // Input is ascending, so the first arrival is the earliest
        if self.last || self.value.is_none() {
            self.value = Some(value.clone());
        }
    }

    fn finalize(&self) -> Option<Value> {
        self.value.clone()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Name-keyed set of aggregate functions
///
/// Lookups are case-insensitive. Cloning is cheap; functions are shared.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn AggregateFunction>>,
}

impl FunctionRegistry {
    /// Create a registry with no functions
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Create a registry with all built-in functions
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Count));
        registry.register(Arc::new(Sum));
        registry.register(Arc::new(Avg));
        registry.register(Arc::new(Extreme::min()));
        registry.register(Arc::new(Extreme::max()));
        registry.register(Arc::new(Positional::first()));
        registry.register(Arc::new(Positional::last()));
        registry
    }

    /// Register a function, returning any function it replaced
    pub fn register(
        &mut self,
        function: Arc<dyn AggregateFunction>,
    ) -> Option<Arc<dyn AggregateFunction>> {
        self.functions
            .insert(function.name().to_ascii_lowercase(), function)
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn AggregateFunction>, TypeError> {
        self.functions
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| TypeError::UnknownFunction(name.to_string()))
    }

    /// Look up several functions, failing on the first unknown name
    pub fn resolve<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<Arc<dyn AggregateFunction>>, TypeError> {
        names.iter().map(|name| self.get(name.as_ref())).collect()
    }

    /// Whether a function is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============================================================================
// Tests
// ============================================================================
