//! Query Engine for windowed GROUP BY aggregation
//!
//! This module turns a time range and a window schedule into one row per
//! window, with one aggregate value per requested function:
//! - Parameter validation before any point is read
//! - A lazy window plan shared by every column
//! - A single forward pass over each ascending point source
//! - Pluggable aggregate functions and predicates
//!
//! # Architecture
//!
//! ```text
//! GROUP BY ([start, end), interval[, sliding_step])
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Parse     │  clause text → TimeRange + IntervalSpec
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Validate   │  interval > 0, step >= interval, window limit
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Plan      │  window k = [start + k*step, start + k*step + interval)
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │ Aggregate   │  cursor per column, empty windows still emitted
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Format     │  JSON, CSV, table
//! └─────────────┘
//! ```
//!
//! # Failures
//!
//! A source error or a value that does not fit the column type aborts the
//! whole query. [`WindowAggregator`] is an iterator of `Result` rows; it may
//! yield completed rows before the error, and those rows must be treated as
//! invalid. [`WindowAggregator::run`] and [`GroupByExecutor::execute`] never
//! return them.
//!
//! # Example
//!
//! ```rust
//! use kuba_window::query::{GroupByExecutor, GroupByQuery, InMemoryCatalog};
//! use kuba_window::types::{DataPoint, DataType, IntervalSpec, TimeRange};
//!
//! let catalog = InMemoryCatalog::new().with_series(
//!     "cpu",
//!     DataType::Float,
//!     (0..10).map(|t| DataPoint::new(t, t as f64)).collect(),
//! );
//!
//! let query = GroupByQuery::new(TimeRange::new(0, 10).unwrap(), IntervalSpec::tumbling(5))
//!     .column("cpu", &["count", "avg"]);
//!
//! let result = GroupByExecutor::new(catalog).execute(&query).unwrap();
//! assert_eq!(result.timestamps(), vec![0, 5]);
//! ```

pub mod aggregator;
pub mod executor;
pub mod functions;
pub mod parser;
pub mod planner;
pub mod predicate;
pub mod result;
pub mod source;
pub mod validator;

// Re-export main types
pub use aggregator::{aggregate_stream, AggregateResult, RunStats, WindowAggregator};
pub use executor::{
    ColumnRequest, ExecutorConfig, GroupByExecutor, GroupByQuery, InMemoryCatalog, SeriesCatalog,
};
pub use functions::{Accumulator, AggregateFunction, FunctionRegistry};
pub use parser::{parse_group_by, parse_where, GroupByClause};
pub use planner::{WindowPlan, Windows};
pub use predicate::{Predicate, PredicateFilter, PredicateOp};
pub use result::{GroupByResult, ResultFormat, ResultMetadata, ResultRow};
pub use source::{IterPointSource, PointSource, VecPointSource};
pub use validator::{validate, window_count, ParameterValidator};
