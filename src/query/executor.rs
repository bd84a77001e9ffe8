//! Query Executor - runs a whole GROUP BY query
//!
//! ```text
//! GroupByQuery
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Validate   │  range, interval, window limit
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │    Plan     │  one WindowPlan, shared read-only
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Resolve    │  functions, type checks, open sources
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │ Aggregate   │  one WindowAggregator per column (rayon)
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │    Join     │  rows keyed by window start
//! └─────────────┘
//! ```
//!
//! Everything that can be rejected without data is rejected before any
//! source is read. A failing column fails the whole query with no rows.

use crate::config::{Config, TimestampPrecision};
use crate::error::{ExecutionError, Result};
use crate::metrics;
use crate::query::aggregator::{AggregateResult, RunStats, WindowAggregator};
use crate::query::functions::{AggregateFunction, FunctionRegistry};
use crate::query::parser::{parse_group_by, GroupByClause};
use crate::query::planner::WindowPlan;
use crate::query::predicate::PredicateFilter;
use crate::query::result::{GroupByResult, ResultRow};
use crate::query::source::{PointSource, VecPointSource};
use crate::query::validator::ParameterValidator;
use crate::types::{DataPoint, DataType, IntervalSpec, TimeRange};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

// ============================================================================
// Query Description
// ============================================================================

/// Aggregates requested over one series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRequest {
    /// Series name in the catalog
    pub series: String,

    /// Aggregate function names, in output order
    pub functions: Vec<String>,
}

impl ColumnRequest {
    /// Create a column request
    pub fn new<S: AsRef<str>>(series: impl Into<String>, functions: &[S]) -> Self {
        Self {
            series: series.into(),
            functions: functions.iter().map(|f| f.as_ref().to_string()).collect(),
        }
    }
}

/// A complete GROUP BY query
#[derive(Clone)]
pub struct GroupByQuery {
    /// Query range `[start, end)`
    pub range: TimeRange,

    /// Window schedule
    pub interval: IntervalSpec,

    /// Requested columns
    pub columns: Vec<ColumnRequest>,

    /// Optional filter applied to in-window points of every column
    pub predicate: Option<Arc<dyn PredicateFilter>>,

    /// Maximum rows to return
    pub limit: Option<usize>,

    /// Rows to skip before returning any
    pub offset: usize,
}

impl GroupByQuery {
    /// Create a query with no columns
    pub fn new(range: TimeRange, interval: IntervalSpec) -> Self {
        Self {
            range,
            interval,
            columns: Vec::new(),
            predicate: None,
            limit: None,
            offset: 0,
        }
    }

    /// Create a query from a parsed clause
    pub fn from_clause(clause: GroupByClause) -> Self {
        Self::new(clause.range, clause.interval)
    }

    /// Parse `GROUP BY ([start, end), interval[, step])` into a query
    pub fn parse(clause: &str, precision: TimestampPrecision) -> Result<Self> {
        Ok(Self::from_clause(parse_group_by(clause, precision)?))
    }

    /// Add a column
    pub fn column<S: AsRef<str>>(mut self, series: impl Into<String>, functions: &[S]) -> Self {
        self.columns.push(ColumnRequest::new(series, functions));
        self
    }

    /// Filter points before aggregation
    pub fn with_predicate(mut self, predicate: impl PredicateFilter + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Set result limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set result offset
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

impl fmt::Debug for GroupByQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupByQuery")
            .field("range", &self.range)
            .field("interval", &self.interval)
            .field("columns", &self.columns)
            .field("has_predicate", &self.predicate.is_some())
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

// ============================================================================
// Series Catalog
// ============================================================================

/// Resolves series names to point sources
pub trait SeriesCatalog: Send + Sync {
    /// Open an ascending source over the series, restricted to `range`
    fn open(&self, series: &str, range: &TimeRange)
        -> std::result::Result<Box<dyn PointSource>, ExecutionError>;
}

/// Catalog holding every series in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    series: HashMap<String, StoredSeries>,
}

#[derive(Debug, Clone)]
struct StoredSeries {
    data_type: DataType,
    points: Arc<[DataPoint]>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a series
    ///
    /// Points are sorted by timestamp; for duplicate timestamps the last
    /// inserted point wins. Values that do not fit `data_type` fail the
    /// query that reads them with `ExecutionError::ValueTypeMismatch`.
    pub fn insert(&mut self, series: impl Into<String>, data_type: DataType, mut points: Vec<DataPoint>) {
        points.reverse();
        points.sort_by_key(|p| p.timestamp);
        points.dedup_by_key(|p| p.timestamp);
        self.series.insert(
            series.into(),
            StoredSeries {
                data_type,
                points: points.into(),
            },
        );
    }

    /// Builder-style insert
    pub fn with_series(mut self, series: impl Into<String>, data_type: DataType, points: Vec<DataPoint>) -> Self {
        self.insert(series, data_type, points);
        self
    }

    /// Number of series
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Whether the catalog holds no series
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl SeriesCatalog for InMemoryCatalog {
    fn open(
        &self,
        series: &str,
        range: &TimeRange,
    ) -> std::result::Result<Box<dyn PointSource>, ExecutionError> {
        let stored = self
            .series
            .get(series)
            .ok_or_else(|| ExecutionError::SeriesNotFound(series.to_string()))?;

        let lo = stored.points.partition_point(|p| p.timestamp < range.start);
        let hi = stored.points.partition_point(|p| p.timestamp < range.end);
        Ok(Box::new(VecPointSource::new(
            series,
            stored.data_type,
            stored.points[lo..hi].to_vec(),
        )))
    }
}

impl<C: SeriesCatalog + ?Sized> SeriesCatalog for Arc<C> {
    fn open(
        &self,
        series: &str,
        range: &TimeRange,
    ) -> std::result::Result<Box<dyn PointSource>, ExecutionError> {
        (**self).open(series, range)
    }
}

// ============================================================================
// Executor Configuration
// ============================================================================

/// Configuration for query execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Aggregate independent columns on the rayon pool (default: true)
    pub parallel_columns: bool,

    /// Validator with the window limit
    pub validator: ParameterValidator,

    /// Row cap when a query has no limit
    pub default_limit: Option<usize>,

    /// Record Prometheus metrics (default: true)
    pub metrics_enabled: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ExecutorConfig {
    fn from(config: &Config) -> Self {
        Self {
            parallel_columns: config.query.parallel_columns,
            validator: config.validator(),
            default_limit: config.query.default_limit,
            metrics_enabled: config.monitoring.metrics_enabled,
        }
    }
}

impl ExecutorConfig {
    /// Create a new executor config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable parallel execution (single-threaded mode)
    pub fn without_parallel(mut self) -> Self {
        self.parallel_columns = false;
        self
    }

    /// Set the window limit (0 = unlimited)
    pub fn with_max_windows(mut self, limit: usize) -> Self {
        self.validator = self.validator.with_max_windows(limit);
        self
    }

    /// Disable metrics recording
    pub fn without_metrics(mut self) -> Self {
        self.metrics_enabled = false;
        self
    }
}

// ============================================================================
// Executor
// ============================================================================

/// One column, resolved and ready to run
struct PreparedColumn {
    aggregator: WindowAggregator<Box<dyn PointSource>>,
}

/// Executes GROUP BY queries against a catalog
pub struct GroupByExecutor<C> {
    catalog: C,
    registry: FunctionRegistry,
    config: ExecutorConfig,
}

impl<C: SeriesCatalog> GroupByExecutor<C> {
    /// Create an executor with the built-in functions and default configuration
    pub fn new(catalog: C) -> Self {
        Self::with_config(catalog, ExecutorConfig::default())
    }

    /// Create an executor with custom configuration
    pub fn with_config(catalog: C, config: ExecutorConfig) -> Self {
        Self {
            catalog,
            registry: FunctionRegistry::with_builtins(),
            config,
        }
    }

    /// Replace the function registry
    pub fn with_registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Get executor configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Function registry used to resolve names
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Execute a query and return results
    ///
    /// # Returns
    ///
    /// * `Ok(GroupByResult)` - One row per window after offset and limit
    /// * `Err(Error)` - Parameter, type or execution failure; no rows
    pub fn execute(&self, query: &GroupByQuery) -> Result<GroupByResult> {
        let start = Instant::now();
        let result = self.execute_inner(query);
        let elapsed = start.elapsed();

        if self.config.metrics_enabled {
            metrics::record_query(elapsed.as_secs_f64(), result.is_ok());
            if let Err(err) = &result {
                metrics::record_error(err.kind());
            }
        }

        match result {
            Ok(result) => {
                debug!(
                    "GROUP BY {} ({}) returned {} rows in {:?}",
                    query.range,
                    query.interval,
                    result.row_count(),
                    elapsed
                );
                Ok(result.with_execution_time(elapsed))
            }
            Err(err) => {
                warn!("GROUP BY {} ({}) failed: {}", query.range, query.interval, err);
                Err(err)
            }
        }
    }

    fn execute_inner(&self, query: &GroupByQuery) -> Result<GroupByResult> {
        let plan = WindowPlan::with_validator(query.range, query.interval, &self.config.validator)?;
        let limit = query.limit.or(self.config.default_limit);
        let window_count = u64::try_from(plan.len()).unwrap_or(u64::MAX);

        // Resolve every function before opening any source
        let mut headers = Vec::new();
        let mut resolved: Vec<Vec<Arc<dyn AggregateFunction>>> = Vec::with_capacity(query.columns.len());
        for column in &query.columns {
            let functions = self.registry.resolve(&column.functions)?;
            headers.extend(
                functions
                    .iter()
                    .map(|f| format!("{}({})", f.name(), column.series)),
            );
            resolved.push(functions);
        }

        // Open sources and type-check before reading any point
        let mut prepared = Vec::with_capacity(query.columns.len());
        for (column, functions) in query.columns.iter().zip(&resolved) {
            let source = self.catalog.open(&column.series, &query.range)?;
            let mut aggregator = WindowAggregator::new(source, &plan, functions)?;
            if let Some(predicate) = &query.predicate {
                aggregator = aggregator.with_predicate(Arc::clone(predicate));
            }
            prepared.push(PreparedColumn { aggregator });
        }

        debug!(
            "Executing {} columns over {} windows (parallel: {})",
            prepared.len(),
            window_count,
            self.config.parallel_columns
        );

        let offset = query.offset;
        let run = |column: PreparedColumn| run_column(column, offset, limit);
        let outputs: Vec<(Vec<AggregateResult>, RunStats)> =
            if self.config.parallel_columns && prepared.len() > 1 {
                prepared.into_par_iter().map(run).collect::<Result<_>>()?
            } else {
                prepared.into_iter().map(run).collect::<Result<_>>()?
            };

        let mut points_read = 0;
        for (_, stats) in &outputs {
            points_read += stats.points_read;
            if self.config.metrics_enabled {
                metrics::record_run(stats);
            }
        }

        let rows = if outputs.is_empty() {
            plan.windows()
                .skip(offset)
                .take(limit.unwrap_or(usize::MAX))
                .map(|w| ResultRow::new(w.start, Vec::new()))
                .collect()
        } else {
            join_columns(outputs.into_iter().map(|(rows, _)| rows).collect())
        };

        let mut result = GroupByResult::new(headers, rows);
        result.metadata.window_count = window_count;
        result.metadata.points_read = points_read;
        result.metadata.truncated = (result.row_count() as u64) < window_count;
        Ok(result)
    }
}

/// Run one column, stopping as soon as the limit is reached
fn run_column(
    column: PreparedColumn,
    offset: usize,
    limit: Option<usize>,
) -> Result<(Vec<AggregateResult>, RunStats)> {
    let mut aggregator = column.aggregator;
    let rows = aggregator
        .by_ref()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect::<Result<Vec<_>>>()?;
    debug!("Column {} produced {} rows", aggregator.series(), rows.len());
    Ok((rows, aggregator.stats()))
}

/// Join per-column rows by window
fn join_columns(columns: Vec<Vec<AggregateResult>>) -> Vec<ResultRow> {
    let row_count = columns.first().map_or(0, Vec::len);
    let mut rows: Vec<ResultRow> = Vec::with_capacity(row_count);

    for (column_idx, column) in columns.into_iter().enumerate() {
        debug_assert_eq!(column.len(), row_count, "columns share one window plan");
        for (row_idx, result) in column.into_iter().enumerate() {
            if column_idx == 0 {
                rows.push(ResultRow::new(result.window_start(), result.values));
            } else {
                debug_assert_eq!(rows[row_idx].timestamp, result.window_start());
                rows[row_idx].values.extend(result.values);
            }
        }
    }

    rows
}

impl<C> fmt::Debug for GroupByExecutor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupByExecutor")
            .field("registry", &self.registry.names())
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
