//! Window Aggregator - single forward pass over one series
//!
//! Assigns an ascending point stream to planned windows and emits exactly one
//! row per window, in window order, including empty windows.
//!
//! ```text
//! windows:   [1,4)      [6,9)      [11,14)
//! points:    1 2 3  4 5  6 7 8  9 10  11 ...
//!            ^^^^^  ^^^  ^^^^^  ^^^^  ^^
//!            agg    gap  agg    gap   agg
//! ```
//!
//! A point at or past the current window's end closes the window and is held
//! back for the next one. Points falling in gaps are discarded without being
//! shown to the predicate. Once the last window closes the source is dropped,
//! so trailing points are never read.
//!
//! The cursor logic lives in [`WindowCursor`] and is shared by the blocking
//! [`WindowAggregator`] and the async [`aggregate_stream`].

use crate::error::{Error, ExecutionError, Result, TypeError};
use crate::query::functions::{Accumulator, AggregateFunction};
use crate::query::planner::{WindowPlan, Windows};
use crate::query::predicate::PredicateFilter;
use crate::query::source::PointSource;
use crate::types::{DataPoint, DataType, Value, Window};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

// ============================================================================
// Results
// ============================================================================

/// Finalized aggregates of one window
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    /// The window these values belong to
    pub window: Window,

    /// Function names, shared by every row of a run
    names: Arc<[String]>,

    /// One value per function, `None` is null
    pub values: Vec<Option<Value>>,
}

impl AggregateResult {
    /// Row label: the window's start timestamp
    pub fn window_start(&self) -> i64 {
        self.window.start
    }

    /// Function names in value order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Value of a function by name
    ///
    /// Returns `None` when the function was not requested, `Some(None)` when
    /// it produced null.
    pub fn get(&self, function: &str) -> Option<Option<&Value>> {
        let idx = self
            .names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(function))?;
        Some(self.values[idx].as_ref())
    }

    /// Iterate over `(function, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(Option::as_ref))
    }
}

/// Serialized as `{"window_start": .., "window_end": .., "<function>": ..}`
impl Serialize for AggregateResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.values.len() + 2))?;
        map.serialize_entry("window_start", &self.window.start)?;
        map.serialize_entry("window_end", &self.window.end)?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

/// Per-run counters, recorded as metrics once the run finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Points pulled from the source
    pub points_read: u64,
    /// Points fed to the accumulators
    pub points_aggregated: u64,
    /// Points discarded because they fell between windows
    pub points_in_gaps: u64,
    /// In-window points rejected by the predicate
    pub points_filtered: u64,
    /// Points read past the last window and discarded
    pub points_skipped: u64,
    /// Rows emitted
    pub windows_emitted: u64,
}

// ============================================================================
// Window Cursor
// ============================================================================

/// Outcome of offering a point to the cursor
#[derive(Debug)]
pub enum Step {
    /// The point was aggregated, filtered out or discarded as a gap
    Consumed,
    /// The point closed the current window
    Closed {
        /// The finished row
        row: AggregateResult,
        /// The point, to be offered again to the next window; `None` when
        /// there is no next window
        retained: Option<DataPoint>,
    },
}

/// Window state machine shared by the sync and async aggregators
pub struct WindowCursor {
    windows: Windows,
    current: Option<Window>,
    functions: Arc<[Arc<dyn AggregateFunction>]>,
    names: Arc<[String]>,
    states: Vec<Box<dyn Accumulator>>,
    predicate: Option<Arc<dyn PredicateFilter>>,
    data_type: DataType,
    last_timestamp: Option<i64>,
    stats: RunStats,
}

impl WindowCursor {
    /// Type-check the functions against the column and position on the first window
    pub fn new(
        plan: &WindowPlan,
        functions: &[Arc<dyn AggregateFunction>],
        data_type: DataType,
    ) -> std::result::Result<Self, TypeError> {
        for function in functions {
            if !function.supports(data_type) {
                return Err(TypeError::UnsupportedAggregateType {
                    function: function.name().to_string(),
                    data_type,
                });
            }
        }

        let mut windows = plan.windows();
        let current = windows.next();
        let functions: Arc<[Arc<dyn AggregateFunction>]> = functions.into();
        let names: Arc<[String]> = functions.iter().map(|f| f.name().to_string()).collect();
        let states = functions.iter().map(|f| f.init()).collect();

        Ok(Self {
            windows,
            current,
            functions,
            names,
            states,
            predicate: None,
            data_type,
            last_timestamp: None,
            stats: RunStats::default(),
        })
    }

    /// Only aggregate points the predicate accepts
    pub fn set_predicate(&mut self, predicate: Arc<dyn PredicateFilter>) {
        self.predicate = Some(predicate);
    }

    /// Window currently being filled, `None` once every window was emitted
    pub fn current(&self) -> Option<Window> {
        self.current
    }

    /// Whether every planned window has been emitted
    pub fn is_finished(&self) -> bool {
        self.current.is_none()
    }

    /// Counters so far
    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Record a point freshly pulled from the source
    ///
    /// Rejects values that do not fit the declared column type, so every
    /// counted point also reaches the numeric accumulators.
    pub fn record_read(&mut self, point: &DataPoint) -> std::result::Result<(), ExecutionError> {
        if !self.data_type.accepts(&point.value) {
            return Err(ExecutionError::ValueTypeMismatch {
                timestamp: point.timestamp,
                expected: self.data_type,
                found: point.value.data_type(),
            });
        }
        debug_assert!(
            self.last_timestamp.map_or(true, |last| last < point.timestamp),
            "point source must be strictly ascending: {:?} then {}",
            self.last_timestamp,
            point.timestamp
        );
        self.last_timestamp = Some(point.timestamp);
        self.stats.points_read += 1;
        Ok(())
    }

    /// Offer the next point in ascending order
    ///
    /// Must not be called once the cursor is finished.
    pub fn offer(&mut self, point: DataPoint) -> Step {
        let window = match self.current {
            Some(window) => window,
            None => {
                self.stats.points_skipped += 1;
                return Step::Consumed;
            }
        };

        if point.timestamp >= window.end {
            let row = self.close(window);
            let retained = if self.is_finished() {
                self.stats.points_skipped += 1;
                None
            } else {
                Some(point)
            };
            return Step::Closed { row, retained };
        }

        if point.timestamp < window.start {
            self.stats.points_in_gaps += 1;
            return Step::Consumed;
        }

        if let Some(predicate) = &self.predicate {
            if !predicate.test(&point) {
                self.stats.points_filtered += 1;
                return Step::Consumed;
            }
        }

        for state in &mut self.states {
            state.accumulate(point.timestamp, &point.value);
        }
        self.stats.points_aggregated += 1;
        Step::Consumed
    }

    /// Emit the current window as-is and advance
    ///
    /// Called at end of stream; repeated calls drain the remaining windows
    /// with empty state.
    pub fn close_current(&mut self) -> Option<AggregateResult> {
        let window = self.current?;
        Some(self.close(window))
    }

    fn close(&mut self, window: Window) -> AggregateResult {
        let values = self.states.iter().map(|s| s.finalize()).collect();
        trace!(
            index = window.index,
            start = window.start,
            end = window.end,
            "window closed"
        );

        self.current = self.windows.next();
        if self.current.is_some() {
            for (state, function) in self.states.iter_mut().zip(self.functions.iter()) {
                *state = function.init();
            }
        }
        self.stats.windows_emitted += 1;

        AggregateResult {
            window,
            names: Arc::clone(&self.names),
            values,
        }
    }
}

impl std::fmt::Debug for WindowCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowCursor")
            .field("current", &self.current)
            .field("functions", &self.names)
            .field("has_predicate", &self.predicate.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

// ============================================================================
// Blocking Aggregator
// ============================================================================

/// Pull-based aggregator over one point source
///
/// Yields one `AggregateResult` per planned window. After a source failure
/// it yields the error once and then stops.
///
/// Rows already yielded before that error are not a usable partial result:
/// a consumer driving the iterator by hand must discard them once an `Err`
/// arrives. [`WindowAggregator::run`] and the executor collect into
/// `Result<Vec<_>>`, so they return the error and no rows.
///
/// ```rust
/// use std::sync::Arc;
/// use kuba_window::query::aggregator::WindowAggregator;
/// use kuba_window::query::functions::FunctionRegistry;
/// use kuba_window::query::planner::WindowPlan;
/// use kuba_window::query::source::VecPointSource;
/// use kuba_window::types::{DataPoint, DataType, IntervalSpec, TimeRange};
///
/// let plan = WindowPlan::new(TimeRange::new(0, 10).unwrap(), IntervalSpec::tumbling(5)).unwrap();
/// let functions = FunctionRegistry::with_builtins().resolve(&["count", "avg"]).unwrap();
/// let source = VecPointSource::new(
///     "s1",
///     DataType::Float,
///     vec![DataPoint::new(1, 1.0), DataPoint::new(2, 3.0)],
/// );
///
/// let rows = WindowAggregator::new(source, &plan, &functions).unwrap().run().unwrap();
/// assert_eq!(rows.len(), 2);
/// assert_eq!(rows[0].get("avg").unwrap().unwrap().as_f64(), Some(2.0));
/// assert_eq!(rows[1].get("avg"), Some(None));
/// ```
#[derive(Debug)]
pub struct WindowAggregator<S> {
    source: Option<S>,
    series: String,
    cursor: WindowCursor,
    pending: Option<DataPoint>,
    failed: bool,
}

impl<S: PointSource> WindowAggregator<S> {
    /// Create an aggregator, type-checking every function first
    ///
    /// The source is not read until the first row is pulled.
    pub fn new(
        source: S,
        plan: &WindowPlan,
        functions: &[Arc<dyn AggregateFunction>],
    ) -> Result<Self> {
        let cursor = WindowCursor::new(plan, functions, source.data_type())?;
        let series = source.series().to_string();
        debug!(
            "Aggregating {} over {} windows of {} ({})",
            series,
            plan.len(),
            plan.range(),
            plan.interval()
        );
        Ok(Self {
            source: Some(source),
            series,
            cursor,
            pending: None,
            failed: false,
        })
    }

    /// Only aggregate points the predicate accepts
    pub fn with_predicate(mut self, predicate: Arc<dyn PredicateFilter>) -> Self {
        self.cursor.set_predicate(predicate);
        self
    }

    /// Series being aggregated
    pub fn series(&self) -> &str {
        &self.series
    }

    /// Counters so far
    pub fn stats(&self) -> RunStats {
        self.cursor.stats()
    }

    /// Whether the source has been released
    pub fn source_released(&self) -> bool {
        self.source.is_none()
    }

    /// Collect every row, discarding all rows if the source fails
    pub fn run(self) -> Result<Vec<AggregateResult>> {
        self.collect()
    }

    fn pull(&mut self) -> std::result::Result<Option<DataPoint>, ExecutionError> {
        if let Some(point) = self.pending.take() {
            return Ok(Some(point));
        }
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };
        match source.next_point()? {
            Some(point) => {
                self.cursor.record_read(&point)?;
                Ok(Some(point))
            }
            None => {
                self.source = None;
                Ok(None)
            }
        }
    }

    fn release_if_finished(&mut self) {
        if self.cursor.is_finished() {
            self.source = None;
            self.pending = None;
            debug!("Finished {}: {:?}", self.series, self.cursor.stats());
        }
    }
}

impl<S: PointSource> Iterator for WindowAggregator<S> {
    type Item = Result<AggregateResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.is_finished() {
            return None;
        }

        loop {
            let point = match self.pull() {
                Ok(Some(point)) => point,
                Ok(None) => {
                    let row = self.cursor.close_current();
                    self.release_if_finished();
                    return row.map(Ok);
                }
                Err(err) => {
                    self.failed = true;
                    self.source = None;
                    self.pending = None;
                    return Some(Err(Error::from(err)));
                }
            };

            if let Step::Closed { row, retained } = self.cursor.offer(point) {
                self.pending = retained;
                self.release_if_finished();
                return Some(Ok(row));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let (_, upper) = self.cursor.windows.size_hint();
        let current = usize::from(self.cursor.current.is_some());
        (0, upper.and_then(|u| u.checked_add(current)))
    }
}

impl<S: PointSource> std::iter::FusedIterator for WindowAggregator<S> {}

// ============================================================================
// Async Aggregator
// ============================================================================

struct StreamState<St> {
    points: Option<St>,
    cursor: WindowCursor,
    pending: Option<DataPoint>,
    failed: bool,
}

/// Aggregate an async point stream
///
/// Same semantics as [`WindowAggregator`]: one row per window, points are
/// pulled on demand, and the stream is dropped once the last window closes.
pub fn aggregate_stream<St>(
    points: St,
    data_type: DataType,
    plan: &WindowPlan,
    functions: &[Arc<dyn AggregateFunction>],
    predicate: Option<Arc<dyn PredicateFilter>>,
) -> Result<impl Stream<Item = Result<AggregateResult>>>
where
    St: Stream<Item = std::result::Result<DataPoint, ExecutionError>> + Unpin,
{
    let mut cursor = WindowCursor::new(plan, functions, data_type)?;
    if let Some(predicate) = predicate {
        cursor.set_predicate(predicate);
    }

    let state = StreamState {
        points: Some(points),
        cursor,
        pending: None,
        failed: false,
    };

    Ok(stream::unfold(state, |mut state| async move {
        if state.failed || state.cursor.is_finished() {
            return None;
        }

        loop {
            let (next, fresh) = match state.pending.take() {
                Some(point) => (Some(Ok(point)), false),
                None => match state.points.as_mut() {
                    Some(points) => (points.next().await, true),
                    None => (None, false),
                },
            };

            let checked = match next {
                Some(Ok(point)) if fresh => state.cursor.record_read(&point).map(|()| point),
                Some(Ok(point)) => Ok(point),
                Some(Err(err)) => Err(err),
                None => {
                    state.points = None;
                    let row = state.cursor.close_current()?;
                    return Some((Ok(row), state));
                }
            };
            let point = match checked {
                Ok(point) => point,
                Err(err) => {
                    state.failed = true;
                    state.points = None;
                    return Some((Err(Error::from(err)), state));
                }
            };

            if let Step::Closed { row, retained } = state.cursor.offer(point) {
                state.pending = retained;
                if state.cursor.is_finished() {
                    state.points = None;
                }
                return Some((Ok(row), state));
            }
        }
    }))
}

// ============================================================================
// Tests
// ============================================================================
