//! Point sources - pull-based suppliers of ascending data points
//!
//! The aggregator pulls one point at a time with no read-ahead. A source may
//! be backed by memory, a file or a remote reader; failures propagate as
//! `ExecutionError` and abort the column run.

use crate::error::ExecutionError;
use crate::types::{DataPoint, DataType};
use std::collections::VecDeque;

/// Supplier of one series' points in strictly ascending timestamp order
///
/// Returning an error ends the column: rows an aggregator produced before it
/// are dropped by every collecting caller.
pub trait PointSource: Send {
    /// Next point, or `None` at end of stream
    fn next_point(&mut self) -> Result<Option<DataPoint>, ExecutionError>;

    /// Declared type of the series values
    fn data_type(&self) -> DataType;

    /// Series name used in logs and errors
    fn series(&self) -> &str {
        "unnamed"
    }
}

impl<S: PointSource + ?Sized> PointSource for Box<S> {
    fn next_point(&mut self) -> Result<Option<DataPoint>, ExecutionError> {
        (**self).next_point()
    }

    fn data_type(&self) -> DataType {
        (**self).data_type()
    }

    fn series(&self) -> &str {
        (**self).series()
    }
}

impl<S: PointSource + ?Sized> PointSource for &mut S {
    fn next_point(&mut self) -> Result<Option<DataPoint>, ExecutionError> {
        (**self).next_point()
    }

    fn data_type(&self) -> DataType {
        (**self).data_type()
    }

    fn series(&self) -> &str {
        (**self).series()
    }
}

// ============================================================================
// In-memory Source
// ============================================================================

/// Source over an owned, already sorted set of points
#[derive(Debug, Clone)]
pub struct VecPointSource {
    series: String,
    data_type: DataType,
    points: VecDeque<DataPoint>,
    /// Number of points handed out so far
    pulled: usize,
}

impl VecPointSource {
    /// Create a source from sorted points
    pub fn new(series: impl Into<String>, data_type: DataType, points: Vec<DataPoint>) -> Self {
        debug_assert!(
            points.windows(2).all(|w| w[0].timestamp < w[1].timestamp),
            "points must be strictly ascending"
        );
        Self {
            series: series.into(),
            data_type,
            points: points.into(),
            pulled: 0,
        }
    }

    /// Number of points pulled by the consumer
    pub fn pulled(&self) -> usize {
        self.pulled
    }

    /// Number of points never pulled
    pub fn remaining(&self) -> usize {
        self.points.len()
    }
}

impl PointSource for VecPointSource {
    fn next_point(&mut self) -> Result<Option<DataPoint>, ExecutionError> {
        let point = self.points.pop_front();
        if point.is_some() {
            self.pulled += 1;
        }
        Ok(point)
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn series(&self) -> &str {
        &self.series
    }
}

// ============================================================================
// Iterator Adapter
// ============================================================================

/// Source over any iterator of fallible points
///
/// Useful for lazily decoded inputs where each point may fail to decode.
pub struct IterPointSource<I> {
    series: String,
    data_type: DataType,
    iter: I,
}

impl<I> IterPointSource<I>
where
    I: Iterator<Item = Result<DataPoint, ExecutionError>> + Send,
{
    /// Wrap an iterator of fallible points
    pub fn new(series: impl Into<String>, data_type: DataType, iter: I) -> Self {
        Self {
            series: series.into(),
            data_type,
            iter,
        }
    }
}

/// Iterator of points lifted into the fallible form
pub type Lifted<I> = std::iter::Map<I, fn(DataPoint) -> Result<DataPoint, ExecutionError>>;

impl<I> IterPointSource<Lifted<I>>
where
    I: Iterator<Item = DataPoint> + Send,
{
    /// Wrap an infallible iterator of points
    pub fn infallible(series: impl Into<String>, data_type: DataType, iter: I) -> Self {
        let lift: fn(DataPoint) -> Result<DataPoint, ExecutionError> = Ok;
        Self::new(series, data_type, iter.map(lift))
    }
}

impl<I> PointSource for IterPointSource<I>
where
    I: Iterator<Item = Result<DataPoint, ExecutionError>> + Send,
{
    fn next_point(&mut self) -> Result<Option<DataPoint>, ExecutionError> {
        self.iter.next().transpose()
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn series(&self) -> &str {
        &self.series
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_source_counts_pulls() {
        let mut source = VecPointSource::new(
            "root.sg.d1.s1",
            DataType::Float,
            vec![DataPoint::new(1, 1.1), DataPoint::new(2, 2.2)],
        );
        assert_eq!(source.series(), "root.sg.d1.s1");
        assert_eq!(source.next_point().unwrap(), Some(DataPoint::new(1, 1.1)));
        assert_eq!(source.pulled(), 1);
        assert_eq!(source.remaining(), 1);
        source.next_point().unwrap();
        assert_eq!(source.next_point().unwrap(), None);
        assert_eq!(source.pulled(), 2);
    }

    #[test]
    fn test_iter_source_propagates_failure() {
        let items = vec![
            Ok(DataPoint::new(1, 1i64)),
            Err(ExecutionError::source_failed("s", "corrupt page")),
        ];
        let mut source = IterPointSource::new("s", DataType::Integer, items.into_iter());
        assert!(source.next_point().unwrap().is_some());
        assert!(matches!(
            source.next_point(),
            Err(ExecutionError::SourceFailed { .. })
        ));
    }

    #[test]
    fn test_infallible_iter_source() {
        let mut source = IterPointSource::infallible(
            "s",
            DataType::Integer,
            (0..3).map(|t| DataPoint::new(t, t)),
        );
        let mut seen = 0;
        while let Some(point) = source.next_point().unwrap() {
            assert_eq!(point.timestamp, seen);
            seen += 1;
        }
        assert_eq!(seen, 3);
    }

    #[test]
    fn test_boxed_source_delegates() {
        let mut boxed: Box<dyn PointSource> = Box::new(VecPointSource::new(
            "boxed",
            DataType::Text,
            vec![DataPoint::new(5, "x")],
        ));
        assert_eq!(boxed.series(), "boxed");
        assert_eq!(boxed.data_type(), DataType::Text);
        assert!(boxed.next_point().unwrap().is_some());
    }
}
