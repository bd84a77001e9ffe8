//! Window Planner - derives the window schedule for a query
//!
//! The plan is a pure function of the range and the interval spec. It holds
//! no windows in memory; `windows()` generates them lazily and can be called
//! any number of times with identical results.
//!
//! ```text
//! range [1, 30), interval 3, sliding step 5
//!
//!  1  4   6  9   11 14  16 19  21 24  26  29 30
//!  [---)  [---)  [---)  [---)  [---)  [---)
//!  w0     w1     w2     w3     w4     w5
//! ```

use crate::error::ParameterError;
use crate::query::validator::{self, ParameterValidator};
use crate::types::{IntervalSpec, TimeRange, Window};
use std::iter::FusedIterator;

/// Validated window schedule for one query
///
/// `Copy` and immutable, so concurrent column runs share it freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    range: TimeRange,
    interval: IntervalSpec,
}

impl WindowPlan {
    /// Validate the parameters and build the plan
    pub fn new(range: TimeRange, interval: IntervalSpec) -> Result<Self, ParameterError> {
        validator::validate(&range, &interval)?;
        Ok(Self { range, interval })
    }

    /// Build the plan with a validator carrying resource limits
    pub fn with_validator(
        range: TimeRange,
        interval: IntervalSpec,
        validator: &ParameterValidator,
    ) -> Result<Self, ParameterError> {
        validator.validate(&range, &interval)?;
        Ok(Self { range, interval })
    }

    /// Query range
    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// Window schedule
    pub fn interval(&self) -> IntervalSpec {
        self.interval
    }

    /// Number of windows in the plan
    pub fn len(&self) -> u128 {
        validator::window_count(&self.range, &self.interval)
    }

    /// A valid plan always has at least one window
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Window at `index`, if it exists
    pub fn get(&self, index: usize) -> Option<Window> {
        let offset = (index as i128).checked_mul(self.interval.sliding_step as i128)?;
        let start = self.range.start as i128 + offset;
        if start >= self.range.end as i128 {
            return None;
        }
        let start = start as i64;
        Some(self.window_at(index, start))
    }

    /// Iterate over the windows in ascending order
    pub fn windows(&self) -> Windows {
        Windows {
            range: self.range,
            interval: self.interval,
            next_start: Some(self.range.start),
            index: 0,
        }
    }

    fn window_at(&self, index: usize, start: i64) -> Window {
        let end = start
            .saturating_add(self.interval.interval)
            .min(self.range.end);
        Window { index, start, end }
    }
}

impl IntoIterator for &WindowPlan {
    type Item = Window;
    type IntoIter = Windows;

    fn into_iter(self) -> Self::IntoIter {
        self.windows()
    }
}

/// Lazy iterator over planned windows
#[derive(Debug, Clone)]
pub struct Windows {
    range: TimeRange,
    interval: IntervalSpec,
    /// Start of the next window; None once the cursor would overflow
    next_start: Option<i64>,
    index: usize,
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let start = self.next_start?;
        if start >= self.range.end {
            self.next_start = None;
            return None;
        }

        let end = start
            .saturating_add(self.interval.interval)
            .min(self.range.end);
        let window = Window {
            index: self.index,
            start,
            end,
        };

        self.next_start = start.checked_add(self.interval.sliding_step);
        self.index += 1;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.next_start {
            Some(start) if start < self.range.end => {
                let remaining = TimeRange::new_unchecked(start, self.range.end);
                let count = validator::window_count(&remaining, &self.interval);
                let lower = usize::try_from(count).unwrap_or(usize::MAX);
                (lower, usize::try_from(count).ok())
            }
            _ => (0, Some(0)),
        }
    }
}

impl FusedIterator for Windows {}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(start: i64, end: i64, interval: i64, step: i64) -> WindowPlan {
        WindowPlan::new(
            TimeRange::new_unchecked(start, end),
            IntervalSpec::sliding(interval, step),
        )
        .unwrap()
    }

    #[test]
    fn test_gapped_schedule() {
        let windows: Vec<Window> = plan(1, 30, 3, 5).windows().collect();
        let bounds: Vec<(i64, i64)> = windows.iter().map(|w| (w.start, w.end)).collect();
        assert_eq!(
            bounds,
            vec![(1, 4), (6, 9), (11, 14), (16, 19), (21, 24), (26, 29)]
        );
        assert!(windows.iter().enumerate().all(|(i, w)| w.index == i));
    }

    #[test]
    fn test_last_window_clipped() {
        let windows: Vec<Window> = plan(0, 10, 4, 4).windows().collect();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[2].start, 8);
        assert_eq!(windows[2].end, 10);
        assert_eq!(windows[2].duration(), 2);
    }

    #[test]
    fn test_interval_longer_than_range() {
        let windows: Vec<Window> = plan(5, 7, 100, 100).windows().collect();
        assert_eq!(
            windows,
            vec![Window {
                index: 0,
                start: 5,
                end: 7
            }]
        );
    }

    #[test]
    fn test_replanning_is_deterministic() {
        let p = plan(1, 30, 3, 5);
        let first: Vec<Window> = p.windows().collect();
        let second: Vec<Window> = p.windows().collect();
        assert_eq!(first, second);
        assert_eq!(p.len(), first.len() as u128);
    }

    #[test]
    fn test_get_matches_iteration() {
        let p = plan(1, 30, 3, 5);
        for window in p.windows() {
            assert_eq!(p.get(window.index), Some(window));
        }
        assert_eq!(p.get(6), None);
        assert_eq!(p.get(usize::MAX), None);
    }

    #[test]
    fn test_size_hint_is_exact() {
        let mut windows = plan(0, 100, 10, 10).windows();
        assert_eq!(windows.size_hint(), (10, Some(10)));
        windows.next();
        assert_eq!(windows.size_hint(), (9, Some(9)));
        assert_eq!(windows.count(), 9);
    }

    #[test]
    fn test_near_i64_max_does_not_overflow() {
        let p = plan(i64::MAX - 10, i64::MAX, 4, 6);
        let windows: Vec<Window> = p.windows().collect();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].start, i64::MAX - 4);
        assert_eq!(windows[1].end, i64::MAX);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let range = TimeRange::new_unchecked(1, 30);
        assert!(WindowPlan::new(range, IntervalSpec::tumbling(0)).is_err());
        assert!(WindowPlan::new(range, IntervalSpec::sliding(2, 1)).is_err());
    }

    #[test]
    fn test_validator_limit_applies() {
        let validator = ParameterValidator::new().with_max_windows(2);
        let result = WindowPlan::with_validator(
            TimeRange::new_unchecked(0, 100),
            IntervalSpec::tumbling(10),
            &validator,
        );
        assert!(matches!(
            result,
            Err(ParameterError::TooManyWindows { windows: 10, .. })
        ));
    }
}
