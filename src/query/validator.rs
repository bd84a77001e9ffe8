//! Parameter validation for windowed queries
//!
//! Runs before any planning or scanning. A query that fails here never
//! touches its point sources.

use crate::error::ParameterError;
use crate::types::{IntervalSpec, TimeRange};

/// Validate a range and window schedule
///
/// Checks, in order:
/// 1. `interval > 0`
/// 2. `sliding_step >= interval`
/// 3. `range.start < range.end`
///
/// ```rust
/// use kuba_window::query::validator::validate;
/// use kuba_window::types::{IntervalSpec, TimeRange};
///
/// let range = TimeRange::new_unchecked(1, 30);
/// assert!(validate(&range, &IntervalSpec::sliding(3, 5)).is_ok());
/// assert!(validate(&range, &IntervalSpec::tumbling(0)).is_err());
/// assert!(validate(&range, &IntervalSpec::sliding(2, 1)).is_err());
/// ```
pub fn validate(range: &TimeRange, interval: &IntervalSpec) -> Result<(), ParameterError> {
    if interval.interval <= 0 {
        return Err(ParameterError::InvalidInterval {
            interval: interval.interval,
        });
    }

    if interval.sliding_step < interval.interval {
        return Err(ParameterError::SlidingStepTooSmall {
            interval: interval.interval,
            sliding_step: interval.sliding_step,
        });
    }

    if range.start >= range.end {
        return Err(ParameterError::InvalidRange {
            start: range.start,
            end: range.end,
        });
    }

    Ok(())
}

/// Number of windows a valid schedule produces over a range
///
/// Counts the steps `k >= 0` with `start + k * sliding_step < end`. Computed in
/// 128-bit arithmetic so extreme ranges cannot overflow. Returns 0 for inputs
/// that `validate` would reject.
pub fn window_count(range: &TimeRange, interval: &IntervalSpec) -> u128 {
    if interval.sliding_step <= 0 || range.start >= range.end {
        return 0;
    }
    let span = range.end as i128 - range.start as i128;
    let step = interval.sliding_step as i128;
    ((span - 1) / step + 1) as u128
}

/// Validator carrying resource limits on top of the structural checks
#[derive(Debug, Clone, Default)]
pub struct ParameterValidator {
    /// Maximum number of windows per query (None = unlimited)
    max_windows: Option<usize>,
}

impl ParameterValidator {
    /// Create a validator with no window limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject schedules producing more than `limit` windows (0 = unlimited)
    pub fn with_max_windows(mut self, limit: usize) -> Self {
        self.max_windows = if limit == 0 { None } else { Some(limit) };
        self
    }

    /// Configured window limit
    pub fn max_windows(&self) -> Option<usize> {
        self.max_windows
    }

    /// Validate structure, then the window limit
    pub fn validate(&self, range: &TimeRange, interval: &IntervalSpec) -> Result<(), ParameterError> {
        validate(range, interval)?;

        if let Some(limit) = self.max_windows {
            let windows = window_count(range, interval);
            if windows > limit as u128 {
                return Err(ParameterError::TooManyWindows { windows, limit });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: i64, end: i64) -> TimeRange {
        TimeRange::new_unchecked(start, end)
    }

    #[test]
    fn test_valid_schedule() {
        assert!(validate(&range(1, 30), &IntervalSpec::sliding(3, 5)).is_ok());
        assert!(validate(&range(1, 30), &IntervalSpec::tumbling(3)).is_ok());
    }

    #[test]
    fn test_zero_interval() {
        assert_eq!(
            validate(&range(1, 30), &IntervalSpec::tumbling(0)),
            Err(ParameterError::InvalidInterval { interval: 0 })
        );
    }

    #[test]
    fn test_negative_interval_is_same_error_as_zero() {
        assert_eq!(
            validate(&range(1, 30), &IntervalSpec::tumbling(-1)),
            Err(ParameterError::InvalidInterval { interval: -1 })
        );
    }

    #[test]
    fn test_sliding_step_too_small() {
        assert_eq!(
            validate(&range(1, 30), &IntervalSpec::sliding(2, 1)),
            Err(ParameterError::SlidingStepTooSmall {
                interval: 2,
                sliding_step: 1
            })
        );
    }

    #[test]
    fn test_invalid_range() {
        assert_eq!(
            validate(&range(30, 1), &IntervalSpec::tumbling(3)),
            Err(ParameterError::InvalidRange { start: 30, end: 1 })
        );
        assert!(validate(&range(7, 7), &IntervalSpec::tumbling(3)).is_err());
    }

    #[test]
    fn test_interval_checked_before_range() {
        // Both are wrong; the interval is reported
        let err = validate(&range(30, 1), &IntervalSpec::tumbling(0)).unwrap_err();
        assert!(matches!(err, ParameterError::InvalidInterval { .. }));
    }

    #[test]
    fn test_window_count() {
        assert_eq!(window_count(&range(1, 30), &IntervalSpec::sliding(3, 5)), 6);
        assert_eq!(window_count(&range(0, 10), &IntervalSpec::tumbling(5)), 2);
        assert_eq!(window_count(&range(0, 11), &IntervalSpec::tumbling(5)), 3);
        assert_eq!(window_count(&range(0, 1), &IntervalSpec::tumbling(100)), 1);
        assert_eq!(
            window_count(&range(i64::MIN, i64::MAX), &IntervalSpec::tumbling(1)),
            u64::MAX as u128
        );
    }

    #[test]
    fn test_window_limit() {
        let validator = ParameterValidator::new().with_max_windows(5);
        assert_eq!(
            validator.validate(&range(1, 30), &IntervalSpec::sliding(3, 5)),
            Err(ParameterError::TooManyWindows {
                windows: 6,
                limit: 5
            })
        );

        let validator = ParameterValidator::new().with_max_windows(6);
        assert!(validator
            .validate(&range(1, 30), &IntervalSpec::sliding(3, 5))
            .is_ok());

        let unlimited = ParameterValidator::new().with_max_windows(0);
        assert_eq!(unlimited.max_windows(), None);
    }
}
