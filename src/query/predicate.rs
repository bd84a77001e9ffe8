//! Point predicates (WHERE clause filters)
//!
//! A predicate is a pure boolean test over one data point. The aggregator
//! only evaluates it for points that already fall inside the current window,
//! so points in gaps or past the last window are never tested.

use crate::types::{DataPoint, Value};
use std::cmp::Ordering;
use std::fmt;

/// Boolean test applied to in-window points
pub trait PredicateFilter: Send + Sync {
    /// Whether the point qualifies for aggregation
    fn test(&self, point: &DataPoint) -> bool;
}

impl<F> PredicateFilter for F
where
    F: Fn(&DataPoint) -> bool + Send + Sync,
{
    fn test(&self, point: &DataPoint) -> bool {
        self(point)
    }
}

/// Predicate comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateOp {
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Equal
    Eq,
    /// Not equal
    Ne,
}

impl PredicateOp {
    /// Whether an ordering of `lhs` relative to `rhs` satisfies the operator
    #[inline]
    pub fn matches(&self, ordering: Ordering) -> bool {
        match self {
            PredicateOp::Gt => ordering == Ordering::Greater,
            PredicateOp::Gte => ordering != Ordering::Less,
            PredicateOp::Lt => ordering == Ordering::Less,
            PredicateOp::Lte => ordering != Ordering::Greater,
            PredicateOp::Eq => ordering == Ordering::Equal,
            PredicateOp::Ne => ordering != Ordering::Equal,
        }
    }

    /// Operator symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            PredicateOp::Gt => ">",
            PredicateOp::Gte => ">=",
            PredicateOp::Lt => "<",
            PredicateOp::Lte => "<=",
            PredicateOp::Eq => "=",
            PredicateOp::Ne => "!=",
        }
    }
}

impl fmt::Display for PredicateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Compiled filter over point timestamps and values
///
/// Comparisons between incomparable values (text against a number, NaN)
/// never match, for every operator.
///
/// ```rust
/// use kuba_window::query::predicate::{Predicate, PredicateFilter};
/// use kuba_window::types::DataPoint;
///
/// let filter = Predicate::value_gt(3.0).and(Predicate::time_lt(10));
/// assert!(filter.test(&DataPoint::new(4, 4.4)));
/// assert!(!filter.test(&DataPoint::new(4, 2.2)));
/// assert!(!filter.test(&DataPoint::new(12, 4.4)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Compare the point timestamp
    Time {
        /// Comparison operator
        op: PredicateOp,
        /// Right-hand timestamp
        timestamp: i64,
    },
    /// Compare the point value
    Value {
        /// Comparison operator
        op: PredicateOp,
        /// Right-hand value
        value: Value,
    },
    /// Both must match
    And(Box<Predicate>, Box<Predicate>),
    /// Either must match
    Or(Box<Predicate>, Box<Predicate>),
    /// Inner must not match
    Not(Box<Predicate>),
}

impl Predicate {
    /// `time <op> timestamp`
    pub fn time(op: PredicateOp, timestamp: i64) -> Self {
        Predicate::Time { op, timestamp }
    }

    /// `value <op> value`
    pub fn value(op: PredicateOp, value: impl Into<Value>) -> Self {
        Predicate::Value {
            op,
            value: value.into(),
        }
    }

    /// `time > timestamp`
    pub fn time_gt(timestamp: i64) -> Self {
        Self::time(PredicateOp::Gt, timestamp)
    }

    /// `time < timestamp`
    pub fn time_lt(timestamp: i64) -> Self {
        Self::time(PredicateOp::Lt, timestamp)
    }

    /// `value > threshold`
    pub fn value_gt(threshold: f64) -> Self {
        Self::value(PredicateOp::Gt, threshold)
    }

    /// `value < threshold`
    pub fn value_lt(threshold: f64) -> Self {
        Self::value(PredicateOp::Lt, threshold)
    }

    /// Conjunction with another predicate
    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// Disjunction with another predicate
    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// Logical negation
    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Evaluate against a point
    pub fn evaluate(&self, point: &DataPoint) -> bool {
        match self {
            Predicate::Time { op, timestamp } => op.matches(point.timestamp.cmp(timestamp)),
            Predicate::Value { op, value } => point
                .value
                .compare(value)
                .is_some_and(|ordering| op.matches(ordering)),
            Predicate::And(lhs, rhs) => lhs.evaluate(point) && rhs.evaluate(point),
            Predicate::Or(lhs, rhs) => lhs.evaluate(point) || rhs.evaluate(point),
            Predicate::Not(inner) => !inner.evaluate(point),
        }
    }
}

impl PredicateFilter for Predicate {
    fn test(&self, point: &DataPoint) -> bool {
        self.evaluate(point)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Time { op, timestamp } => write!(f, "time {} {}", op, timestamp),
            Predicate::Value {
                op,
                value: Value::Text(text),
            } => write!(f, "value {} '{}'", op, text),
            Predicate::Value { op, value } => write!(f, "value {} {}", op, value),
            Predicate::And(lhs, rhs) => write!(f, "({} AND {})", lhs, rhs),
            Predicate::Or(lhs, rhs) => write!(f, "({} OR {})", lhs, rhs),
            Predicate::Not(inner) => write!(f, "NOT {}", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_predicate() {
        let p = Predicate::time_gt(3);
        assert!(!p.test(&DataPoint::new(3, 1.0)));
        assert!(p.test(&DataPoint::new(4, 1.0)));
    }

    #[test]
    fn test_value_predicate_widens_integers() {
        let p = Predicate::value_gt(3.0);
        assert!(p.test(&DataPoint::new(1, 4i64)));
        assert!(!p.test(&DataPoint::new(1, 3i64)));
        assert!(p.test(&DataPoint::new(1, 3.3)));
    }

    #[test]
    fn test_incomparable_values_never_match() {
        let eq = Predicate::value(PredicateOp::Eq, 1.0);
        let ne = Predicate::value(PredicateOp::Ne, 1.0);
        let text = DataPoint::new(1, "one");
        assert!(!eq.test(&text));
        assert!(!ne.test(&text));
        assert!(!ne.test(&DataPoint::new(1, f64::NAN)));
    }

    #[test]
    fn test_text_equality() {
        let p = Predicate::value(PredicateOp::Eq, "on");
        assert!(p.test(&DataPoint::new(1, "on")));
        assert!(!p.test(&DataPoint::new(1, "off")));
    }

    #[test]
    fn test_combinators() {
        let p = Predicate::time_gt(3).and(Predicate::value_lt(10.0));
        assert!(p.test(&DataPoint::new(4, 5.0)));
        assert!(!p.test(&DataPoint::new(2, 5.0)));

        let p = Predicate::time_lt(2).or(Predicate::time_gt(8));
        assert!(p.test(&DataPoint::new(1, 0.0)));
        assert!(!p.test(&DataPoint::new(5, 0.0)));
        assert!(p.clone().negate().test(&DataPoint::new(5, 0.0)));
    }

    #[test]
    fn test_closure_filter() {
        let even = |p: &DataPoint| p.timestamp % 2 == 0;
        assert!(even.test(&DataPoint::new(2, 1.0)));
        assert!(!even.test(&DataPoint::new(3, 1.0)));
    }

    #[test]
    fn test_display() {
        let p = Predicate::value_gt(3.0).and(Predicate::time_gt(3).negate());
        assert_eq!(p.to_string(), "(value > 3.0 AND NOT time > 3)");
        assert_eq!(
            Predicate::value(PredicateOp::Ne, "x").to_string(),
            "value != 'x'"
        );
    }
}
