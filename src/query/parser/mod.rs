//! Query Parser Module
//!
//! Parses the GROUP BY window clause and WHERE predicates into engine types.
//!
//! ```sql
//! GROUP BY ([1, 30), 3ms, 5ms)
//! value > 3 AND time < 2024-01-01 00:00:00
//! ```
//!
//! # Example
//!
//! ```rust
//! use kuba_window::config::TimestampPrecision;
//! use kuba_window::query::parser::{parse_group_by, parse_where};
//!
//! let clause = parse_group_by("GROUP BY ([1, 30), 3, 5)", TimestampPrecision::Milliseconds);
//! assert!(clause.is_ok());
//!
//! let predicate = parse_where("value > 3", TimestampPrecision::Milliseconds);
//! assert!(predicate.is_ok());
//! ```

pub mod sql;

pub use sql::{parse_duration, parse_group_by, parse_timestamp, parse_where, GroupByClause};
