//! GROUP BY with gaps between windows (sliding step larger than interval)
//!
//! Dataset: one device with a float temperature, a boolean status and an
//! integer hardware column. Timestamps 17, 19, 20 and 21 are missing.

use kuba_window::config::TimestampPrecision;
use kuba_window::error::{Error, ExecutionError, ParameterError, TypeError};
use kuba_window::query::parser::parse_where;
use kuba_window::query::{
    ExecutorConfig, GroupByExecutor, GroupByQuery, InMemoryCatalog, PointSource, SeriesCatalog,
};
use kuba_window::{DataPoint, DataType, GroupByResult, TimeRange, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const CLAUSE: &str = "GROUP BY ([1, 30), 3ms, 5ms)";
const MS: TimestampPrecision = TimestampPrecision::Milliseconds;

const ROWS: &[(i64, f64, bool, i64)] = &[
    (1, 1.1, false, 11),
    (2, 2.2, true, 22),
    (3, 3.3, false, 33),
    (4, 4.4, false, 44),
    (5, 5.5, false, 55),
    (6, 6.6, false, 66),
    (7, 7.7, true, 77),
    (8, 8.8, false, 88),
    (9, 9.9, false, 99),
    (10, 10.0, false, 110),
    (11, 11.1, false, 121),
    (12, 12.2, true, 220),
    (13, 13.3, false, 330),
    (14, 14.4, false, 440),
    (15, 15.5, false, 550),
    (16, 16.6, false, 660),
    (18, 18.8, true, 780),
    (22, 22.2, false, 220),
    (23, 23.3, false, 650),
    (24, 24.4, false, 760),
    (25, 25.5, false, 550),
    (26, 20.2, true, 220),
    (27, 30.3, false, 330),
    (28, 40.4, false, 440),
    (29, 50.5, false, 550),
];

/// Rows after the first window; the same with no filter, with `value > 3` and with `time > 3`
const TAIL: &[&str] = &[
    "6,3,23.1,7.7",
    "11,3,36.599999999999994,12.2",
    "16,2,35.400000000000006,17.700000000000003",
    "21,2,45.5,22.75",
    "26,3,90.9,30.299999999999997",
];

fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_series(
            "temperature",
            DataType::Float,
            ROWS.iter().map(|&(t, v, _, _)| DataPoint::new(t, v)).collect(),
        )
        .with_series(
            "status",
            DataType::Boolean,
            ROWS.iter().map(|&(t, _, s, _)| DataPoint::new(t, s)).collect(),
        )
        .with_series(
            "hardware",
            DataType::Integer,
            ROWS.iter().map(|&(t, _, _, h)| DataPoint::new(t, h)).collect(),
        )
}

fn query() -> GroupByQuery {
    GroupByQuery::parse(CLAUSE, MS)
        .unwrap()
        .column("temperature", &["count", "sum", "avg"])
}

/// Compare rows against `timestamp,count,sum,avg` lines
///
/// Expected floats are parsed from their shortest text, so comparison is
/// exact on the f64 produced by in-order summation.
fn assert_rows(result: &GroupByResult, expected: &[&str]) {
    assert_eq!(result.row_count(), expected.len());
    for (row, line) in result.rows.iter().zip(expected) {
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(row.timestamp, fields[0].parse::<i64>().unwrap(), "{}", line);
        assert_eq!(
            row.values[0],
            Some(Value::Integer(fields[1].parse().unwrap())),
            "{}",
            line
        );
        assert_eq!(
            row.values[1],
            Some(Value::Float(fields[2].parse().unwrap())),
            "{}",
            line
        );
        match fields[3] {
            "null" => assert_eq!(row.values[2], None, "{}", line),
            avg => assert_eq!(row.values[2], Some(Value::Float(avg.parse().unwrap())), "{}", line),
        }
    }
}

fn with_first(first: &'static str) -> Vec<&'static str> {
    std::iter::once(first).chain(TAIL.iter().copied()).collect()
}

#[test]
fn test_count_sum_avg_inner_interval() {
    let result = GroupByExecutor::new(catalog()).execute(&query()).unwrap();

    assert_eq!(
        result.columns,
        vec!["count(temperature)", "sum(temperature)", "avg(temperature)"]
    );
    assert_rows(&result, &with_first("1,3,6.6,2.2"));
    assert_eq!(result.metadata.window_count, 6);
}

#[test]
fn test_count_sum_avg_inner_interval_with_value_filter() {
    let q = query().with_predicate(parse_where("where value > 3", MS).unwrap());
    let result = GroupByExecutor::new(catalog()).execute(&q).unwrap();
    assert_rows(&result, &with_first("1,1,3.3,3.3"));
}

#[test]
fn test_count_sum_avg_inner_interval_with_time_filter() {
    let q = query().with_predicate(parse_where("time > 3", MS).unwrap());
    let result = GroupByExecutor::new(catalog()).execute(&q).unwrap();
    assert_rows(&result, &with_first("1,0,0.0,null"));
}

#[test]
fn test_sequential_execution_matches() {
    let executor =
        GroupByExecutor::with_config(catalog(), ExecutorConfig::new().without_parallel());
    let result = executor.execute(&query()).unwrap();
    assert_rows(&result, &with_first("1,3,6.6,2.2"));
}

#[test]
fn test_csv_output() {
    let result = GroupByExecutor::new(catalog())
        .execute(&query().with_predicate(parse_where("time > 3", MS).unwrap()))
        .unwrap();
    let csv = result.to_csv();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("timestamp,count(temperature),sum(temperature),avg(temperature)")
    );
    assert_eq!(lines.next(), Some("1,0,0.0,null"));
    assert_eq!(lines.count(), 5);
}

#[test]
fn test_other_columns() {
    let q = GroupByQuery::parse(CLAUSE, MS)
        .unwrap()
        .column("status", &["count"])
        .column("hardware", &["sum", "avg"]);
    let result = GroupByExecutor::new(catalog()).execute(&q).unwrap();

    assert_eq!(
        result.column("count(status)").unwrap(),
        vec![
            Some(&Value::Integer(3)),
            Some(&Value::Integer(3)),
            Some(&Value::Integer(3)),
            Some(&Value::Integer(2)),
            Some(&Value::Integer(2)),
            Some(&Value::Integer(3)),
        ]
    );
    assert_eq!(result.rows[0].values[1], Some(Value::Float(66.0)));
    assert_eq!(result.rows[3].values[2], Some(Value::Float(720.0)));
}

#[test]
fn test_sum_of_boolean_rejected() {
    let q = GroupByQuery::parse(CLAUSE, MS)
        .unwrap()
        .column("status", &["sum"]);
    assert!(matches!(
        GroupByExecutor::new(catalog()).execute(&q),
        Err(Error::Type(TypeError::UnsupportedAggregateType { .. }))
    ));
}

/// Catalog counting how often a source is opened or read
#[derive(Clone, Default)]
struct CountingCatalog {
    inner: Arc<InMemoryCatalog>,
    reads: Arc<AtomicUsize>,
}

struct CountingSource {
    inner: Box<dyn PointSource>,
    reads: Arc<AtomicUsize>,
}

impl PointSource for CountingSource {
    fn next_point(&mut self) -> Result<Option<DataPoint>, ExecutionError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.next_point()
    }

    fn data_type(&self) -> DataType {
        self.inner.data_type()
    }
}

impl SeriesCatalog for CountingCatalog {
    fn open(
        &self,
        series: &str,
        range: &TimeRange,
    ) -> Result<Box<dyn PointSource>, ExecutionError> {
        Ok(Box::new(CountingSource {
            inner: self.inner.open(series, range)?,
            reads: Arc::clone(&self.reads),
        }))
    }
}

#[test]
fn test_zero_or_negative_interval() {
    let catalog = CountingCatalog {
        inner: Arc::new(catalog()),
        ..Default::default()
    };
    let executor = GroupByExecutor::new(catalog.clone());

    for (clause, interval) in [
        ("GROUP BY ([1, 30), 0ms)", 0),
        ("GROUP BY ([1, 30), -1ms)", -1),
    ] {
        let q = GroupByQuery::parse(clause, MS)
            .unwrap()
            .column("temperature", &["count", "sum", "avg"])
            .with_predicate(parse_where("time > 3", MS).unwrap());
        match executor.execute(&q) {
            Err(Error::Parameter(ParameterError::InvalidInterval { interval: got })) => {
                assert_eq!(got, interval)
            }
            other => panic!("expected InvalidInterval, got {:?}", other),
        }
    }
    assert_eq!(catalog.reads.load(Ordering::SeqCst), 0);
}

#[test]
fn test_sliding_step_less_than_interval() {
    let catalog = CountingCatalog {
        inner: Arc::new(catalog()),
        ..Default::default()
    };
    let q = GroupByQuery::parse("GROUP BY ([1, 30), 2ms, 1ms)", MS)
        .unwrap()
        .column("temperature", &["count", "sum", "avg"]);

    let err = GroupByExecutor::new(catalog.clone()).execute(&q).unwrap_err();
    assert!(matches!(
        err,
        Error::Parameter(ParameterError::SlidingStepTooSmall {
            interval: 2,
            sliding_step: 1
        })
    ));
    assert_eq!(catalog.reads.load(Ordering::SeqCst), 0);
}

#[test]
fn test_trailing_points_not_read() {
    let catalog = CountingCatalog {
        inner: Arc::new(catalog()),
        ..Default::default()
    };
    let q = GroupByQuery::parse("GROUP BY ([1, 30), 3ms, 5ms)", MS)
        .unwrap()
        .column("temperature", &["count"])
        .with_limit(2);

    let result = GroupByExecutor::new(catalog.clone()).execute(&q).unwrap();
    assert_eq!(result.timestamps(), vec![1, 6]);
    // 1..=8 plus the point at 9 that closed the second window
    assert_eq!(catalog.reads.load(Ordering::SeqCst), 9);
}
