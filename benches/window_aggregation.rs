//! Windowed Aggregation Benchmarks
//!
//! Measures single-column throughput for tumbling and sliding schedules,
//! and multi-column execution with and without the rayon pool.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kuba_window::query::functions::FunctionRegistry;
use kuba_window::query::{
    ExecutorConfig, GroupByExecutor, GroupByQuery, InMemoryCatalog, Predicate, VecPointSource,
    WindowAggregator, WindowPlan,
};
use kuba_window::{DataPoint, DataType, IntervalSpec, TimeRange};
use std::hint::black_box;

// =============================================================================
// Test Data Generators
// =============================================================================

/// Create points one millisecond apart
fn create_points(count: usize) -> Vec<DataPoint> {
    (0..count)
        .map(|i| DataPoint::new(i as i64, 100.0 + (i as f64 * 0.1).sin() * 10.0))
        .collect()
}

/// Catalog with `series_count` float series of `points` each
fn create_catalog(series_count: usize, points: usize) -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    for s in 0..series_count {
        catalog.insert(format!("s{}", s), DataType::Float, create_points(points));
    }
    catalog
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_single_column(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_column");
    let functions = FunctionRegistry::with_builtins()
        .resolve(&["count", "sum", "avg"])
        .unwrap_or_default();

    for &count in &[10_000usize, 100_000, 1_000_000] {
        let points = create_points(count);
        let range = TimeRange::new_unchecked(0, count as i64);
        group.throughput(Throughput::Elements(count as u64));

        for (name, interval) in [
            ("tumbling", IntervalSpec::tumbling(100)),
            ("sliding_gaps", IntervalSpec::sliding(30, 100)),
        ] {
            let plan = WindowPlan::new(range, interval).unwrap();
            group.bench_with_input(BenchmarkId::new(name, count), &points, |b, points| {
                b.iter(|| {
                    let source = VecPointSource::new("s", DataType::Float, points.clone());
                    let rows = WindowAggregator::new(source, &plan, &functions)
                        .and_then(|agg| agg.run())
                        .unwrap_or_default();
                    black_box(rows.len())
                })
            });
        }
    }

    group.finish();
}

fn bench_multi_column(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_column");
    let points = 100_000;

    for &series in &[1usize, 4, 16] {
        let mut query = GroupByQuery::new(
            TimeRange::new_unchecked(0, points as i64),
            IntervalSpec::sliding(50, 100),
        )
        .with_predicate(Predicate::value_gt(100.0));
        for s in 0..series {
            query = query.column(format!("s{}", s), &["count", "sum", "avg"]);
        }
        group.throughput(Throughput::Elements((series * points) as u64));

        let parallel = GroupByExecutor::with_config(
            create_catalog(series, points),
            ExecutorConfig::new().without_metrics(),
        );
        group.bench_with_input(BenchmarkId::new("parallel", series), &query, |b, q| {
            b.iter(|| black_box(parallel.execute(q).map(|r| r.row_count())))
        });

        let sequential = GroupByExecutor::with_config(
            create_catalog(series, points),
            ExecutorConfig::new().without_metrics().without_parallel(),
        );
        group.bench_with_input(BenchmarkId::new("sequential", series), &query, |b, q| {
            b.iter(|| black_box(sequential.execute(q).map(|r| r.row_count())))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_column, bench_multi_column);
criterion_main!(benches);
