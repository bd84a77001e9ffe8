//! Metrics and telemetry for windowed queries
//!
//! Prometheus collectors registered in the default registry. Aggregation
//! runs report once per column from their `RunStats`, never per point.

use crate::error::ErrorKind;
use crate::query::aggregator::RunStats;
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

lazy_static! {
    // === Query Counters ===

    /// Total queries by outcome
    pub static ref QUERIES_TOTAL: CounterVec = register_counter_vec!(
        "window_queries_total",
        "Total GROUP BY queries by status",
        &["status"]
    ).unwrap();

    /// Failed queries by error kind
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "window_errors_total",
        "Total failed queries by error kind",
        &["kind"]
    ).unwrap();

    /// Rows emitted by aggregators
    pub static ref ROWS_EMITTED_TOTAL: Counter = register_counter!(
        "window_rows_emitted_total",
        "Total window rows emitted by column aggregators"
    ).unwrap();

    /// Points seen by aggregators, by what happened to them
    pub static ref POINTS_TOTAL: CounterVec = register_counter_vec!(
        "window_points_total",
        "Total points by outcome (aggregated, gap, filtered, skipped)",
        &["outcome"]
    ).unwrap();

    // === Latency Histograms ===

    /// End-to-end query duration
    pub static ref QUERY_DURATION: Histogram = register_histogram!(
        "window_query_duration_seconds",
        "GROUP BY query latency in seconds",
        vec![0.0001, 0.001, 0.01, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();
}

/// Get metrics in Prometheus text format
///
/// # Returns
///
/// Result containing the formatted metrics string, or an error if encoding fails
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record the counters of one finished column run
#[inline]
pub fn record_run(stats: &RunStats) {
    ROWS_EMITTED_TOTAL.inc_by(stats.windows_emitted as f64);

    for (outcome, count) in [
        ("aggregated", stats.points_aggregated),
        ("gap", stats.points_in_gaps),
        ("filtered", stats.points_filtered),
        ("skipped", stats.points_skipped),
    ] {
        if count > 0 {
            POINTS_TOTAL
                .with_label_values(&[outcome])
                .inc_by(count as f64);
        }
    }
}

/// Record a finished query
#[inline]
pub fn record_query(duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    QUERIES_TOTAL.with_label_values(&[status]).inc();
    QUERY_DURATION.observe(duration_secs);
}

/// Record a query failure
#[inline]
pub fn record_error(kind: ErrorKind) {
    ERRORS_TOTAL.with_label_values(&[kind.as_str()]).inc();
}
