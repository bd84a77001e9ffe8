//! Query result types and formatters
//!
//! A GROUP BY query produces one row per window, labelled with the window
//! start, and one column per `function(series)` pair. Nulls stay distinct
//! from zero in every output format.

use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Rows shown by the table formatter before truncating
const MAX_TABLE_ROWS: usize = 100;

// ============================================================================
// Query Result Types
// ============================================================================

/// Complete GROUP BY result with data and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupByResult {
    /// Column headers, `function(series)`, excluding the timestamp
    pub columns: Vec<String>,

    /// One row per emitted window, ascending by window start
    pub rows: Vec<ResultRow>,

    /// Query execution metadata
    pub metadata: ResultMetadata,
}

impl GroupByResult {
    /// Create result from headers and rows
    pub fn new(columns: Vec<String>, rows: Vec<ResultRow>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            metadata: ResultMetadata {
                row_count,
                ..Default::default()
            },
        }
    }

    /// Set execution time metadata
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.metadata.execution_time_us = duration.as_micros() as u64;
        self
    }

    /// Check if result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get row count
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of a column by header, case-insensitive
    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(header))
    }

    /// All values of one column, in row order
    pub fn column(&self, header: &str) -> Option<Vec<Option<&Value>>> {
        let idx = self.column_index(header)?;
        Some(self.rows.iter().map(|row| row.values[idx].as_ref()).collect())
    }

    /// Window start labels, in row order
    pub fn timestamps(&self) -> Vec<i64> {
        self.rows.iter().map(|row| row.timestamp).collect()
    }

    /// Format result to string
    pub fn format(&self, format: ResultFormat) -> String {
        match format {
            ResultFormat::Json => self.to_json(),
            ResultFormat::JsonPretty => self.to_json_pretty(),
            ResultFormat::Csv => self.to_csv(),
            ResultFormat::Table => self.to_table(),
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Convert to pretty-printed JSON string
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Convert to CSV string; nulls are written as `null`
    pub fn to_csv(&self) -> String {
        let mut output = String::from("timestamp");
        for column in &self.columns {
            output.push(',');
            output.push_str(&csv_field(column));
        }
        output.push('\n');

        for row in &self.rows {
            output.push_str(&row.timestamp.to_string());
            for value in &row.values {
                output.push(',');
                output.push_str(&csv_field(&cell(value.as_ref())));
            }
            output.push('\n');
        }

        output
    }

    /// Convert to ASCII table string
    pub fn to_table(&self) -> String {
        if self.rows.is_empty() {
            return "No results".to_string();
        }

        let shown = &self.rows[..self.rows.len().min(MAX_TABLE_ROWS)];
        let headers: Vec<&str> = std::iter::once("timestamp")
            .chain(self.columns.iter().map(String::as_str))
            .collect();
        let cells: Vec<Vec<String>> = shown
            .iter()
            .map(|row| {
                std::iter::once(row.timestamp.to_string())
                    .chain(row.values.iter().map(|v| cell(v.as_ref())))
                    .collect()
            })
            .collect();

        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in &cells {
            for (width, text) in widths.iter_mut().zip(row) {
                *width = (*width).max(text.chars().count());
            }
        }

        let border: String = widths
            .iter()
            .map(|w| format!("+{}", "-".repeat(w + 2)))
            .collect::<String>()
            + "+\n";

        let mut output = border.clone();
        for (header, width) in headers.iter().zip(&widths) {
            output.push_str(&format!("| {:^width$} ", header, width = width));
        }
        output.push_str("|\n");
        output.push_str(&border);

        for row in &cells {
            for (text, width) in row.iter().zip(&widths) {
                output.push_str(&format!("| {:>width$} ", text, width = width));
            }
            output.push_str("|\n");
        }
        output.push_str(&border);

        if self.rows.len() > MAX_TABLE_ROWS {
            output.push_str(&format!(
                "... and {} more rows\n",
                self.rows.len() - MAX_TABLE_ROWS
            ));
        }

        // Metadata footer
        output.push_str(&format!(
            "\n{} rows in {:.3}ms\n",
            self.metadata.row_count,
            self.metadata.execution_time_us as f64 / 1000.0
        ));

        output
    }
}

/// Text of one cell
fn cell(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "null".to_string(),
    }
}

/// Quote a CSV field when needed
fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

/// Single result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Window start
    pub timestamp: i64,

    /// One value per column; `None` is null
    pub values: Vec<Option<Value>>,
}

impl ResultRow {
    /// Create a new row
    pub fn new(timestamp: i64, values: Vec<Option<Value>>) -> Self {
        Self { timestamp, values }
    }
}

/// Query execution metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Number of rows returned
    pub row_count: usize,

    /// Number of windows in the plan
    #[serde(default)]
    pub window_count: u64,

    /// Query execution time in microseconds
    pub execution_time_us: u64,

    /// Points pulled from all sources
    #[serde(skip_serializing_if = "is_zero")]
    #[serde(default)]
    pub points_read: u64,

    /// Whether rows were cut by offset or limit
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[serde(default)]
    pub truncated: bool,
}

/// Helper for serde skip_serializing_if
fn is_zero(n: &u64) -> bool {
    *n == 0
}

// ============================================================================
// Result Format
// ============================================================================

/// Output format for query results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultFormat {
    /// Compact JSON
    #[default]
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// CSV format
    Csv,
    /// ASCII table (for CLI)
    Table,
}

impl fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultFormat::Json => write!(f, "json"),
            ResultFormat::JsonPretty => write!(f, "json-pretty"),
            ResultFormat::Csv => write!(f, "csv"),
            ResultFormat::Table => write!(f, "table"),
        }
    }
}

impl std::str::FromStr for ResultFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ResultFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(ResultFormat::JsonPretty),
            "csv" => Ok(ResultFormat::Csv),
            "table" => Ok(ResultFormat::Table),
            _ => Err(format!("unknown format: {}", s)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GroupByResult {
        GroupByResult::new(
            vec!["count(s1)".to_string(), "avg(s1)".to_string()],
            vec![
                ResultRow::new(1, vec![Some(Value::Integer(0)), None]),
                ResultRow::new(6, vec![Some(Value::Integer(3)), Some(Value::Float(7.7))]),
            ],
        )
    }

    #[test]
    fn test_csv_writes_null() {
        let csv = sample().to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "timestamp,count(s1),avg(s1)");
        assert_eq!(lines[1], "1,0,null");
        assert_eq!(lines[2], "6,3,7.7");
    }

    #[test]
    fn test_csv_float_keeps_decimal_point() {
        let result = GroupByResult::new(
            vec!["sum(s1)".to_string()],
            vec![ResultRow::new(1, vec![Some(Value::Float(0.0))])],
        );
        assert_eq!(result.to_csv().lines().nth(1), Some("1,0.0"));
    }

    #[test]
    fn test_csv_quotes_text() {
        let result = GroupByResult::new(
            vec!["last_value(s1)".to_string()],
            vec![ResultRow::new(1, vec![Some(Value::from("a,\"b\""))])],
        );
        assert_eq!(result.to_csv().lines().nth(1), Some("1,\"a,\"\"b\"\"\""));
    }

    #[test]
    fn test_json_null_and_round_trip() {
        let result = sample();
        let json: serde_json::Value = serde_json::from_str(&result.to_json()).unwrap();
        assert!(json["rows"][0]["values"][1].is_null());
        assert_eq!(json["rows"][1]["values"][1], 7.7);
        assert_eq!(json["metadata"]["row_count"], 2);

        let back: GroupByResult = serde_json::from_str(&result.to_json()).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_json_nan_sum_distinct_from_empty_window() {
        let result = GroupByResult::new(
            vec!["sum(s1)".to_string(), "avg(s1)".to_string()],
            vec![
                ResultRow::new(1, vec![Some(Value::Float(f64::NAN)), Some(Value::Float(f64::NAN))]),
                ResultRow::new(6, vec![Some(Value::Float(0.0)), None]),
            ],
        );
        let json: serde_json::Value = serde_json::from_str(&result.to_json()).unwrap();
        assert_eq!(json["rows"][0]["values"][0], "NaN");
        assert_eq!(json["rows"][0]["values"][1], "NaN");
        assert!(json["rows"][1]["values"][1].is_null());
    }

    #[test]
    fn test_table() {
        let table = sample().to_table();
        assert!(table.contains("count(s1)"));
        assert!(table.contains("null"));
        assert!(table.contains("2 rows"));
        assert_eq!(GroupByResult::new(vec![], vec![]).to_table(), "No results");
    }

    #[test]
    fn test_column_access() {
        let result = sample();
        assert_eq!(result.column_index("AVG(s1)"), Some(1));
        assert_eq!(
            result.column("count(s1)").unwrap(),
            vec![Some(&Value::Integer(0)), Some(&Value::Integer(3))]
        );
        assert_eq!(result.timestamps(), vec![1, 6]);
        assert!(result.column("sum(s1)").is_none());
    }

    #[test]
    fn test_result_format_parsing() {
        assert_eq!("json".parse::<ResultFormat>().unwrap(), ResultFormat::Json);
        assert_eq!("CSV".parse::<ResultFormat>().unwrap(), ResultFormat::Csv);
        assert_eq!("table".parse::<ResultFormat>().unwrap(), ResultFormat::Table);
        assert!("xml".parse::<ResultFormat>().is_err());
    }
}
