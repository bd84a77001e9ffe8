//! Kuba Window CLI
//!
//! Runs a windowed GROUP BY query over series loaded from CSV files.
//!
//! # CLI Commands
//!
//! - `query` - Execute a GROUP BY query
//! - `check-config` - Validate configuration file
//! - `functions` - List available aggregate functions (default)
//!
//! # Series Files
//!
//! Each `--series name=path.csv` file holds `timestamp,value` records with a
//! header row (pass `--no-header` when there is none). Values may be quoted,
//! lines starting with `#` are ignored, and every record must have exactly
//! two fields. Timestamps are integers in the configured precision or
//! `YYYY-MM-DD HH:MM:SS` datetimes. The column type is inferred from the
//! values: all integers, any number, all `true`/`false`, otherwise text.
//!
//! # Example Usage
//!
//! ```bash
//! kuba-window query \
//!   --series s1=data/s1.csv \
//!   --functions count,sum,avg \
//!   --where "value > 3" \
//!   --format table \
//!   "GROUP BY ([1, 30), 3ms, 5ms)"
//! ```

use clap::{Parser, Subcommand};
use kuba_window::{
    config::TimestampPrecision,
    metrics,
    query::{parser, GroupByExecutor, GroupByQuery, InMemoryCatalog, ResultFormat},
    Config, DataPoint, DataType, Value,
};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "kuba-window")]
#[command(version)]
#[command(about = "Time-windowed GROUP BY aggregation over time series", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (overrides WINDOW_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a GROUP BY query
    Query(QueryArgs),

    /// Validate configuration file and print the effective settings
    CheckConfig,

    /// List available aggregate functions
    Functions,
}

#[derive(clap::Args)]
struct QueryArgs {
    /// Window clause, e.g. "GROUP BY ([1, 30), 3ms, 5ms)"
    clause: String,

    /// Series to load, as name=path.csv (repeatable)
    #[arg(short, long = "series", required = true)]
    series: Vec<String>,

    /// Aggregate functions applied to every series
    #[arg(short, long, value_delimiter = ',', default_value = "count,sum,avg")]
    functions: Vec<String>,

    /// Predicate applied to in-window points, e.g. "value > 3 AND time < 20"
    #[arg(short = 'w', long = "where")]
    predicate: Option<String>,

    /// Output format (json, json-pretty, csv, table)
    #[arg(long, default_value = "table")]
    format: ResultFormat,

    /// Maximum rows to return
    #[arg(long)]
    limit: Option<usize>,

    /// Rows to skip
    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Series files have no header row
    #[arg(long)]
    no_header: bool,

    /// Print Prometheus metrics after the result
    #[arg(long)]
    metrics: bool,
}

// =============================================================================
// CLI Command Handlers
// =============================================================================

/// Load configuration from the CLI path, WINDOW_CONFIG, or defaults
fn load_config(cli: &Cli) -> kuba_window::Result<Config> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("WINDOW_CONFIG").map(PathBuf::from));

    match path {
        Some(path) => Config::from_file_with_env(path),
        None => Config::from_env(),
    }
}

/// Validate configuration and print summary
fn cmd_check_config(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Configuration is valid!");
    println!();
    println!("Query Settings:");
    println!("  Timestamp precision: {}", config.query.timestamp_precision);
    println!("  Max windows: {}", config.query.max_windows);
    println!("  Parallel columns: {}", config.query.parallel_columns);
    match config.query.default_limit {
        Some(limit) => println!("  Default limit: {}", limit),
        None => println!("  Default limit: none"),
    }
    println!();
    println!("Monitoring:");
    println!("  Metrics enabled: {}", config.monitoring.metrics_enabled);
    println!("  Log level: {}", config.monitoring.log_level);

    Ok(())
}

/// Print registered aggregate functions
fn cmd_functions(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let executor = GroupByExecutor::with_config(InMemoryCatalog::new(), config.into());
    for name in executor.registry().names() {
        println!("{}", name);
    }
    Ok(())
}

/// Execute a query and print the formatted result
fn cmd_query(config: &Config, args: &QueryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let precision = config.query.timestamp_precision;

    let mut catalog = InMemoryCatalog::new();
    let mut query = GroupByQuery::parse(&args.clause, precision)?;
    for spec in &args.series {
        let (name, path) = spec
            .split_once('=')
            .ok_or_else(|| format!("series must be name=path, got '{}'", spec))?;
        let (data_type, points) = load_series(Path::new(path), !args.no_header, precision)?;
        info!("Loaded {} points of {} into series {}", points.len(), data_type, name);
        catalog.insert(name, data_type, points);
        query = query.column(name, args.functions.as_slice());
    }

    if let Some(text) = &args.predicate {
        let predicate = parser::parse_where(text, precision)?;
        debug!("Predicate: {}", predicate);
        query = query.with_predicate(predicate);
    }
    if let Some(limit) = args.limit {
        query = query.with_limit(limit);
    }
    query = query.with_offset(args.offset);

    let executor = GroupByExecutor::with_config(catalog, config.into());
    let result = executor.execute(&query)?;
    print!("{}", result.format(args.format));
    if !matches!(args.format, ResultFormat::Table | ResultFormat::Csv) {
        println!();
    }

    if args.metrics {
        println!("{}", metrics::gather_metrics()?);
    }

    Ok(())
}

// =============================================================================
// Series Loading
// =============================================================================

/// Read `timestamp,value` records and infer the column type
fn load_series(
    path: &Path,
    has_headers: bool,
    precision: TimestampPrecision,
) -> Result<(DataType, Vec<DataPoint>), Box<dyn std::error::Error>> {
    let file = File::open(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    read_series(file, has_headers, precision)
        .map_err(|e| format!("{}: {}", path.display(), e).into())
}

fn read_series<R: Read>(
    input: R,
    has_headers: bool,
    precision: TimestampPrecision,
) -> Result<(DataType, Vec<DataPoint>), Box<dyn std::error::Error>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(false)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(input);

    let mut raw = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());
        let (ts, value) = match (record.get(0), record.get(1), record.len()) {
            (Some(ts), Some(value), 2) => (ts, value),
            _ => return Err(format!("line {}: expected timestamp,value", line).into()),
        };
        let timestamp = parser::parse_timestamp(ts, precision)
            .map_err(|e| format!("line {}: {}", line, e))?;
        raw.push((timestamp, value.to_string()));
    }

    let data_type = infer_type(raw.iter().map(|(_, v)| v.as_str()));
    let points = raw
        .into_iter()
        .map(|(timestamp, text)| DataPoint::new(timestamp, typed_value(&text, data_type)))
        .collect();
    Ok((data_type, points))
}

fn infer_type<'a>(values: impl Iterator<Item = &'a str> + Clone) -> DataType {
    if values.clone().all(|v| v.parse::<i64>().is_ok()) {
        DataType::Integer
    } else if values.clone().all(|v| v.parse::<f64>().is_ok()) {
        DataType::Float
    } else if values.clone().all(|v| v.parse::<bool>().is_ok()) {
        DataType::Boolean
    } else {
        DataType::Text
    }
}

fn typed_value(text: &str, data_type: DataType) -> Value {
    match data_type {
        DataType::Integer => text.parse::<i64>().ok().map(Value::Integer),
        DataType::Float => text.parse::<f64>().ok().map(Value::Float),
        DataType::Boolean => text.parse::<bool>().ok().map(Value::Boolean),
        DataType::Text => None,
    }
    .unwrap_or_else(|| Value::Text(text.to_string()))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.monitoring.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    debug!("Configuration: {:?}", config);

    match &cli.command {
        Some(Commands::Query(args)) => cmd_query(&config, args),
        Some(Commands::CheckConfig) => cmd_check_config(&config),
        Some(Commands::Functions) | None => cmd_functions(&config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(text: &str, has_headers: bool) -> (DataType, Vec<DataPoint>) {
        read_series(text.as_bytes(), has_headers, TimestampPrecision::Milliseconds).unwrap()
    }

    #[test]
    fn test_header_row_skipped() {
        let (data_type, points) = read("time,value\n1,2.5\n2,4\n", true);
        assert_eq!(data_type, DataType::Float);
        assert_eq!(
            points,
            vec![DataPoint::new(1, Value::Float(2.5)), DataPoint::new(2, Value::Float(4.0))]
        );
    }

    #[test]
    fn test_quoted_text_with_comma() {
        let (data_type, points) = read("time,status\n1,\"ok, cooling\"\n2,\"idle\"\n", true);
        assert_eq!(data_type, DataType::Text);
        assert_eq!(points[0].value, Value::Text("ok, cooling".to_string()));
        assert_eq!(points[1].value, Value::Text("idle".to_string()));
    }

    #[test]
    fn test_without_header_first_record_kept() {
        let (data_type, points) = read("# sensor s1\n1,10\n2,20\n", false);
        assert_eq!(data_type, DataType::Integer);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], DataPoint::new(1, Value::Integer(10)));
    }

    #[test]
    fn test_bad_timestamp_reported_with_line() {
        let err = read_series(
            "time,value\n1,2\nsoon,3\n".as_bytes(),
            true,
            TimestampPrecision::Milliseconds,
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("line 3:"), "{}", err);
    }

    #[test]
    fn test_extra_field_rejected() {
        let result = read_series(
            "time,value\n1,2,3\n".as_bytes(),
            true,
            TimestampPrecision::Milliseconds,
        );
        assert!(result.is_err());
    }
}
