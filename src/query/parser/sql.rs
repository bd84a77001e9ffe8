//! GROUP BY and WHERE clause parser
//!
//! # Supported Syntax
//!
//! ```sql
//! -- Tumbling windows over integer timestamps
//! GROUP BY ([1, 30), 3)
//!
//! -- Sliding step, durations with units
//! GROUP BY ([1, 30), 3ms, 5ms)
//!
//! -- Datetime bounds (UTC), compound durations
//! GROUP BY ([2024-01-01 00:00:00, 2024-01-02T00:00:00), 1h30m)
//!
//! -- Predicates
//! value > 3 AND time >= 2024-01-01 00:00:00
//! NOT (value = 'off' OR timestamp < 10)
//! ```
//!
//! Durations are converted to the configured timestamp precision. Zero and
//! negative durations are accepted here and rejected by the parameter
//! validator.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{char, digit1, multispace0, multispace1, one_of, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, recognize, value},
    multi::many1,
    sequence::{delimited, preceded, terminated},
    IResult, Parser,
};

use crate::config::TimestampPrecision;
use crate::error::{Error, Result};
use crate::query::predicate::{Predicate, PredicateOp};
use crate::types::{IntervalSpec, TimeRange, Value};
use chrono::NaiveDateTime;

/// Range and window schedule of a parsed GROUP BY clause
///
/// Not yet validated; hand it to the validator or the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupByClause {
    /// `[start, end)` in timestamp units
    pub range: TimeRange,

    /// Interval and sliding step in timestamp units
    pub interval: IntervalSpec,
}

/// Parse `[GROUP BY] ([start, end), interval[, sliding_step])`
///
/// ```rust
/// use kuba_window::config::TimestampPrecision;
/// use kuba_window::query::parser::parse_group_by;
///
/// let clause = parse_group_by("GROUP BY ([1, 30), 3ms, 5ms)", TimestampPrecision::Milliseconds).unwrap();
/// assert_eq!((clause.range.start, clause.range.end), (1, 30));
/// assert_eq!(clause.interval.interval, 3);
/// assert_eq!(clause.interval.sliding_step, 5);
/// ```
pub fn parse_group_by(input: &str, precision: TimestampPrecision) -> Result<GroupByClause> {
    let raw = finish(input, group_by_clause)?;

    let start = raw.start.resolve(precision)?;
    let end = raw.end.resolve(precision)?;
    let interval = raw.interval.resolve(precision)?;
    let sliding_step = raw
        .sliding_step
        .map(|step| step.resolve(precision))
        .transpose()?;

    Ok(GroupByClause {
        range: TimeRange::new_unchecked(start, end),
        interval: IntervalSpec::new(interval, sliding_step),
    })
}

/// Parse a duration such as `3`, `5ms` or `1h30m` into timestamp units
///
/// A bare integer is taken to already be in timestamp units.
pub fn parse_duration(input: &str, precision: TimestampPrecision) -> Result<i64> {
    finish(input, duration)?.resolve(precision)
}

/// Parse an integer timestamp or a UTC datetime literal into timestamp units
pub fn parse_timestamp(input: &str, precision: TimestampPrecision) -> Result<i64> {
    finish(input, timestamp)?.resolve(precision)
}

/// Parse a WHERE predicate over `time`/`timestamp` and `value`
///
/// ```rust
/// use kuba_window::config::TimestampPrecision;
/// use kuba_window::query::parser::parse_where;
/// use kuba_window::query::predicate::PredicateFilter;
/// use kuba_window::types::DataPoint;
///
/// let predicate = parse_where("value > 3 and time < 10", TimestampPrecision::Milliseconds).unwrap();
/// assert!(predicate.test(&DataPoint::new(2, 3.3)));
/// assert!(!predicate.test(&DataPoint::new(2, 2.2)));
/// ```
pub fn parse_where(input: &str, precision: TimestampPrecision) -> Result<Predicate> {
    let input = strip_keyword(input.trim(), "WHERE");
    finish(input, |i| or_expr(i, precision))
}

/// Run a parser over the whole input, mapping nom failures to parse errors
fn finish<'a, O, P>(input: &'a str, parser: P) -> Result<O>
where
    P: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    let trimmed = input.trim();
    match all_consuming(parser).parse(trimmed) {
        Ok((_, output)) => Ok(output),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let offset = trimmed.len() - e.input.len();
            Err(Error::parse(format!(
                "Unexpected input at position {} in '{}': '{}'",
                offset, trimmed, e.input
            )))
        }
        Err(nom::Err::Incomplete(_)) => Err(Error::parse(format!("Incomplete input: '{}'", trimmed))),
    }
}

fn strip_keyword<'a>(input: &'a str, word: &str) -> &'a str {
    match input.get(..word.len()) {
        Some(head)
            if head.eq_ignore_ascii_case(word)
                && input[word.len()..].starts_with(char::is_whitespace) =>
        {
            input[word.len()..].trim_start()
        }
        _ => input,
    }
}

// ============================================================================
// Raw Syntax
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct RawGroupBy {
    start: RawTimestamp,
    end: RawTimestamp,
    interval: RawDuration,
    sliding_step: Option<RawDuration>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RawTimestamp {
    /// Already in timestamp units
    Units(i64),
    /// UTC wall-clock time
    DateTime(NaiveDateTime),
}

impl RawTimestamp {
    fn resolve(self, precision: TimestampPrecision) -> Result<i64> {
        match self {
            RawTimestamp::Units(ts) => Ok(ts),
            RawTimestamp::DateTime(dt) => {
                let utc = dt.and_utc();
                let nanos = utc.timestamp() as i128 * 1_000_000_000
                    + utc.timestamp_subsec_nanos() as i128;
                let units = nanos.div_euclid(precision.nanos_per_unit() as i128);
                i64::try_from(units).map_err(|_| {
                    Error::parse(format!("Datetime {} is out of range for {}", dt, precision))
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DurationUnit {
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Milli,
    Micro,
    Nano,
}

impl DurationUnit {
    fn nanos(self) -> i128 {
        match self {
            DurationUnit::Week => 7 * 86_400 * 1_000_000_000,
            DurationUnit::Day => 86_400 * 1_000_000_000,
            DurationUnit::Hour => 3_600 * 1_000_000_000,
            DurationUnit::Minute => 60 * 1_000_000_000,
            DurationUnit::Second => 1_000_000_000,
            DurationUnit::Milli => 1_000_000,
            DurationUnit::Micro => 1_000,
            DurationUnit::Nano => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RawDuration {
    /// Bare integer, already in timestamp units
    Units(i64),
    /// `[-]<n><unit>...`
    Compound {
        negative: bool,
        parts: Vec<(u64, DurationUnit)>,
    },
}

impl RawDuration {
    fn resolve(&self, precision: TimestampPrecision) -> Result<i64> {
        let (negative, parts) = match self {
            RawDuration::Units(units) => return Ok(*units),
            RawDuration::Compound { negative, parts } => (*negative, parts),
        };

        let mut nanos: i128 = 0;
        for &(amount, unit) in parts {
            nanos = (amount as i128)
                .checked_mul(unit.nanos())
                .and_then(|n| nanos.checked_add(n))
                .ok_or_else(|| Error::parse("Duration overflows"))?;
        }

        let per_unit = precision.nanos_per_unit() as i128;
        if nanos % per_unit != 0 {
            return Err(Error::parse(format!(
                "Duration of {}ns is not a whole number of {}",
                nanos, precision
            )));
        }

        let units = if negative { -(nanos / per_unit) } else { nanos / per_unit };
        i64::try_from(units)
            .map_err(|_| Error::parse(format!("Duration of {}ns is out of range", nanos)))
    }
}

// ============================================================================
// GROUP BY Parsing
// ============================================================================

/// Parse the clause, keyword optional
fn group_by_clause(input: &str) -> IResult<&str, RawGroupBy> {
    let (input, _) = opt((
        tag_no_case("GROUP"),
        multispace1,
        tag_no_case("BY"),
        multispace0,
    ))
    .parse(input)?;
    let (input, _) = (char('('), multispace0, char('['), multispace0).parse(input)?;
    let (input, start) = timestamp(input)?;
    let (input, _) = comma(input)?;
    let (input, end) = timestamp(input)?;
    let (input, _) = (multispace0, char(')')).parse(input)?;
    let (input, _) = comma(input)?;
    let (input, interval) = duration(input)?;
    let (input, sliding_step) = opt(preceded(comma, duration)).parse(input)?;
    let (input, _) = (multispace0, char(')')).parse(input)?;

    Ok((
        input,
        RawGroupBy {
            start,
            end,
            interval,
            sliding_step,
        },
    ))
}

fn comma(input: &str) -> IResult<&str, char> {
    delimited(multispace0, char(','), multispace0).parse(input)
}

// ============================================================================
// Durations and Timestamps
// ============================================================================

/// Parse duration like: 5ms, 1h30m, -3s, 3
fn duration(input: &str) -> IResult<&str, RawDuration> {
    alt((
        map(
            (opt(char('-')), many1((unsigned, duration_unit))),
            |(sign, parts)| RawDuration::Compound {
                negative: sign.is_some(),
                parts,
            },
        ),
        map(signed, RawDuration::Units),
    ))
    .parse(input)
}

fn duration_unit(input: &str) -> IResult<&str, DurationUnit> {
    // Longer units first so "ms" is not read as "m" followed by "s"
    alt((
        value(DurationUnit::Nano, tag_no_case("ns")),
        value(DurationUnit::Micro, tag_no_case("us")),
        value(DurationUnit::Micro, tag("µs")),
        value(DurationUnit::Milli, tag_no_case("ms")),
        value(DurationUnit::Second, tag_no_case("s")),
        value(DurationUnit::Minute, tag_no_case("m")),
        value(DurationUnit::Hour, tag_no_case("h")),
        value(DurationUnit::Day, tag_no_case("d")),
        value(DurationUnit::Week, tag_no_case("w")),
    ))
    .parse(input)
}

/// Parse timestamp: datetime literal or signed integer
fn timestamp(input: &str) -> IResult<&str, RawTimestamp> {
    alt((
        map(datetime, RawTimestamp::DateTime),
        map(signed, RawTimestamp::Units),
    ))
    .parse(input)
}

/// Parse `YYYY-MM-DD[ T]HH:MM:SS[.fff]`
fn datetime(input: &str) -> IResult<&str, NaiveDateTime> {
    map_res(
        recognize((
            digit1,
            char('-'),
            digit1,
            char('-'),
            digit1,
            one_of(" Tt"),
            digit1,
            char(':'),
            digit1,
            char(':'),
            digit1,
            opt((char('.'), digit1)),
        )),
        |text: &str| {
            let normalized: String = text
                .chars()
                .map(|c| if c == 'T' || c == 't' { ' ' } else { c })
                .collect();
            NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f")
        },
    )
    .parse(input)
}

fn unsigned(input: &str) -> IResult<&str, u64> {
    map_res(digit1, str::parse::<u64>).parse(input)
}

fn signed(input: &str) -> IResult<&str, i64> {
    map_res(recognize((opt(one_of("+-")), digit1)), str::parse::<i64>).parse(input)
}

// ============================================================================
// WHERE Parsing
// ============================================================================

/// Keyword not followed by an identifier character
fn keyword<'a>(
    word: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    terminated(
        tag_no_case(word),
        not(satisfy(|c: char| c.is_alphanumeric() || c == '_')),
    )
}

fn or_expr(input: &str, precision: TimestampPrecision) -> IResult<&str, Predicate> {
    let (mut input, mut predicate) = and_expr(input, precision)?;
    loop {
        match preceded((multispace0, keyword("OR")), |i| and_expr(i, precision)).parse(input) {
            Ok((rest, rhs)) => {
                predicate = predicate.or(rhs);
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, predicate)),
            Err(e) => return Err(e),
        }
    }
}

fn and_expr(input: &str, precision: TimestampPrecision) -> IResult<&str, Predicate> {
    let (mut input, mut predicate) = factor(input, precision)?;
    loop {
        match preceded((multispace0, keyword("AND")), |i| factor(i, precision)).parse(input) {
            Ok((rest, rhs)) => {
                predicate = predicate.and(rhs);
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, predicate)),
            Err(e) => return Err(e),
        }
    }
}

fn factor(input: &str, precision: TimestampPrecision) -> IResult<&str, Predicate> {
    let (input, _) = multispace0(input)?;
    alt((
        map(preceded(keyword("NOT"), |i| factor(i, precision)), Predicate::negate),
        delimited(
            char('('),
            |i| or_expr(i, precision),
            (multispace0, char(')')),
        ),
        |i| comparison(i, precision),
    ))
    .parse(input)
}

fn comparison(input: &str, precision: TimestampPrecision) -> IResult<&str, Predicate> {
    alt((|i| time_comparison(i, precision), value_comparison)).parse(input)
}

/// Parse time condition like: time > 3
fn time_comparison(input: &str, precision: TimestampPrecision) -> IResult<&str, Predicate> {
    let (input, _) = alt((keyword("timestamp"), keyword("time"))).parse(input)?;
    let (input, _) = multispace0(input)?;
    let (input, op) = predicate_op(input)?;
    let (input, _) = multispace0(input)?;
    let (rest, raw) = timestamp(input)?;

    let ts = raw.resolve(precision).map_err(|_| {
        nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Verify))
    })?;
    Ok((rest, Predicate::time(op, ts)))
}

/// Parse value predicate like: value > 100
fn value_comparison(input: &str) -> IResult<&str, Predicate> {
    let (input, _) = keyword("value").parse(input)?;
    let (input, _) = multispace0(input)?;
    let (input, op) = predicate_op(input)?;
    let (input, _) = multispace0(input)?;
    let (input, literal) = value_literal(input)?;
    Ok((input, Predicate::value(op, literal)))
}

/// Parse predicate operator
fn predicate_op(input: &str) -> IResult<&str, PredicateOp> {
    alt((
        value(PredicateOp::Gte, tag(">=")),
        value(PredicateOp::Lte, tag("<=")),
        value(PredicateOp::Ne, tag("!=")),
        value(PredicateOp::Ne, tag("<>")),
        value(PredicateOp::Eq, tag("==")),
        value(PredicateOp::Gt, tag(">")),
        value(PredicateOp::Lt, tag("<")),
        value(PredicateOp::Eq, tag("=")),
    ))
    .parse(input)
}

fn value_literal(input: &str) -> IResult<&str, Value> {
    alt((
        map(string_literal, Value::from),
        value(Value::Boolean(true), keyword("true")),
        value(Value::Boolean(false), keyword("false")),
        number_literal,
    ))
    .parse(input)
}

/// Parse number; integers stay integers, anything with a fraction or
/// exponent becomes a float
fn number_literal(input: &str) -> IResult<&str, Value> {
    map_res(
        recognize((
            opt(one_of("+-")),
            digit1,
            opt((char('.'), digit1)),
            opt((one_of("eE"), opt(one_of("+-")), digit1)),
        )),
        |text: &str| {
            if text.contains(['.', 'e', 'E']) {
                text.parse::<f64>().map(Value::Float)
            } else {
                match text.parse::<i64>() {
                    Ok(v) => Ok(Value::Integer(v)),
                    Err(_) => text.parse::<f64>().map(Value::Float),
                }
            }
        },
    )
    .parse(input)
}

/// Parse string literal
fn string_literal(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
    ))
    .parse(input)
}

// ============================================================================
// Tests
// ============================================================================
