//! Time expression parsing and document timestamp decoding.
//!
//! Supported expressions:
//! - integer epoch seconds (`1479512700`)
//! - `now`
//! - `now-<N><unit>` with unit one of `s m h d M y`, evaluated as a duration
//! - `YYYY-MM-DD`, `YYYY-MM-DDTHH`, `YYYY-MM-DDTHH:MM`, `YYYY-MM-DDTHH:MM:SS`
//!   in local time

use std::sync::LazyLock;

use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;

use crate::error::{EsBridgeError, Result};

static EPOCH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+$").expect("valid regex"));

static RELATIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^now-(\d+)([a-zA-Z])$").expect("valid regex"));

static ABSOLUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(T\d{2}(:\d{2}(:\d{2})?)?)?$").expect("valid regex")
});

static DOC_TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2})\.(\d{1,6})Z$").expect("valid regex")
});

/// Seconds per relative time unit. Months are 30 days, years 360 days.
pub fn unit_seconds(unit: char) -> Option<i64> {
    match unit {
        's' => Some(1),
        'm' => Some(60),
        'h' => Some(3_600),
        'd' => Some(86_400),
        'M' => Some(2_592_000),
        'y' => Some(31_104_000),
        _ => None,
    }
}

/// A classified time expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeExpression {
    /// Bare integer, passed through as epoch seconds.
    Epoch(i64),
    /// The current time, resolved at parse time.
    Now(i64),
    /// `now-<N><unit>`: a duration in seconds, not an instant.
    LookBack(i64),
    /// A calendar date/time in local time, as epoch seconds.
    Absolute(i64),
}

impl TimeExpression {
    /// The numeric value of the expression: epoch seconds, or a duration for
    /// [`TimeExpression::LookBack`].
    pub fn seconds(self) -> i64 {
        match self {
            Self::Epoch(s) | Self::Now(s) | Self::LookBack(s) | Self::Absolute(s) => s,
        }
    }
}

/// Classify and evaluate a time expression.
pub fn parse(expr: &str) -> Result<TimeExpression> {
    let expr = expr.trim();

    if EPOCH_RE.is_match(expr) {
        return expr
            .parse()
            .map(TimeExpression::Epoch)
            .map_err(|e| EsBridgeError::time_expr(expr, format!("epoch out of range: {e}")));
    }

    if expr == "now" {
        return Ok(TimeExpression::Now(Utc::now().timestamp()));
    }

    if let Some(caps) = RELATIVE_RE.captures(expr) {
        let count: i64 = caps[1]
            .parse()
            .map_err(|e| EsBridgeError::time_expr(expr, format!("bad count: {e}")))?;
        let unit = caps[2].chars().next().unwrap_or_default();
        let per_unit = unit_seconds(unit)
            .ok_or_else(|| EsBridgeError::time_expr(expr, format!("unknown unit '{unit}'")))?;
        let seconds = count
            .checked_mul(per_unit)
            .ok_or_else(|| EsBridgeError::time_expr(expr, "duration overflows"))?;
        return Ok(TimeExpression::LookBack(seconds));
    }

    if ABSOLUTE_RE.is_match(expr) {
        return parse_local(expr).map(TimeExpression::Absolute);
    }

    Err(EsBridgeError::time_expr(expr, "unrecognized format"))
}

/// Resolve a time expression to epoch seconds (or a duration for `now-N`).
pub fn resolve(expr: &str) -> Result<i64> {
    parse(expr).map(TimeExpression::seconds)
}

fn parse_local(expr: &str) -> Result<i64> {
    // Pad the shorter grammars out to a full timestamp.
    let full = match expr.len() {
        10 => format!("{expr}T00:00:00"),
        13 => format!("{expr}:00:00"),
        16 => format!("{expr}:00"),
        _ => expr.to_string(),
    };

    let naive = NaiveDateTime::parse_from_str(&full, "%Y-%m-%dT%H:%M:%S")
        .map_err(|e| EsBridgeError::time_expr(expr, e.to_string()))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| EsBridgeError::time_expr(expr, "local time does not exist"))
}

/// Decode a `YYYY-MM-DDTHH:MM:SS.ffffffZ` document timestamp into
/// `"<epoch_seconds>.<microseconds>"`.
pub fn decode_document_timestamp(value: &Value) -> Result<String> {
    let text = value.as_str().ok_or_else(|| EsBridgeError::TimestampFormat {
        value: value.to_string(),
    })?;

    let format_error = || EsBridgeError::TimestampFormat {
        value: text.to_string(),
    };

    let caps = DOC_TIMESTAMP_RE.captures(text).ok_or_else(format_error)?;
    let naive = NaiveDateTime::parse_from_str(&caps[1], "%Y-%m-%dT%H:%M:%S")
        .map_err(|_| format_error())?;

    let micros = format!("{:0<6}", &caps[2]);
    Ok(format!("{}.{micros}", naive.and_utc().timestamp()))
}
