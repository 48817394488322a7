//! Timestamp heuristics.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::core::{Source, SqlValue};

/// Token that means "the current time" inside a timestamp string.
pub const NOW_TOKEN: &str = "NOW";

/// Interpret a value as an absolute instant.
///
/// Accepted shapes, in order: epoch milliseconds (integer, float or
/// numeric string), an RFC 3339 string, a string containing `NOW`, and
/// whatever temporal representation the source's extended parser knows.
pub fn coerce_timestamp(value: &Value, source: &dyn Source) -> Result<DateTime<Utc>, String> {
    match value {
        Value::Number(n) => {
            let millis = match n.as_i64() {
                Some(ms) => ms,
                None => n.as_f64().map(|f| f as i64).unwrap_or_default(),
            };
            from_millis(millis)
        }
        Value::String(s) => parse_timestamp_str(s),
        other => match source.ext_parse(other) {
            Some(SqlValue::Timestamp(t)) => Ok(t),
            _ => Err(format!("cannot interpret {} as a timestamp", other)),
        },
    }
}

/// Parse a timestamp string: epoch millis, RFC 3339, or the `NOW` token.
pub fn parse_timestamp_str(s: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = s.trim();
    if let Ok(ms) = trimmed.parse::<i64>() {
        return from_millis(ms);
    }
    match DateTime::parse_from_rfc3339(trimmed) {
        Ok(t) => Ok(t.with_timezone(&Utc)),
        Err(_) if trimmed.contains(NOW_TOKEN) => Ok(Utc::now()),
        Err(e) => Err(format!("invalid timestamp {:?}: {}", s, e)),
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, String> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| format!("epoch milliseconds {} out of range", ms))
}
