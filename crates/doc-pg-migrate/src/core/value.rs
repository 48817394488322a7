//! Bound values for destination inserts.
//!
//! Source records are untyped JSON-like maps; [`SqlValue`] is the shape a
//! value has once the coercion engine is done with it. The final conversion
//! to the wire format happens at bind time against the actual column type,
//! so an `I64` can land in a `smallint` column and a `Text` holding a UUID
//! can land in a `uuid` column.

use std::error::Error;
use std::fmt;

use bytes::BytesMut;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tokio_postgres::types::{to_sql_checked, IsNull, Kind, ToSql, Type};
use uuid::Uuid;

use crate::coerce::parse_timestamp_str;

type BoxError = Box<dyn Error + Sync + Send>;

/// A coerced field value ready to be bound to an INSERT parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    TextArray(Vec<String>),
    BoolArray(Vec<bool>),
    I64Array(Vec<i64>),
    F64Array(Vec<f64>),
    TimestampArray(Vec<DateTime<Utc>>),
    Json(Value),
    /// Let the column default fill the value (`DEFAULT` instead of `$n`).
    Default,
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Build a value from a JSON value, guided by the destination SQL type.
    ///
    /// Arrays headed for an array column take the column's element type
    /// (`integer[]` gives `I64Array`, `boolean[]` gives `BoolArray`,
    /// `timestamptz[]` gives `TimestampArray`). Elements that do not fit,
    /// and untyped array columns, fall back to inference from the elements.
    /// Objects, and anything headed for a `json` or `jsonb` column, stay
    /// JSON.
    pub fn from_json(value: &Value, sql_type: &str) -> SqlValue {
        let ty = sql_type.trim().to_ascii_lowercase();
        if ty.starts_with("json") {
            return match value {
                Value::Null => SqlValue::Null,
                other => SqlValue::Json(other.clone()),
            };
        }

        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::I64(i),
                None => SqlValue::F64(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Array(items) if is_array_type(&ty) => array_from_json(items, &ty),
            other => SqlValue::Json(other.clone()),
        }
    }

    /// JSON rendering, used for in-memory storage and diagnostics.
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null | SqlValue::Default => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::I64(n) => Value::from(*n),
            SqlValue::F64(n) => Value::from(*n),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::Timestamp(t) => Value::String(format_timestamp(t)),
            SqlValue::TextArray(v) => Value::from(v.clone()),
            SqlValue::BoolArray(v) => Value::from(v.clone()),
            SqlValue::I64Array(v) => Value::from(v.clone()),
            SqlValue::F64Array(v) => Value::from(v.clone()),
            SqlValue::TimestampArray(v) => {
                Value::Array(v.iter().map(|t| Value::String(format_timestamp(t))).collect())
            }
            SqlValue::Json(v) => v.clone(),
        }
    }

    /// Whether this is an array value with no elements.
    pub fn is_empty_array(&self) -> bool {
        match self {
            SqlValue::TextArray(v) => v.is_empty(),
            SqlValue::BoolArray(v) => v.is_empty(),
            SqlValue::I64Array(v) => v.is_empty(),
            SqlValue::F64Array(v) => v.is_empty(),
            SqlValue::TimestampArray(v) => v.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Default => f.write_str("DEFAULT"),
            SqlValue::Text(s) => write!(f, "{:?}", s),
            SqlValue::Timestamp(t) => f.write_str(&format_timestamp(t)),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<Vec<String>> for SqlValue {
    fn from(v: Vec<String>) -> Self {
        SqlValue::TextArray(v)
    }
}

/// Whether a SQL type string names an array type.
pub fn is_array_type(sql_type: &str) -> bool {
    let ty = sql_type.trim();
    ty.ends_with("[]") || ty.to_ascii_lowercase().starts_with("array")
}

/// Wire type of a column type as written in DDL, or `None` when the
/// name is not one the binder knows.
pub fn pg_type_for(sql_type: &str) -> Option<Type> {
    let ty = sql_type.trim().to_ascii_lowercase();
    if let Some(element) = array_element_type(&ty) {
        let element = pg_type_for(element)?;
        return Some(match element {
            Type::TEXT => Type::TEXT_ARRAY,
            Type::VARCHAR => Type::VARCHAR_ARRAY,
            Type::BPCHAR => Type::BPCHAR_ARRAY,
            Type::UUID => Type::UUID_ARRAY,
            Type::BOOL => Type::BOOL_ARRAY,
            Type::INT2 => Type::INT2_ARRAY,
            Type::INT4 => Type::INT4_ARRAY,
            Type::INT8 => Type::INT8_ARRAY,
            Type::FLOAT4 => Type::FLOAT4_ARRAY,
            Type::FLOAT8 => Type::FLOAT8_ARRAY,
            Type::TIMESTAMPTZ => Type::TIMESTAMPTZ_ARRAY,
            Type::TIMESTAMP => Type::TIMESTAMP_ARRAY,
            Type::DATE => Type::DATE_ARRAY,
            Type::JSON => Type::JSON_ARRAY,
            Type::JSONB => Type::JSONB_ARRAY,
            _ => return None,
        });
    }

    // varchar(64) and friends bind like their base type
    let base = ty.split('(').next().unwrap_or_default().trim();
    Some(match base {
        "text" => Type::TEXT,
        "varchar" | "character varying" => Type::VARCHAR,
        "char" | "character" | "bpchar" => Type::BPCHAR,
        "uuid" => Type::UUID,
        "boolean" | "bool" => Type::BOOL,
        "smallint" | "int2" => Type::INT2,
        "integer" | "int" | "int4" => Type::INT4,
        "bigint" | "int8" => Type::INT8,
        "real" | "float4" => Type::FLOAT4,
        "double precision" | "float8" => Type::FLOAT8,
        "timestamptz" | "timestamp with time zone" => Type::TIMESTAMPTZ,
        "timestamp" | "timestamp without time zone" => Type::TIMESTAMP,
        "date" => Type::DATE,
        "json" => Type::JSON,
        "jsonb" => Type::JSONB,
        _ => return None,
    })
}

/// Whether a SQL type string names a scalar temporal type.
pub fn is_temporal_type(sql_type: &str) -> bool {
    let ty = sql_type.trim().to_ascii_lowercase();
    ty.starts_with("time") && !is_array_type(&ty)
}

fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Element type of an array SQL type: `integer[]` gives `integer`.
pub fn array_element_type(sql_type: &str) -> Option<&str> {
    sql_type.trim().strip_suffix("[]").map(str::trim)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementKind {
    Int,
    Float,
    Bool,
    Timestamp,
    Other,
}

fn element_kind(element: &str) -> ElementKind {
    match element.to_ascii_lowercase().as_str() {
        "smallint" | "int2" | "integer" | "int" | "int4" | "bigint" | "int8" => ElementKind::Int,
        "real" | "float4" | "double precision" | "float8" => ElementKind::Float,
        "boolean" | "bool" => ElementKind::Bool,
        e if e.starts_with("timestamp") => ElementKind::Timestamp,
        _ => ElementKind::Other,
    }
}

fn json_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => DateTime::<Utc>::from_timestamp_millis(n.as_i64()?),
        Value::String(s) => parse_timestamp_str(s).ok(),
        _ => None,
    }
}

fn array_from_json(items: &[Value], sql_type: &str) -> SqlValue {
    let kind = array_element_type(sql_type).map_or(ElementKind::Other, element_kind);
    let typed = match kind {
        ElementKind::Int => items
            .iter()
            .map(json_i64)
            .collect::<Option<Vec<_>>>()
            .map(SqlValue::I64Array),
        ElementKind::Float => items
            .iter()
            .map(json_f64)
            .collect::<Option<Vec<_>>>()
            .map(SqlValue::F64Array),
        ElementKind::Bool => items
            .iter()
            .map(json_bool)
            .collect::<Option<Vec<_>>>()
            .map(SqlValue::BoolArray),
        ElementKind::Timestamp => items
            .iter()
            .map(json_timestamp)
            .collect::<Option<Vec<_>>>()
            .map(SqlValue::TimestampArray),
        ElementKind::Other => None,
    };
    typed.unwrap_or_else(|| infer_array(items))
}

fn infer_array(items: &[Value]) -> SqlValue {
    if items.iter().all(Value::is_string) {
        return SqlValue::TextArray(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        );
    }
    if !items.is_empty() && items.iter().all(Value::is_boolean) {
        return SqlValue::BoolArray(items.iter().filter_map(Value::as_bool).collect());
    }
    if items.iter().all(|v| v.as_i64().is_some()) {
        return SqlValue::I64Array(items.iter().filter_map(Value::as_i64).collect());
    }
    if items.iter().all(Value::is_number) {
        return SqlValue::F64Array(items.iter().filter_map(Value::as_f64).collect());
    }
    SqlValue::TextArray(
        items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
    )
}

fn mismatch(value: &SqlValue, ty: &Type) -> BoxError {
    format!("cannot bind {} to a column of type {}", value, ty).into()
}

fn is_text(ty: &Type) -> bool {
    [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME, Type::UNKNOWN].contains(ty)
}

fn is_text_array(ty: &Type) -> bool {
    [Type::TEXT_ARRAY, Type::VARCHAR_ARRAY, Type::BPCHAR_ARRAY].contains(ty)
}

fn parse_each<T>(items: &[String]) -> Result<Vec<T>, BoxError>
where
    T: std::str::FromStr,
    T::Err: Error + Sync + Send + 'static,
{
    items
        .iter()
        .map(|s| s.trim().parse::<T>().map_err(Into::into))
        .collect()
}

fn parse_timestamps(items: &[String]) -> Result<Vec<DateTime<Utc>>, BoxError> {
    items
        .iter()
        .map(|s| parse_timestamp_str(s).map_err(Into::into))
        .collect()
}

fn bind_i64(n: i64, value: &SqlValue, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(n)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(n)?.to_sql(ty, out),
        Type::INT8 => n.to_sql(ty, out),
        Type::FLOAT4 => (n as f32).to_sql(ty, out),
        Type::FLOAT8 => (n as f64).to_sql(ty, out),
        Type::BOOL => (n != 0).to_sql(ty, out),
        Type::TIMESTAMPTZ => DateTime::<Utc>::from_timestamp_millis(n)
            .ok_or_else(|| mismatch(value, ty))?
            .to_sql(ty, out),
        Type::JSON | Type::JSONB => Value::from(n).to_sql(ty, out),
        _ if is_text(ty) => n.to_string().to_sql(ty, out),
        _ => Err(mismatch(value, ty)),
    }
}

fn bind_f64(n: f64, value: &SqlValue, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (n as f32).to_sql(ty, out),
        Type::FLOAT8 => n.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 if n.fract() == 0.0 => {
            bind_i64(n as i64, value, ty, out)
        }
        Type::JSON | Type::JSONB => Value::from(n).to_sql(ty, out),
        _ if is_text(ty) => n.to_string().to_sql(ty, out),
        _ => Err(mismatch(value, ty)),
    }
}

fn bind_text(s: &str, value: &SqlValue, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::UUID => Uuid::parse_str(s.trim())?.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 => bind_i64(s.trim().parse()?, value, ty, out),
        Type::FLOAT4 | Type::FLOAT8 => bind_f64(s.trim().parse()?, value, ty, out),
        Type::BOOL => s.trim().parse::<bool>()?.to_sql(ty, out),
        Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(s.trim())?
            .with_timezone(&Utc)
            .to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<Value>(s)
            .unwrap_or_else(|_| Value::String(s.to_string()))
            .to_sql(ty, out),
        _ if is_text(ty) => s.to_sql(ty, out),
        _ if is_text_array(ty) => vec![s].to_sql(ty, out),
        _ => Err(mismatch(value, ty)),
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        // An empty array carries no element type, so it fits any array column.
        if self.is_empty_array() && matches!(ty.kind(), Kind::Array(_)) {
            return Vec::<String>::new().to_sql(ty, out);
        }

        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Default => Err("DEFAULT placeholder cannot be bound as a parameter".into()),
            SqlValue::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                Type::JSON | Type::JSONB => Value::Bool(*b).to_sql(ty, out),
                _ if is_text(ty) => b.to_string().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            SqlValue::I64(n) => bind_i64(*n, self, ty, out),
            SqlValue::F64(n) => bind_f64(*n, self, ty, out),
            SqlValue::Text(s) => bind_text(s, self, ty, out),
            SqlValue::Timestamp(t) => match *ty {
                Type::TIMESTAMPTZ => t.to_sql(ty, out),
                Type::TIMESTAMP => t.naive_utc().to_sql(ty, out),
                Type::DATE => t.date_naive().to_sql(ty, out),
                Type::INT8 => t.timestamp_millis().to_sql(ty, out),
                _ if is_text(ty) => format_timestamp(t).to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            SqlValue::TextArray(v) => match *ty {
                Type::UUID_ARRAY => v
                    .iter()
                    .map(|s| Uuid::parse_str(s.trim()))
                    .collect::<Result<Vec<_>, _>>()?
                    .to_sql(ty, out),
                Type::INT2_ARRAY => parse_each::<i16>(v)?.to_sql(ty, out),
                Type::INT4_ARRAY => parse_each::<i32>(v)?.to_sql(ty, out),
                Type::INT8_ARRAY => parse_each::<i64>(v)?.to_sql(ty, out),
                Type::FLOAT4_ARRAY => parse_each::<f32>(v)?.to_sql(ty, out),
                Type::FLOAT8_ARRAY => parse_each::<f64>(v)?.to_sql(ty, out),
                Type::BOOL_ARRAY => parse_each::<bool>(v)?.to_sql(ty, out),
                Type::TIMESTAMPTZ_ARRAY => parse_timestamps(v)?.to_sql(ty, out),
                Type::JSON | Type::JSONB => self.to_json().to_sql(ty, out),
                _ if is_text_array(ty) => v.to_sql(ty, out),
                _ if is_text(ty) => self.to_json().to_string().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            SqlValue::BoolArray(v) => match *ty {
                Type::BOOL_ARRAY => v.to_sql(ty, out),
                Type::JSON | Type::JSONB => self.to_json().to_sql(ty, out),
                _ if is_text_array(ty) => {
                    v.iter().map(bool::to_string).collect::<Vec<_>>().to_sql(ty, out)
                }
                _ => Err(mismatch(self, ty)),
            },
            SqlValue::I64Array(v) => match *ty {
                Type::INT8_ARRAY => v.to_sql(ty, out),
                Type::INT4_ARRAY => v
                    .iter()
                    .map(|n| i32::try_from(*n))
                    .collect::<Result<Vec<_>, _>>()?
                    .to_sql(ty, out),
                Type::INT2_ARRAY => v
                    .iter()
                    .map(|n| i16::try_from(*n))
                    .collect::<Result<Vec<_>, _>>()?
                    .to_sql(ty, out),
                Type::FLOAT8_ARRAY => v.iter().map(|n| *n as f64).collect::<Vec<_>>().to_sql(ty, out),
                Type::FLOAT4_ARRAY => v.iter().map(|n| *n as f32).collect::<Vec<_>>().to_sql(ty, out),
                Type::JSON | Type::JSONB => self.to_json().to_sql(ty, out),
                _ if is_text_array(ty) => {
                    v.iter().map(i64::to_string).collect::<Vec<_>>().to_sql(ty, out)
                }
                _ => Err(mismatch(self, ty)),
            },
            SqlValue::F64Array(v) => match *ty {
                Type::FLOAT8_ARRAY => v.to_sql(ty, out),
                Type::FLOAT4_ARRAY => v.iter().map(|n| *n as f32).collect::<Vec<_>>().to_sql(ty, out),
                Type::JSON | Type::JSONB => self.to_json().to_sql(ty, out),
                _ if is_text_array(ty) => {
                    v.iter().map(f64::to_string).collect::<Vec<_>>().to_sql(ty, out)
                }
                _ => Err(mismatch(self, ty)),
            },
            SqlValue::TimestampArray(v) => match *ty {
                Type::TIMESTAMPTZ_ARRAY => v.to_sql(ty, out),
                Type::JSON | Type::JSONB => self.to_json().to_sql(ty, out),
                _ if is_text_array(ty) => {
                    v.iter().map(format_timestamp).collect::<Vec<_>>().to_sql(ty, out)
                }
                _ => Err(mismatch(self, ty)),
            },
            SqlValue::Json(v) => match *ty {
                Type::JSON | Type::JSONB => v.to_sql(ty, out),
                _ if is_text(ty) => v.to_string().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(SqlValue::from_json(&json!(null), "text"), SqlValue::Null);
        assert_eq!(SqlValue::from_json(&json!(true), "boolean"), SqlValue::Bool(true));
        assert_eq!(SqlValue::from_json(&json!(42), "bigint"), SqlValue::I64(42));
        assert_eq!(SqlValue::from_json(&json!(1.5), "real"), SqlValue::F64(1.5));
        assert_eq!(
            SqlValue::from_json(&json!("abc"), "text"),
            SqlValue::Text("abc".into())
        );
    }

    #[test]
    fn test_from_json_arrays_follow_column_type() {
        assert_eq!(
            SqlValue::from_json(&json!(["a", "b"]), "text[]"),
            SqlValue::TextArray(vec!["a".into(), "b".into()])
        );
        assert_eq!(
            SqlValue::from_json(&json!([1, 2]), "bigint[]"),
            SqlValue::I64Array(vec![1, 2])
        );
        assert_eq!(
            SqlValue::from_json(&json!(["a", 1]), "text[]"),
            SqlValue::TextArray(vec!["a".into(), "1".into()])
        );
        assert_eq!(
            SqlValue::from_json(&json!(["a"]), "jsonb"),
            SqlValue::Json(json!(["a"]))
        );
    }

    #[test]
    fn test_from_json_arrays_take_element_type() {
        assert_eq!(
            SqlValue::from_json(&json!([]), "integer[]"),
            SqlValue::I64Array(vec![])
        );
        assert_eq!(
            SqlValue::from_json(&json!(["1", 2]), "bigint[]"),
            SqlValue::I64Array(vec![1, 2])
        );
        assert_eq!(
            SqlValue::from_json(&json!([true, false]), "boolean[]"),
            SqlValue::BoolArray(vec![true, false])
        );
        assert_eq!(
            SqlValue::from_json(&json!(["2023-11-14T22:13:20Z", 0]), "timestamptz[]"),
            SqlValue::TimestampArray(vec![
                DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap(),
                DateTime::<Utc>::from_timestamp_millis(0).unwrap(),
            ])
        );
        assert_eq!(
            SqlValue::from_json(&json!([1.5]), "double precision[]"),
            SqlValue::F64Array(vec![1.5])
        );
        // Elements that do not fit fall back to inference.
        assert_eq!(
            SqlValue::from_json(&json!(["x"]), "integer[]"),
            SqlValue::TextArray(vec!["x".into()])
        );
        assert_eq!(
            SqlValue::from_json(&json!([true]), "text[]"),
            SqlValue::BoolArray(vec![true])
        );
    }

    #[test]
    fn test_empty_arrays_bind_to_any_array_column() {
        let array_types = [
            Type::INT2_ARRAY,
            Type::INT4_ARRAY,
            Type::INT8_ARRAY,
            Type::BOOL_ARRAY,
            Type::FLOAT8_ARRAY,
            Type::TIMESTAMPTZ_ARRAY,
            Type::TEXT_ARRAY,
            Type::UUID_ARRAY,
        ];
        for value in [
            SqlValue::from_json(&json!([]), "integer[]"),
            SqlValue::from_json(&json!([]), "text[]"),
            SqlValue::TextArray(vec![]),
        ] {
            for ty in &array_types {
                let mut buf = BytesMut::new();
                assert!(value.to_sql(ty, &mut buf).is_ok(), "{} into {}", value, ty);
            }
        }

        let mut buf = BytesMut::new();
        assert!(SqlValue::TextArray(vec![]).to_sql(&Type::INT4, &mut buf).is_err());
    }

    #[test]
    fn test_typed_arrays_bind() {
        let mut buf = BytesMut::new();
        let ints = SqlValue::from_json(&json!([1, 2]), "integer[]");
        assert!(ints.to_sql(&Type::INT4_ARRAY, &mut buf).is_ok());
        assert!(ints.to_sql(&Type::INT8_ARRAY, &mut buf).is_ok());

        let flags = SqlValue::from_json(&json!([true, false]), "boolean[]");
        assert!(flags.to_sql(&Type::BOOL_ARRAY, &mut buf).is_ok());

        let stamps = SqlValue::from_json(&json!(["2023-11-14T22:13:20Z"]), "timestamptz[]");
        assert!(stamps.to_sql(&Type::TIMESTAMPTZ_ARRAY, &mut buf).is_ok());

        // Split lists arrive as text and are parsed per element.
        let split = SqlValue::TextArray(vec!["1".into(), " 2".into()]);
        assert!(split.to_sql(&Type::INT4_ARRAY, &mut buf).is_ok());
        let bad = SqlValue::TextArray(vec!["one".into()]);
        assert!(bad.to_sql(&Type::INT4_ARRAY, &mut buf).is_err());
        let split_flags = SqlValue::TextArray(vec!["true".into()]);
        assert!(split_flags.to_sql(&Type::BOOL_ARRAY, &mut buf).is_ok());
    }

    #[test]
    fn test_type_predicates() {
        assert!(is_temporal_type("timestamptz"));
        assert!(is_temporal_type("TIMESTAMP"));
        assert!(!is_temporal_type("timestamptz[]"));
        assert!(!is_temporal_type("text"));
        assert!(is_array_type("text[]"));
        assert_eq!(array_element_type("integer[]"), Some("integer"));
        assert_eq!(array_element_type("integer"), None);
    }

    #[test]
    fn test_pg_type_for_ddl_names() {
        assert_eq!(pg_type_for("integer[]"), Some(Type::INT4_ARRAY));
        assert_eq!(pg_type_for("BOOLEAN[]"), Some(Type::BOOL_ARRAY));
        assert_eq!(pg_type_for("varchar(64)"), Some(Type::VARCHAR));
        assert_eq!(pg_type_for("double precision"), Some(Type::FLOAT8));
        assert_eq!(pg_type_for("timestamptz[]"), Some(Type::TIMESTAMPTZ_ARRAY));
        assert_eq!(pg_type_for("citext"), None);
        assert_eq!(pg_type_for("citext[]"), None);
    }

    #[test]
    fn test_bind_converts_to_column_type() {
        let mut buf = BytesMut::new();
        assert!(SqlValue::I64(7).to_sql(&Type::INT2, &mut buf).is_ok());
        assert!(SqlValue::I64(70_000).to_sql(&Type::INT2, &mut buf).is_err());
        assert!(SqlValue::Text("12".into()).to_sql(&Type::INT4, &mut buf).is_ok());
        assert!(SqlValue::Text("not-a-uuid".into())
            .to_sql(&Type::UUID, &mut buf)
            .is_err());
        assert!(matches!(
            SqlValue::Null.to_sql(&Type::TEXT, &mut buf),
            Ok(IsNull::Yes)
        ));
        assert!(SqlValue::Default.to_sql(&Type::TEXT, &mut buf).is_err());
    }

    #[test]
    fn test_json_rendering_of_timestamps() {
        let t = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap();
        assert_eq!(
            SqlValue::Timestamp(t).to_json(),
            json!("2023-11-14T22:13:20.000Z")
        );
    }
}
