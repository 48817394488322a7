//! Flat JSON document store: `{ "entity": [record, ...], ... }`.
//!
//! Serves as a migration source, a backup source and a backup destination.
//! Exports of MongoDB collections in Extended JSON are understood by the
//! extended-type parser.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::JsonSourceConfig;
use crate::core::{BackupDestination, Record, Source, SqlValue};
use crate::error::{MigrateError, Result};

/// JSON file backed store.
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<Map<String, Value>>,
    ignore_entities: Vec<String>,
}

impl JsonFileStore {
    /// Open the file at `path`, creating it with `{}` when absent.
    pub async fn connect(path: impl AsRef<Path>, ignore_entities: Vec<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !tokio::fs::try_exists(&path).await? {
            info!("Creating empty document store at {}", path.display());
            tokio::fs::write(&path, b"{}").await?;
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let data = match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => map,
            _ => {
                return Err(MigrateError::Source(format!(
                    "{}: top level must be an object of entity arrays",
                    path.display()
                )))
            }
        };

        debug!("Loaded {} entities from {}", data.len(), path.display());
        Ok(Self {
            path,
            data: Mutex::new(data),
            ignore_entities,
        })
    }

    pub async fn from_config(config: &JsonSourceConfig) -> Result<Self> {
        Self::connect(&config.path, config.ignore_entities.clone()).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_ignored(&self, entity: &str) -> bool {
        self.ignore_entities.iter().any(|e| e == entity)
    }
}

#[async_trait]
impl Source for JsonFileStore {
    async fn list_entities(&self) -> Result<Vec<String>> {
        let data = self.data.lock().await;
        Ok(data
            .keys()
            .filter(|k| !self.is_ignored(k))
            .cloned()
            .collect())
    }

    async fn get_records(&self, entity: &str) -> Result<Vec<Record>> {
        if self.is_ignored(entity) {
            return Ok(Vec::new());
        }

        let data = self.data.lock().await;
        let items = match data.get(entity) {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(MigrateError::Source(format!(
                    "{}: entity '{}' is not an array",
                    self.path.display(),
                    entity
                )))
            }
            None => {
                warn!("Entity {} not found in {}", entity, self.path.display());
                return Ok(Vec::new());
            }
        };

        items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(map.clone()),
                _ => Err(MigrateError::Source(format!(
                    "{}: record {} of '{}' is not an object",
                    self.path.display(),
                    i + 1,
                    entity
                ))),
            })
            .collect()
    }

    async fn get_count(&self, entity: &str) -> Result<usize> {
        if self.is_ignored(entity) {
            return Ok(0);
        }
        let data = self.data.lock().await;
        Ok(match data.get(entity) {
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        })
    }

    fn ext_parse(&self, value: &Value) -> Option<SqlValue> {
        parse_extended_json(value)
    }

    fn source_type(&self) -> &str {
        "json"
    }
}

#[async_trait]
impl BackupDestination for JsonFileStore {
    async fn write_record(&self, entity: &str, record: Record) -> Result<()> {
        if self.is_ignored(entity) {
            return Ok(());
        }

        let mut data = self.data.lock().await;
        let slot = data
            .entry(entity.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match slot {
            Value::Array(items) => {
                items.push(Value::Object(record));
                Ok(())
            }
            _ => Err(MigrateError::Source(format!(
                "{}: entity '{}' is not an array",
                self.path.display(),
                entity
            ))),
        }
    }

    /// Removes every visible entity; ignored entities are left alone.
    async fn clear(&self) -> Result<()> {
        let mut data = self.data.lock().await;
        data.retain(|k, _| self.is_ignored(k));
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let content = {
            let data = self.data.lock().await;
            serde_json::to_vec_pretty(&*data)?
        };

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        debug!("Flushed {} bytes to {}", content.len(), self.path.display());
        Ok(())
    }
}

/// Decode MongoDB Extended JSON wrappers.
///
/// Recognises `$date`, `$oid`, `$numberLong`, `$numberInt`, `$numberDouble`
/// and `$numberDecimal`, plus arrays whose elements all decode to the same
/// kind.
pub fn parse_extended_json(value: &Value) -> Option<SqlValue> {
    match value {
        Value::Object(map) if map.len() == 1 => {
            let (key, inner) = map.iter().next()?;
            match key.as_str() {
                "$date" => parse_date(inner).map(SqlValue::Timestamp),
                "$oid" => inner.as_str().map(|s| SqlValue::Text(s.to_string())),
                "$numberLong" | "$numberInt" => parse_long(inner).map(SqlValue::I64),
                "$numberDouble" | "$numberDecimal" => parse_double(inner).map(SqlValue::F64),
                _ => None,
            }
        }
        Value::Array(items) if !items.is_empty() => {
            let parsed: Vec<SqlValue> = items
                .iter()
                .map(parse_extended_json)
                .collect::<Option<_>>()?;
            homogeneous_array(parsed)
        }
        _ => None,
    }
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        Value::Object(_) => {
            let ms = match parse_extended_json(value)? {
                SqlValue::I64(ms) => ms,
                _ => return None,
            };
            Utc.timestamp_millis_opt(ms).single()
        }
        _ => None,
    }
}

fn parse_long(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn parse_double(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn homogeneous_array(items: Vec<SqlValue>) -> Option<SqlValue> {
    match items.first()? {
        SqlValue::Timestamp(_) => items
            .into_iter()
            .map(|v| match v {
                SqlValue::Timestamp(t) => Some(t),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(SqlValue::TimestampArray),
        SqlValue::Text(_) => items
            .into_iter()
            .map(|v| match v {
                SqlValue::Text(s) => Some(s),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(SqlValue::TextArray),
        SqlValue::I64(_) => items
            .into_iter()
            .map(|v| match v {
                SqlValue::I64(n) => Some(n),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(SqlValue::I64Array),
        SqlValue::F64(_) => items
            .into_iter()
            .map(|v| match v {
                SqlValue::F64(n) => Some(n),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(SqlValue::F64Array),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_connect_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.json");

        let store = JsonFileStore::connect(&path, vec![]).await.unwrap();
        assert!(path.exists());
        assert!(store.list_entities().await.unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_reads_records_and_hides_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.json");
        std::fs::write(
            &path,
            json!({
                "bots": [{"botID": "1"}, {"botID": "2"}],
                "sessions": [{"token": "x"}]
            })
            .to_string(),
        )
        .unwrap();

        let store = JsonFileStore::connect(&path, vec!["sessions".into()])
            .await
            .unwrap();
        assert_eq!(store.list_entities().await.unwrap(), vec!["bots"]);
        assert_eq!(store.get_count("bots").await.unwrap(), 2);
        assert_eq!(store.get_records("bots").await.unwrap()[1]["botID"], "2");
        assert!(store.get_records("sessions").await.unwrap().is_empty());
        assert!(store.get_records("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_object_record_is_source_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.json");
        std::fs::write(&path, r#"{"bots": [1, 2]}"#).unwrap();

        let store = JsonFileStore::connect(&path, vec![]).await.unwrap();
        let err = store.get_records("bots").await.unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn test_write_clear_flush() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, r#"{"stale": [{"a": 1}]}"#).unwrap();

        let store = JsonFileStore::connect(&path, vec![]).await.unwrap();
        store.clear().await.unwrap();

        let mut record = Record::new();
        record.insert("name".into(), json!("Splashtail"));
        store.write_record("bots", record).await.unwrap();
        store.flush().await.unwrap();

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!({"bots": [{"name": "Splashtail"}]}));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_extended_json_scalars() {
        let date = parse_extended_json(&json!({"$date": "2021-06-01T12:00:00Z"})).unwrap();
        assert_eq!(
            date,
            SqlValue::Timestamp(Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap())
        );

        let long_date =
            parse_extended_json(&json!({"$date": {"$numberLong": "1622548800000"}})).unwrap();
        assert_eq!(
            long_date,
            SqlValue::Timestamp(Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap())
        );

        assert_eq!(
            parse_extended_json(&json!({"$oid": "60b6"})),
            Some(SqlValue::Text("60b6".into()))
        );
        assert_eq!(
            parse_extended_json(&json!({"$numberLong": "42"})),
            Some(SqlValue::I64(42))
        );
        assert_eq!(
            parse_extended_json(&json!({"$numberDouble": "1.5"})),
            Some(SqlValue::F64(1.5))
        );
    }

    #[test]
    fn test_extended_json_arrays() {
        assert_eq!(
            parse_extended_json(&json!([{"$oid": "a"}, {"$oid": "b"}])),
            Some(SqlValue::TextArray(vec!["a".into(), "b".into()]))
        );
        assert_eq!(
            parse_extended_json(&json!([{"$numberLong": "1"}, {"$oid": "b"}])),
            None
        );
        assert_eq!(parse_extended_json(&json!(["plain"])), None);
    }

    #[test]
    fn test_plain_values_are_not_recognised() {
        assert_eq!(parse_extended_json(&json!("text")), None);
        assert_eq!(parse_extended_json(&json!({"a": 1, "b": 2})), None);
        assert_eq!(parse_extended_json(&json!({"$unknown": 1})), None);
    }
}
