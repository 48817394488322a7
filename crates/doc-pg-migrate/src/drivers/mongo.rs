//! MongoDB collections read as document entities.
//!
//! Documents are handed to the pipeline as relaxed Extended JSON, so native
//! BSON types survive as `$date` / `$oid` wrappers until the extended-type
//! parser turns them back into typed values.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{Client, Database};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::MongoSourceConfig;
use crate::core::{Record, Source, SqlValue};
use crate::error::{MigrateError, Result};

/// Reads entities from the collections of one MongoDB database.
pub struct MongoStore {
    database: Database,
    ignore_entities: Vec<String>,
}

fn source_err(context: &str, e: mongodb::error::Error) -> MigrateError {
    MigrateError::Source(format!("{}: {}", context, e))
}

impl MongoStore {
    pub async fn connect(config: &MongoSourceConfig) -> Result<Self> {
        let client = Client::with_uri_str(&config.url)
            .await
            .map_err(|e| source_err("connecting to MongoDB", e))?;
        info!("Connected to MongoDB database {}", config.database);
        Ok(Self::from_database(
            client.database(&config.database),
            config.ignore_entities.clone(),
        ))
    }

    pub fn from_database(database: Database, ignore_entities: Vec<String>) -> Self {
        Self {
            database,
            ignore_entities,
        }
    }

    fn is_ignored(&self, entity: &str) -> bool {
        self.ignore_entities.iter().any(|e| e == entity)
    }
}

/// Convert one BSON document into a record.
pub fn document_to_record(document: Document) -> Record {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn bson_timestamp(value: &Bson) -> Option<DateTime<Utc>> {
    match value {
        Bson::DateTime(dt) => DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis()),
        _ => None,
    }
}

fn bson_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int64(n) => Some(*n),
        Bson::Int32(n) => Some(i64::from(*n)),
        _ => None,
    }
}

fn bson_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn bson_text(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::DateTime(_) => bson_timestamp(value)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

/// Decode the BSON types that have no plain JSON counterpart.
///
/// Dates become timestamps and object ids their hex form. Arrays are typed
/// by their first element (dates, integers, doubles) when every element
/// agrees; other arrays of scalars become a list of strings.
pub fn parse_bson(value: &Bson) -> Option<SqlValue> {
    match value {
        Bson::DateTime(_) => bson_timestamp(value).map(SqlValue::Timestamp),
        Bson::ObjectId(oid) => Some(SqlValue::Text(oid.to_hex())),
        // Nested documents stay JSON.
        Bson::Array(items)
            if items
                .iter()
                .any(|i| matches!(i, Bson::Document(_) | Bson::Array(_))) =>
        {
            None
        }
        Bson::Array(items) => {
            let typed = match items.first() {
                Some(Bson::DateTime(_)) => items
                    .iter()
                    .map(bson_timestamp)
                    .collect::<Option<Vec<_>>>()
                    .map(SqlValue::TimestampArray),
                Some(Bson::Int64(_) | Bson::Int32(_)) => items
                    .iter()
                    .map(bson_i64)
                    .collect::<Option<Vec<_>>>()
                    .map(SqlValue::I64Array),
                Some(Bson::Double(_)) => items
                    .iter()
                    .map(bson_f64)
                    .collect::<Option<Vec<_>>>()
                    .map(SqlValue::F64Array),
                _ => None,
            };
            Some(typed.unwrap_or_else(|| SqlValue::TextArray(items.iter().map(bson_text).collect())))
        }
        _ => None,
    }
}

#[async_trait]
impl Source for MongoStore {
    async fn list_entities(&self) -> Result<Vec<String>> {
        let mut names = self
            .database
            .list_collection_names()
            .await
            .map_err(|e| source_err("listing collections", e))?;
        names.retain(|name| !self.is_ignored(name));
        names.sort();

        info!(
            "Found {} collections in {}",
            names.len(),
            self.database.name()
        );
        Ok(names)
    }

    async fn get_records(&self, entity: &str) -> Result<Vec<Record>> {
        if self.is_ignored(entity) {
            return Ok(Vec::new());
        }

        let cursor = self
            .database
            .collection::<Document>(entity)
            .find(doc! {})
            .await
            .map_err(|e| source_err(&format!("reading {}", entity), e))?;
        let documents: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| source_err(&format!("reading {}", entity), e))?;

        let records: Vec<Record> = documents.into_iter().map(document_to_record).collect();
        debug!("Read {} records from {}", records.len(), entity);
        Ok(records)
    }

    async fn get_count(&self, entity: &str) -> Result<usize> {
        if self.is_ignored(entity) {
            return Ok(0);
        }

        let count = self
            .database
            .collection::<Document>(entity)
            .count_documents(doc! {})
            .await
            .map_err(|e| source_err(&format!("counting {}", entity), e))?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    /// Records carry Extended JSON, so the value is read back as BSON first.
    fn ext_parse(&self, value: &Value) -> Option<SqlValue> {
        match value {
            Value::Object(_) | Value::Array(_) => {
                Bson::try_from(value.clone()).ok().as_ref().and_then(parse_bson)
            }
            _ => None,
        }
    }

    fn source_type(&self) -> &str {
        "mongo"
    }
}
