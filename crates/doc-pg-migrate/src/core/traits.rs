//! Collaborator traits the migration core depends on.
//!
//! - [`Source`]: where records come from (JSON file, Postgres, ...)
//! - [`BackupSource`] / [`BackupDestination`]: the schema-less backup path
//! - [`TargetWriter`]: DDL and inserts against the destination database
//! - [`Notifier`], [`Progress`]: fire-and-forget reporting
//! - [`OperatorPrompt`]: blocking request for a human-supplied value

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

use super::schema::{ColumnDef, ForeignKeyRef};
use super::value::SqlValue;

/// One untyped source document: source key to value.
pub type Record = Map<String, Value>;

/// Read records from a source store.
#[async_trait]
pub trait Source: Send + Sync {
    /// Names of the entities the source can serve.
    async fn list_entities(&self) -> Result<Vec<String>>;

    /// All records of one entity.
    async fn get_records(&self, entity: &str) -> Result<Vec<Record>>;

    /// Number of records of one entity.
    async fn get_count(&self, entity: &str) -> Result<usize>;

    /// Decode a store-specific representation (native dates, typed
    /// numbers). Returns `None` when the value is not recognised, in which
    /// case the caller keeps it unchanged.
    fn ext_parse(&self, _value: &Value) -> Option<SqlValue> {
        None
    }

    /// Short identifier used in logs ("json", "postgres").
    fn source_type(&self) -> &str;
}

/// Source side of the backup round trip.
///
/// Every [`Source`] can act as a backup source; the round trip only uses
/// `list_entities` and `get_records`.
pub trait BackupSource: Source {}

impl<T: Source + ?Sized> BackupSource for T {}

/// Destination side of the backup round trip.
#[async_trait]
pub trait BackupDestination: Send + Sync {
    /// Append one record to an entity.
    async fn write_record(&self, entity: &str, record: Record) -> Result<()>;

    /// Remove every entity.
    async fn clear(&self) -> Result<()>;

    /// Persist buffered writes.
    async fn flush(&self) -> Result<()>;
}

/// Write schema and rows to the destination database.
///
/// Table names are unqualified; implementations apply their configured
/// schema.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    // ===== Schema Operations =====

    /// Drop and recreate the destination schema.
    async fn reset_schema(&self) -> Result<()>;

    /// Install the extensions synthetic keys depend on (`uuid-ossp`).
    async fn ensure_extensions(&self) -> Result<()>;

    /// Drop a table if it exists.
    async fn drop_table(&self, table: &str) -> Result<()>;

    async fn table_exists(&self, table: &str) -> Result<bool>;

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool>;

    /// Execute raw SQL, returning the affected row count.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Create a table holding only the synthetic UUID primary key.
    async fn create_entity_table(&self, table: &str) -> Result<()>;

    async fn add_column(&self, table: &str, column: &ColumnDef) -> Result<()>;

    /// Add a cascading foreign key on `column`.
    async fn add_foreign_key(&self, table: &str, column: &str, target: &ForeignKeyRef)
        -> Result<()>;

    async fn create_index(&self, table: &str, name: &str, columns: &[String]) -> Result<()>;

    // ===== Data Operations =====

    /// Insert one row. Constraint violations surface as
    /// [`MigrateError::Constraint`](crate::error::MigrateError::Constraint).
    async fn insert_row(&self, table: &str, columns: &[String], values: &[SqlValue])
        -> Result<()>;

    async fn rename_table(&self, from: &str, to: &str) -> Result<()>;

    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Database type identifier ("postgres", "memory").
    fn db_type(&self) -> &str;
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
    Debug,
}

impl NotifyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyLevel::Info => "info",
            NotifyLevel::Warning => "warning",
            NotifyLevel::Error => "error",
            NotifyLevel::Debug => "debug",
        }
    }
}

/// Fire-and-forget log sink. Messages may be dropped if nobody listens.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotifyLevel, message: &str);
}

/// Progress bar factory.
pub trait Progress: Send + Sync {
    fn start_bar(&self, label: &str, total: u64) -> Box<dyn ProgressHandle>;
}

/// A running progress bar.
pub trait ProgressHandle: Send + Sync {
    fn increment(&self);

    fn finish(&self) {}
}

/// Ask a human for a value. Blocks the pipeline until answered.
#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String>;
}
