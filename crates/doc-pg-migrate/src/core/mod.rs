//! Core abstractions for document-to-Postgres migration.
//!
//! - [`schema`]: declarative entities and field descriptors
//! - [`value`]: coerced values and their Postgres binding
//! - [`traits`]: source, target, backup and reporting collaborators

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{
    ColumnDef, EntityOptions, FieldDescriptor, ForeignKeyRef, NativeType, SchemaEntity,
    SourceKeys, SAME_AS_SOURCE, SKIP_DEFAULT,
};
pub use traits::{
    BackupDestination, BackupSource, Notifier, NotifyLevel, OperatorPrompt, Progress,
    ProgressHandle, Record, Source, TargetWriter,
};
pub use value::{is_array_type, is_temporal_type, pg_type_for, SqlValue};
