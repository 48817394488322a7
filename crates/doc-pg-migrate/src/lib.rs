//! # doc-pg-migrate
//!
//! Descriptor-driven migration of schemaless documents into PostgreSQL.
//!
//! Each declared entity becomes one table with a synthetic UUID primary
//! key. Field descriptors drive everything else:
//!
//! - **DDL synthesis**: columns, unique constraints, defaults, cascading
//!   foreign keys and a composite index
//! - **Value coercion**: alternate source keys, transforms, defaults,
//!   operator prompts, timestamps and list splitting
//! - **Row inserts** with per-entity policies for foreign key and unique
//!   violations, then an optional table rename
//! - **Migrations** run in order after the copy
//! - **Backup round trips** between stores without any type inference
//!
//! ## Example
//!
//! ```rust,no_run
//! use doc_pg_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> doc_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::connect(config).await?;
//!     let summary = orchestrator.run().await?;
//!     println!("Inserted {} rows", summary.rows_inserted);
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod coerce;
pub mod config;
pub mod core;
pub mod ddl;
pub mod drivers;
pub mod error;
pub mod migrations;
pub mod notify;
pub mod orchestrator;
pub mod prompt;
pub mod resolver;
pub mod transfer;
pub mod transform;
pub mod typemap;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, PromptMode, SourceConfig, TargetConfig};
pub use crate::core::{
    BackupDestination, BackupSource, FieldDescriptor, NativeType, Notifier, NotifyLevel,
    OperatorPrompt, Progress, Record, SchemaEntity, Source, SqlValue, TargetWriter,
};
pub use drivers::{JsonFileStore, MemoryTarget, MongoStore, PostgresStore, PostgresWriter};
pub use error::{MigrateError, Result};
pub use orchestrator::{Orchestrator, RunSummary};
pub use transfer::{EntityReport, TransferConfig, TransferEngine};
pub use transform::{TransformContext, TransformRegistry};
