//! Store implementations of the core collaborator traits.
//!
//! - [`postgres`]: PostgreSQL target writer and table-backed source
//! - [`jsonfile`]: flat JSON document store (source and backup destination)
//! - [`memory`]: in-memory target for dry runs and tests
//! - [`mongo`]: MongoDB collections as a source
//! - [`common`]: shared utilities (TLS, connection pools)

pub mod common;
pub mod jsonfile;
pub mod memory;
pub mod mongo;
pub mod postgres;

// Re-export common utilities
pub use common::{connect_pool, SslMode};

// Re-export driver types
pub use jsonfile::JsonFileStore;
pub use memory::MemoryTarget;
pub use mongo::MongoStore;
pub use postgres::{PostgresStore, PostgresWriter};
