//! PostgreSQL driver.
//!
//! - [`PostgresWriter`]: target writer for the relational schema
//! - [`PostgresStore`]: existing tables read as a document source

mod source;
mod writer;

pub use source::PostgresStore;
pub use writer::{build_insert_sql, classify_constraint, format_args, PostgresWriter};
