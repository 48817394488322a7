//! Error types for the migration library.

use std::fmt;

use thiserror::Error;

/// Kind of integrity constraint a failed insert tripped over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    ForeignKey,
    Unique,
    NotNull,
    Other,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::Unique => "unique",
            ConstraintKind::NotNull => "not null",
            ConstraintKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, unresolvable descriptor metadata, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// DDL statement failed. The schema may be partially built.
    #[error("Schema error: {message}\n  Statement: {sql}")]
    Schema { sql: String, message: String },

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Insert rejected by an integrity constraint
    #[error("{kind} constraint violated on {table}: {message}")]
    Constraint {
        kind: ConstraintKind,
        table: String,
        message: String,
    },

    /// Insert failed for a reason other than a constraint
    #[error("Insert into {table} failed: {message}\n  Statement: {sql}\n  Args: {args}")]
    Insert {
        table: String,
        sql: String,
        args: String,
        message: String,
    },

    /// A field value could not be coerced into its column type
    #[error("Cannot coerce {entity}.{field} at row {row}: {message}")]
    Coercion {
        entity: String,
        field: String,
        row: usize,
        message: String,
    },

    /// Source collaborator failed
    #[error("Source error: {0}")]
    Source(String),

    /// Operator prompt could not produce an answer
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// A post-copy migration failed
    #[error("Migration '{name}' failed: {message}")]
    Migration { name: String, message: String },

    /// HTTP transport error (observer daemon)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Schema error for a failed DDL statement
    pub fn schema(sql: impl Into<String>, message: impl fmt::Display) -> Self {
        MigrateError::Schema {
            sql: sql.into(),
            message: message.to_string(),
        }
    }

    /// Create a Migration error
    pub fn migration(name: impl Into<String>, message: impl fmt::Display) -> Self {
        MigrateError::Migration {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// The constraint kind, if this is a constraint violation.
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            MigrateError::Constraint { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 1,
            MigrateError::Schema { .. } => 2,
            MigrateError::Target(_)
            | MigrateError::Pool { .. }
            | MigrateError::Constraint { .. }
            | MigrateError::Insert { .. } => 3,
            MigrateError::Coercion { .. } => 4,
            MigrateError::Source(_) | MigrateError::Json(_) => 5,
            MigrateError::Migration { .. } => 6,
            MigrateError::Io(_) => 7,
            MigrateError::Prompt(_) | MigrateError::Http(_) => 8,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_category() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 1);
        assert_eq!(MigrateError::schema("CREATE TABLE t ()", "boom").exit_code(), 2);
        assert_eq!(MigrateError::Source("down".into()).exit_code(), 5);
        assert_eq!(MigrateError::migration("m1", "bad").exit_code(), 6);
        assert_eq!(MigrateError::Prompt("closed".into()).exit_code(), 8);
    }

    #[test]
    fn test_schema_error_includes_statement() {
        let err = MigrateError::schema("ALTER TABLE bots ADD COLUMN x text", "syntax error");
        let text = err.to_string();
        assert!(text.contains("ALTER TABLE bots ADD COLUMN x text"));
        assert!(text.contains("syntax error"));
    }

    #[test]
    fn test_constraint_kind() {
        let err = MigrateError::Constraint {
            kind: ConstraintKind::ForeignKey,
            table: "reviews".into(),
            message: "violates foreign key".into(),
        };
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::ForeignKey));
        assert_eq!(MigrateError::Config("x".into()).constraint_kind(), None);
        assert!(err.to_string().starts_with("foreign key constraint violated on reviews"));
    }
}
