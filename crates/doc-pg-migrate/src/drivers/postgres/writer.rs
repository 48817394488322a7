//! PostgreSQL target writer.
//!
//! Implements [`TargetWriter`] over a deadpool-postgres pool. DDL failures
//! become [`MigrateError::Schema`] carrying the statement; insert failures
//! are classified into constraint violations (foreign key, unique, not
//! null) or generic insert errors carrying the statement and bound values.

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tracing::debug;

use crate::config::TargetConfig;
use crate::core::{ColumnDef, ForeignKeyRef, SqlValue, TargetWriter};
use crate::ddl;
use crate::drivers::common::connect_pool;
use crate::error::{ConstraintKind, MigrateError, Result};

/// PostgreSQL target writer implementation.
pub struct PostgresWriter {
    pool: Pool,
    schema: String,
}

/// Human-readable message of a driver error, preferring the server's text.
fn db_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({})", db.message(), detail),
            None => db.message().to_string(),
        },
        None => e.to_string(),
    }
}

/// Classify a failed insert by SQLSTATE, falling back to the message text.
pub fn classify_constraint(code: Option<&SqlState>, message: &str) -> Option<ConstraintKind> {
    match code {
        Some(c) if *c == SqlState::FOREIGN_KEY_VIOLATION => return Some(ConstraintKind::ForeignKey),
        Some(c) if *c == SqlState::UNIQUE_VIOLATION => return Some(ConstraintKind::Unique),
        Some(c) if *c == SqlState::NOT_NULL_VIOLATION => return Some(ConstraintKind::NotNull),
        _ => {}
    }
    if message.contains("violates foreign key") {
        Some(ConstraintKind::ForeignKey)
    } else if message.contains("unique constraint") {
        Some(ConstraintKind::Unique)
    } else if message.contains("violates not-null") {
        Some(ConstraintKind::NotNull)
    } else {
        None
    }
}

/// Build the INSERT statement; `DEFAULT` values take no parameter slot.
pub fn build_insert_sql(schema: &str, table: &str, columns: &[String], values: &[SqlValue]) -> String {
    let target = ddl::qualify_table(schema, table);
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", target);
    }

    let col_list: Vec<String> = columns.iter().map(|c| ddl::quote_ident(c)).collect();
    let mut idx = 0;
    let placeholders: Vec<String> = values
        .iter()
        .map(|v| match v {
            SqlValue::Default => "DEFAULT".to_string(),
            _ => {
                idx += 1;
                format!("${}", idx)
            }
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        target,
        col_list.join(", "),
        placeholders.join(", ")
    )
}

/// Render bound values for diagnostics.
pub fn format_args(values: &[SqlValue]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

impl PostgresWriter {
    /// Connect to the target described by the configuration.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let pool = connect_pool(&config.connection, config.max_connections, "target").await?;
        Ok(Self::from_pool(pool, config.schema.clone()))
    }

    pub fn from_pool(pool: Pool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting PostgreSQL connection"))
    }

    /// Run one DDL statement; failures carry the statement.
    async fn run_ddl(&self, sql: &str) -> Result<()> {
        let client = self.client().await?;
        client
            .batch_execute(sql)
            .await
            .map_err(|e| MigrateError::schema(sql, db_message(&e)))?;
        debug!("{}", sql);
        Ok(())
    }
}

#[async_trait]
impl TargetWriter for PostgresWriter {
    async fn reset_schema(&self) -> Result<()> {
        let schema = ddl::quote_ident(&self.schema);
        self.run_ddl(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema))
            .await?;
        self.run_ddl(&format!("CREATE SCHEMA {}", schema)).await
    }

    async fn ensure_extensions(&self) -> Result<()> {
        self.run_ddl("CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\"").await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.run_ddl(&ddl::drop_table_sql(&self.schema, table)).await
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let client = self.client().await?;

        let sql = r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
        "#;

        let row = client.query_one(sql, &[&self.schema, &table]).await?;
        Ok(row.get::<_, bool>(0))
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let client = self.client().await?;

        let sql = r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2 AND column_name = $3
            )
        "#;

        let row = client
            .query_one(sql, &[&self.schema, &table, &column])
            .await?;
        Ok(row.get::<_, bool>(0))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let client = self.client().await?;
        Ok(client.execute(sql, &[]).await?)
    }

    async fn create_entity_table(&self, table: &str) -> Result<()> {
        self.run_ddl(&ddl::create_table_sql(&self.schema, table)).await
    }

    async fn add_column(&self, table: &str, column: &ColumnDef) -> Result<()> {
        self.run_ddl(&ddl::add_column_sql(&self.schema, table, column))
            .await
    }

    async fn add_foreign_key(&self, table: &str, column: &str, target: &ForeignKeyRef) -> Result<()> {
        self.run_ddl(&ddl::add_foreign_key_sql(&self.schema, table, column, target))
            .await
    }

    async fn create_index(&self, table: &str, name: &str, columns: &[String]) -> Result<()> {
        self.run_ddl(&ddl::create_index_sql(&self.schema, table, name, columns))
            .await
    }

    async fn insert_row(&self, table: &str, columns: &[String], values: &[SqlValue]) -> Result<()> {
        let sql = build_insert_sql(&self.schema, table, columns, values);
        let params: Vec<&(dyn ToSql + Sync)> = values
            .iter()
            .filter(|v| !matches!(v, SqlValue::Default))
            .map(|v| v as &(dyn ToSql + Sync))
            .collect();

        let client = self.client().await?;
        match client.execute(&sql, &params).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = db_message(&e);
                match classify_constraint(e.code(), &message) {
                    Some(kind) => Err(MigrateError::Constraint {
                        kind,
                        table: table.to_string(),
                        message,
                    }),
                    None => Err(MigrateError::Insert {
                        table: table.to_string(),
                        sql,
                        args: format_args(values),
                        message,
                    }),
                }
            }
        }
    }

    async fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        self.run_ddl(&ddl::rename_table_sql(&self.schema, from, to))
            .await
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT count(*) FROM {}",
            ddl::qualify_table(&self.schema, table)
        );
        let row = client.query_one(&sql, &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    fn db_type(&self) -> &str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_sql_skips_default_slots() {
        let cols = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let values = vec![
            SqlValue::Text("x".into()),
            SqlValue::Default,
            SqlValue::I64(1),
        ];
        assert_eq!(
            build_insert_sql("public", "bots", &cols, &values),
            "INSERT INTO \"public\".\"bots\" (\"a\", \"b\", \"c\") VALUES ($1, DEFAULT, $2)"
        );
        assert_eq!(
            build_insert_sql("public", "bots", &[], &[]),
            "INSERT INTO \"public\".\"bots\" DEFAULT VALUES"
        );
    }

    #[test]
    fn test_classify_constraint() {
        assert_eq!(
            classify_constraint(Some(&SqlState::FOREIGN_KEY_VIOLATION), ""),
            Some(ConstraintKind::ForeignKey)
        );
        assert_eq!(
            classify_constraint(Some(&SqlState::UNIQUE_VIOLATION), ""),
            Some(ConstraintKind::Unique)
        );
        assert_eq!(
            classify_constraint(
                None,
                "insert or update on table \"reviews\" violates foreign key constraint"
            ),
            Some(ConstraintKind::ForeignKey)
        );
        assert_eq!(
            classify_constraint(None, "duplicate key value violates unique constraint"),
            Some(ConstraintKind::Unique)
        );
        assert_eq!(
            classify_constraint(Some(&SqlState::SYNTAX_ERROR), "syntax error"),
            None
        );
    }

    #[test]
    fn test_format_args() {
        let values = vec![SqlValue::Null, SqlValue::Text("a".into()), SqlValue::I64(3)];
        assert_eq!(format_args(&values), "[NULL, \"a\", 3]");
    }
}
