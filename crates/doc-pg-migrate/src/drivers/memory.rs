//! In-memory destination.
//!
//! Keeps tables as vectors of JSON rows and enforces the constraints the
//! pipeline relies on: NOT NULL, UNIQUE, cascading FOREIGN KEY references
//! and column defaults. Values go through the same binder the PostgreSQL
//! writer uses, so a value the server would reject fails here too. Every
//! statement it is asked to run is recorded in
//! its SQL form so `--dry-run` can print what a real run would execute.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use uuid::Uuid;

use crate::core::{is_array_type, pg_type_for, ColumnDef, ForeignKeyRef, Record, SqlValue, TargetWriter};
use crate::ddl::{self, PRIMARY_KEY_COLUMN};
use crate::drivers::postgres::{build_insert_sql, format_args};
use crate::error::{ConstraintKind, MigrateError, Result};

#[derive(Debug, Clone)]
struct ForeignKey {
    column: String,
    target: ForeignKeyRef,
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<ColumnDef>,
    foreign_keys: Vec<ForeignKey>,
    indexes: Vec<String>,
    rows: Vec<Record>,
}

impl MemoryTable {
    fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    statements: Vec<String>,
}

/// Destination database held in memory.
#[derive(Debug)]
pub struct MemoryTarget {
    schema: String,
    state: Mutex<MemoryState>,
}

impl Default for MemoryTarget {
    fn default() -> Self {
        Self::new("public")
    }
}

fn primary_key_column() -> ColumnDef {
    ColumnDef {
        name: PRIMARY_KEY_COLUMN.to_string(),
        sql_type: "uuid".to_string(),
        not_null: true,
        unique: true,
        default: Some("uuid_generate_v4()".to_string()),
    }
}

/// Evaluate a DDL default expression the way the server would.
fn eval_default(expr: &str, sql_type: &str) -> Value {
    let expr = expr.trim();
    let lower = expr.to_ascii_lowercase();
    let call = lower.split("::").next().unwrap_or_default().trim();

    match call {
        "uuid_generate_v4()" | "gen_random_uuid()" => {
            return Value::String(Uuid::new_v4().to_string())
        }
        "now()" | "current_timestamp" | "current_timestamp()" => {
            return Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        "null" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if expr.len() >= 2 && expr.starts_with('\'') && expr.ends_with('\'') {
        let literal = expr[1..expr.len() - 1].replace("''", "'");
        if literal == "{}" && is_array_type(sql_type) {
            return Value::Array(Vec::new());
        }
        if sql_type.trim().to_ascii_lowercase().starts_with("json") {
            if let Ok(v) = serde_json::from_str(&literal) {
                return v;
            }
        }
        return Value::String(literal);
    }

    if let Ok(n) = expr.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(n) = expr.parse::<f64>() {
        return Value::from(n);
    }
    Value::String(expr.to_string())
}

impl MemoryTarget {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Statements executed so far, in order.
    pub async fn statements(&self) -> Vec<String> {
        self.state.lock().await.statements.clone()
    }

    /// Stored rows of a table, or `None` if it does not exist.
    pub async fn rows(&self, table: &str) -> Option<Vec<Record>> {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .map(|t| t.rows.clone())
    }

    /// Column definitions of a table, primary key first.
    pub async fn columns(&self, table: &str) -> Option<Vec<ColumnDef>> {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .map(|t| t.columns.clone())
    }

    pub async fn indexes(&self, table: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .map(|t| t.indexes.clone())
            .unwrap_or_default()
    }

    pub async fn table_names(&self) -> Vec<String> {
        self.state.lock().await.tables.keys().cloned().collect()
    }

    fn missing_table(sql: &str, table: &str) -> MigrateError {
        MigrateError::schema(sql, format!("relation \"{}\" does not exist", table))
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn reset_schema(&self) -> Result<()> {
        let schema = ddl::quote_ident(&self.schema);
        let mut state = self.state.lock().await;
        state.tables.clear();
        state
            .statements
            .push(format!("DROP SCHEMA IF EXISTS {} CASCADE", schema));
        state.statements.push(format!("CREATE SCHEMA {}", schema));
        Ok(())
    }

    async fn ensure_extensions(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .statements
            .push("CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\"".to_string());
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.statements.push(ddl::drop_table_sql(&self.schema, table));
        if state.tables.remove(table).is_some() {
            // CASCADE drops the constraints that referenced it.
            for other in state.tables.values_mut() {
                other.foreign_keys.retain(|fk| fk.target.table != table);
            }
        }
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.state.lock().await.tables.contains_key(table))
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .get(table)
            .is_some_and(|t| t.column(column).is_some()))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.state.lock().await.statements.push(sql.to_string());
        Ok(0)
    }

    async fn create_entity_table(&self, table: &str) -> Result<()> {
        let sql = ddl::create_table_sql(&self.schema, table);
        let mut state = self.state.lock().await;
        if state.tables.contains_key(table) {
            return Err(MigrateError::schema(
                sql,
                format!("relation \"{}\" already exists", table),
            ));
        }
        state.tables.insert(
            table.to_string(),
            MemoryTable {
                columns: vec![primary_key_column()],
                ..Default::default()
            },
        );
        state.statements.push(sql);
        Ok(())
    }

    async fn add_column(&self, table: &str, column: &ColumnDef) -> Result<()> {
        let sql = ddl::add_column_sql(&self.schema, table, column);
        let mut state = self.state.lock().await;
        let Some(t) = state.tables.get_mut(table) else {
            return Err(Self::missing_table(&sql, table));
        };
        if t.column(&column.name).is_some() {
            return Err(MigrateError::schema(
                sql,
                format!("column \"{}\" of relation \"{}\" already exists", column.name, table),
            ));
        }

        let fill = column
            .default
            .as_deref()
            .map(|d| eval_default(d, &column.sql_type))
            .unwrap_or(Value::Null);
        if column.not_null && fill.is_null() && !t.rows.is_empty() {
            return Err(MigrateError::schema(
                sql,
                format!("column \"{}\" contains null values", column.name),
            ));
        }
        for row in &mut t.rows {
            row.insert(column.name.clone(), fill.clone());
        }

        t.columns.push(column.clone());
        state.statements.push(sql);
        Ok(())
    }

    async fn add_foreign_key(&self, table: &str, column: &str, target: &ForeignKeyRef) -> Result<()> {
        let sql = ddl::add_foreign_key_sql(&self.schema, table, column, target);
        let mut state = self.state.lock().await;

        let Some(referenced) = state.tables.get(&target.table) else {
            return Err(Self::missing_table(&sql, &target.table));
        };
        match referenced.column(&target.column) {
            Some(col) if col.unique => {}
            Some(_) => {
                return Err(MigrateError::schema(
                    sql,
                    format!(
                        "there is no unique constraint matching given keys for referenced table \"{}\"",
                        target.table
                    ),
                ))
            }
            None => {
                return Err(MigrateError::schema(
                    sql,
                    format!(
                        "column \"{}\" referenced in foreign key constraint does not exist",
                        target.column
                    ),
                ))
            }
        }

        let Some(t) = state.tables.get_mut(table) else {
            return Err(Self::missing_table(&sql, table));
        };
        if t.column(column).is_none() {
            return Err(MigrateError::schema(
                sql,
                format!("column \"{}\" does not exist", column),
            ));
        }
        t.foreign_keys.push(ForeignKey {
            column: column.to_string(),
            target: target.clone(),
        });
        state.statements.push(sql);
        Ok(())
    }

    async fn create_index(&self, table: &str, name: &str, columns: &[String]) -> Result<()> {
        let sql = ddl::create_index_sql(&self.schema, table, name, columns);
        let mut state = self.state.lock().await;
        let Some(t) = state.tables.get_mut(table) else {
            return Err(Self::missing_table(&sql, table));
        };
        if let Some(missing) = columns.iter().find(|c| t.column(c).is_none()) {
            return Err(MigrateError::schema(
                sql,
                format!("column \"{}\" does not exist", missing),
            ));
        }
        t.indexes.push(name.to_string());
        state.statements.push(sql);
        Ok(())
    }

    async fn insert_row(&self, table: &str, columns: &[String], values: &[SqlValue]) -> Result<()> {
        let sql = build_insert_sql(&self.schema, table, columns, values);
        let insert_err = |message: String| MigrateError::Insert {
            table: table.to_string(),
            sql: sql.clone(),
            args: format_args(values),
            message,
        };
        let violation = |kind: ConstraintKind, message: String| MigrateError::Constraint {
            kind,
            table: table.to_string(),
            message,
        };

        let mut state = self.state.lock().await;
        let Some(t) = state.tables.get(table) else {
            return Err(insert_err(format!("relation \"{}\" does not exist", table)));
        };
        if columns.len() != values.len() {
            return Err(insert_err(format!(
                "INSERT has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        if let Some(unknown) = columns.iter().find(|c| t.column(c).is_none()) {
            return Err(insert_err(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                unknown, table
            )));
        }

        let mut scratch = BytesMut::new();
        for (name, value) in columns.iter().zip(values) {
            if matches!(value, SqlValue::Default) {
                continue;
            }
            let Some(ty) = t.column(name).and_then(|c| pg_type_for(&c.sql_type)) else {
                continue;
            };
            scratch.clear();
            value
                .to_sql(&ty, &mut scratch)
                .map_err(|e| insert_err(format!("column \"{}\": {}", name, e)))?;
        }

        let mut row = Map::new();
        for col in &t.columns {
            let provided = columns
                .iter()
                .position(|c| c == &col.name)
                .map(|i| &values[i]);
            let value = match provided {
                Some(SqlValue::Default) | None => col
                    .default
                    .as_deref()
                    .map(|d| eval_default(d, &col.sql_type))
                    .unwrap_or(Value::Null),
                Some(v) => v.to_json(),
            };

            if col.not_null && value.is_null() {
                return Err(violation(
                    ConstraintKind::NotNull,
                    format!(
                        "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                        col.name, table
                    ),
                ));
            }
            if col.unique
                && !value.is_null()
                && t.rows.iter().any(|r| r.get(&col.name) == Some(&value))
            {
                return Err(violation(
                    ConstraintKind::Unique,
                    format!(
                        "duplicate key value violates unique constraint \"{}_{}_key\"",
                        table, col.name
                    ),
                ));
            }
            row.insert(col.name.clone(), value);
        }

        for fk in &t.foreign_keys {
            let value = row.get(&fk.column).unwrap_or(&Value::Null);
            if value.is_null() {
                continue;
            }
            let found = state.tables.get(&fk.target.table).is_some_and(|target| {
                target
                    .rows
                    .iter()
                    .any(|r| r.get(&fk.target.column) == Some(value))
            });
            if !found {
                return Err(violation(
                    ConstraintKind::ForeignKey,
                    format!(
                        "insert or update on table \"{}\" violates foreign key constraint \"{}\"",
                        table,
                        ddl::foreign_key_name(table, &fk.column)
                    ),
                ));
            }
        }

        if let Some(t) = state.tables.get_mut(table) {
            t.rows.push(row);
        }
        Ok(())
    }

    async fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        let sql = ddl::rename_table_sql(&self.schema, from, to);
        let mut state = self.state.lock().await;
        if state.tables.contains_key(to) {
            return Err(MigrateError::schema(
                sql,
                format!("relation \"{}\" already exists", to),
            ));
        }
        let Some(t) = state.tables.remove(from) else {
            return Err(Self::missing_table(&sql, from));
        };
        state.tables.insert(to.to_string(), t);
        for other in state.tables.values_mut() {
            for fk in &mut other.foreign_keys {
                if fk.target.table == from {
                    fk.target.table = to.to_string();
                }
            }
        }
        state.statements.push(sql);
        Ok(())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let state = self.state.lock().await;
        match state.tables.get(table) {
            Some(t) => Ok(t.rows.len() as i64),
            None => Err(Self::missing_table(
                &format!("SELECT count(*) FROM {}", ddl::qualify_table(&self.schema, table)),
                table,
            )),
        }
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}
