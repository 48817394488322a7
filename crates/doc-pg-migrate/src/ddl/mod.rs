//! DDL synthesis for schema entities.
//!
//! An entity becomes one table: a synthetic UUID primary key created with
//! the table, then one `ALTER TABLE .. ADD COLUMN` per active field in
//! declared order, then the foreign keys, then the optional composite
//! index. The statement builders here are shared by the Postgres writer
//! and by `check`, which prints the plan without connecting.

use tracing::{debug, warn};

use crate::core::{ColumnDef, FieldDescriptor, ForeignKeyRef, SchemaEntity, TargetWriter};
use crate::error::Result;
use crate::resolver::{ResolvedField, TagResolver};

/// Name of the synthetic primary key column every entity table gets.
pub const PRIMARY_KEY_COLUMN: &str = "itag";

/// Quote an identifier for PostgreSQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Qualify a table name with schema.
pub fn qualify_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Quote a string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Whether an expression is a SQL function call such as `NOW()` or
/// `uuid_generate_v4()::text`.
pub fn is_function_call(expr: &str) -> bool {
    let expr = expr.trim();
    let call = match expr.split_once("::") {
        Some((call, cast)) if !cast.trim().is_empty() => call.trim_end(),
        Some(_) => return false,
        None => expr,
    };
    let Some(open) = call.find('(') else {
        return false;
    };
    let name = &call[..open];
    call.ends_with(')')
        && !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Render a declared default as a DDL expression.
///
/// Returns `None` for the row-skip sentinel, which never reaches the
/// database. SQL keywords, numbers, function calls and already-quoted
/// literals pass through; everything else is quoted.
pub fn format_default(expr: &str) -> Option<String> {
    let expr = expr.trim();
    if expr == crate::core::SKIP_DEFAULT {
        return None;
    }

    let lower = expr.to_ascii_lowercase();
    let raw = matches!(lower.as_str(), "null" | "true" | "false")
        || is_numeric_literal(expr)
        || is_function_call(expr)
        || (expr.len() >= 2 && expr.starts_with('\'') && expr.ends_with('\''));

    if raw {
        Some(expr.to_string())
    } else {
        Some(quote_literal(expr))
    }
}

fn is_numeric_literal(expr: &str) -> bool {
    expr.parse::<f64>().is_ok()
        && expr
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

/// Deterministic foreign key constraint name.
pub fn foreign_key_name(table: &str, column: &str) -> String {
    format!("{}_{}_fkey", table, column)
}

pub fn drop_table_sql(schema: &str, table: &str) -> String {
    format!("DROP TABLE IF EXISTS {} CASCADE", qualify_table(schema, table))
}

pub fn create_table_sql(schema: &str, table: &str) -> String {
    format!(
        "CREATE TABLE {} ({} UUID PRIMARY KEY NOT NULL DEFAULT uuid_generate_v4())",
        qualify_table(schema, table),
        quote_ident(PRIMARY_KEY_COLUMN)
    )
}

pub fn add_column_sql(schema: &str, table: &str, col: &ColumnDef) -> String {
    let mut sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        qualify_table(schema, table),
        quote_ident(&col.name),
        col.sql_type
    );
    if col.not_null {
        sql.push_str(" NOT NULL");
    }
    if col.unique {
        sql.push_str(" UNIQUE");
    }
    if let Some(default) = &col.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(default);
    }
    sql
}

pub fn add_foreign_key_sql(schema: &str, table: &str, column: &str, fk: &ForeignKeyRef) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE ON UPDATE CASCADE",
        qualify_table(schema, table),
        quote_ident(&foreign_key_name(table, column)),
        quote_ident(column),
        qualify_table(schema, &fk.table),
        quote_ident(&fk.column)
    )
}

pub fn create_index_sql(schema: &str, table: &str, name: &str, columns: &[String]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "CREATE INDEX {} ON {} ({})",
        quote_ident(name),
        qualify_table(schema, table),
        cols.join(", ")
    )
}

pub fn rename_table_sql(schema: &str, from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME TO {}",
        qualify_table(schema, from),
        quote_ident(to)
    )
}

/// One active field with its resolution.
#[derive(Debug, Clone)]
pub struct PlannedColumn<'a> {
    pub field: &'a FieldDescriptor,
    pub resolved: ResolvedField,
    pub def: ColumnDef,
}

/// Everything needed to build one entity's table.
#[derive(Debug, Clone)]
pub struct EntityPlan<'a> {
    pub entity: &'a SchemaEntity,
    pub columns: Vec<PlannedColumn<'a>>,
}

impl<'a> EntityPlan<'a> {
    /// Resolve every active field of an entity.
    ///
    /// Any unresolvable descriptor aborts before a single statement runs.
    pub fn build(entity: &'a SchemaEntity, resolver: &mut TagResolver) -> Result<Self> {
        let mut columns = Vec::new();
        for field in entity.active_fields() {
            let resolved = resolver.resolve(field)?;
            let def = ColumnDef {
                name: resolved.dest.clone(),
                sql_type: resolved.sql_type.clone(),
                not_null: resolved.not_null,
                unique: field.unique,
                default: field.default.as_deref().and_then(format_default),
            };
            columns.push(PlannedColumn {
                field,
                resolved,
                def,
            });
        }
        Ok(Self { entity, columns })
    }

    pub fn table(&self) -> &str {
        &self.entity.name
    }

    /// Destination column names in insert order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.def.name.clone()).collect()
    }

    fn foreign_keys(&self) -> impl Iterator<Item = (&str, &ForeignKeyRef)> {
        self.columns.iter().filter_map(|c| {
            c.field
                .foreign_key
                .as_ref()
                .map(|fk| (c.def.name.as_str(), fk))
        })
    }

    /// The statements [`synthesize`] would run, in order.
    pub fn render(&self, schema: &str, selective: bool) -> Vec<String> {
        let table = self.table();
        let mut out = Vec::new();
        if selective {
            out.push(drop_table_sql(schema, table));
        }
        out.push(create_table_sql(schema, table));
        for col in &self.columns {
            out.push(add_column_sql(schema, table, &col.def));
        }
        for (column, fk) in self.foreign_keys() {
            out.push(add_foreign_key_sql(schema, table, column, fk));
        }
        let index_cols = &self.entity.options.index_cols;
        if !index_cols.is_empty() {
            out.push(create_index_sql(
                schema,
                table,
                &self.entity.index_name(),
                index_cols,
            ));
        }
        out
    }
}

/// Create the entity's table, columns, foreign keys and index.
///
/// In selective mode a pre-existing table is dropped first; a failed drop
/// is only logged. Every other failure aborts.
pub async fn synthesize(target: &dyn TargetWriter, plan: &EntityPlan<'_>, selective: bool) -> Result<()> {
    let table = plan.table();

    if selective {
        if let Err(e) = target.drop_table(table).await {
            warn!("Failed to drop table {}: {}", table, e);
        }
    }

    target.create_entity_table(table).await?;
    debug!("Created table {}", table);

    for col in &plan.columns {
        target.add_column(table, &col.def).await?;
        debug!("Added column {}.{} {}", table, col.def.name, col.def.sql_type);
    }

    for (column, fk) in plan.foreign_keys() {
        target.add_foreign_key(table, column, fk).await?;
        debug!(
            "Added foreign key {}.{} -> {}.{}",
            table, column, fk.table, fk.column
        );
    }

    let index_cols = &plan.entity.options.index_cols;
    if !index_cols.is_empty() {
        let name = plan.entity.index_name();
        target.create_index(table, &name, index_cols).await?;
        debug!("Created index {} on {}", name, table);
    }

    Ok(())
}
