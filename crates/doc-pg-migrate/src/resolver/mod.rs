//! Field descriptor resolution.
//!
//! Turns a [`FieldDescriptor`] into the destination column name, the
//! primary source key, the SQL type and the nullability. Results are
//! memoized by field name for one entity pass; call
//! [`TagResolver::reset`] before each entity so fields with the same name
//! in different entities never collide.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::core::{FieldDescriptor, SAME_AS_SOURCE};
use crate::error::{MigrateError, Result};
use crate::typemap::native_to_postgres;

/// Resolved column metadata for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    /// Destination column name.
    pub dest: String,
    /// Primary source key.
    pub source: String,
    pub sql_type: String,
    pub not_null: bool,
}

impl ResolvedField {
    /// Type plus nullability, e.g. `text not null`.
    pub fn column_spec(&self) -> String {
        if self.not_null {
            format!("{} not null", self.sql_type)
        } else {
            self.sql_type.clone()
        }
    }
}

/// Memoizing resolver scoped to one entity pass.
#[derive(Debug, Default)]
pub struct TagResolver {
    entity: String,
    cache: HashMap<String, ResolvedField>,
}

impl TagResolver {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            cache: HashMap::new(),
        }
    }

    /// Start a new entity pass, dropping every memoized result.
    pub fn reset(&mut self, entity: impl Into<String>) {
        self.entity = entity.into();
        self.cache.clear();
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Resolve a field, reusing the memoized result for its name.
    pub fn resolve(&mut self, field: &FieldDescriptor) -> Result<ResolvedField> {
        if let Some(hit) = self.cache.get(&field.name) {
            return Ok(hit.clone());
        }

        let resolved = resolve_field(&self.entity, field)?;
        debug!(
            "Resolved {}.{} -> {} {}",
            self.entity,
            field.name,
            resolved.dest,
            resolved.column_spec()
        );
        self.cache.insert(field.name.clone(), resolved.clone());
        Ok(resolved)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

/// Resolve a field without memoization.
pub fn resolve_field(entity: &str, field: &FieldDescriptor) -> Result<ResolvedField> {
    let source = field.source.primary().ok_or_else(|| {
        MigrateError::Config(format!("{}.{}: no source key", entity, field.name))
    })?;

    let dest = match field.dest.as_deref().map(str::trim) {
        Some(SAME_AS_SOURCE) => source,
        Some(dest) if !dest.is_empty() => dest,
        _ => {
            return Err(MigrateError::Config(format!(
                "{}.{}: no destination column",
                entity, field.name
            )))
        }
    };

    let not_null = match field.nullable {
        Some(nullable) => !nullable,
        None => {
            if field.native_type.is_optional() && !field.omit_empty {
                warn!(
                    "{}.{}: optional type {} without omit_empty becomes NOT NULL; set `nullable` explicitly",
                    entity, field.name, field.native_type
                );
            }
            !field.omit_empty
        }
    };

    let sql_type = match field.sql_type.as_deref().map(str::trim) {
        Some(explicit) if !explicit.is_empty() => explicit.to_string(),
        _ => native_to_postgres(&field.native_type, field.to_list),
    };

    Ok(ResolvedField {
        dest: dest.to_string(),
        source: source.to_string(),
        sql_type,
        not_null,
    })
}
