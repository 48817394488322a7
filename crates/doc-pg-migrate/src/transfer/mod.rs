//! Per-entity copy: DDL, row coercion and inserts.
//!
//! One entity at a time, one record at a time, one field at a time. Each
//! record is coerced field by field in DDL column order and inserted with
//! a single parameterized statement. Constraint violations are skipped
//! only when the entity's options allow it; anything else aborts the run.

use serde::Serialize;
use tracing::{debug, info};

use crate::coerce::{coerce, Coerced, CoercionContext};
use crate::core::{
    EntityOptions, Notifier, NotifyLevel, OperatorPrompt, Progress, SchemaEntity, Source,
    TargetWriter,
};
use crate::ddl::{self, EntityPlan};
use crate::drivers::postgres::format_args;
use crate::error::{ConstraintKind, Result};
use crate::resolver::TagResolver;
use crate::transform::TransformRegistry;

/// Copy behavior shared by every entity of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferConfig {
    /// Build tables without copying rows.
    pub schema_only: bool,
    /// Only some entities are rebuilt; existing tables are dropped first.
    pub selective: bool,
    /// Per-field debug notifications for every entity.
    pub debug: bool,
}

/// Outcome of copying one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    pub entity: String,
    /// Final table name, after any rename.
    pub table: String,
    pub inserted: u64,
    /// Rows dropped by a `SKIP` default.
    pub skipped: u64,
    /// Rows rejected by an ignorable constraint.
    pub ignored: u64,
}

impl EntityReport {
    fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            table: entity.to_string(),
            ..Default::default()
        }
    }
}

/// Whether the entity's options allow skipping a row rejected by `kind`.
pub fn is_ignorable(kind: ConstraintKind, options: &EntityOptions) -> bool {
    match kind {
        ConstraintKind::ForeignKey => options.ignore_fk_error,
        ConstraintKind::Unique => options.ignore_unique_error,
        ConstraintKind::NotNull | ConstraintKind::Other => false,
    }
}

/// Copies entities from a source into the target.
pub struct TransferEngine<'a> {
    pub source: &'a dyn Source,
    pub target: &'a dyn TargetWriter,
    pub transforms: &'a TransformRegistry,
    pub prompt: &'a dyn OperatorPrompt,
    pub notifier: &'a dyn Notifier,
    pub progress: &'a dyn Progress,
    pub config: TransferConfig,
}

impl TransferEngine<'_> {
    /// Synthesize the entity's table, copy its rows and apply the rename.
    pub async fn copy_entity(
        &self,
        entity: &SchemaEntity,
        resolver: &mut TagResolver,
    ) -> Result<EntityReport> {
        resolver.reset(&entity.name);
        let plan = EntityPlan::build(entity, resolver)?;

        ddl::synthesize(self.target, &plan, self.config.selective).await?;
        info!("Synthesized {} ({} columns)", entity.name, plan.columns.len());

        let mut report = EntityReport::new(&entity.name);

        if !self.config.schema_only {
            self.copy_rows(&plan, &mut report).await?;
        }

        if let Some(rename) = &entity.options.rename_to {
            self.target.rename_table(&entity.name, rename).await?;
            self.notifier.notify(
                NotifyLevel::Info,
                &format!("Renamed {} to {}", entity.name, rename),
            );
            report.table = rename.clone();
        }

        Ok(report)
    }

    async fn copy_rows(&self, plan: &EntityPlan<'_>, report: &mut EntityReport) -> Result<()> {
        let entity = plan.entity;
        let table = plan.table();
        let debug = self.config.debug || entity.options.debug;

        let records = self.source.get_records(table).await?;
        let count = self.source.get_count(table).await?;
        let columns = plan.column_names();

        let bar = self.progress.start_bar(table, count as u64);

        for (i, record) in records.iter().enumerate() {
            let row = i + 1;
            if row == 1 {
                self.notifier
                    .notify(NotifyLevel::Info, &format!("Backing up {}", table));
            }
            bar.increment();

            let ctx = CoercionContext {
                entity: table,
                records: &records,
                row,
                source: self.source,
                transforms: self.transforms,
                prompt: self.prompt,
                notifier: self.notifier,
                debug,
            };

            let mut values = Vec::with_capacity(plan.columns.len());
            let mut skip = false;
            for col in &plan.columns {
                match coerce(col.field, &col.resolved, record, &ctx).await? {
                    Coerced::Value(v) => values.push(v),
                    Coerced::SkipRow => {
                        skip = true;
                        break;
                    }
                }
            }
            if skip {
                report.skipped += 1;
                continue;
            }

            if debug {
                self.notifier.notify(
                    NotifyLevel::Debug,
                    &format!("Row {} of {}: {}", row, table, format_args(&values)),
                );
            }

            match self.target.insert_row(table, &columns, &values).await {
                Ok(()) => report.inserted += 1,
                Err(e) => match e.constraint_kind() {
                    Some(kind) if is_ignorable(kind, &entity.options) => {
                        self.notifier.notify(
                            NotifyLevel::Warning,
                            &format!("Ignoring {} error on row {}: {}", kind, row, e),
                        );
                        report.ignored += 1;
                    }
                    _ => {
                        self.notifier.notify(
                            NotifyLevel::Error,
                            &format!("Error on row {} of {}: {}", row, table, e),
                        );
                        self.notifier.notify(
                            NotifyLevel::Error,
                            &format!(
                                "Failing insert into {} ({}) args {}",
                                table,
                                columns.join(", "),
                                format_args(&values)
                            ),
                        );
                        bar.finish();
                        return Err(e);
                    }
                },
            }
        }

        bar.finish();
        debug!(
            "{}: {} inserted, {} skipped, {} ignored",
            table, report.inserted, report.skipped, report.ignored
        );
        Ok(())
    }
}
