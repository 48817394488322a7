//! Post-copy migrations.
//!
//! Migrations run strictly in declared order after every entity has been
//! copied. Nothing records which ones already ran, so each migration is
//! expected to be idempotent; configured SQL migrations get that through
//! their `unless_*` guards. The first failure stops the runner.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MigrationConfig;
use crate::core::{Notifier, NotifyLevel, Progress, TargetWriter};
use crate::error::{MigrateError, Result};

/// What a migration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Applied { statements: usize, rows: u64 },
    /// A guard found the change already in place.
    Skipped(String),
}

/// One named, one-shot change against the destination.
#[async_trait]
pub trait Migration: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, target: &dyn TargetWriter) -> Result<MigrationOutcome>;
}

/// A migration made of SQL statements from the configuration.
#[derive(Debug, Clone)]
pub struct SqlMigration {
    config: MigrationConfig,
}

impl SqlMigration {
    pub fn new(config: MigrationConfig) -> Self {
        Self { config }
    }

    async fn guard(&self, target: &dyn TargetWriter) -> Result<Option<String>> {
        if let Some(table) = &self.config.unless_table_exists {
            if target.table_exists(table).await? {
                return Ok(Some(format!("table {} already exists", table)));
            }
        }
        if let Some(guard) = &self.config.unless_column_exists {
            if target.column_exists(&guard.table, &guard.column).await? {
                return Ok(Some(format!(
                    "column {}.{} already exists",
                    guard.table, guard.column
                )));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn run(&self, target: &dyn TargetWriter) -> Result<MigrationOutcome> {
        if let Some(reason) = self.guard(target).await? {
            return Ok(MigrationOutcome::Skipped(reason));
        }

        let mut statements = 0;
        let mut rows = 0;
        for sql in self.config.statements.iter().map(|s| s.trim()) {
            if sql.is_empty() {
                continue;
            }
            rows += target
                .execute(sql)
                .await
                .map_err(|e| MigrateError::migration(&self.config.name, format!("{}\n  Statement: {}", e, sql)))?;
            statements += 1;
            debug!("{}: {}", self.config.name, sql);
        }
        Ok(MigrationOutcome::Applied { statements, rows })
    }
}

/// Build the configured migrations, in order.
pub fn from_config(configs: &[MigrationConfig]) -> Vec<Box<dyn Migration>> {
    configs
        .iter()
        .cloned()
        .map(|c| Box::new(SqlMigration::new(c)) as Box<dyn Migration>)
        .collect()
}

/// Outcome of one migration, for the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub name: String,
    pub applied: bool,
    pub rows: u64,
}

/// Runs migrations in order, stopping at the first failure.
pub struct MigrationRunner<'a> {
    pub target: &'a dyn TargetWriter,
    pub notifier: &'a dyn Notifier,
    pub progress: &'a dyn Progress,
}

impl MigrationRunner<'_> {
    pub async fn run(&self, migrations: &[Box<dyn Migration>]) -> Result<Vec<MigrationReport>> {
        let total = migrations.len();
        let bar = self.progress.start_bar("migrations", total as u64 + 1);
        let mut reports = Vec::with_capacity(total);

        for (i, migration) in migrations.iter().enumerate() {
            bar.increment();
            let name = migration.name();
            self.notifier.notify(
                NotifyLevel::Info,
                &format!("Running migration [{}/{}] {}", i + 1, total, name),
            );

            let outcome = match migration.run(self.target).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    bar.finish();
                    let err = match e {
                        MigrateError::Migration { .. } => e,
                        other => MigrateError::migration(name, other),
                    };
                    self.notifier.notify(NotifyLevel::Error, &err.to_string());
                    return Err(err);
                }
            };

            let report = match outcome {
                MigrationOutcome::Applied { statements, rows } => {
                    info!("Migration {} applied ({} statements)", name, statements);
                    MigrationReport {
                        name: name.to_string(),
                        applied: true,
                        rows,
                    }
                }
                MigrationOutcome::Skipped(reason) => {
                    self.notifier.notify(
                        NotifyLevel::Info,
                        &format!("Skipping migration {}: {}", name, reason),
                    );
                    MigrationReport {
                        name: name.to_string(),
                        applied: false,
                        rows: 0,
                    }
                }
            };
            reports.push(report);
        }

        bar.increment();
        bar.finish();
        Ok(reports)
    }
}
