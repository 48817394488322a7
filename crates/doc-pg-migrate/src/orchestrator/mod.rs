//! Migration orchestrator - main workflow coordinator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::backup::{self, BackupReport};
use crate::config::{Config, NotifyConfig, PromptConfig, PromptMode, SourceConfig};
use crate::core::{
    BackupDestination, BackupSource, Notifier, NotifyLevel, OperatorPrompt, Progress, Source,
    TargetWriter,
};
use crate::drivers::{JsonFileStore, MongoStore, PostgresStore, PostgresWriter};
use crate::error::Result;
use crate::migrations::{self, MigrationReport, MigrationRunner};
use crate::notify::{
    check_daemon, DaemonClient, DaemonNotifier, DaemonProgress, IndicatifProgress, TracingNotifier,
};
use crate::prompt::{HeadlessPrompt, HttpPrompt, StdinPrompt};
use crate::resolver::TagResolver;
use crate::transfer::{EntityReport, TransferConfig, TransferEngine};
use crate::transform::TransformRegistry;

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn Source>,
    target: Arc<dyn TargetWriter>,
    transforms: TransformRegistry,
    prompt: Arc<dyn OperatorPrompt>,
    notifier: Arc<dyn Notifier>,
    progress: Arc<dyn Progress>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Destination kind ("postgres", "memory").
    pub target: String,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub selective: bool,

    pub schema_only: bool,

    /// Entities copied, in order.
    pub entities: Vec<EntityReport>,

    /// Declared entities left alone by a selective run.
    pub skipped_entities: Vec<String>,

    pub migrations: Vec<MigrationReport>,

    /// Rows inserted across all entities.
    pub rows_inserted: u64,
}

impl RunSummary {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Open the configured source store.
pub async fn open_source(config: &SourceConfig) -> Result<Arc<dyn Source>> {
    Ok(match config {
        SourceConfig::Json(json) => Arc::new(JsonFileStore::from_config(json).await?),
        SourceConfig::Postgres(pg) => Arc::new(PostgresStore::connect(pg).await?),
        SourceConfig::Mongo(mongo) => Arc::new(MongoStore::connect(mongo).await?),
    })
}

/// Build the configured operator prompt.
pub fn prompt_for(config: &PromptConfig) -> Arc<dyn OperatorPrompt> {
    match config.mode {
        PromptMode::Http => Arc::new(HttpPrompt::new(config.bind.clone())),
        PromptMode::Stdin => Arc::new(StdinPrompt),
        PromptMode::Headless => Arc::new(HeadlessPrompt),
    }
}

/// Build the notifier and progress reporter.
///
/// With a daemon URL both report through the daemon forwarder; otherwise
/// notifications go to `tracing` and progress to terminal bars. With
/// `require_daemon` an unreachable daemon is an error.
pub async fn reporters(config: &NotifyConfig) -> Result<(Arc<dyn Notifier>, Arc<dyn Progress>)> {
    match &config.daemon_url {
        Some(url) => {
            if config.require_daemon {
                check_daemon(url).await?;
            }
            let (client, _forwarder) = DaemonClient::spawn(url)?;
            info!("Forwarding notifications to {}", url);
            Ok((
                Arc::new(DaemonNotifier::new(client.clone())),
                Arc::new(DaemonProgress::new(client)),
            ))
        }
        None => Ok((Arc::new(TracingNotifier), Arc::new(IndicatifProgress::new()))),
    }
}

impl Orchestrator {
    /// Create an orchestrator over explicit collaborators.
    ///
    /// Defaults: built-in transforms, headless prompt, `tracing` notifier
    /// and terminal progress bars.
    pub fn new(config: Config, source: Arc<dyn Source>, target: Arc<dyn TargetWriter>) -> Self {
        Self {
            config,
            source,
            target,
            transforms: TransformRegistry::with_builtins(),
            prompt: Arc::new(HeadlessPrompt),
            notifier: Arc::new(TracingNotifier),
            progress: Arc::new(IndicatifProgress::new()),
        }
    }

    /// Connect to the configured source and target.
    pub async fn connect(config: Config) -> Result<Self> {
        let source = open_source(&config.source).await?;
        let target: Arc<dyn TargetWriter> = Arc::new(PostgresWriter::new(&config.target).await?);
        let (notifier, progress) = reporters(&config.notify).await?;
        let prompt = prompt_for(&config.prompt);

        Ok(Self::new(config, source, target)
            .with_prompt(prompt)
            .with_notifier(notifier)
            .with_progress(progress))
    }

    pub fn with_transforms(mut self, transforms: TransformRegistry) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn OperatorPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the migration: schema preparation, every selected entity, then
    /// the migration list.
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let selective = self.config.is_selective();
        let schema_only = self.config.backup.schema_only;

        info!("Starting migration run: {}", run_id);
        self.transforms.validate(&self.config.entities)?;

        // Phase 1: Prepare destination schema
        if selective {
            info!(
                "Phase 1: Selective run for {}",
                self.config.backup.entities.join(", ")
            );
            self.target.ensure_extensions().await?;
            self.drop_rename_targets().await?;
        } else {
            info!("Phase 1: Resetting destination schema {}", self.config.target.schema);
            self.target.reset_schema().await?;
            self.target.ensure_extensions().await?;
        }

        // Phase 2: Copy entities
        info!("Phase 2: Copying entities from {}", self.source.source_type());
        let engine = TransferEngine {
            source: self.source.as_ref(),
            target: self.target.as_ref(),
            transforms: &self.transforms,
            prompt: self.prompt.as_ref(),
            notifier: self.notifier.as_ref(),
            progress: self.progress.as_ref(),
            config: TransferConfig {
                schema_only,
                selective,
                debug: self.config.backup.debug,
            },
        };

        let mut resolver = TagResolver::default();
        let mut entities = Vec::new();
        let mut skipped_entities = Vec::new();
        for entity in &self.config.entities {
            if selective && !self.config.backup.entities.contains(&entity.name) {
                self.notifier.notify(
                    NotifyLevel::Info,
                    &format!("Skipping backup of {}", entity.name),
                );
                skipped_entities.push(entity.name.clone());
                continue;
            }
            entities.push(engine.copy_entity(entity, &mut resolver).await?);
        }

        // Phase 3: Migrations
        let migrations = if schema_only {
            info!("Phase 3: Schema-only run, skipping migrations");
            Vec::new()
        } else {
            info!("Phase 3: Running {} migrations", self.config.migrations.len());
            self.run_migrations().await?
        };

        let completed_at = Utc::now();
        let rows_inserted = entities.iter().map(|e| e.inserted).sum();
        let summary = RunSummary {
            run_id,
            target: self.target.db_type().to_string(),
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            selective,
            schema_only,
            entities,
            skipped_entities,
            migrations,
            rows_inserted,
        };

        info!(
            "Run {} complete: {} entities, {} rows in {:.2}s",
            summary.run_id,
            summary.entities.len(),
            summary.rows_inserted,
            summary.duration_seconds
        );
        Ok(summary)
    }

    /// Run only the configured migration list.
    pub async fn run_migrations(&self) -> Result<Vec<MigrationReport>> {
        let runner = MigrationRunner {
            target: self.target.as_ref(),
            notifier: self.notifier.as_ref(),
            progress: self.progress.as_ref(),
        };
        runner
            .run(&migrations::from_config(&self.config.migrations))
            .await
    }

    /// Schema-less round trip between two stores.
    pub async fn backup<S: BackupSource + ?Sized>(
        source: &S,
        dest: &dyn BackupDestination,
        notifier: &dyn Notifier,
        progress: &dyn Progress,
    ) -> Result<BackupReport> {
        backup::round_trip(source, dest, notifier, progress).await
    }

    /// A selective run keeps the rest of the schema, so tables a selected
    /// entity renames into must go before the rename can succeed.
    async fn drop_rename_targets(&self) -> Result<()> {
        for entity in &self.config.entities {
            if !self.config.backup.entities.contains(&entity.name) {
                continue;
            }
            if let Some(rename) = &entity.options.rename_to {
                if self.target.table_exists(rename).await? {
                    warn!("Dropping {} before {} is renamed into it", rename, entity.name);
                    self.target.drop_table(rename).await?;
                }
            }
        }
        Ok(())
    }
}
