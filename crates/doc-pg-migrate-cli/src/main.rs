//! doc-pg-migrate CLI - descriptor-driven document to PostgreSQL migration.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use doc_pg_migrate::config::JsonSourceConfig;
use doc_pg_migrate::ddl::EntityPlan;
use doc_pg_migrate::orchestrator::{open_source, prompt_for, reporters};
use doc_pg_migrate::resolver::TagResolver;
use doc_pg_migrate::{
    Config, JsonFileStore, MemoryTarget, MigrateError, Orchestrator, PostgresWriter, RunSummary,
    SourceConfig, TargetWriter, TransformRegistry,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "doc-pg-migrate")]
#[command(about = "Migrate schemaless documents into a relational PostgreSQL schema")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the schema, copy every entity and run migrations
    Run {
        /// Only rebuild these entities (comma-separated). Default is all
        #[arg(long)]
        backup: Option<String>,

        /// Create tables without copying rows
        #[arg(long)]
        schema_only: bool,

        /// Source store: json, postgres or mongo
        #[arg(long)]
        source: Option<String>,

        /// Run against an in-memory target and print the statements
        #[arg(long)]
        dry_run: bool,
    },

    /// Copy every entity between two stores without type inference
    Backup {
        /// Store to read from: json, postgres or mongo
        #[arg(long)]
        from: String,

        /// Store to write to: json
        #[arg(long)]
        to: String,

        /// Output file for a json destination
        #[arg(long, default_value = "backup.out.json")]
        to_path: PathBuf,
    },

    /// Run only the migration list against the target
    Migrate,

    /// Validate the configuration and print the DDL without connecting
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            backup,
            schema_only,
            source,
            dry_run,
        } => {
            // Apply overrides
            if let Some(list) = backup {
                config.backup.entities = split_entities(&list);
            }
            if schema_only {
                config.backup.schema_only = true;
            }
            if let Some(kind) = source {
                select_source(&mut config, &kind)?;
            }
            config.validate()?;

            let summary = if dry_run {
                let target = Arc::new(MemoryTarget::new(config.target.schema.clone()));
                let orchestrator = build(config, target.clone()).await?;
                let summary = orchestrator.run().await?;
                if !cli.output_json {
                    for statement in target.statements().await {
                        println!("{};", statement);
                    }
                }
                summary
            } else {
                let target = Arc::new(PostgresWriter::new(&config.target).await?);
                build(config, target).await?.run().await?
            };

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                print_summary(&summary, dry_run);
            }
        }

        Commands::Backup { from, to, to_path } => {
            select_source(&mut config, &from)?;
            if to != "json" {
                return Err(MigrateError::Config(format!(
                    "Unknown backup destination '{}'. Supported destinations: json",
                    to
                )));
            }
            if let SourceConfig::Json(json) = &config.source {
                if json.path == to_path {
                    return Err(MigrateError::Config(
                        "backup source and destination are the same file".into(),
                    ));
                }
            }

            let source = open_source(&config.source).await?;
            let dest = JsonFileStore::connect(&to_path, Vec::new()).await?;
            let (notifier, progress) = reporters(&config.notify).await?;

            let report =
                Orchestrator::backup(&*source, &dest, notifier.as_ref(), progress.as_ref()).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nBackup completed!");
                for (entity, count) in &report.entities {
                    println!("  {}: {} records", entity, count);
                }
                println!("  Written to {}", to_path.display());
            }
        }

        Commands::Migrate => {
            let target = Arc::new(PostgresWriter::new(&config.target).await?);
            let orchestrator = build(config, target).await?;
            let reports = orchestrator.run_migrations().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                println!("\nMigrations completed!");
                for report in &reports {
                    let status = if report.applied { "applied" } else { "skipped" };
                    println!("  {} ({})", report.name, status);
                }
            }
        }

        Commands::Check => {
            TransformRegistry::with_builtins().validate(&config.entities)?;

            let mut resolver = TagResolver::default();
            let mut plans = serde_json::Map::new();
            for entity in &config.entities {
                resolver.reset(&entity.name);
                let plan = EntityPlan::build(entity, &mut resolver)?;
                let statements = plan.render(&config.target.schema, config.is_selective());
                if !cli.output_json {
                    println!("-- {}", entity.name);
                    for statement in &statements {
                        println!("{};", statement);
                    }
                    println!();
                }
                plans.insert(entity.name.clone(), statements.into());
            }

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plans)?);
            } else {
                println!("Configuration OK: {} entities", config.entities.len());
            }
        }
    }

    Ok(())
}

/// Wire the configured source, prompt and reporters around a target.
async fn build(config: Config, target: Arc<dyn TargetWriter>) -> Result<Orchestrator, MigrateError> {
    let source = open_source(&config.source).await?;
    let (notifier, progress) = reporters(&config.notify).await?;
    let prompt = prompt_for(&config.prompt);
    Ok(Orchestrator::new(config, source, target)
        .with_prompt(prompt)
        .with_notifier(notifier)
        .with_progress(progress))
}

fn split_entities(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Point the configuration at the named source store.
///
/// `json` falls back to `backup.json` when the config names another store;
/// `postgres` and `mongo` need their connection settings in the config.
fn select_source(config: &mut Config, kind: &str) -> Result<(), MigrateError> {
    match kind {
        _ if kind == config.source.kind() => Ok(()),
        "json" => {
            config.source = SourceConfig::Json(JsonSourceConfig {
                path: PathBuf::from("backup.json"),
                ignore_entities: Vec::new(),
            });
            Ok(())
        }
        "postgres" | "mongo" => Err(MigrateError::Config(format!(
            "source '{}' needs a `source: {{type: {}, ...}}` section in the config",
            kind, kind
        ))),
        other => Err(MigrateError::Config(format!(
            "Unknown source '{}'. Supported sources: json, postgres, mongo",
            other
        ))),
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    let status_msg = if dry_run { "Dry run completed!" } else { "Migration completed!" };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", summary.run_id);
    println!("  Duration: {:.2}s", summary.duration_seconds);
    for entity in &summary.entities {
        println!(
            "  {}: {} inserted, {} skipped, {} ignored",
            entity.table, entity.inserted, entity.skipped, entity.ignored
        );
    }
    if !summary.skipped_entities.is_empty() {
        println!("  Not selected: {}", summary.skipped_entities.join(", "));
    }
    println!("  Rows: {}", summary.rows_inserted);
    println!("  Migrations: {}", summary.migrations.len());
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("Invalid verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("Invalid log format '{}'", other)),
    }

    Ok(())
}
