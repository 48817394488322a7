//! Configuration validation.

use std::collections::{HashMap, HashSet};

use super::{Config, PgConnection, SourceConfig};
use crate::drivers::SslMode;
use crate::error::{MigrateError, Result};
use crate::resolver::resolve_field;

fn validate_connection(prefix: &str, conn: &PgConnection) -> Result<()> {
    if conn.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", prefix)));
    }
    if conn.database.is_empty() {
        return Err(MigrateError::Config(format!("{}.database is required", prefix)));
    }
    if conn.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", prefix)));
    }
    conn.ssl_mode.parse::<SslMode>()?;
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Target validation
    validate_connection("target", &config.target.connection)?;
    if config.target.schema.is_empty() {
        return Err(MigrateError::Config("target.schema is required".into()));
    }
    if config.target.max_connections == 0 {
        return Err(MigrateError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }

    // Source validation
    match &config.source {
        SourceConfig::Json(json) => {
            if json.path.as_os_str().is_empty() {
                return Err(MigrateError::Config("source.path is required".into()));
            }
        }
        SourceConfig::Postgres(pg) => {
            validate_connection("source", &pg.connection())?;
            if pg.host == config.target.connection.host
                && pg.port == config.target.connection.port
                && pg.database == config.target.connection.database
            {
                return Err(MigrateError::Config(
                    "source and target cannot be the same database".into(),
                ));
            }
        }
        SourceConfig::Mongo(mongo) => {
            if !(mongo.url.starts_with("mongodb://") || mongo.url.starts_with("mongodb+srv://")) {
                return Err(MigrateError::Config(
                    "source.url must be a mongodb:// or mongodb+srv:// connection string".into(),
                ));
            }
            if mongo.database.is_empty() {
                return Err(MigrateError::Config("source.database is required".into()));
            }
        }
    }

    if config.notify.require_daemon && config.notify.daemon_url.is_none() {
        return Err(MigrateError::Config(
            "notify.require_daemon needs notify.daemon_url".into(),
        ));
    }

    if config.prompt.bind.is_empty() {
        return Err(MigrateError::Config("prompt.bind is required".into()));
    }

    validate_entities(config)?;
    validate_migrations(config)?;

    Ok(())
}

fn validate_entities(config: &Config) -> Result<()> {
    let mut names = HashSet::new();
    for entity in &config.entities {
        if entity.name.is_empty() {
            return Err(MigrateError::Config("entity name is required".into()));
        }
        if !names.insert(entity.name.as_str()) {
            return Err(MigrateError::Config(format!(
                "entity '{}' is declared twice",
                entity.name
            )));
        }

        // Memoization is by field name, so repeated names must agree.
        let mut seen = HashMap::new();
        for field in &entity.fields {
            if let Some(previous) = seen.insert(field.name.as_str(), field) {
                if previous != field {
                    return Err(MigrateError::Config(format!(
                        "{}.{}: field declared twice with different metadata",
                        entity.name, field.name
                    )));
                }
            }
        }

        let mut columns = HashSet::new();
        for field in entity.active_fields() {
            let resolved = resolve_field(&entity.name, field)?;
            columns.insert(resolved.dest);
        }
        for col in &entity.options.index_cols {
            if !columns.contains(col) {
                return Err(MigrateError::Config(format!(
                    "{}: index column '{}' is not a declared column",
                    entity.name, col
                )));
            }
        }

        if let Some(rename) = &entity.options.rename_to {
            if rename.is_empty() || rename == &entity.name {
                return Err(MigrateError::Config(format!(
                    "{}: rename_to must name a different table",
                    entity.name
                )));
            }
        }
    }

    for selected in &config.backup.entities {
        if !names.contains(selected.as_str()) {
            return Err(MigrateError::Config(format!(
                "backup.entities names unknown entity '{}'",
                selected
            )));
        }
    }

    Ok(())
}

fn validate_migrations(config: &Config) -> Result<()> {
    let mut names = HashSet::new();
    for migration in &config.migrations {
        if migration.name.is_empty() {
            return Err(MigrateError::Config("migration name is required".into()));
        }
        if !names.insert(migration.name.as_str()) {
            return Err(MigrateError::Config(format!(
                "migration '{}' is declared twice",
                migration.name
            )));
        }
        if migration.statements.iter().all(|s| s.trim().is_empty()) {
            return Err(MigrateError::Config(format!(
                "migration '{}' has no statements",
                migration.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BackupConfig, JsonSourceConfig, MigrationConfig, MongoSourceConfig, NotifyConfig,
        PromptConfig, TargetConfig,
    };
    use crate::core::{EntityOptions, FieldDescriptor, NativeType, SchemaEntity};

    fn valid_config() -> Config {
        Config {
            target: TargetConfig {
                connection: PgConnection {
                    host: "localhost".to_string(),
                    port: 5432,
                    database: "infinity".to_string(),
                    user: "postgres".to_string(),
                    password: "password".to_string(),
                    ssl_mode: "disable".to_string(),
                },
                schema: "public".to_string(),
                max_connections: 4,
            },
            source: SourceConfig::Json(JsonSourceConfig {
                path: "backup.json".into(),
                ignore_entities: vec![],
            }),
            backup: BackupConfig::default(),
            notify: NotifyConfig::default(),
            prompt: PromptConfig::default(),
            entities: vec![SchemaEntity::new(
                "bots",
                vec![FieldDescriptor::new("BotID", "botID", NativeType::String).dest("bot_id")],
            )],
            migrations: vec![MigrationConfig {
                name: "add_flag".into(),
                statements: vec!["ALTER TABLE bots ADD COLUMN flag boolean".into()],
                unless_column_exists: None,
                unless_table_exists: None,
            }],
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_target_database() {
        let mut config = valid_config();
        config.target.connection.database = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_ssl_mode() {
        let mut config = valid_config();
        config.target.connection.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unresolvable_field_is_rejected() {
        let mut config = valid_config();
        config.entities[0]
            .fields
            .push(FieldDescriptor::new("Owner", "owner", NativeType::String));
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("bots.Owner"));
    }

    #[test]
    fn test_conflicting_duplicate_field_names() {
        let mut config = valid_config();
        config.entities[0].fields.push(
            FieldDescriptor::new("BotID", "id", NativeType::String).dest("bot_id"),
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_index_cols_must_exist() {
        let mut config = valid_config();
        config.entities[0].options = EntityOptions {
            index_cols: vec!["missing".into()],
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_selected_entities_must_be_declared() {
        let mut config = valid_config();
        config.backup.entities = vec!["reviews".into()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_mongo_source_needs_connection_string() {
        let mut config = valid_config();
        config.source = SourceConfig::Mongo(MongoSourceConfig {
            url: "mongodb://localhost:27017".into(),
            database: "infinity".into(),
            ignore_entities: vec![],
        });
        assert!(validate(&config).is_ok());

        if let SourceConfig::Mongo(mongo) = &mut config.source {
            mongo.url = "localhost:27017".into();
        }
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("source.url"));

        if let SourceConfig::Mongo(mongo) = &mut config.source {
            mongo.url = "mongodb+srv://cluster.example.net".into();
            mongo.database.clear();
        }
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("source.database is required"));
    }

    #[test]
    fn test_require_daemon_needs_url() {
        let mut config = valid_config();
        config.notify.require_daemon = true;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("notify.daemon_url"));

        config.notify.daemon_url = Some("http://localhost:3939".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_duplicate_migration_names() {
        let mut config = valid_config();
        let dup = config.migrations[0].clone();
        config.migrations.push(dup);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.connection.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }
}
