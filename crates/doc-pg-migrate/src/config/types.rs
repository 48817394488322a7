//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::SchemaEntity;
use crate::prompt::DEFAULT_PROMPT_BIND;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Destination database (PostgreSQL).
    pub target: TargetConfig,

    /// Where documents are read from.
    #[serde(default)]
    pub source: SourceConfig,

    /// Copy behavior.
    #[serde(default)]
    pub backup: BackupConfig,

    /// Observer daemon.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// How missing values are asked for.
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Declared entities, copied in order.
    #[serde(default)]
    pub entities: Vec<SchemaEntity>,

    /// Post-copy migrations, run in order.
    #[serde(default)]
    pub migrations: Vec<MigrationConfig>,
}

/// Connection parameters for one PostgreSQL server.
#[derive(Clone, Serialize, Deserialize)]
pub struct PgConnection {
    /// Database host (default: "127.0.0.1").
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username (default: "postgres").
    #[serde(default = "default_user")]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode: disable, require, verify-ca, verify-full (default: "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,
}

impl fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Destination database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(flatten)]
    pub connection: PgConnection,

    /// Schema the entity tables live in (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// Pool size (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Source store, selected by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Json(JsonSourceConfig),
    Postgres(PostgresSourceConfig),
    Mongo(MongoSourceConfig),
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Json(JsonSourceConfig {
            path: PathBuf::from("backup.json"),
            ignore_entities: Vec::new(),
        })
    }
}

impl SourceConfig {
    /// Short name used on the command line ("json", "postgres", "mongo").
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::Json(_) => "json",
            SourceConfig::Postgres(_) => "postgres",
            SourceConfig::Mongo(_) => "mongo",
        }
    }
}

/// A flat JSON document `{ entity: [record, ...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSourceConfig {
    pub path: PathBuf,

    /// Entities hidden from listing, reads and writes.
    #[serde(default)]
    pub ignore_entities: Vec<String>,
}

/// Tables of an existing PostgreSQL database read as entities.
#[derive(Clone, Serialize, Deserialize)]
pub struct PostgresSourceConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_pg_port")]
    pub port: u16,

    pub database: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_disable")]
    pub ssl_mode: String,

    /// Schema whose tables are listed (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    #[serde(default)]
    pub ignore_entities: Vec<String>,
}

impl PostgresSourceConfig {
    pub fn connection(&self) -> PgConnection {
        PgConnection {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            ssl_mode: self.ssl_mode.clone(),
        }
    }
}

impl fmt::Debug for PostgresSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("schema", &self.schema)
            .field("ignore_entities", &self.ignore_entities)
            .finish()
    }
}

/// Collections of a MongoDB database read as entities.
#[derive(Clone, Serialize, Deserialize)]
pub struct MongoSourceConfig {
    /// Connection string (default: "mongodb://127.0.0.1:27017").
    #[serde(default = "default_mongo_url")]
    pub url: String,

    pub database: String,

    #[serde(default)]
    pub ignore_entities: Vec<String>,
}

impl fmt::Debug for MongoSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Connection strings may embed credentials before the host.
        let url = match self.url.split_once('@') {
            Some((scheme_and_user, host)) => {
                let scheme = scheme_and_user.split("://").next().unwrap_or_default();
                format!("{}://[REDACTED]@{}", scheme, host)
            }
            None => self.url.clone(),
        };
        f.debug_struct("MongoSourceConfig")
            .field("url", &url)
            .field("database", &self.database)
            .field("ignore_entities", &self.ignore_entities)
            .finish()
    }
}

/// Copy behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Only these entities are rebuilt; empty means all.
    #[serde(default)]
    pub entities: Vec<String>,

    /// Build tables without copying rows.
    #[serde(default)]
    pub schema_only: bool,

    /// Per-field debug notifications for every entity.
    #[serde(default)]
    pub debug: bool,
}

/// Observer daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Base URL, e.g. `http://localhost:3939`.
    #[serde(default)]
    pub daemon_url: Option<String>,

    /// Refuse to start unless the daemon answers `GET /`.
    #[serde(default)]
    pub require_daemon: bool,
}

/// How the operator is asked for missing values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    #[default]
    Http,
    Stdin,
    Headless,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub mode: PromptMode,

    /// Bind address of the HTTP prompt (default: "127.0.0.1:34012").
    #[serde(default = "default_prompt_bind")]
    pub bind: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            mode: PromptMode::default(),
            bind: default_prompt_bind(),
        }
    }
}

/// A table/column pair used by migration guards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnGuard {
    pub table: String,
    pub column: String,
}

/// One SQL migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub name: String,

    /// Statements executed in order.
    pub statements: Vec<String>,

    /// Skip when this column already exists.
    #[serde(default)]
    pub unless_column_exists: Option<ColumnGuard>,

    /// Skip when this table already exists.
    #[serde(default)]
    pub unless_table_exists: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_mongo_url() -> String {
    "mongodb://127.0.0.1:27017".to_string()
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_max_connections() -> usize {
    4
}

fn default_prompt_bind() -> String {
    DEFAULT_PROMPT_BIND.to_string()
}
