//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;
use std::time::Duration;

use tokio_postgres::Config as PgConfig;

use crate::error::Result;

/// Connect timeout for PostgreSQL pools.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Whether a run only rebuilds the selected entities.
    pub fn is_selective(&self) -> bool {
        !self.backup.entities.is_empty()
    }
}

impl PgConnection {
    /// Build a tokio-postgres configuration.
    pub fn pg_config(&self) -> PgConfig {
        let mut pg_config = PgConfig::new();
        pg_config.host(&self.host);
        pg_config.port(self.port);
        pg_config.dbname(&self.database);
        pg_config.user(&self.user);
        if !self.password.is_empty() {
            pg_config.password(&self.password);
        }
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(CONNECT_TIMEOUT);
        pg_config
    }

    /// Connection URL without the password, for logs.
    pub fn display_url(&self) -> String {
        format!(
            "postgresql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}
