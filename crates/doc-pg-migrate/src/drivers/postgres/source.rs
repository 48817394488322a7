//! Existing PostgreSQL tables read as document entities.
//!
//! Each row becomes one record via `row_to_json`, so column names are the
//! source keys. Entities are the tables of one schema.

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::PostgresSourceConfig;
use crate::core::{Record, Source};
use crate::ddl;
use crate::drivers::common::connect_pool;
use crate::error::{MigrateError, Result};

/// Pool size for the read side; rows are pulled one entity at a time.
const SOURCE_POOL_SIZE: usize = 2;

/// Reads entities from the tables of a PostgreSQL schema.
pub struct PostgresStore {
    pool: Pool,
    schema: String,
    ignore_entities: Vec<String>,
}

fn source_err(context: &str, e: tokio_postgres::Error) -> MigrateError {
    MigrateError::Source(format!("{}: {}", context, e))
}

impl PostgresStore {
    pub async fn connect(config: &PostgresSourceConfig) -> Result<Self> {
        let pool = connect_pool(&config.connection(), SOURCE_POOL_SIZE, "source").await?;
        Ok(Self {
            pool,
            schema: config.schema.clone(),
            ignore_entities: config.ignore_entities.clone(),
        })
    }

    fn is_ignored(&self, entity: &str) -> bool {
        self.ignore_entities.iter().any(|e| e == entity)
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting PostgreSQL source connection"))
    }
}

#[async_trait]
impl Source for PostgresStore {
    async fn list_entities(&self) -> Result<Vec<String>> {
        let client = self.client().await?;

        let sql = r#"
            SELECT tablename FROM pg_catalog.pg_tables
            WHERE schemaname NOT IN ('pg_catalog', 'information_schema')
              AND schemaname = $1
            ORDER BY tablename
        "#;

        let rows = client
            .query(sql, &[&self.schema])
            .await
            .map_err(|e| source_err("listing tables", e))?;

        let entities: Vec<String> = rows
            .iter()
            .map(|row| row.get::<_, String>(0))
            .filter(|name| !self.is_ignored(name))
            .collect();

        info!("Found {} tables in source schema {}", entities.len(), self.schema);
        Ok(entities)
    }

    async fn get_records(&self, entity: &str) -> Result<Vec<Record>> {
        if self.is_ignored(entity) {
            return Ok(Vec::new());
        }

        let client = self.client().await?;
        let sql = format!(
            "SELECT row_to_json(t) FROM {} t",
            ddl::qualify_table(&self.schema, entity)
        );

        let stream = client
            .query_raw(&sql, std::iter::empty::<&str>())
            .await
            .map_err(|e| source_err(&format!("reading {}", entity), e))?;
        tokio::pin!(stream);

        let mut records = Vec::new();
        while let Some(row) = stream.next().await {
            let row = row.map_err(|e| source_err(&format!("reading {}", entity), e))?;
            let value: Value = row
                .try_get(0)
                .map_err(|e| source_err(&format!("decoding {}", entity), e))?;
            match value {
                Value::Object(map) => records.push(map),
                other => {
                    return Err(MigrateError::Source(format!(
                        "{}: expected a JSON object per row, got {}",
                        entity, other
                    )))
                }
            }
        }

        debug!("Read {} records from {}", records.len(), entity);
        Ok(records)
    }

    async fn get_count(&self, entity: &str) -> Result<usize> {
        if self.is_ignored(entity) {
            return Ok(0);
        }

        let client = self.client().await?;
        let sql = format!(
            "SELECT count(*) FROM {}",
            ddl::qualify_table(&self.schema, entity)
        );
        let row = client
            .query_one(&sql, &[])
            .await
            .map_err(|e| source_err(&format!("counting {}", entity), e))?;

        Ok(row.get::<_, i64>(0).max(0) as usize)
    }

    fn source_type(&self) -> &str {
        "postgres"
    }
}
