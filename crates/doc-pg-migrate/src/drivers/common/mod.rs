//! Connection plumbing shared by the PostgreSQL drivers.

pub mod tls;

pub use tls::{tls_connector, SslMode};

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tracing::{info, warn};

use crate::config::PgConnection;
use crate::error::{MigrateError, Result};

/// Build a connection pool and check it with `SELECT 1`.
pub async fn connect_pool(conn: &PgConnection, max_size: usize, role: &str) -> Result<Pool> {
    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let pg_config = conn.pg_config();

    let mgr = match tls_connector(conn.ssl_mode.parse::<SslMode>()?) {
        Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
        None => {
            warn!(
                "PostgreSQL {} TLS is disabled. Credentials will be transmitted in plaintext.",
                role
            );
            Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
        }
    };

    let pool = Pool::builder(mgr)
        .max_size(max_size)
        .build()
        .map_err(|e| MigrateError::pool(e, format!("creating PostgreSQL {} pool", role)))?;

    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::pool(e, format!("testing PostgreSQL {} connection", role)))?;
    client.simple_query("SELECT 1").await?;

    info!("Connected to PostgreSQL {}: {}", role, conn.display_url());
    Ok(pool)
}
