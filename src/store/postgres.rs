//! PostgreSQL connections for the pool.
//!
//! Each pooled connection is a plain `sqlx::PgConnection`; pooling,
//! pre-ping and recycling are handled by [`Pool`](super::Pool).

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::pool::{ConnectionManager, Pool, PoolConfig, PoolError};

/// Pool of PostgreSQL connections.
pub type PgPool = Pool<PgManager>;

/// Opens PostgreSQL connections with a bounded connect time.
pub struct PgManager {
    options: PgConnectOptions,
    connect_timeout: Duration,
}

impl PgManager {
    pub fn new(database_url: &str, connect_timeout: Duration) -> Result<Self, PoolError> {
        let options = PgConnectOptions::from_str(database_url)
            .map_err(|e| PoolError::Connect(format!("invalid DATABASE_URL: {e}")))?
            .application_name(env!("CARGO_PKG_NAME"));

        Ok(Self {
            options,
            connect_timeout,
        })
    }
}

#[async_trait]
impl ConnectionManager for PgManager {
    type Connection = PgConnection;
    type Error = sqlx::Error;

    async fn connect(&self) -> Result<PgConnection, sqlx::Error> {
        match tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&self.options))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", self.connect_timeout),
            ))),
        }
    }

    async fn ping(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&mut *conn).await?;
        Ok(())
    }

    async fn close(&self, conn: PgConnection) {
        if let Err(e) = conn.close().await {
            debug!("Error while closing database connection: {e}");
        }
    }
}

/// Build the application pool. No connection is opened until first use.
pub fn connect_lazy(
    database_url: &str,
    connect_timeout: Duration,
    config: PoolConfig,
) -> Result<PgPool, PoolError> {
    let manager = PgManager::new(database_url, connect_timeout)?;
    Ok(Pool::new(manager, config))
}
