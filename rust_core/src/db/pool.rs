//! Postgres connection pool settings.

use crate::config::env_parse;
use crate::error::Result as SyncResult;
use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

#[derive(Clone, Debug, PartialEq)]
pub struct DbPoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// Maximum lifetime of a connection
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            max_lifetime: Duration::from_secs(1800),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl DbPoolConfig {
    pub fn from_env() -> SyncResult<Self> {
        let d = Self::default();
        let config = Self {
            max_connections: env_parse("DB_POOL_MAX_CONNECTIONS", d.max_connections)?,
            min_connections: env_parse("DB_POOL_MIN_CONNECTIONS", d.min_connections)?,
            max_lifetime: Duration::from_secs(env_parse(
                "DB_POOL_MAX_LIFETIME_SECS",
                d.max_lifetime.as_secs(),
            )?),
            idle_timeout: Duration::from_secs(env_parse(
                "DB_POOL_IDLE_TIMEOUT_SECS",
                d.idle_timeout.as_secs(),
            )?),
            acquire_timeout: Duration::from_secs(env_parse(
                "DB_POOL_ACQUIRE_TIMEOUT_SECS",
                d.acquire_timeout.as_secs(),
            )?),
        };
        if config.max_connections == 0 || config.min_connections > config.max_connections {
            return Err(crate::error::SyncError::config(format!(
                "invalid pool size min={} max={}",
                config.min_connections, config.max_connections
            )));
        }
        Ok(config)
    }
}

pub async fn create_pool(database_url: &str, config: &DbPoolConfig) -> Result<PgPool> {
    info!(
        "Creating database pool: max={}, min={}, acquire_timeout={:?}",
        config.max_connections, config.min_connections, config.acquire_timeout
    );

    let connect_opts =
        PgConnectOptions::from_str(database_url).context("Failed to parse database URL")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(connect_opts)
        .await
        .context("Failed to create database pool")?;

    Ok(pool)
}
