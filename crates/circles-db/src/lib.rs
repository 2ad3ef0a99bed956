//! # circles-db
//!
//! Database layer for Circles. Everything lives in one SQLite database:
//! - **Accounts & logins**: identities and session ids
//! - **Circles**: the hierarchy, walked with recursive CTEs
//! - **Roles, grants & membership**: the inputs of permission resolution

pub mod repository;
pub mod sqlite;

use std::str::FromStr;

use anyhow::Result;
use circles_common::config::DatabaseConfig;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// Shared database state passed through Axum extractors.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the configured SQLite database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        tracing::info!(url = %config.url, "Connecting to SQLite...");
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` is a separate database, so keep exactly one alive.
        let pool_options = if sqlite::is_memory_url(&config.url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
        };
        let pool = pool_options.connect_with(options).await?;

        tracing::info!("Connected to SQLite");
        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Migrations complete");
        Ok(())
    }
}
