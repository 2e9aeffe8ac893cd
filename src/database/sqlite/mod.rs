use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::sqlite::models::{Connection, NewConnection, TableSyncStatus};
use crate::database::sqlite::queries::{ConnectionQueries, SyncStatusQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// Connection and per-table sync bookkeeping
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config(config: &Config) -> Result<Self> {
        let config_dir = config.get_base_dir();

        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config.database_path()).await
    }

    // Connection operations
    #[inline]
    pub async fn upsert_connection(&self, connection: &NewConnection) -> Result<Connection> {
        ConnectionQueries::upsert(&self.pool, connection).await
    }

    #[inline]
    pub async fn get_connection(&self, id: &str) -> Result<Option<Connection>> {
        ConnectionQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn list_connections(&self) -> Result<Vec<Connection>> {
        ConnectionQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn mark_connection_synced(&self, id: &str) -> Result<()> {
        ConnectionQueries::mark_synced(&self.pool, id).await
    }

    #[inline]
    pub async fn delete_connection(&self, id: &str) -> Result<bool> {
        ConnectionQueries::delete(&self.pool, id).await
    }

    // Sync status operations
    #[inline]
    pub async fn get_sync_status(
        &self,
        connection_id: &str,
        table_name: &str,
    ) -> Result<Option<TableSyncStatus>> {
        SyncStatusQueries::get(&self.pool, connection_id, table_name).await
    }

    #[inline]
    pub async fn list_sync_status(&self, connection_id: &str) -> Result<Vec<TableSyncStatus>> {
        SyncStatusQueries::list_for_connection(&self.pool, connection_id).await
    }

    #[inline]
    pub async fn store_sync_status(&self, status: &TableSyncStatus) -> Result<()> {
        SyncStatusQueries::upsert(&self.pool, status).await
    }

    #[inline]
    pub async fn clear_sync_status(&self, connection_id: &str) -> Result<u64> {
        SyncStatusQueries::clear_connection(&self.pool, connection_id).await
    }
}
