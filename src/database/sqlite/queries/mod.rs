#[cfg(test)]
mod tests;

use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

pub struct ConnectionQueries;

impl ConnectionQueries {
    /// Insert a connection, or refresh its name, type and schema if it exists
    #[inline]
    pub async fn upsert(pool: &SqlitePool, connection: &NewConnection) -> Result<Connection> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO connections (id, name, db_type, table_schema, created_date)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                db_type = excluded.db_type,
                table_schema = excluded.table_schema
            "#,
        )
        .bind(&connection.id)
        .bind(&connection.name)
        .bind(connection.db_type)
        .bind(&connection.table_schema)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to upsert connection")?;

        Self::get_by_id(pool, &connection.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve upserted connection"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Connection>> {
        sqlx::query_as::<_, Connection>(
            r#"
            SELECT id, name, db_type, table_schema, created_date, last_synced
            FROM connections WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get connection by id")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Connection>> {
        sqlx::query_as::<_, Connection>(
            r#"
            SELECT id, name, db_type, table_schema, created_date, last_synced
            FROM connections ORDER BY created_date, id
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to list connections")
    }

    #[inline]
    pub async fn mark_synced(pool: &SqlitePool, id: &str) -> Result<()> {
        sqlx::query("UPDATE connections SET last_synced = ? WHERE id = ?")
            .bind(Utc::now().naive_utc())
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to mark connection as synced")?;
        Ok(())
    }

    /// Remove a connection and, through the cascade, its sync status rows
    #[inline]
    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM connections WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete connection")?;

        debug!(
            "Deleted {} connection rows for {}",
            result.rows_affected(),
            id
        );
        Ok(result.rows_affected() > 0)
    }
}

pub struct SyncStatusQueries;

impl SyncStatusQueries {
    #[inline]
    pub async fn upsert(pool: &SqlitePool, status: &TableSyncStatus) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO table_sync_status
                (connection_id, table_name, last_sync_timestamp, last_sync_row_count, next_chunk_index)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(connection_id, table_name) DO UPDATE SET
                last_sync_timestamp = excluded.last_sync_timestamp,
                last_sync_row_count = excluded.last_sync_row_count,
                next_chunk_index = excluded.next_chunk_index
            "#,
        )
        .bind(&status.connection_id)
        .bind(&status.table_name)
        .bind(status.last_sync_timestamp)
        .bind(status.last_sync_row_count)
        .bind(status.next_chunk_index)
        .execute(pool)
        .await
        .with_context(|| {
            format!(
                "Failed to store sync status for {}.{}",
                status.connection_id, status.table_name
            )
        })?;

        Ok(())
    }

    #[inline]
    pub async fn get(
        pool: &SqlitePool,
        connection_id: &str,
        table_name: &str,
    ) -> Result<Option<TableSyncStatus>> {
        sqlx::query_as::<_, TableSyncStatus>(
            r#"
            SELECT connection_id, table_name, last_sync_timestamp, last_sync_row_count, next_chunk_index
            FROM table_sync_status WHERE connection_id = ? AND table_name = ?
            "#,
        )
        .bind(connection_id)
        .bind(table_name)
        .fetch_optional(pool)
        .await
        .context("Failed to get table sync status")
    }

    #[inline]
    pub async fn list_for_connection(
        pool: &SqlitePool,
        connection_id: &str,
    ) -> Result<Vec<TableSyncStatus>> {
        sqlx::query_as::<_, TableSyncStatus>(
            r#"
            SELECT connection_id, table_name, last_sync_timestamp, last_sync_row_count, next_chunk_index
            FROM table_sync_status WHERE connection_id = ? ORDER BY table_name
            "#,
        )
        .bind(connection_id)
        .fetch_all(pool)
        .await
        .context("Failed to list table sync status")
    }

    /// Forget every table of a connection, used before a full re-ingest
    #[inline]
    pub async fn clear_connection(pool: &SqlitePool, connection_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM table_sync_status WHERE connection_id = ?")
            .bind(connection_id)
            .execute(pool)
            .await
            .context("Failed to clear table sync status")?;
        Ok(result.rows_affected())
    }
}
