#[cfg(test)]
mod tests;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::chunking::TableSchemaItem;
use crate::source::DbType;
use crate::sync::SyncState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Connection {
    pub id: String,
    pub name: String,
    pub db_type: DbType,
    /// JSON array of `{tableName, columns}` from the last ingest
    pub table_schema: String,
    pub created_date: NaiveDateTime,
    pub last_synced: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConnection {
    pub id: String,
    pub name: String,
    pub db_type: DbType,
    pub table_schema: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TableSyncStatus {
    pub connection_id: String,
    pub table_name: String,
    pub last_sync_timestamp: DateTime<Utc>,
    pub last_sync_row_count: i64,
    pub next_chunk_index: i64,
}

impl Connection {
    /// Table summaries stored with the connection; empty when unreadable
    #[inline]
    pub fn schema_items(&self) -> Vec<TableSchemaItem> {
        serde_json::from_str(&self.table_schema).unwrap_or_default()
    }
}

impl TableSyncStatus {
    #[inline]
    pub fn sync_state(&self) -> SyncState {
        SyncState {
            last_sync_timestamp: self.last_sync_timestamp,
            last_sync_row_count: usize::try_from(self.last_sync_row_count).unwrap_or(0),
        }
    }

    #[inline]
    pub fn next_chunk_index(&self) -> usize {
        usize::try_from(self.next_chunk_index).unwrap_or(0)
    }
}
