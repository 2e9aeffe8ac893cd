// Indexer module
// Turns table dumps into embedded chunk records and keeps per-table sync state

#[cfg(test)]
mod tests;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use futures::future::try_join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::TableRagError;
use crate::chunking::{
    Chunk, ChunkEncoder, Row, Table, TableSchemaItem, infer_keys, schema_document,
};
use crate::config::Config;
use crate::database::lancedb::{
    EmbeddingRecord, RecordKind, RecordMetadata, VectorStore, data_record_id, schema_record_id,
};
use crate::database::sqlite::Database;
use crate::database::sqlite::models::{NewConnection, TableSyncStatus};
use crate::embeddings::Embedder;
use crate::source::DbType;
use crate::sync::{choose_cursor, select_new_rows};

/// Which connection a dump belongs to and how it is merged with what is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub connection_id: String,
    pub connection_name: String,
    pub db_type: DbType,
    /// Only index rows added since the last sync, appending chunks
    pub incremental: bool,
}

impl IngestRequest {
    #[inline]
    pub fn full(connection_id: impl Into<String>, db_type: DbType) -> Self {
        let connection_id = connection_id.into();
        Self {
            connection_name: connection_id.clone(),
            connection_id,
            db_type,
            incremental: false,
        }
    }

    #[inline]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = name.into();
        self
    }

    #[inline]
    pub fn incremental(mut self) -> Self {
        self.incremental = true;
        self
    }
}

/// Statistics about one ingest run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub tables_indexed: usize,
    pub tables_skipped: usize,
    pub rows_encoded: usize,
    pub chunks_created: usize,
    pub records_stored: usize,
}

/// Rows of one table selected for this run
#[derive(Debug)]
struct TablePlan {
    table: Table,
    start_index: usize,
    previous_row_count: usize,
}

#[derive(Debug)]
struct EncodedTable {
    table_name: String,
    rows: usize,
    start_index: usize,
    previous_row_count: usize,
    chunks: Vec<Chunk>,
}

pub struct Indexer<E> {
    config: Config,
    database: Database,
    vector_store: VectorStore,
    embedder: Arc<E>,
}

impl<E: Embedder + 'static> Indexer<E> {
    /// Open the metadata and vector databases under the configured directory
    #[inline]
    pub async fn new(config: Config, embedder: E) -> Result<Self> {
        let database = Database::initialize_from_config(&config)
            .await
            .context("Failed to initialize SQLite database")?;

        let vector_store = VectorStore::new(&config)
            .await
            .context("Failed to initialize LanceDB vector store")?;

        Ok(Self::from_parts(config, database, vector_store, embedder))
    }

    #[inline]
    pub fn from_parts(
        config: Config,
        database: Database,
        vector_store: VectorStore,
        embedder: E,
    ) -> Self {
        Self {
            config,
            database,
            vector_store,
            embedder: Arc::new(embedder),
        }
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    #[inline]
    pub fn vector_store(&self) -> &VectorStore {
        &self.vector_store
    }

    #[inline]
    pub fn into_vector_store(self) -> VectorStore {
        self.vector_store
    }

    /// Index a dump of tables for one connection.
    ///
    /// A full ingest replaces everything stored for the connection. An incremental
    /// ingest only encodes rows past each table's sync cursor and numbers the new
    /// chunks after the ones already stored; tables never synced before are skipped.
    #[inline]
    pub async fn ingest(
        &mut self,
        tables: &[Table],
        request: &IngestRequest,
    ) -> Result<IndexingStats> {
        if request.connection_id.trim().is_empty() {
            return Err(
                TableRagError::InvalidInput("Connection id cannot be empty".to_string()).into(),
            );
        }

        info!(
            "{} ingest of {} tables for connection {}",
            if request.incremental { "Incremental" } else { "Full" },
            tables.len(),
            request.connection_id
        );

        let schema_items: Vec<TableSchemaItem> =
            tables.iter().map(TableSchemaItem::from_table).collect();
        let schema_json =
            serde_json::to_string(&schema_items).context("Failed to serialize table schema")?;

        let mut stats = IndexingStats::default();
        let (plans, skipped) = self.plan_tables(tables, request).await?;
        stats.tables_skipped = skipped;

        let encoded = self.encode_tables(plans).await?;

        // Everything is embedded before stored data is touched, so a failing
        // embedder leaves the previous index intact
        let created_at = Utc::now().to_rfc3339();
        let schema_record = self
            .embed_schema_record(tables, request, &created_at)
            .await?;

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(encoded.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut embedded = Vec::with_capacity(encoded.len());
        for table in encoded {
            bar.set_message(table.table_name.clone());
            let records = self
                .embed_table(&table, request, &created_at)
                .await
                .with_context(|| format!("Failed to embed table {}", table.table_name))?;
            embedded.push((table, records));
            bar.inc(1);
        }
        bar.finish_and_clear();

        if !request.incremental {
            self.vector_store
                .delete_connection(&request.connection_id)
                .await
                .context("Failed to remove previous records")?;
            self.database.clear_sync_status(&request.connection_id).await?;
        }

        self.database
            .upsert_connection(&NewConnection {
                id: request.connection_id.clone(),
                name: request.connection_name.clone(),
                db_type: request.db_type,
                table_schema: schema_json,
            })
            .await?;

        self.vector_store
            .upsert_records(&[schema_record])
            .await
            .context("Failed to store schema record")?;
        stats.records_stored += 1;

        for (table, records) in &embedded {
            let stored = self
                .store_table(table, records, &request.connection_id)
                .await
                .with_context(|| format!("Failed to index table {}", table.table_name))?;

            stats.tables_indexed += 1;
            stats.rows_encoded += table.rows;
            stats.chunks_created += table.chunks.len();
            stats.records_stored += stored;
        }

        self.database
            .mark_connection_synced(&request.connection_id)
            .await?;

        if let Err(e) = self.vector_store.optimize().await {
            warn!("Failed to optimize vector database: {}", e);
        }

        info!(
            "Indexed {} tables ({} skipped): {} rows in {} chunks, {} records stored",
            stats.tables_indexed,
            stats.tables_skipped,
            stats.rows_encoded,
            stats.chunks_created,
            stats.records_stored
        );

        Ok(stats)
    }

    /// Remove a connection's records and bookkeeping; false if it was unknown
    #[inline]
    pub async fn delete_connection(&mut self, connection_id: &str) -> Result<bool> {
        self.vector_store
            .delete_connection(connection_id)
            .await
            .context("Failed to delete connection records")?;
        self.database.delete_connection(connection_id).await
    }

    async fn plan_tables(
        &self,
        tables: &[Table],
        request: &IngestRequest,
    ) -> Result<(Vec<TablePlan>, usize)> {
        if !request.incremental {
            let plans = tables
                .iter()
                .map(|table| TablePlan {
                    table: table.clone(),
                    start_index: 0,
                    previous_row_count: 0,
                })
                .collect();
            return Ok((plans, 0));
        }

        let mut plans = Vec::new();
        let mut skipped = 0;
        for table in tables {
            let Some(status) = self
                .database
                .get_sync_status(&request.connection_id, &table.table_name)
                .await?
            else {
                debug!("Table {} was never synced, skipping", table.table_name);
                skipped += 1;
                continue;
            };

            let cursor = choose_cursor(request.db_type, table);
            let state = status.sync_state();
            let rows = select_new_rows(
                table,
                &cursor,
                &state,
                self.config.chunking.max_rows_per_sync,
            );

            if rows.is_empty() {
                debug!("No new rows in table {}", table.table_name);
                skipped += 1;
                continue;
            }

            debug!(
                "Table {}: {} new rows using {:?}",
                table.table_name,
                rows.len(),
                cursor
            );

            plans.push(TablePlan {
                table: partial_table(table, rows),
                start_index: status.next_chunk_index(),
                previous_row_count: state.last_sync_row_count,
            });
        }

        Ok((plans, skipped))
    }

    /// Encode every planned table on its own blocking task
    async fn encode_tables(&self, plans: Vec<TablePlan>) -> Result<Vec<EncodedTable>> {
        let byte_budget = self.config.chunking.byte_budget;

        let handles = plans.into_iter().map(|plan| {
            tokio::task::spawn_blocking(move || {
                let chunks = ChunkEncoder::new(byte_budget)
                    .with_start_index(plan.start_index)
                    .encode(&plan.table);
                EncodedTable {
                    table_name: plan.table.table_name,
                    rows: plan.table.data.len(),
                    start_index: plan.start_index,
                    previous_row_count: plan.previous_row_count,
                    chunks,
                }
            })
        });

        try_join_all(handles)
            .await
            .context("Encoding task failed")
    }

    async fn embed_schema_record(
        &self,
        tables: &[Table],
        request: &IngestRequest,
        created_at: &str,
    ) -> Result<EmbeddingRecord> {
        let document = schema_document(tables);
        let vector = self
            .embed(vec![document.clone()])
            .await?
            .pop()
            .ok_or_else(|| anyhow!("No embedding returned for schema document"))?;

        Ok(EmbeddingRecord {
            id: schema_record_id(&request.connection_id),
            vector,
            metadata: RecordMetadata {
                kind: RecordKind::Schema,
                connection_id: request.connection_id.clone(),
                connection_name: request.connection_name.clone(),
                db_type: request.db_type.to_string(),
                table_name: None,
                chunk_index: None,
                payload: document,
                created_at: created_at.to_string(),
            },
        })
    }

    /// Embed a table's chunks in batches of the configured upsert size
    async fn embed_table(
        &self,
        table: &EncodedTable,
        request: &IngestRequest,
        created_at: &str,
    ) -> Result<Vec<EmbeddingRecord>> {
        let batch_size = self.config.retrieval.upsert_batch_size.max(1);
        let mut records = Vec::with_capacity(table.chunks.len());

        for batch in table.chunks.chunks(batch_size) {
            let payloads: Vec<String> = batch.iter().map(Chunk::to_canonical_json).collect();
            let vectors = self.embed(payloads.clone()).await?;

            records.extend(batch.iter().zip(payloads).zip(vectors).map(
                |((chunk, payload), vector)| EmbeddingRecord {
                    id: data_record_id(
                        &request.connection_id,
                        &table.table_name,
                        chunk.chunk_index,
                    ),
                    vector,
                    metadata: RecordMetadata {
                        kind: RecordKind::Data,
                        connection_id: request.connection_id.clone(),
                        connection_name: request.connection_name.clone(),
                        db_type: request.db_type.to_string(),
                        table_name: Some(table.table_name.clone()),
                        chunk_index: u32::try_from(chunk.chunk_index).ok(),
                        payload,
                        created_at: created_at.to_string(),
                    },
                },
            ));
        }

        Ok(records)
    }

    async fn store_table(
        &mut self,
        table: &EncodedTable,
        records: &[EmbeddingRecord],
        connection_id: &str,
    ) -> Result<usize> {
        let batch_size = self.config.retrieval.upsert_batch_size.max(1);
        for batch in records.chunks(batch_size) {
            self.vector_store.upsert_records(batch).await?;
        }

        let status = TableSyncStatus {
            connection_id: connection_id.to_string(),
            table_name: table.table_name.clone(),
            last_sync_timestamp: Utc::now(),
            last_sync_row_count: i64::try_from(table.previous_row_count + table.rows)
                .unwrap_or(i64::MAX),
            next_chunk_index: i64::try_from(table.start_index + table.chunks.len())
                .unwrap_or(i64::MAX),
        };
        self.database.store_sync_status(&status).await?;

        debug!(
            "Stored {} records for table {}",
            records.len(),
            table.table_name
        );
        Ok(records.len())
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = texts.len();
        let embedder = Arc::clone(&self.embedder);
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .context("Embedding task failed")?
            .map_err(|e| TableRagError::Embedding(format!("{e:#}")))?;

        if vectors.len() != expected {
            return Err(TableRagError::Embedding(format!(
                "Expected {} vectors, got {}",
                expected,
                vectors.len()
            ))
            .into());
        }

        Ok(vectors)
    }
}

/// The new rows of a table, keyed like the full dump so entries keep merging with
/// the rows indexed by earlier syncs
fn partial_table(table: &Table, rows: Vec<Row>) -> Table {
    let keys = match &table.primary_key {
        Some(declared) if !declared.is_empty() => declared.clone(),
        _ => infer_keys(&table.data),
    };

    let partial = Table {
        table_name: table.table_name.clone(),
        columns: table.columns.clone(),
        primary_key: None,
        data: rows,
    };

    if keys.is_empty() {
        partial
    } else {
        partial.with_primary_key(keys)
    }
}
