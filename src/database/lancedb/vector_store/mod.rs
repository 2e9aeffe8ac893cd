
use super::{EmbeddingRecord, RecordKind, RecordMetadata};
use crate::{TableRagError, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::{
    Connection, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TABLE_NAME: &str = "records";

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: usize,
}

/// Search result from vector similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub metadata: RecordMetadata,
    pub similarity_score: f32,
    pub distance: f32,
}

fn db_error(context: &str, e: impl std::fmt::Display) -> TableRagError {
    TableRagError::Database(format!("{context}: {e}"))
}

/// Quote a string literal for a LanceDB filter expression
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a StringArray, TableRagError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| TableRagError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| TableRagError::Database(format!("Invalid {name} column type")))
}

fn string_array<'a>(
    records: &'a [EmbeddingRecord],
    field: impl Fn(&'a EmbeddingRecord) -> &'a str,
) -> StringArray {
    StringArray::from(records.iter().map(field).collect::<Vec<_>>())
}

impl VectorStore {
    /// Open (or create) the record table under the configured vector directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, TableRagError> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path)
            .map_err(|e| db_error("Failed to create vector database directory", e))?;

        let uri = db_path.to_string_lossy().into_owned();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| db_error("Failed to connect to LanceDB", e))?;

        let mut store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            vector_dimension: config.ollama.embedding_dimension as usize,
        };
        store.initialize_table().await?;

        info!("Vector store initialized successfully");
        Ok(store)
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    async fn initialize_table(&mut self) -> Result<(), TableRagError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| db_error("Failed to list tables", e))?;

        if table_names.contains(&self.table_name) {
            match self.detect_existing_vector_dimension().await {
                Ok(dim) => {
                    self.vector_dimension = dim;
                    debug!("Detected existing vector dimension: {}", dim);
                }
                Err(e) => warn!(
                    "Could not detect vector dimension from existing table: {}",
                    e
                ),
            }
            return Ok(());
        }

        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(self.vector_dimension))
            .execute()
            .await
            .map_err(|e| db_error("Failed to create table", e))?;

        info!(
            "Record table created with {} dimensions",
            self.vector_dimension
        );
        Ok(())
    }

    async fn detect_existing_vector_dimension(&self) -> Result<usize, TableRagError> {
        let schema = self
            .open_table()
            .await?
            .schema()
            .await
            .map_err(|e| db_error("Failed to get table schema", e))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                TableRagError::Database(
                    "Could not find vector column or determine dimension".to_string(),
                )
            })
    }

    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    i32::try_from(vector_dim).unwrap_or(i32::MAX),
                ),
                false,
            ),
            Field::new("kind", DataType::Utf8, false),
            Field::new("connection_id", DataType::Utf8, false),
            Field::new("connection_name", DataType::Utf8, false),
            Field::new("db_type", DataType::Utf8, false),
            Field::new("table_name", DataType::Utf8, true),
            Field::new("chunk_index", DataType::UInt32, true),
            Field::new("payload", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    async fn open_table(&self) -> Result<Table, TableRagError> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| db_error("Failed to open table", e))
    }

    /// Insert records, replacing any stored record with the same id
    #[inline]
    pub async fn upsert_records(
        &mut self,
        records: &[EmbeddingRecord],
    ) -> Result<(), TableRagError> {
        let Some(first) = records.first() else {
            debug!("No records to store");
            return Ok(());
        };

        let vector_dim = first.vector.len();
        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(TableRagError::Database(format!(
                "Record {} has {} dimensions, expected {}",
                bad.id,
                bad.vector.len(),
                vector_dim
            )));
        }

        if self.vector_dimension != vector_dim {
            warn!(
                "Vector dimension changed from {} to {}, recreating table",
                self.vector_dimension, vector_dim
            );
            self.recreate_table_with_dimension(vector_dim).await?;
        }

        let table = self.open_table().await?;

        // Replacement never reaches past the connection that owns a record
        let predicate = records
            .iter()
            .into_group_map_by(|r| r.metadata.connection_id.as_str())
            .into_iter()
            .map(|(connection_id, group)| {
                format!(
                    "(connection_id = {} AND id IN ({}))",
                    sql_literal(connection_id),
                    group.iter().map(|r| sql_literal(&r.id)).join(", ")
                )
            })
            .join(" OR ");
        table
            .delete(&predicate)
            .await
            .map_err(|e| db_error("Failed to replace existing records", e))?;

        let record_batch = self.create_record_batch(records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| db_error("Failed to insert records", e))?;

        debug!("Stored {} records", records.len());
        Ok(())
    }

    async fn recreate_table_with_dimension(
        &mut self,
        vector_dim: usize,
    ) -> Result<(), TableRagError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| db_error("Failed to list tables for drop", e))?;

        if table_names.contains(&self.table_name) {
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| db_error("Failed to drop table", e))?;
        }

        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| db_error("Failed to create table with new dimensions", e))?;

        self.vector_dimension = vector_dim;
        info!("Record table recreated with {} dimensions", vector_dim);
        Ok(())
    }

    fn create_record_batch(
        &self,
        records: &[EmbeddingRecord],
    ) -> Result<RecordBatch, TableRagError> {
        let vector_dim = self.vector_dimension;

        let flat_values: Vec<f32> = records
            .iter()
            .flat_map(|r| r.vector.iter().copied())
            .collect();
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            i32::try_from(vector_dim).map_err(|e| db_error("Vector dimension too large", e))?,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| db_error("Failed to create vector array", e))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(string_array(records, |r| r.id.as_str())),
            Arc::new(vector_array),
            Arc::new(string_array(records, |r| r.metadata.kind.as_str())),
            Arc::new(string_array(records, |r| r.metadata.connection_id.as_str())),
            Arc::new(string_array(records, |r| r.metadata.connection_name.as_str())),
            Arc::new(string_array(records, |r| r.metadata.db_type.as_str())),
            Arc::new(StringArray::from(
                records
                    .iter()
                    .map(|r| r.metadata.table_name.as_deref())
                    .collect::<Vec<_>>(),
            )),
            Arc::new(UInt32Array::from(
                records
                    .iter()
                    .map(|r| r.metadata.chunk_index)
                    .collect::<Vec<_>>(),
            )),
            Arc::new(string_array(records, |r| r.metadata.payload.as_str())),
            Arc::new(string_array(records, |r| r.metadata.created_at.as_str())),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| db_error("Failed to create record batch", e))
    }

    /// Nearest records to `query_vector`, optionally restricted to one connection
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
        connection_filter: Option<&str>,
    ) -> Result<Vec<SearchResult>, TableRagError> {
        debug!("Searching for similar vectors with limit: {}", limit);

        let table = self.open_table().await?;

        let mut query = table
            .vector_search(query_vector)
            .map_err(|e| db_error("Failed to create vector search", e))?
            .column("vector")
            .limit(limit);

        if let Some(connection_id) = connection_filter {
            query = query.only_if(format!("connection_id = {}", sql_literal(connection_id)));
        }

        let mut results = query
            .execute()
            .await
            .map_err(|e| db_error("Failed to execute search", e))?;

        let mut search_results = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| db_error("Failed to read result stream", e))?
        {
            search_results.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results", search_results.len());
        Ok(search_results)
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>, TableRagError> {
        let ids = string_column(batch, "id")?;
        let kinds = string_column(batch, "kind")?;
        let connection_ids = string_column(batch, "connection_id")?;
        let connection_names = string_column(batch, "connection_name")?;
        let db_types = string_column(batch, "db_type")?;
        let table_names = string_column(batch, "table_name")?;
        let payloads = string_column(batch, "payload")?;
        let created_ats = string_column(batch, "created_at")?;
        let chunk_indices = batch
            .column_by_name("chunk_index")
            .ok_or_else(|| TableRagError::Database("Missing chunk_index column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| TableRagError::Database("Invalid chunk_index column type".to_string()))?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut search_results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let Some(kind) = RecordKind::parse(kinds.value(row)) else {
                warn!("Skipping record {} with unknown kind", ids.value(row));
                continue;
            };

            let metadata = RecordMetadata {
                kind,
                connection_id: connection_ids.value(row).to_string(),
                connection_name: connection_names.value(row).to_string(),
                db_type: db_types.value(row).to_string(),
                table_name: (!table_names.is_null(row)).then(|| table_names.value(row).to_string()),
                chunk_index: (!chunk_indices.is_null(row)).then(|| chunk_indices.value(row)),
                payload: payloads.value(row).to_string(),
                created_at: created_ats.value(row).to_string(),
            };

            let distance = distances
                .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            search_results.push(SearchResult {
                id: ids.value(row).to_string(),
                metadata,
                similarity_score: 1.0 - distance,
                distance,
            });
        }

        Ok(search_results)
    }

    /// Delete every record of a connection
    #[inline]
    pub async fn delete_connection(&mut self, connection_id: &str) -> Result<(), TableRagError> {
        debug!("Deleting records for connection: {}", connection_id);

        self.open_table()
            .await?
            .delete(&format!("connection_id = {}", sql_literal(connection_id)))
            .await
            .map_err(|e| db_error("Failed to delete connection records", e))?;

        info!("Deleted records for connection: {}", connection_id);
        Ok(())
    }

    /// Number of stored records, optionally for one connection only
    #[inline]
    pub async fn count_records(
        &self,
        connection_filter: Option<&str>,
    ) -> Result<u64, TableRagError> {
        let filter = connection_filter.map(|id| format!("connection_id = {}", sql_literal(id)));
        let count = self
            .open_table()
            .await?
            .count_rows(filter)
            .await
            .map_err(|e| db_error("Failed to count rows", e))?;

        Ok(count as u64)
    }

    /// Compact the record table after large deletions
    #[inline]
    pub async fn optimize(&mut self) -> Result<(), TableRagError> {
        self.open_table()
            .await?
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| db_error("Failed to optimize table", e))?;

        info!("Vector database optimization completed");
        Ok(())
    }
}
