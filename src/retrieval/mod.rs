// Retrieval module
// Answers a question with the schema and the rows rebuilt from the nearest chunks


use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::TableRagError;
use crate::chunking::{Chunk, TableSample, TableSchemaItem, reconstruct_tables};
use crate::database::lancedb::{RecordKind, SearchResult, VectorStore};
use crate::embeddings::Embedder;

/// What a language model gets to see about a connection for one question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    pub schema: Vec<TableSchemaItem>,
    pub sample_data: Vec<TableSample>,
}

impl QueryContext {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.schema.is_empty() && self.sample_data.is_empty()
    }
}

pub struct Retriever<E> {
    vector_store: VectorStore,
    embedder: Arc<E>,
    top_k: usize,
}

impl<E: Embedder + 'static> Retriever<E> {
    #[inline]
    pub fn new(vector_store: VectorStore, embedder: E, top_k: usize) -> Self {
        Self {
            vector_store,
            embedder: Arc::new(embedder),
            top_k: top_k.max(1),
        }
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Embed the question, fetch the nearest records of the connection and rebuild
    /// the rows they carry
    #[inline]
    pub async fn retrieve(&self, connection_id: &str, question: &str) -> Result<QueryContext> {
        let embedder = Arc::clone(&self.embedder);
        let text = question.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .context("Embedding task failed")?
            .map_err(|e| TableRagError::Embedding(format!("{e:#}")))?;

        let results = self
            .vector_store
            .search_similar(&vector, self.top_k, Some(connection_id))
            .await?;

        debug!(
            "Found {} records for connection {}",
            results.len(),
            connection_id
        );

        let context = build_context(&results);
        info!(
            "Query context: {} tables described, {} tables with rows",
            context.schema.len(),
            context.sample_data.len()
        );
        Ok(context)
    }
}

/// Assemble a query context from search hits.
///
/// The first schema hit supplies the table list. Data hits are parsed as chunks and
/// merged per table; payloads that do not parse are skipped.
#[inline]
pub fn build_context(results: &[SearchResult]) -> QueryContext {
    let schema = results
        .iter()
        .find(|r| r.metadata.kind == RecordKind::Schema)
        .map(|r| {
            serde_json::from_str::<Vec<TableSchemaItem>>(&r.metadata.payload).unwrap_or_else(|e| {
                warn!("Ignoring unreadable schema record {}: {}", r.id, e);
                Vec::new()
            })
        })
        .unwrap_or_default();

    let chunks: Vec<Chunk> = results
        .iter()
        .filter(|r| r.metadata.kind == RecordKind::Data)
        .filter_map(|r| match serde_json::from_str::<Chunk>(&r.metadata.payload) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                warn!("Skipping unreadable chunk record {}: {}", r.id, e);
                None
            }
        })
        .collect();

    QueryContext {
        schema,
        sample_data: reconstruct_tables(&chunks),
    }
}
