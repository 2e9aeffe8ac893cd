// LanceDB vector database module
// Stores chunk and schema embeddings with their payloads for similarity search


pub mod vector_store;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use vector_store::{SearchResult, VectorStore};

/// What a stored record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// One serialized chunk of table data
    Data,
    /// The schema summary of a whole connection
    Schema,
}

impl RecordKind {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Data => "data",
            RecordKind::Schema => "schema",
        }
    }

    #[inline]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "data" => Some(RecordKind::Data),
            "schema" => Some(RecordKind::Schema),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// See [`data_record_id`] and [`schema_record_id`]
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub connection_id: String,
    pub connection_name: String,
    pub db_type: String,
    /// Set on data records only
    pub table_name: Option<String>,
    /// Set on data records only
    pub chunk_index: Option<u32>,
    /// Canonical chunk JSON, or the schema document
    pub payload: String,
    pub created_at: String,
}

/// Record id of a data chunk.
///
/// Connection and table names are length-prefixed, so names containing the
/// separator cannot collide: `data-{len}:{connection}-{len}:{table}-{chunkIndex}`.
#[inline]
pub fn data_record_id(connection_id: &str, table_name: &str, chunk_index: usize) -> String {
    format!(
        "data-{}:{connection_id}-{}:{table_name}-{chunk_index}",
        connection_id.len(),
        table_name.len()
    )
}

/// Record id of a connection's schema document
#[inline]
pub fn schema_record_id(connection_id: &str) -> String {
    format!("schema-{connection_id}")
}
