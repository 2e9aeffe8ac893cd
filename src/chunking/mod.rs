// Row chunking module
// Splits tables into size-bounded chunks for embedding and rebuilds rows from retrieved chunks

pub mod canonical;
pub mod encoder;
pub mod keys;
pub mod reconstruct;
pub mod schema;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

pub use canonical::{canonical_json, canonical_object, canonical_size};
pub use encoder::{ChunkEncoder, encode};
pub use keys::infer_keys;
pub use reconstruct::{
    RowReconstructor, TableReconstructor, TableSample, reconstruct, reconstruct_stream,
    reconstruct_tables,
};
pub use schema::{TableSchemaItem, infer_columns, schema_document, summarize};

/// Maximum canonical byte size of a chunk's units
pub const DEFAULT_BYTE_BUDGET: usize = 4000;

/// Maximum number of new rows picked up per table on one sync
pub const DEFAULT_MAX_ROWS_PER_SYNC: usize = 1000;

/// A single table row. Column order is preserved as loaded.
pub type Row = serde_json::Map<String, Value>;

/// Column name and coarse declared type, as reported by the source connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    #[serde(alias = "name")]
    pub column_name: String,
    #[serde(alias = "declaredType", alias = "type")]
    pub data_type: String,
}

impl ColumnDescriptor {
    #[inline]
    pub fn new(column_name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A table (or document collection) as produced by a row source
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(alias = "collectionName")]
    pub table_name: String,
    #[serde(default, alias = "schema")]
    pub columns: Vec<ColumnDescriptor>,
    /// Declared key columns. When absent the key is inferred from the rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<String>>,
    #[serde(default)]
    pub data: Vec<Row>,
}

impl Table {
    #[inline]
    pub fn new(table_name: impl Into<String>, data: Vec<Row>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            primary_key: None,
            data,
        }
    }

    #[inline]
    pub fn with_columns(mut self, columns: Vec<ColumnDescriptor>) -> Self {
        self.columns = columns;
        self
    }

    #[inline]
    pub fn with_primary_key(mut self, key: Vec<String>) -> Self {
        self.primary_key = Some(key);
        self
    }
}

/// One non-key column value of one identified row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entry {
    pub pk: Row,
    pub attribute: Row,
}

impl Entry {
    #[inline]
    pub fn canonical_json(&self) -> String {
        let mut out = String::new();
        canonical::write_entry(self, &mut out);
        out
    }
}

/// Chunk contents: normalized entries when a key is known, whole rows otherwise.
///
/// Deserializing this type on its own guesses the variant from the shape of the
/// items; chunks carry an explicit [`ChunkMode`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkEntries {
    Keyed(Vec<Entry>),
    Rows(Vec<Row>),
}

/// Encoding mode recorded in a chunk's envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkMode {
    Keyed,
    Rows,
}

impl ChunkMode {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keyed => "keyed",
            Self::Rows => "rows",
        }
    }
}

impl ChunkEntries {
    #[inline]
    pub fn mode(&self) -> ChunkMode {
        match self {
            Self::Keyed(_) => ChunkMode::Keyed,
            Self::Rows(_) => ChunkMode::Rows,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::Keyed(entries) => entries.len(),
            Self::Rows(rows) => rows.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A size-bounded unit of encoded table data
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawChunk")]
pub struct Chunk {
    pub table_name: String,
    pub chunk_index: usize,
    pub entries: ChunkEntries,
}

/// Wire form of a chunk. `mode` is absent in payloads written before it existed.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChunk {
    table_name: String,
    #[serde(default)]
    chunk_index: usize,
    #[serde(default)]
    mode: Option<ChunkMode>,
    entries: Value,
}

impl TryFrom<RawChunk> for Chunk {
    type Error = serde_json::Error;

    fn try_from(raw: RawChunk) -> Result<Self, Self::Error> {
        let entries = match raw.mode {
            Some(ChunkMode::Keyed) => ChunkEntries::Keyed(serde_json::from_value(raw.entries)?),
            Some(ChunkMode::Rows) => ChunkEntries::Rows(serde_json::from_value(raw.entries)?),
            None => serde_json::from_value(raw.entries)?,
        };

        Ok(Self {
            table_name: raw.table_name,
            chunk_index: raw.chunk_index,
            entries,
        })
    }
}

impl Serialize for Chunk {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Chunk", 4)?;
        state.serialize_field("tableName", &self.table_name)?;
        state.serialize_field("chunkIndex", &self.chunk_index)?;
        state.serialize_field("mode", &self.entries.mode())?;
        state.serialize_field("entries", &self.entries)?;
        state.end()
    }
}

impl Chunk {
    #[inline]
    pub fn mode(&self) -> ChunkMode {
        self.entries.mode()
    }

    #[inline]
    pub fn is_keyed(&self) -> bool {
        matches!(self.entries, ChunkEntries::Keyed(_))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the canonical sizes of the chunk's units, the quantity bounded by the byte budget
    #[inline]
    pub fn payload_size(&self) -> usize {
        match &self.entries {
            ChunkEntries::Keyed(entries) => entries.iter().map(|e| e.canonical_json().len()).sum(),
            ChunkEntries::Rows(rows) => rows.iter().map(|r| canonical_object(r).len()).sum(),
        }
    }

    /// Serialized form handed to the embedding pipeline and stored alongside the vector
    #[inline]
    pub fn to_canonical_json(&self) -> String {
        let mut out = String::new();
        canonical::write_chunk(self, &mut out);
        out
    }
}

/// Configuration for row chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Byte budget per chunk
    pub byte_budget: usize,
    /// Upper bound on rows taken from a table during one incremental sync
    pub max_rows_per_sync: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            byte_budget: DEFAULT_BYTE_BUDGET,
            max_rows_per_sync: DEFAULT_MAX_ROWS_PER_SYNC,
        }
    }
}
