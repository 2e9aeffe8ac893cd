
use std::collections::HashMap;
use std::pin::pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::canonical::canonical_object;
use super::{Chunk, ChunkEntries, Row};

/// Rows rebuilt for one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSample {
    pub table_name: String,
    pub sample_data: Vec<Row>,
}

/// Merges chunk entries of a single table into rows.
///
/// Entries are grouped by the canonical form of their key, so chunks may be applied in
/// any order and any number of times. When the same key and column arrive with
/// different values the last one applied wins.
#[derive(Debug, Default)]
pub struct RowReconstructor {
    positions: HashMap<String, usize>,
    rows: Vec<Row>,
}

impl RowReconstructor {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge every entry of the chunk, regardless of the table it is tagged with
    #[inline]
    pub fn apply(&mut self, chunk: &Chunk) {
        match &chunk.entries {
            ChunkEntries::Keyed(entries) => {
                for entry in entries {
                    let key = format!("pk:{}", canonical_object(&entry.pk));
                    let row = self.slot(key, || entry.pk.clone());
                    for (column, value) in &entry.attribute {
                        row.insert(column.clone(), value.clone());
                    }
                }
            }
            ChunkEntries::Rows(rows) => {
                // Without a key a row is its own identity
                for row in rows {
                    let key = format!("row:{}", canonical_object(row));
                    self.slot(key, || row.clone());
                }
            }
        }
    }

    fn slot(&mut self, key: String, seed: impl FnOnce() -> Row) -> &mut Row {
        let position = match self.positions.get(&key) {
            Some(&position) => position,
            None => {
                self.rows.push(seed());
                let position = self.rows.len() - 1;
                self.positions.insert(key, position);
                position
            }
        };
        &mut self.rows[position]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in the order their keys were first seen
    #[inline]
    pub fn finish(self) -> Vec<Row> {
        self.rows
    }
}

/// Routes chunks of several tables to one reconstructor per table
#[derive(Debug, Default)]
pub struct TableReconstructor {
    positions: HashMap<String, usize>,
    tables: Vec<(String, RowReconstructor)>,
}

impl TableReconstructor {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn apply(&mut self, chunk: &Chunk) {
        let position = match self.positions.get(&chunk.table_name) {
            Some(&position) => position,
            None => {
                self.tables
                    .push((chunk.table_name.clone(), RowReconstructor::new()));
                let position = self.tables.len() - 1;
                self.positions.insert(chunk.table_name.clone(), position);
                position
            }
        };
        self.tables[position].1.apply(chunk);
    }

    /// Tables in the order they were first seen
    #[inline]
    pub fn finish(self) -> Vec<TableSample> {
        self.tables
            .into_iter()
            .map(|(table_name, rows)| {
                let sample_data = rows.finish();
                debug!(
                    "Reconstructed {} rows for table {}",
                    sample_data.len(),
                    table_name
                );
                TableSample {
                    table_name,
                    sample_data,
                }
            })
            .collect()
    }
}

/// Rebuild the rows of `table_name` from an unordered, possibly partial set of chunks.
///
/// Chunks tagged with another table are ignored. An empty input yields no rows.
#[inline]
pub fn reconstruct(table_name: &str, chunks: &[Chunk]) -> Vec<Row> {
    let mut reconstructor = RowReconstructor::new();
    for chunk in chunks.iter().filter(|c| c.table_name == table_name) {
        reconstructor.apply(chunk);
    }
    reconstructor.finish()
}

/// Rebuild rows for every table the chunks belong to
#[inline]
pub fn reconstruct_tables(chunks: &[Chunk]) -> Vec<TableSample> {
    let mut reconstructor = TableReconstructor::new();
    for chunk in chunks {
        reconstructor.apply(chunk);
    }
    reconstructor.finish()
}

/// Fold chunks arriving from a concurrent producer into a single accumulator
#[inline]
pub async fn reconstruct_stream<S>(chunks: S) -> Vec<TableSample>
where
    S: Stream<Item = Chunk>,
{
    let mut chunks = pin!(chunks);
    let mut reconstructor = TableReconstructor::new();
    while let Some(chunk) = chunks.next().await {
        reconstructor.apply(&chunk);
    }
    reconstructor.finish()
}
