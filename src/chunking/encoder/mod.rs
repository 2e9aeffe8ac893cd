
use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use super::canonical::canonical_object;
use super::keys::infer_keys;
use super::{Chunk, ChunkEntries, DEFAULT_BYTE_BUDGET, Entry, Row, Table};

/// Splits a table into chunks whose payload stays within a byte budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEncoder {
    byte_budget: usize,
    start_index: usize,
}

impl Default for ChunkEncoder {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_BYTE_BUDGET)
    }
}

/// A value that can be packed into a chunk
trait PackUnit: Sized {
    fn canonical_len(&self) -> usize;
    fn into_entries(units: Vec<Self>) -> ChunkEntries;
}

impl PackUnit for Entry {
    fn canonical_len(&self) -> usize {
        self.canonical_json().len()
    }

    fn into_entries(units: Vec<Self>) -> ChunkEntries {
        ChunkEntries::Keyed(units)
    }
}

impl PackUnit for Row {
    fn canonical_len(&self) -> usize {
        canonical_object(self).len()
    }

    fn into_entries(units: Vec<Self>) -> ChunkEntries {
        ChunkEntries::Rows(units)
    }
}

/// Accumulator threaded through the packing loop
struct Packing<'a, T> {
    table_name: &'a str,
    byte_budget: usize,
    next_index: usize,
    open: Vec<T>,
    open_size: usize,
    chunks: Vec<Chunk>,
}

impl<'a, T: PackUnit> Packing<'a, T> {
    fn new(table_name: &'a str, byte_budget: usize, start_index: usize) -> Self {
        Self {
            table_name,
            byte_budget,
            next_index: start_index,
            open: Vec::new(),
            open_size: 0,
            chunks: Vec::new(),
        }
    }

    fn push(mut self, unit: T) -> Self {
        let size = unit.canonical_len();

        if size > self.byte_budget {
            // Cannot be split further; goes out alone and the open chunk keeps filling.
            warn!(
                "Unit of {} bytes in table '{}' exceeds the {} byte budget, emitting it as its own chunk",
                size, self.table_name, self.byte_budget
            );
            self.emit(vec![unit]);
            return self;
        }

        if self.open_size + size > self.byte_budget {
            self.close();
        }

        self.open.push(unit);
        self.open_size += size;
        self
    }

    fn close(&mut self) {
        if self.open.is_empty() {
            return;
        }
        let units = std::mem::take(&mut self.open);
        self.open_size = 0;
        self.emit(units);
    }

    fn emit(&mut self, units: Vec<T>) {
        self.chunks.push(Chunk {
            table_name: self.table_name.to_string(),
            chunk_index: self.next_index,
            entries: T::into_entries(units),
        });
        self.next_index += 1;
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.close();
        self.chunks
    }
}

impl ChunkEncoder {
    #[inline]
    pub fn new(byte_budget: usize) -> Self {
        Self {
            byte_budget,
            start_index: 0,
        }
    }

    /// Number the produced chunks from `start_index` instead of zero, so chunks from an
    /// incremental sync do not collide with chunks stored by earlier syncs
    #[inline]
    pub fn with_start_index(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }

    #[inline]
    pub fn byte_budget(&self) -> usize {
        self.byte_budget
    }

    /// Encode a table into chunks.
    ///
    /// Uses the table's declared key, or infers one. With a key every non-key column
    /// value becomes its own entry tagged with the row's key values; without one whole
    /// rows are packed.
    #[inline]
    pub fn encode(&self, table: &Table) -> Vec<Chunk> {
        let keys = match &table.primary_key {
            Some(declared) if !declared.is_empty() => declared.clone(),
            _ => infer_keys(&table.data),
        };

        let chunks = if keys.is_empty() {
            self.encode_rows(table)
        } else {
            self.encode_entries(table, &keys)
        };

        debug!(
            "Encoded table '{}' ({} rows, key {:?}) into {} chunks",
            table.table_name,
            table.data.len(),
            keys,
            chunks.len()
        );

        chunks
    }

    fn encode_entries(&self, table: &Table, keys: &[String]) -> Vec<Chunk> {
        let key_set: HashSet<&str> = keys.iter().map(String::as_str).collect();

        let mut packing = Packing::new(&table.table_name, self.byte_budget, self.start_index);
        for row in &table.data {
            let pk: Row = keys
                .iter()
                .map(|key| (key.clone(), row.get(key).cloned().unwrap_or(Value::Null)))
                .collect();

            let mut emitted = false;
            for (column, value) in row {
                if key_set.contains(column.as_str()) {
                    continue;
                }
                let mut attribute = Row::new();
                attribute.insert(column.clone(), value.clone());
                packing = packing.push(Entry {
                    pk: pk.clone(),
                    attribute,
                });
                emitted = true;
            }

            // A row made only of key columns still needs one entry to be rebuilt
            if !emitted {
                packing = packing.push(Entry {
                    pk,
                    attribute: Row::new(),
                });
            }
        }

        packing.finish()
    }

    fn encode_rows(&self, table: &Table) -> Vec<Chunk> {
        table
            .data
            .iter()
            .cloned()
            .fold(
                Packing::new(&table.table_name, self.byte_budget, self.start_index),
                Packing::push,
            )
            .finish()
    }
}

/// Encode a table with the given byte budget, numbering chunks from zero
#[inline]
pub fn encode(table: &Table, byte_budget: usize) -> Vec<Chunk> {
    ChunkEncoder::new(byte_budget).encode(table)
}
