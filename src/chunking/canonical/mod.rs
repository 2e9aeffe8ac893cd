#[cfg(test)]
mod tests;

use serde_json::Value;

use super::{Chunk, ChunkEntries, Entry, Row};

/// Serialize a value as compact JSON with object keys sorted at every depth.
///
/// The output is used both to measure sizes against the byte budget and as the
/// identity of a value when grouping, so it must not depend on insertion order.
#[inline]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Canonical serialization of a row or any other JSON object
#[inline]
pub fn canonical_object(map: &Row) -> String {
    let mut out = String::new();
    write_object(map, &mut out);
    out
}

/// Size in bytes of the canonical serialization
#[inline]
pub fn canonical_size(value: &Value) -> usize {
    canonical_json(value).len()
}

pub(crate) fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_str(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => write_object(map, out),
    }
}

pub(crate) fn write_object(map: &Row, out: &mut String) {
    let mut fields: Vec<(&String, &Value)> = map.iter().collect();
    fields.sort_unstable_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (i, (key, value)) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_str(key, out);
        out.push(':');
        write_value(value, out);
    }
    out.push('}');
}

// Field names below are written in sorted order by hand.

pub(crate) fn write_entry(entry: &Entry, out: &mut String) {
    out.push_str("{\"attribute\":");
    write_object(&entry.attribute, out);
    out.push_str(",\"pk\":");
    write_object(&entry.pk, out);
    out.push('}');
}

pub(crate) fn write_chunk(chunk: &Chunk, out: &mut String) {
    out.push_str("{\"chunkIndex\":");
    out.push_str(&chunk.chunk_index.to_string());
    out.push_str(",\"entries\":[");
    match &chunk.entries {
        ChunkEntries::Keyed(entries) => {
            for (i, entry) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_entry(entry, out);
            }
        }
        ChunkEntries::Rows(rows) => {
            for (i, row) in rows.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_object(row, out);
            }
        }
    }
    out.push_str("],\"mode\":\"");
    out.push_str(chunk.mode().as_str());
    out.push_str("\",\"tableName\":");
    write_str(&chunk.table_name, out);
    out.push('}');
}

/// JSON string literal as serde_json escapes it
fn write_str(s: &str, out: &mut String) {
    out.push_str(&Value::from(s).to_string());
}
