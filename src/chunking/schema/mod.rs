#[cfg(test)]
mod tests;

use std::borrow::Cow;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::canonical::canonical_json;
use super::{ColumnDescriptor, Row, Table};

/// Per-table entry of the schema document embedded next to the row chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchemaItem {
    pub table_name: String,
    pub columns: String,
}

impl TableSchemaItem {
    #[inline]
    pub fn from_table(table: &Table) -> Self {
        Self {
            table_name: table.table_name.clone(),
            columns: column_list(&column_descriptors(table)),
        }
    }
}

/// Compact one-line description of a table: `users: id (integer), name (text)`
#[inline]
pub fn summarize(table: &Table) -> String {
    format!(
        "{}: {}",
        table.table_name,
        column_list(&column_descriptors(table))
    )
}

/// JSON array describing every table, embedded as a single schema record
#[inline]
pub fn schema_document(tables: &[Table]) -> String {
    let items = tables
        .iter()
        .map(|table| {
            let item = TableSchemaItem::from_table(table);
            let mut object = Row::new();
            object.insert("tableName".to_string(), Value::String(item.table_name));
            object.insert("columns".to_string(), Value::String(item.columns));
            Value::Object(object)
        })
        .collect();
    canonical_json(&Value::Array(items))
}

/// Declared column descriptors, or descriptors sampled from the first row when the
/// source did not report any (document collections)
#[inline]
pub fn column_descriptors(table: &Table) -> Cow<'_, [ColumnDescriptor]> {
    if table.columns.is_empty() {
        Cow::Owned(infer_columns(&table.data))
    } else {
        Cow::Borrowed(&table.columns)
    }
}

/// Sample column names and coarse types from the first row
#[inline]
pub fn infer_columns(rows: &[Row]) -> Vec<ColumnDescriptor> {
    rows.first()
        .map(|first| {
            first
                .iter()
                .map(|(name, value)| ColumnDescriptor::new(name.clone(), type_tag(value)))
                .collect()
        })
        .unwrap_or_default()
}

fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Array(_) => "array",
        // Document sources report nulls as objects
        Value::Object(_) | Value::Null => "object",
    }
}

fn column_list(columns: &[ColumnDescriptor]) -> String {
    columns
        .iter()
        .map(|c| format!("{} ({})", c.column_name, c.data_type))
        .join(", ")
}
