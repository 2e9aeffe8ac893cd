// Incremental sync module
// Decides how new rows are recognised in a fresh table dump


use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

use crate::chunking::schema::column_descriptors;
use crate::chunking::{ColumnDescriptor, Row, Table};
use crate::source::DbType;

const TIMESTAMP_TYPES: [&str; 4] = ["timestamp", "timestamptz", "date", "datetime"];
const TIMESTAMP_NAMES: [&str; 6] = [
    "created_at",
    "updated_at",
    "timestamp",
    "date",
    "created",
    "modified",
];
const DOCUMENT_TIMESTAMP_NAMES: [&str; 6] = [
    "createdAt",
    "created_at",
    "updatedAt",
    "updated_at",
    "timestamp",
    "date",
];

/// How new rows are told apart from rows already indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCursor {
    /// Rows whose column value is later than the last sync
    Timestamp { column: String },
    /// Rows past the number already indexed
    Offset,
}

/// What is known about a table from its previous sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncState {
    pub last_sync_timestamp: DateTime<Utc>,
    pub last_sync_row_count: usize,
}

/// Pick a timestamp column of a relational table.
///
/// Conventional names with a temporal type win; otherwise the first temporal column.
#[inline]
pub fn find_timestamp_column(columns: &[ColumnDescriptor]) -> Option<String> {
    let is_temporal = |column: &ColumnDescriptor| {
        let data_type = column.data_type.to_lowercase();
        TIMESTAMP_TYPES.iter().any(|t| data_type.contains(t))
    };

    columns
        .iter()
        .find(|c| {
            TIMESTAMP_NAMES.contains(&c.column_name.to_lowercase().as_str()) && is_temporal(c)
        })
        .or_else(|| columns.iter().find(|c| is_temporal(c)))
        .map(|c| c.column_name.clone())
}

/// Pick a timestamp field of a document collection by name alone
#[inline]
pub fn find_document_timestamp_field(columns: &[ColumnDescriptor]) -> Option<String> {
    columns
        .iter()
        .find(|c| {
            let lowered = c.column_name.to_lowercase();
            DOCUMENT_TIMESTAMP_NAMES.contains(&c.column_name.as_str())
                || lowered.contains("date")
                || lowered.contains("time")
        })
        .map(|c| c.column_name.clone())
}

/// Cursor to use for a table
#[inline]
pub fn choose_cursor(db_type: DbType, table: &Table) -> SyncCursor {
    let columns = column_descriptors(table);
    let column = match db_type {
        DbType::Postgresql => find_timestamp_column(&columns),
        DbType::Mongodb => find_document_timestamp_field(&columns),
    };

    column.map_or(SyncCursor::Offset, |column| SyncCursor::Timestamp { column })
}

/// Rows of a fresh dump that were not covered by the previous sync, at most `limit`
#[inline]
pub fn select_new_rows(
    table: &Table,
    cursor: &SyncCursor,
    state: &SyncState,
    limit: usize,
) -> Vec<Row> {
    let rows: Vec<Row> = match cursor {
        SyncCursor::Timestamp { column } => table
            .data
            .iter()
            .filter(|row| {
                row.get(column)
                    .and_then(parse_timestamp)
                    .is_some_and(|ts| ts > state.last_sync_timestamp)
            })
            .take(limit)
            .cloned()
            .collect(),
        SyncCursor::Offset => table
            .data
            .iter()
            .skip(state.last_sync_row_count)
            .take(limit)
            .cloned()
            .collect(),
    };

    debug!(
        "Found {} new rows in table {} using {:?}",
        rows.len(),
        table.table_name,
        cursor
    );
    rows
}

/// Interpret a cell as a point in time.
///
/// Accepts RFC 3339 strings, naive date-times (taken as UTC), plain dates, epoch
/// milliseconds and extended-JSON `{"$date": ...}` wrappers.
#[inline]
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Value::Object(map) => map.get("$date").and_then(parse_timestamp),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
