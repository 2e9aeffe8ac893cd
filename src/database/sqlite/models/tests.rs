use super::*;
use chrono::{NaiveDate, TimeZone};

fn connection(table_schema: &str) -> Connection {
    Connection {
        id: "crm".to_string(),
        name: "CRM".to_string(),
        db_type: DbType::Mongodb,
        table_schema: table_schema.to_string(),
        created_date: NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date"),
        last_synced: None,
    }
}

#[test]
fn schema_items_parse_stored_summary() {
    let conn = connection(
        r#"[{"columns":"_id (string), email (string)","tableName":"contacts"}]"#,
    );

    let items = conn.schema_items();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].table_name, "contacts");
    assert_eq!(items[0].columns, "_id (string), email (string)");
}

#[test]
fn unreadable_schema_is_empty() {
    assert!(connection("not json").schema_items().is_empty());
}

#[test]
fn sync_status_conversions() {
    let at = Utc
        .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp");
    let status = TableSyncStatus {
        connection_id: "crm".to_string(),
        table_name: "contacts".to_string(),
        last_sync_timestamp: at,
        last_sync_row_count: 42,
        next_chunk_index: -1,
    };

    let state = status.sync_state();

    assert_eq!(state.last_sync_timestamp, at);
    assert_eq!(state.last_sync_row_count, 42);
    assert_eq!(status.next_chunk_index(), 0);
}
