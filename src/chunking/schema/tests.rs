use super::*;
use serde_json::json;

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

#[test]
fn summary_uses_declared_columns() {
    let table = Table::new("users", Vec::new()).with_columns(vec![
        ColumnDescriptor::new("id", "integer"),
        ColumnDescriptor::new("name", "text"),
        ColumnDescriptor::new("created_at", "timestamp without time zone"),
    ]);

    assert_eq!(
        summarize(&table),
        "users: id (integer), name (text), created_at (timestamp without time zone)"
    );
}

#[test]
fn summary_samples_first_document_without_declared_columns() {
    let table = Table::new(
        "events",
        vec![
            row(json!({"_id": "a1", "count": 3, "ok": true, "tags": [], "meta": {}, "gone": null})),
            row(json!({"_id": "a2", "extra": "ignored"})),
        ],
    );

    assert_eq!(
        summarize(&table),
        "events: _id (string), count (number), ok (boolean), tags (array), meta (object), gone (object)"
    );
}

#[test]
fn summary_of_empty_table_has_no_columns() {
    assert_eq!(summarize(&Table::new("empty", Vec::new())), "empty: ");
}

#[test]
fn schema_document_lists_every_table() {
    let tables = vec![
        Table::new("users", Vec::new()).with_columns(vec![ColumnDescriptor::new("id", "integer")]),
        Table::new("notes", vec![row(json!({"body": "hi"}))]),
    ];

    let document = schema_document(&tables);
    assert_eq!(
        document,
        r#"[{"columns":"id (integer)","tableName":"users"},{"columns":"body (string)","tableName":"notes"}]"#
    );

    let items: Vec<TableSchemaItem> =
        serde_json::from_str(&document).expect("should parse schema document");
    assert_eq!(items[1].table_name, "notes");
}
