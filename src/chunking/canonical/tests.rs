use super::*;
use crate::chunking::ChunkMode;
use serde_json::json;

#[test]
fn sorts_object_keys_at_every_depth() {
    let value = json!({"b": 1, "a": {"z": true, "m": null}, "c": [{"y": 2, "x": 1}]});

    assert_eq!(
        canonical_json(&value),
        r#"{"a":{"m":null,"z":true},"b":1,"c":[{"x":1,"y":2}]}"#
    );
}

#[test]
fn insertion_order_does_not_change_output() {
    let first = json!({"id": 1, "name": "A"});
    let second = json!({"name": "A", "id": 1});

    assert_eq!(canonical_json(&first), canonical_json(&second));
}

#[test]
fn array_order_is_significant() {
    assert_ne!(canonical_json(&json!([1, 2])), canonical_json(&json!([2, 1])));
}

#[test]
fn matches_serde_json_for_scalars() {
    let values = [
        json!(null),
        json!(true),
        json!(-17),
        json!(2.5),
        json!(18446744073709551615_u64),
        json!("plain"),
        json!("quote \" backslash \\ newline \n tab \t bell \u{07} unicode é"),
    ];

    for value in values {
        let expected = serde_json::to_string(&value).expect("should serialize scalar");
        assert_eq!(canonical_json(&value), expected);
    }
}

#[test]
fn size_is_measured_in_bytes() {
    // "é" is two bytes in UTF-8
    assert_eq!(canonical_size(&json!("é")), 4);
    assert_eq!(canonical_size(&json!({})), 2);
}

#[test]
fn entry_serialization_is_sorted() {
    let entry = Entry {
        pk: json!({"id": 1}).as_object().cloned().unwrap_or_default(),
        attribute: json!({"name": "A"}).as_object().cloned().unwrap_or_default(),
    };

    assert_eq!(entry.canonical_json(), r#"{"attribute":{"name":"A"},"pk":{"id":1}}"#);
}

#[test]
fn chunk_serialization_parses_back() {
    let entry = Entry {
        pk: json!({"id": 7}).as_object().cloned().unwrap_or_default(),
        attribute: json!({"tags": ["a", "b"]})
            .as_object()
            .cloned()
            .unwrap_or_default(),
    };
    let chunk = Chunk {
        table_name: "posts".to_string(),
        chunk_index: 3,
        entries: ChunkEntries::Keyed(vec![entry]),
    };

    let text = chunk.to_canonical_json();
    assert_eq!(
        text,
        r#"{"chunkIndex":3,"entries":[{"attribute":{"tags":["a","b"]},"pk":{"id":7}}],"mode":"keyed","tableName":"posts"}"#
    );

    let parsed: Chunk = serde_json::from_str(&text).expect("should parse chunk");
    assert_eq!(parsed, chunk);
}

#[test]
fn untagged_whole_row_chunk_parses_as_rows() {
    let text = r#"{"chunkIndex":0,"entries":[{"name":"A","score":1}],"tableName":"scores"}"#;

    let parsed: Chunk = serde_json::from_str(text).expect("should parse chunk");
    assert!(!parsed.is_keyed());
    assert_eq!(parsed.len(), 1);
}

#[test]
fn rows_shaped_like_entries_keep_their_mode() {
    let table = crate::chunking::Table::new(
        "pairs",
        vec![
            json!({"pk": {"x": 1}, "attribute": {"y": 2}})
                .as_object()
                .cloned()
                .unwrap_or_default();
            2
        ],
    );
    let chunks = crate::chunking::encode(&table, 4000);
    assert!(!chunks[0].is_keyed());

    let parsed: Chunk =
        serde_json::from_str(&chunks[0].to_canonical_json()).expect("should parse chunk");
    assert_eq!(parsed.mode(), ChunkMode::Rows);
    assert_eq!(
        crate::chunking::reconstruct("pairs", &[parsed]),
        vec![table.data[0].clone()]
    );

    let pretty = serde_json::to_string_pretty(&chunks[0]).expect("can serialize chunk");
    let reparsed: Chunk = serde_json::from_str(&pretty).expect("should parse chunk");
    assert_eq!(reparsed, chunks[0]);
}

#[test]
fn escapes_control_characters_in_keys() {
    let value = json!({"line\nbreak": "\u{01}", "quote\"": 1});

    assert_eq!(
        canonical_json(&value),
        r#"{"line\nbreak":"\u0001","quote\"":1}"#
    );
}
