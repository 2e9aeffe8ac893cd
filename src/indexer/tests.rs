use super::*;
use crate::config::OllamaConfig;
use serde_json::{Value, json};
use tempfile::TempDir;

/// Deterministic bag-of-bytes vectors, enough to exercise storage and search
struct HashEmbedder;

impl Embedder for HashEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0_f32; 8];
                for (i, byte) in text.bytes().enumerate() {
                    vector[(i + byte as usize) % 8] += 1.0;
                }
                let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt().max(1.0);
                vector.iter().map(|x| x / norm).collect()
            })
            .collect())
    }
}

/// Stands in for an embedding server that is down
struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(anyhow!("connection refused"))
    }
}

fn create_test_config(temp_dir: &TempDir) -> Config {
    Config {
        base_dir: temp_dir.path().to_path_buf(),
        ollama: OllamaConfig {
            embedding_dimension: 8,
            ..OllamaConfig::default()
        },
        ..Config::default()
    }
}

async fn create_test_indexer() -> (Indexer<HashEmbedder>, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);

    let indexer = Indexer::new(config, HashEmbedder)
        .await
        .expect("should create indexer");
    (indexer, temp_dir)
}

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

fn users() -> Table {
    Table::new(
        "users",
        vec![
            row(json!({"id": 1, "name": "Ann", "email": "ann@example.com"})),
            row(json!({"id": 2, "name": "Bob", "email": "bob@example.com"})),
            row(json!({"id": 3, "name": "Cy", "email": "cy@example.com"})),
        ],
    )
}

fn orders(count: i64) -> Table {
    Table::new(
        "orders",
        (1..=count)
            .map(|n| row(json!({"order_no": n, "total": n * 10})))
            .collect(),
    )
}

#[tokio::test]
async fn full_ingest_stores_schema_and_chunks() {
    let (mut indexer, _temp_dir) = create_test_indexer().await;
    let request = IngestRequest::full("app", DbType::Postgresql).with_name("App DB");

    let stats = indexer
        .ingest(&[users()], &request)
        .await
        .expect("ingest should succeed");

    assert_eq!(
        stats,
        IndexingStats {
            tables_indexed: 1,
            tables_skipped: 0,
            rows_encoded: 3,
            chunks_created: 1,
            records_stored: 2,
        }
    );

    let count = indexer
        .vector_store()
        .count_records(Some("app"))
        .await
        .expect("should count records");
    assert_eq!(count, 2);

    let connection = indexer
        .database()
        .get_connection("app")
        .await
        .expect("should query connection")
        .expect("connection should exist");
    assert_eq!(connection.name, "App DB");
    assert!(connection.last_synced.is_some());
    assert_eq!(connection.schema_items()[0].table_name, "users");

    let status = indexer
        .database()
        .get_sync_status("app", "users")
        .await
        .expect("should query status")
        .expect("status should exist");
    assert_eq!(status.last_sync_row_count, 3);
    assert_eq!(status.next_chunk_index, 1);
}

#[tokio::test]
async fn full_reingest_replaces_previous_records() {
    let (mut indexer, _temp_dir) = create_test_indexer().await;
    let request = IngestRequest::full("app", DbType::Postgresql);

    indexer
        .ingest(&[users(), orders(3)], &request)
        .await
        .expect("first ingest should succeed");
    indexer
        .ingest(&[users()], &request)
        .await
        .expect("second ingest should succeed");

    let count = indexer
        .vector_store()
        .count_records(Some("app"))
        .await
        .expect("should count records");
    assert_eq!(count, 2);

    let statuses = indexer
        .database()
        .list_sync_status("app")
        .await
        .expect("should list status");
    assert_eq!(statuses.len(), 1);
}

#[tokio::test]
async fn failed_embedding_keeps_previous_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let request = IngestRequest::full("app", DbType::Postgresql);

    {
        let mut indexer = Indexer::new(create_test_config(&temp_dir), HashEmbedder)
            .await
            .expect("should create indexer");
        indexer
            .ingest(&[users(), orders(3)], &request)
            .await
            .expect("first ingest should succeed");
    }

    let mut indexer = Indexer::new(create_test_config(&temp_dir), FailingEmbedder)
        .await
        .expect("should reopen indexer");
    let result = indexer.ingest(&[users()], &request).await;
    assert!(result.is_err());

    let count = indexer
        .vector_store()
        .count_records(Some("app"))
        .await
        .expect("should count records");
    assert_eq!(count, 3);

    let statuses = indexer
        .database()
        .list_sync_status("app")
        .await
        .expect("should list status");
    assert_eq!(statuses.len(), 2);
}

#[tokio::test]
async fn incremental_ingest_appends_new_rows() {
    let (mut indexer, _temp_dir) = create_test_indexer().await;
    let full = IngestRequest::full("shop", DbType::Postgresql);

    indexer
        .ingest(&[orders(3)], &full)
        .await
        .expect("full ingest should succeed");

    let stats = indexer
        .ingest(&[orders(5)], &full.clone().incremental())
        .await
        .expect("incremental ingest should succeed");

    assert_eq!(stats.tables_indexed, 1);
    assert_eq!(stats.rows_encoded, 2);
    assert_eq!(stats.chunks_created, 1);

    let status = indexer
        .database()
        .get_sync_status("shop", "orders")
        .await
        .expect("should query status")
        .expect("status should exist");
    assert_eq!(status.last_sync_row_count, 5);
    assert_eq!(status.next_chunk_index, 2);

    // schema record plus chunk 0 and chunk 1
    let count = indexer
        .vector_store()
        .count_records(Some("shop"))
        .await
        .expect("should count records");
    assert_eq!(count, 3);
}

#[tokio::test]
async fn incremental_ingest_skips_unsynced_and_unchanged_tables() {
    let (mut indexer, _temp_dir) = create_test_indexer().await;
    let full = IngestRequest::full("shop", DbType::Postgresql);

    indexer
        .ingest(&[orders(3)], &full)
        .await
        .expect("full ingest should succeed");

    let stats = indexer
        .ingest(&[orders(3), users()], &full.incremental())
        .await
        .expect("incremental ingest should succeed");

    assert_eq!(stats.tables_indexed, 0);
    assert_eq!(stats.tables_skipped, 2);
    assert_eq!(stats.rows_encoded, 0);
}

#[tokio::test]
async fn empty_connection_id_is_rejected() {
    let (mut indexer, _temp_dir) = create_test_indexer().await;

    let result = indexer
        .ingest(&[users()], &IngestRequest::full("  ", DbType::Postgresql))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn delete_connection_removes_everything() {
    let (mut indexer, _temp_dir) = create_test_indexer().await;
    indexer
        .ingest(&[users()], &IngestRequest::full("app", DbType::Postgresql))
        .await
        .expect("ingest should succeed");

    assert!(
        indexer
            .delete_connection("app")
            .await
            .expect("delete should succeed")
    );
    assert!(
        !indexer
            .delete_connection("app")
            .await
            .expect("delete should succeed")
    );

    let count = indexer
        .vector_store()
        .count_records(Some("app"))
        .await
        .expect("should count records");
    assert_eq!(count, 0);
}

#[test]
fn partial_table_keeps_key_of_full_dump() {
    let table = users();
    let new_rows = vec![row(json!({"id": 4, "name": "Dee", "email": "dee@example.com"}))];

    let partial = partial_table(&table, new_rows);

    assert_eq!(partial.primary_key, Some(vec!["id".to_string()]));
    assert_eq!(partial.data.len(), 1);
}

#[test]
fn partial_table_without_key_packs_rows() {
    let table = Table::new(
        "log",
        vec![row(json!({"level": "info"})), row(json!({"level": "info"}))],
    );

    let partial = partial_table(&table, vec![row(json!({"level": "warn"}))]);

    assert_eq!(partial.primary_key, None);
}
