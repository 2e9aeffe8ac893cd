#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Ingest and query pipelines end to end: table dumps go in, query contexts come out

use anyhow::Result;
use serde_json::{Value, json};
use serial_test::serial;
use tablerag::chunking::{ColumnDescriptor, Row, Table};
use tablerag::commands::{
    delete_connection, ingest_file, list_connections, query_connection, show_status,
};
use tablerag::config::{Config, HOME_ENV_VAR, OllamaConfig};
use tablerag::database::sqlite::Database;
use tablerag::embeddings::Embedder;
use tablerag::indexer::{Indexer, IngestRequest};
use tablerag::retrieval::Retriever;
use tablerag::source::DbType;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const DIMENSION: usize = 64;

/// Vectors derived from the words of a text, so related texts land close together
struct WordEmbedder;

impl Embedder for WordEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0_f32; DIMENSION];
                for word in text.split(|c: char| !c.is_alphanumeric()) {
                    if word.is_empty() {
                        continue;
                    }
                    let slot = word
                        .to_lowercase()
                        .bytes()
                        .fold(7_usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
                    vector[slot % DIMENSION] += 1.0;
                }
                vector
            })
            .collect())
    }
}

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

fn create_test_config(temp_dir: &TempDir) -> Config {
    Config {
        base_dir: temp_dir.path().to_path_buf(),
        ollama: OllamaConfig {
            embedding_dimension: DIMENSION as u32,
            ..OllamaConfig::default()
        },
        ..Config::default()
    }
}

fn products() -> Table {
    Table::new(
        "products",
        vec![
            row(json!({"sku": "A-1", "title": "Desk lamp", "price": 25})),
            row(json!({"sku": "B-2", "title": "Office chair", "price": 180})),
        ],
    )
    .with_columns(vec![
        ColumnDescriptor::new("sku", "text"),
        ColumnDescriptor::new("title", "text"),
        ColumnDescriptor::new("price", "integer"),
    ])
}

fn reviews(timestamps: &[&str]) -> Table {
    Table::new(
        "reviews",
        timestamps
            .iter()
            .enumerate()
            .map(|(n, at)| {
                row(json!({
                    "_id": format!("r{}", n),
                    "createdAt": at,
                    "stars": 5 - (n % 5),
                }))
            })
            .collect(),
    )
}

#[tokio::test]
async fn ingest_then_query_returns_schema_and_rows() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);

    let mut indexer = Indexer::new(config, WordEmbedder)
        .await
        .expect("should create indexer");
    let stats = indexer
        .ingest(
            &[products(), reviews(&["2024-01-01T00:00:00Z"])],
            &IngestRequest::full("store", DbType::Postgresql).with_name("Store"),
        )
        .await
        .expect("ingest should succeed");
    assert_eq!(stats.tables_indexed, 2);
    assert_eq!(stats.rows_encoded, 3);

    let retriever = Retriever::new(indexer.into_vector_store(), WordEmbedder, 15);
    let context = retriever
        .retrieve("store", "What does the office chair cost?")
        .await
        .expect("retrieve should succeed");

    let tables: Vec<&str> = context
        .schema
        .iter()
        .map(|item| item.table_name.as_str())
        .collect();
    assert_eq!(tables, vec!["products", "reviews"]);
    assert_eq!(context.schema[0].columns, "sku (text), title (text), price (integer)");

    let products = context
        .sample_data
        .iter()
        .find(|sample| sample.table_name == "products")
        .expect("products rows are retrieved");
    assert_eq!(products.sample_data.len(), 2);
    assert!(
        products
            .sample_data
            .iter()
            .any(|r| r.get("title") == Some(&json!("Office chair")))
    );
}

#[tokio::test]
async fn document_source_syncs_by_timestamp() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let mut indexer = Indexer::new(config, WordEmbedder)
        .await
        .expect("should create indexer");

    let first = IngestRequest::full("reviews-db", DbType::Mongodb);
    indexer
        .ingest(&[reviews(&["2020-05-01T10:00:00Z"])], &first)
        .await
        .expect("full ingest should succeed");

    // the second dump repeats the old review and adds one written after the last sync
    let stats = indexer
        .ingest(
            &[reviews(&["2020-05-01T10:00:00Z", "2999-01-01T00:00:00Z"])],
            &first.clone().incremental(),
        )
        .await
        .expect("incremental ingest should succeed");

    assert_eq!(stats.tables_indexed, 1);
    assert_eq!(stats.rows_encoded, 1);

    let status = indexer
        .database()
        .get_sync_status("reviews-db", "reviews")
        .await
        .expect("should query status")
        .expect("status should exist");
    assert_eq!(status.next_chunk_index, 2);
    assert_eq!(status.last_sync_row_count, 2);

    let retriever = Retriever::new(indexer.into_vector_store(), WordEmbedder, 15);
    let context = retriever
        .retrieve("reviews-db", "recent reviews")
        .await
        .expect("retrieve should succeed");
    assert_eq!(context.sample_data[0].sample_data.len(), 2);
}

#[tokio::test]
async fn query_for_unknown_connection_is_empty() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let mut indexer = Indexer::new(config, WordEmbedder)
        .await
        .expect("should create indexer");
    indexer
        .ingest(&[products()], &IngestRequest::full("store", DbType::Postgresql))
        .await
        .expect("ingest should succeed");

    let retriever = Retriever::new(indexer.into_vector_store(), WordEmbedder, 15);
    let context = retriever
        .retrieve("elsewhere", "lamps")
        .await
        .expect("retrieve should succeed");

    assert!(context.is_empty());
}

async fn mount_mock_ollama(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "test-model", "size": 1024, "digest": "abc"}]
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(|request: &Request| {
            let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
            let count = body["input"].as_array().map_or(0, Vec::len);
            ResponseTemplate::new(200)
                .set_body_json(json!({"embeddings": vec![vec![0.25_f32; DIMENSION]; count]}))
        })
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn commands_drive_the_whole_pipeline() {
    let server = MockServer::start().await;
    mount_mock_ollama(&server).await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        ollama: OllamaConfig {
            host: "127.0.0.1".to_string(),
            port: server.address().port(),
            model: "test-model".to_string(),
            embedding_dimension: DIMENSION as u32,
            ..OllamaConfig::default()
        },
        ..create_test_config(&temp_dir)
    };
    config.save().expect("should save config");

    let dump_path = temp_dir.path().join("dump.json");
    let dump = serde_json::to_string(&vec![products()]).expect("can serialize dump");
    std::fs::write(&dump_path, dump).expect("should write dump");

    // SAFETY: every test touching the process environment runs under #[serial]
    unsafe { std::env::set_var(HOME_ENV_VAR, temp_dir.path()) };

    let request = IngestRequest::full("store", DbType::Postgresql).with_name("Store");
    ingest_file(&dump_path, &request)
        .await
        .expect("ingest should succeed");
    list_connections().await.expect("list should succeed");
    show_status("store").await.expect("status should succeed");
    query_connection("store", "office chair", Some(5))
        .await
        .expect("query should succeed");

    let database = Database::initialize_from_config(&config)
        .await
        .expect("should open database");
    let statuses = database
        .list_sync_status("store")
        .await
        .expect("should list status");
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].last_sync_row_count, 2);

    delete_connection("store").await.expect("delete should succeed");
    assert!(delete_connection("store").await.is_err());
    assert!(show_status("store").await.is_err());
    assert!(query_connection("store", "anything", None).await.is_err());

    // SAFETY: see above
    unsafe { std::env::remove_var(HOME_ENV_VAR) };
}
