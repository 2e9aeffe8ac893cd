use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, batch_size: u32) -> Config {
    let address = server.address();
    let mut config = Config::default();
    config.ollama.host = address.ip().to_string();
    config.ollama.port = address.port();
    config.ollama.model = "test-model".to_string();
    config.ollama.batch_size = batch_size;
    config
}

#[test]
fn client_configuration() {
    let mut config = Config::default();
    config.ollama.host = "test-host".to_string();
    config.ollama.port = 1234;
    config.ollama.model = "test-model".to_string();
    config.ollama.batch_size = 128;

    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model(), "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&Config::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5)
        .with_backoff(Duration::from_millis(5));

    assert_eq!(client.retry_attempts, 5);
    assert_eq!(client.backoff_unit, Duration::from_millis(5));
}

#[test]
fn empty_input_makes_no_request() {
    let client = OllamaClient::new(&Config::default()).expect("Failed to create client");

    let vectors = client
        .generate_embeddings(&[])
        .expect("empty input should succeed");

    assert!(vectors.is_empty());
}

#[tokio::test]
async fn embeddings_are_requested_in_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "test-model"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-model",
            "embeddings": [[0.1, 0.2], [0.3, 0.4]]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 2)).expect("Failed to create client");
    let texts: Vec<String> = (0..4).map(|i| format!("text {i}")).collect();

    let vectors = tokio::task::spawn_blocking(move || client.generate_embeddings(&texts))
        .await
        .expect("task should complete")
        .expect("embedding should succeed");

    assert_eq!(vectors.len(), 4);
    assert_eq!(vectors[2], vec![0.1, 0.2]);
}

#[tokio::test]
async fn mismatched_response_count_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2]]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 8)).expect("Failed to create client");
    let texts = vec!["a".to_string(), "b".to_string()];

    let result = tokio::task::spawn_blocking(move || client.generate_embeddings(&texts))
        .await
        .expect("task should complete");

    assert!(result.is_err());
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 8))
        .expect("Failed to create client")
        .with_backoff(Duration::from_millis(1));

    let vector = tokio::task::spawn_blocking(move || client.embed("hello"))
        .await
        .expect("task should complete")
        .expect("retry should succeed");

    assert_eq!(vector, vec![1.0, 0.0]);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 8))
        .expect("Failed to create client")
        .with_backoff(Duration::from_millis(1));

    let result = tokio::task::spawn_blocking(move || client.embed("hello"))
        .await
        .expect("task should complete");

    assert!(result.is_err());
}

#[tokio::test]
async fn health_check_validates_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "test-model", "size": 1024, "digest": "abc"}]
        })))
        .mount(&server)
        .await;

    let present = OllamaClient::new(&config_for(&server, 8)).expect("Failed to create client");
    let mut missing_config = config_for(&server, 8);
    missing_config.ollama.model = "other-model".to_string();
    let missing = OllamaClient::new(&missing_config).expect("Failed to create client");

    let (present, missing) = tokio::task::spawn_blocking(move || {
        (present.health_check(), missing.health_check())
    })
    .await
    .expect("task should complete");

    assert!(present.is_ok());
    assert!(missing.is_err());
}
