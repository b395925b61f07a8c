mod common;

use common::init_tracing;
use interfaces::{LanguageModelClient, LanguageModelError};
use serde_json::json;
use signal_aggregator::GeminiClient;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/models/test-model:generateContent";

fn client_for(server: &MockServer) -> GeminiClient {
    GeminiClient::new("test-key", "test-model").with_base_url(&format!("{}/", server.uri()))
}

#[tokio::test]
async fn candidate_parts_are_joined_into_the_reply() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hello, " }, { "text": "world" }] } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client_for(&server).generate("prompt").await;
    assert_eq!(reply, Ok("Hello, world".to_string()));
}

#[tokio::test]
async fn too_many_requests_is_a_rate_limit() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let result = client_for(&server).generate("prompt").await;
    assert!(matches!(result, Err(LanguageModelError::RateLimited(_))));
}

#[tokio::test]
async fn resource_exhausted_body_is_a_rate_limit() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "status": "RESOURCE_EXHAUSTED", "message": "Quota exceeded" }
        })))
        .mount(&server)
        .await;

    let result = client_for(&server).generate("prompt").await;
    assert!(matches!(result, Err(LanguageModelError::RateLimited(_))));
}

#[tokio::test]
async fn other_client_errors_are_plain_failures() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "status": "INVALID_ARGUMENT", "message": "request 4290 rejected" }
        })))
        .mount(&server)
        .await;

    let result = client_for(&server).generate("prompt").await;
    assert!(matches!(result, Err(LanguageModelError::Failed(_))));
}

#[tokio::test]
async fn empty_candidates_are_a_failure() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let result = client_for(&server).generate("prompt").await;
    assert!(matches!(result, Err(LanguageModelError::Failed(_))));
}
