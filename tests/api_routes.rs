mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use common::MockGenerator;
use cmdr_serve::config::SamplingLimits;
use cmdr_serve::orchestrator::Orchestrator;
use cmdr_serve::server::{AppState, build_router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app(generator: Arc<MockGenerator>) -> axum::Router {
    let orchestrator = Orchestrator::new(generator, SamplingLimits::default());
    build_router(AppState::new(orchestrator, Duration::from_secs(5)))
}

async fn post(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn chat_returns_generated_text() {
    let generator = Arc::new(MockGenerator::replying("Hi there<|END_OF_TURN_TOKEN|>"));
    let (status, body) = post(
        app(generator.clone()),
        "/chat",
        json!({"conversation": [{"role": "user", "content": "Hello"}]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"generated_text": "Hi there"}));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn generate_returns_generated_text() {
    let generator = Arc::new(MockGenerator::replying("world"));
    let (status, body) = post(
        app(generator),
        "/generate",
        json!({"prompt": "Hello", "temperature": 0.7, "max_tokens": 16}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generated_text"], "world");
}

#[tokio::test]
async fn tool_route_returns_tagged_tool_call() {
    let generator = Arc::new(MockGenerator::replying(
        "Action: ```json\n[{\"tool_name\": \"internet_search\", \"parameters\": {\"query\": \"weather\"}}]\n```",
    ));
    let (status, body) = post(
        app(generator),
        "/tool",
        json!({
            "conversation": [{"role": "user", "content": "What's the weather?"}],
            "tools": [{
                "name": "internet_search",
                "description": "Search the internet",
                "parameter_definitions": {
                    "query": {"description": "Query", "type": "str", "required": true}
                }
            }]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"tool_response": {
            "type": "tool_call",
            "name": "internet_search",
            "arguments": {"query": "weather"}
        }})
    );
}

#[tokio::test]
async fn rag_route_returns_citations() {
    let generator = Arc::new(MockGenerator::replying(
        "Grounded answer: <co: 0>Emperor penguins</co: 0> are the tallest.",
    ));
    let (status, body) = post(
        app(generator),
        "/rag",
        json!({
            "conversation": [{"role": "user", "content": "Tallest penguin?"}],
            "documents": [{"title": "Tall penguins", "text": "Emperor penguins are the tallest."}],
            "citation_mode": "fast"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let rag = &body["rag_response"];
    assert_eq!(rag["type"], "grounded_answer");
    assert_eq!(rag["text"], "Emperor penguins are the tallest.");
    assert_eq!(
        rag["citations"],
        json!([{"document_id": 0, "start": 0, "end": 16, "text": "Emperor penguins"}])
    );
}

#[tokio::test]
async fn missing_key_is_bad_request() {
    let generator = Arc::new(MockGenerator::replying("unused"));
    let (status, body) = post(app(generator.clone()), "/chat", json!({"messages": []})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("conversation"));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn invalid_temperature_is_bad_request() {
    let generator = Arc::new(MockGenerator::replying("unused"));
    let (status, _) = post(
        app(generator.clone()),
        "/chat",
        json!({"conversation": [{"role": "user", "content": "Hello"}], "temperature": -0.1}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn dangling_citation_is_bad_gateway() {
    let generator = Arc::new(MockGenerator::replying(
        "Grounded answer: <co: 5>made up</co: 5>",
    ));
    let (status, body) = post(
        app(generator),
        "/rag",
        json!({
            "conversation": [{"role": "user", "content": "q"}],
            "documents": [{"title": "a", "text": "b"}]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn generation_failure_is_internal_error() {
    let generator = Arc::new(MockGenerator::failing("device lost"));
    let (status, body) = post(
        app(generator),
        "/chat",
        json!({"conversation": [{"role": "user", "content": "Hello"}]}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "An unexpected error occurred");
    assert!(body["details"].as_str().unwrap().contains("device lost"));
}

#[tokio::test]
async fn slow_generation_times_out() {
    let generator = Arc::new(MockGenerator::replying("late").with_delay(Duration::from_secs(5)));
    let orchestrator = Orchestrator::new(generator, SamplingLimits::default());
    let app = build_router(AppState::new(orchestrator, Duration::from_millis(50)));

    let (status, _) = post(
        app,
        "/chat",
        json!({"conversation": [{"role": "user", "content": "Hello"}]}),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn health_reports_model() {
    let generator = Arc::new(MockGenerator::replying("unused"));
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app(generator).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "mock-command-r");
}
