//! HTTP surface tests, driven in-process through the router.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use docqa::app::DocQa;
use docqa::config::ServerConfig;
use docqa::server::{router, AppState};
use docqa_core::answer::NOT_PRESENT;
use docqa_core::embedding::Embedder;
use docqa_core::error::{MSG_PROCESS_FIRST, MSG_TRY_AGAIN};
use docqa_core::Result;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

fn test_router(reply: Reply) -> Router {
    let app = app_with(
        Arc::new(KeywordEmbedder::new("keywords")),
        Arc::new(FakeGenerator::new(reply)),
    );
    router(AppState::new(app))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(v) => builder.body(Body::from(v.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_session(app: &Router) -> String {
    let (status, body) = send(app, "POST", "/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    body["session_id"].as_str().unwrap().to_string()
}

fn documents() -> Value {
    json!({
        "documents": [
            { "id": "bio.pdf", "text": BIOLOGY },
            { "id": "geo.pdf", "text": GEOGRAPHY },
        ]
    })
}

#[tokio::test]
async fn test_health() {
    let app = test_router(Reply::EchoContext);
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_process_then_ask() {
    let app = test_router(Reply::EchoContext);
    let id = create_session(&app).await;

    let (status, body) = send(&app, "POST", &format!("/sessions/{id}/process"), Some(documents())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunks"], 2);
    assert_eq!(body["model"], "keywords");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/ask"),
        Some(json!({ "question": "Which river runs through Paris?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "answered");
    assert!(body["answer"].as_str().unwrap().starts_with("Paris is the capital"));
    assert_eq!(body["sources"][0]["document_id"], "geo.pdf");
}

#[tokio::test]
async fn test_ask_before_process_is_conflict() {
    let app = test_router(Reply::EchoContext);
    let id = create_session(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/ask"),
        Some(json!({ "question": "What produces ATP?" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "index_not_found");
    assert_eq!(body["error"]["message"], MSG_PROCESS_FIRST);
}

#[tokio::test]
async fn test_unrelated_question_is_not_present() {
    let app = test_router(Reply::Text("should not be called".to_string()));
    let id = create_session(&app).await;
    send(
        &app,
        "POST",
        &format!("/sessions/{id}/process"),
        Some(json!({ "documents": [{ "id": "bio.pdf", "text": BIOLOGY }] })),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/ask"),
        Some(json!({ "question": "What is the capital of France?", "k": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], NOT_PRESENT);
    assert_eq!(body["outcome"], "not_present");
}

#[tokio::test(start_paused = true)]
async fn test_generation_outage_is_service_unavailable() {
    let app = test_router(Reply::Unavailable);
    let id = create_session(&app).await;
    send(&app, "POST", &format!("/sessions/{id}/process"), Some(documents())).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/ask"),
        Some(json!({ "question": "What produces ATP?" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["message"], MSG_TRY_AGAIN);
}

#[tokio::test]
async fn test_validation_errors_are_bad_request() {
    let app = test_router(Reply::EchoContext);
    let id = create_session(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/process"),
        Some(json!({ "documents": [{ "id": "blank.pdf", "text": "" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    send(&app, "POST", &format!("/sessions/{id}/process"), Some(documents())).await;
    let (status, _) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/ask"),
        Some(json!({ "question": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let app = test_router(Reply::EchoContext);
    let a = create_session(&app).await;
    let b = create_session(&app).await;
    assert_ne!(a, b);

    send(&app, "POST", &format!("/sessions/{a}/process"), Some(documents())).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/sessions/{b}/ask"),
        Some(json!({ "question": "What produces ATP?" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delete_and_unknown_session() {
    let app = test_router(Reply::EchoContext);
    let id = create_session(&app).await;

    let (status, _) = send(&app, "DELETE", &format!("/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/ask"),
        Some(json!({ "question": "anything" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _) = send(&app, "DELETE", &format!("/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Blocks any batch mentioning `gate` until the test releases it.
struct GatedEmbedder {
    inner: KeywordEmbedder,
    gate: &'static str,
    started: Notify,
    release: Notify,
}

#[async_trait]
impl Embedder for GatedEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
    fn dims(&self) -> usize {
        self.inner.dims()
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.to_lowercase().contains(self.gate)) {
            self.started.notify_one();
            self.release.notified().await;
        }
        self.inner.embed_batch(texts).await
    }
}

#[tokio::test]
async fn test_later_upload_wins_over_slower_earlier_one() {
    let embedder = Arc::new(GatedEmbedder {
        inner: KeywordEmbedder::new("keywords"),
        gate: "mitochondria",
        started: Notify::new(),
        release: Notify::new(),
    });
    let app = router(AppState::new(DocQa::with_providers(
        &test_config(),
        embedder.clone(),
        Arc::new(FakeGenerator::new(Reply::EchoContext)),
    )));
    let id = create_session(&app).await;

    let slow = tokio::spawn({
        let app = app.clone();
        let uri = format!("/sessions/{id}/process");
        async move {
            send(
                &app,
                "POST",
                &uri,
                Some(json!({ "documents": [{ "id": "bio.pdf", "text": BIOLOGY }] })),
            )
            .await
        }
    });
    embedder.started.notified().await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/process"),
        Some(json!({ "documents": [{ "id": "geo.pdf", "text": GEOGRAPHY }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    embedder.release.notify_one();
    let (status, body) = slow.await.unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "build_superseded");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/ask"),
        Some(json!({ "question": "Which river runs through Paris?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sources"][0]["document_id"], "geo.pdf");
}

fn limited_router(server: ServerConfig) -> Router {
    let app = app_with(
        Arc::new(KeywordEmbedder::new("keywords")),
        Arc::new(FakeGenerator::new(Reply::EchoContext)),
    );
    router(AppState::with_config(app, &server))
}

#[tokio::test]
async fn test_least_recently_used_session_is_evicted() {
    let app = limited_router(ServerConfig {
        max_sessions: 2,
        ..ServerConfig::default()
    });
    let first = create_session(&app).await;
    let second = create_session(&app).await;

    // Touch the first so the second becomes the eviction candidate.
    send(&app, "POST", &format!("/sessions/{first}/process"), Some(documents())).await;
    let third = create_session(&app).await;

    let ask = json!({ "question": "What produces ATP?" });
    let (status, _) = send(&app, "POST", &format!("/sessions/{second}/ask"), Some(ask.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", &format!("/sessions/{first}/ask"), Some(ask.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", &format!("/sessions/{third}/ask"), Some(ask)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "index_not_found");
}

#[tokio::test]
async fn test_oversized_upload_uses_error_envelope() {
    let app = limited_router(ServerConfig {
        max_body_bytes: 1024,
        ..ServerConfig::default()
    });
    let id = create_session(&app).await;

    let big = "Mitochondria produce ATP. ".repeat(100);
    let (status, body) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/process"),
        Some(json!({ "documents": [{ "id": "big.txt", "text": big }] })),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], "payload_too_large");
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = test_router(Reply::EchoContext);
    let id = create_session(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/ask"),
        Some(json!({ "query": "wrong field" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}
