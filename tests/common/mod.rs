#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use danci_mastery::db::{MemoryStore, StoreBackend};
use danci_mastery::mastery::config::RetryPolicy;
use danci_mastery::mastery::{MasteryConfig, MasteryEngine};
use danci_mastery::state::Engine;

pub fn test_config() -> MasteryConfig {
    MasteryConfig {
        scheduler_seed: Some(7),
        storage_retry: RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        },
        ..MasteryConfig::default()
    }
}

pub fn create_test_engine() -> Arc<Engine> {
    let store = StoreBackend::Memory(MemoryStore::new());
    Arc::new(MasteryEngine::new(Arc::new(store), test_config()))
}

pub fn create_test_app() -> Router {
    danci_mastery::create_app_with(create_test_engine())
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}
