//! Wiring helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use calltrail_api::notifier::Notifier;
use calltrail_api::provider::RecordingProvider;
use calltrail_api::{create_api_router, AppConfig, AppState, Services};
use calltrail_storage::{BlobStore, CallStore};
use serde_json::Value;
use tower::ServiceExt;

/// Defaults with the settle delay removed and short timeouts.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.recording.settle_delay = Duration::ZERO;
    config.recording.download_timeout = Duration::from_millis(500);
    config.recording.upload_timeout = Duration::from_millis(500);
    config.reconciler.store_timeout = Duration::from_millis(500);
    config.broadcast.timeout = Duration::from_millis(500);
    config
}

pub fn test_state(
    config: &AppConfig,
    store: Arc<dyn CallStore>,
    provider: Arc<dyn RecordingProvider>,
    blobs: Option<Arc<dyn BlobStore>>,
    notifiers: Vec<Arc<dyn Notifier>>,
) -> AppState {
    AppState::new(
        config,
        Services {
            store,
            provider,
            blobs,
            notifiers,
        },
    )
}

pub fn test_router(config: &AppConfig, state: AppState) -> Router {
    create_api_router(state, &config.server)
}

/// POST `body` to `uri` and decode the JSON response.
pub async fn post_json(router: &Router, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap();
    send(router, request).await
}

pub async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}
