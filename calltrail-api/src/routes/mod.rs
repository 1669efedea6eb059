//! HTTP Routes Module
//!
//! - `/webhook/*` - telephony provider callbacks
//! - `/api/v1/recordings/*` - recording download links
//! - `/api/v1/ws` - live call events over WebSocket
//! - `/health/*` - Kubernetes-compatible probes
//! - `/metrics` - Prometheus exposition
//! - `/openapi.json` - API document (with the `openapi` feature)

pub mod health;
pub mod recording;
pub mod webhook;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, middleware::observability_middleware};
use crate::ws::ws_handler;

pub use health::create_router as health_router;
pub use recording::create_router as recording_router;
pub use webhook::create_router as webhook_router;

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

#[cfg(feature = "openapi")]
async fn openapi_json() -> impl axum::response::IntoResponse {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ServerConfig.
///
/// With no configured origins any origin is allowed.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600));

    if config.cors_origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete service router.
///
/// # Middleware Order (outer to inner)
/// 1. CORS
/// 2. Request tracing
/// 3. Observability (metrics + request id)
pub fn create_api_router(state: AppState, config: &ServerConfig) -> Router {
    let api_routes = Router::new()
        .nest("/recordings", recording::create_router())
        .route("/ws", get(ws_handler));

    #[allow(unused_mut)]
    let mut router = Router::new()
        .nest("/webhook", webhook::create_router())
        .nest("/api/v1", api_routes)
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler));

    #[cfg(feature = "openapi")]
    {
        router = router.route("/openapi.json", get(openapi_json));
    }

    router
        // Applied innermost-first: CORS is outermost, then tracing, then observability.
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(config))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_accepts_invalid_origins() {
        let config = ServerConfig {
            cors_origins: vec!["https://crm.example.com".into(), "bad\norigin".into()],
            ..ServerConfig::default()
        };
        let _ = build_cors_layer(&config);
    }
}
