//! CallTrail API Server Entry Point
//!
//! Bootstraps configuration, connects the PostgreSQL call store and starts
//! the Axum HTTP server.

use std::sync::Arc;

use axum::Router;
use calltrail_api::{
    create_api_router, realtime_notifier, ApiError, ApiResult, AppConfig, AppState, BlobConfig,
    DbConfig, MangoRecordingClient, PgCallStore, Services,
};
use calltrail_storage::{BlobStore, LocalBlobStore};

use calltrail_api::telemetry::{init_tracing, TelemetryConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let config = AppConfig::from_env();
    tracing::debug!(?config, "Loaded configuration");

    let db_config = DbConfig::from_env();
    let store = PgCallStore::from_config(&db_config)?;
    if let Err(e) = store.health_check().await {
        // Readiness reports this; the webhook routes still ack.
        tracing::warn!(error = %e, "Call store not reachable at startup");
    }

    let provider = MangoRecordingClient::new(
        config.provider.clone(),
        config.recording.download_timeout,
    )
    .map_err(|e| ApiError::internal_error(format!("Failed to build provider client: {}", e)))?;
    if !config.provider.is_configured() {
        tracing::warn!("Provider credentials missing; recording downloads will fail");
    }

    let http = reqwest::Client::builder()
        .timeout(config.broadcast.timeout)
        .build()
        .map_err(|e| ApiError::internal_error(format!("Failed to build HTTP client: {}", e)))?;

    let services = Services {
        store: Arc::new(store),
        provider: Arc::new(provider),
        blobs: blob_store(&config.blob)?,
        notifiers: realtime_notifier(&config, http).into_iter().collect(),
    };

    let state = AppState::new(&config, services);
    let app: Router = create_api_router(state, &config.server);

    let addr = config.server.socket_addr();
    tracing::info!(
        %addr,
        service = %telemetry_config.service_name,
        environment = %telemetry_config.environment,
        "Starting CallTrail API server"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

/// Local blob store when a root directory is configured.
fn blob_store(config: &BlobConfig) -> ApiResult<Option<Arc<dyn BlobStore>>> {
    let Some(root) = config.root.as_ref() else {
        tracing::info!("Blob root not set; recordings will not be archived");
        return Ok(None);
    };
    let secret = config.signing_secret.as_deref().ok_or_else(|| {
        ApiError::invalid_input("CALLTRAIL_BLOB_SIGNING_SECRET is required with CALLTRAIL_BLOB_ROOT")
    })?;
    let store = LocalBlobStore::new(root, config.public_url.clone(), secret.as_bytes())
        .map_err(|e| ApiError::internal_error(format!("Failed to open blob store: {}", e)))?;
    tracing::info!(root = %root, "Archiving recordings to local blob store");
    Ok(Some(Arc::new(store)))
}
