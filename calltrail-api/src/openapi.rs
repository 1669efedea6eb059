//! OpenAPI Specification for the CallTrail service
//!
//! Generated by utoipa from route annotations and schema derives.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::events::CallSnapshot;
use crate::recordings::RecordingUrl;
use crate::routes::health::{ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::routes::{health, recording, webhook};
use crate::types::WebhookAck;
use calltrail_core::{CallDirection, CallStatus};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CallTrail API",
        version = "0.1.0",
        description = "Telephony webhook reconciliation and call recording retrieval"
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Webhooks", description = "Telephony provider callbacks; always answered with 200"),
        (name = "Recordings", description = "Signed download links for archived recordings"),
        (name = "Health", description = "Liveness and readiness probes")
    ),
    paths(
        webhook::lifecycle_webhook,
        webhook::recording_link_webhook,
        webhook::recording_ready_webhook,
        recording::download_recording,
        health::ping,
        health::liveness,
        health::readiness,
    ),
    components(schemas(
        WebhookAck,
        RecordingUrl,
        ApiError,
        ErrorCode,
        CallSnapshot,
        CallStatus,
        CallDirection,
        HealthResponse,
        HealthStatus,
        HealthDetails,
        ComponentHealth,
    ))
)]
pub struct ApiDoc;

impl ApiDoc {
    pub fn to_json() -> Result<String, serde_json::Error> {
        Self::openapi().to_pretty_json()
    }
}
