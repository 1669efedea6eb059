//! Provider Webhook Routes
//!
//! - `POST /webhook/mango` - call lifecycle events
//! - `POST /webhook/mango/recording` - direct recording link for a call
//! - `POST /webhook/mango/recording-ready` - recording job signal
//!
//! Every handler answers `200 OK` with a [`WebhookAck`], including for
//! malformed bodies and internal failures. The provider retries on any
//! other status, so failure detail travels in the body and the logs only.

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use calltrail_core::{LifecycleEvent, RecordingJob, RecordingLink};
use serde_json::Value;
use std::sync::Arc;

use crate::pipeline::RecordingPipeline;
use crate::reconciler::Reconciler;
use crate::state::AppState;
use crate::types::WebhookAck;

fn parse_body(body: &Bytes) -> Result<Value, WebhookAck> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, bytes = body.len(), "Webhook body is not valid JSON");
        WebhookAck::failed(format!("Invalid JSON body: {}", e))
    })
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /webhook/mango - Call lifecycle event
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/webhook/mango",
    tag = "Webhooks",
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
    ),
))]
pub async fn lifecycle_webhook(
    State(reconciler): State<Arc<Reconciler>>,
    body: Bytes,
) -> Json<WebhookAck> {
    let value = match parse_body(&body) {
        Ok(value) => value,
        Err(ack) => return Json(ack),
    };
    tracing::debug!(payload = %value, "Received lifecycle webhook");

    let event = match LifecycleEvent::from_json(value) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected lifecycle webhook");
            return Json(WebhookAck::from_decode_error(&e));
        }
    };
    tracing::info!(
        external_call_id = %event.external_call_id(),
        phase = event.label(),
        "Lifecycle event received"
    );

    let result = reconciler.handle(event).await;
    Json(WebhookAck::from_reconciliation(&result))
}

/// POST /webhook/mango/recording - Attach a recording link
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/webhook/mango/recording",
    tag = "Webhooks",
    responses(
        (status = 200, description = "Link acknowledged", body = WebhookAck),
    ),
))]
pub async fn recording_link_webhook(
    State(reconciler): State<Arc<Reconciler>>,
    body: Bytes,
) -> Json<WebhookAck> {
    let value = match parse_body(&body) {
        Ok(value) => value,
        Err(ack) => return Json(ack),
    };

    let link = match RecordingLink::from_json(&value) {
        Ok(link) => link,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected recording link webhook");
            return Json(WebhookAck::from_decode_error(&e));
        }
    };

    let result = reconciler.handle(LifecycleEvent::RecordingLinkOnly(link)).await;
    Json(WebhookAck::from_recording_link(&result))
}

/// POST /webhook/mango/recording-ready - Recording job signal
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/webhook/mango/recording-ready",
    tag = "Webhooks",
    responses(
        (status = 200, description = "Job processed", body = WebhookAck),
    ),
))]
pub async fn recording_ready_webhook(
    State(pipeline): State<Arc<RecordingPipeline>>,
    body: Bytes,
) -> Json<WebhookAck> {
    let value = match parse_body(&body) {
        Ok(value) => value,
        Err(ack) => return Json(ack),
    };

    let job: RecordingJob = match serde_json::from_value(value) {
        Ok(job) => job,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected recording job webhook");
            return Json(WebhookAck::failed(format!("Invalid recording job: {}", e)));
        }
    };
    tracing::info!(
        entry_id = %job.entry_id,
        recording_id = %job.recording_id,
        job_state = %job.job_state,
        "Recording job received"
    );

    Json(pipeline.process(job).await.into())
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/mango", post(lifecycle_webhook))
        .route("/mango/recording", post(recording_link_webhook))
        .route("/mango/recording-ready", post(recording_ready_webhook))
}
