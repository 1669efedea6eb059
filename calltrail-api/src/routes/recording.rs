//! Recording download links.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use calltrail_core::CallId;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::recordings::{RecordingLinks, RecordingUrl};
use crate::state::AppState;

/// GET /api/v1/recordings/call/{id}/download - Download URL for a call's recording
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/recordings/call/{id}/download",
    tag = "Recordings",
    params(
        ("id" = i64, Path, description = "Internal call id")
    ),
    responses(
        (status = 200, description = "Signed blob URL or provider link", body = RecordingUrl),
        (status = 404, description = "Call, recording or file not found", body = crate::error::ApiError),
        (status = 503, description = "Recording storage not configured", body = crate::error::ApiError),
    ),
))]
pub async fn download_recording(
    State(links): State<Arc<RecordingLinks>>,
    Path(call_id): Path<CallId>,
) -> ApiResult<Json<RecordingUrl>> {
    let url = links.download_url(call_id).await?;
    tracing::debug!(call_id, "Issued recording download URL");
    Ok(Json(url))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/call/:id/download", get(download_recording))
}
