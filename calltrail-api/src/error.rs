//! HTTP error responses
//!
//! Provider-facing webhook routes never surface these; they always answer
//! with a `WebhookAck`. [`ApiError`] serves the download-link route, the
//! metrics endpoint and startup.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use calltrail_core::{BlobError, CallTrailError, ProviderError, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Machine-readable error category; fixes the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 400
    InvalidInput,
    MissingField,

    // 404
    NotFound,
    CallNotFound,
    /// Call exists but has no archived recording
    RecordingNotFound,

    // 409
    AlreadyExists,

    // 5xx
    InternalError,
    DatabaseError,
    /// Recording provider or blob storage failed
    UpstreamError,
    ServiceUnavailable,
    Timeout,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput | ErrorCode::MissingField => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound | ErrorCode::CallNotFound | ErrorCode::RecordingNotFound => {
                StatusCode::NOT_FOUND
            }
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::UpstreamError => StatusCode::BAD_GATEWAY,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// JSON error body: `{"code": "CALL_NOT_FOUND", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn call_not_found(call_id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::CallNotFound, format!("Call {} not found", call_id))
    }

    pub fn recording_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RecordingNotFound, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn upstream_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn timeout(operation: &str) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Operation '{}' timed out", operation),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, key } => {
                ApiError::new(ErrorCode::NotFound, format!("{} {} not found", entity, key))
            }
            StorageError::AlreadyExists { entity, key } => ApiError::new(
                ErrorCode::AlreadyExists,
                format!("{} {} already exists", entity, key),
            ),
            StorageError::Unavailable { reason } => {
                tracing::error!(reason = %reason, "Store unavailable");
                ApiError::service_unavailable("Call store unavailable")
            }
            StorageError::Timeout { operation, .. } => ApiError::timeout(operation),
            StorageError::Query { reason } => {
                // Query text stays in the logs.
                tracing::error!(reason = %reason, "Store query failed");
                ApiError::database_error("Database operation failed")
            }
        }
    }
}

impl From<CallTrailError> for ApiError {
    fn from(err: CallTrailError) -> Self {
        match err {
            CallTrailError::Storage(e) => e.into(),
            CallTrailError::Decode(e) => ApiError::invalid_input(e.to_string()),
            CallTrailError::Provider(ProviderError::Timeout { .. })
            | CallTrailError::Blob(BlobError::Timeout { .. }) => ApiError::timeout("upstream"),
            CallTrailError::Blob(BlobError::NotConfigured) => {
                ApiError::service_unavailable("Blob storage not configured")
            }
            other => {
                tracing::error!(error = %other, "Upstream failure");
                ApiError::upstream_error(other.to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
