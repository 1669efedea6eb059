//! Error types for calltrail operations

use std::time::Duration;
use thiserror::Error;

/// Call record store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Store operation '{operation}' timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("Query failed: {reason}")]
    Query { reason: String },
}

impl StorageError {
    pub fn call_not_found(key: impl ToString) -> Self {
        StorageError::NotFound {
            entity: "Call",
            key: key.to_string(),
        }
    }

    pub fn call_already_exists(external_call_id: impl ToString) -> Self {
        StorageError::AlreadyExists {
            entity: "Call",
            key: external_call_id.to_string(),
        }
    }

    /// Whether the error is the unique-key conflict raised by a racing create.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::AlreadyExists { .. })
    }
}

/// Remote recording provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Recording provider credentials not configured")]
    NotConfigured,

    #[error("Request to recording provider failed: {reason}")]
    Request { reason: String },

    #[error("Recording provider answered with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Recording download timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
}

/// Blob storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("Blob storage not configured")]
    NotConfigured,

    #[error("Invalid blob key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Blob I/O failed for '{key}': {reason}")]
    Io { key: String, reason: String },

    #[error("Blob operation timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
}

/// Broadcast delivery errors. Never propagated past the notifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Notifier disabled: {reason}")]
    Disabled { reason: String },

    #[error("Broadcast request failed: {reason}")]
    Request { reason: String },

    #[error("Broadcast endpoint answered with status {status}")]
    Status { status: u16 },

    #[error("Broadcast timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
}

/// Provider payload decoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Required field missing: {field}")]
    MissingField { field: &'static str },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Master error type for all calltrail errors.
#[derive(Debug, Clone, Error)]
pub enum CallTrailError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("Notify error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Result type alias for calltrail operations.
pub type CallTrailResult<T> = Result<T, CallTrailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::call_not_found("abc-1");
        let msg = err.to_string();
        assert!(msg.contains("Call not found"));
        assert!(msg.contains("abc-1"));
    }

    #[test]
    fn test_conflict_detection() {
        assert!(StorageError::call_already_exists("x").is_conflict());
        assert!(!StorageError::call_not_found("x").is_conflict());
    }

    #[test]
    fn test_master_error_wraps_sources() {
        let err: CallTrailError = ProviderError::NotConfigured.into();
        assert!(err.to_string().starts_with("Provider error"));

        let err: CallTrailError = DecodeError::MissingField { field: "call_id" }.into();
        assert!(err.to_string().contains("call_id"));
    }
}
