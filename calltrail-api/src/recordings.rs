//! Download links for call recordings.
//!
//! Archived recordings get a signed blob URL. A reference saved from a
//! link-only webhook is the provider's own URL and is handed out as is.

use crate::constants::{MSG_RECORDING_FILE_NOT_FOUND, MSG_RECORDING_NOT_FOUND};
use crate::error::{ApiError, ApiResult};
use calltrail_core::{BlobError, CallId, StorageError};
use calltrail_storage::{BlobStore, CallStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A download URL for one call's recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RecordingUrl {
    pub call_id: CallId,
    pub url: String,
    /// Seconds until a signed URL expires; absent for provider links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

#[derive(Clone)]
pub struct RecordingLinks {
    store: Arc<dyn CallStore>,
    blobs: Option<Arc<dyn BlobStore>>,
    ttl: Duration,
    timeout: Duration,
}

impl RecordingLinks {
    pub fn new(
        store: Arc<dyn CallStore>,
        blobs: Option<Arc<dyn BlobStore>>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            blobs,
            ttl,
            timeout,
        }
    }

    pub fn archival_enabled(&self) -> bool {
        self.blobs.is_some()
    }

    /// URL for the recording of call `call_id`.
    pub async fn download_url(&self, call_id: CallId) -> ApiResult<RecordingUrl> {
        let call = tokio::time::timeout(self.timeout, self.store.find_by_id(call_id))
            .await
            .map_err(|_| StorageError::Timeout {
                operation: "find_by_id",
                elapsed: self.timeout,
            })??
            .ok_or_else(|| ApiError::call_not_found(call_id))?;

        let key = call
            .recording_ref
            .ok_or_else(|| ApiError::recording_not_found(MSG_RECORDING_NOT_FOUND))?;

        if is_provider_url(&key) {
            return Ok(RecordingUrl {
                call_id,
                url: key,
                expires_in: None,
            });
        }

        let blobs = self
            .blobs
            .as_ref()
            .ok_or_else(|| ApiError::service_unavailable("Recording storage not configured"))?;

        let exists = tokio::time::timeout(self.timeout, blobs.exists(&key))
            .await
            .map_err(|_| ApiError::timeout("recording lookup"))?
            .map_err(blob_error)?;
        if !exists {
            tracing::warn!(call_id, key = %key, "Recording reference points at a missing file");
            return Err(ApiError::recording_not_found(MSG_RECORDING_FILE_NOT_FOUND));
        }

        let url = blobs.signed_get_url(&key, self.ttl).await.map_err(blob_error)?;
        Ok(RecordingUrl {
            call_id,
            url,
            expires_in: Some(self.ttl.as_secs()),
        })
    }
}

fn is_provider_url(reference: &str) -> bool {
    let lower = reference.trim_start().to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

fn blob_error(e: BlobError) -> ApiError {
    match e {
        BlobError::NotConfigured => ApiError::service_unavailable(e.to_string()),
        BlobError::InvalidKey { .. } => ApiError::recording_not_found(MSG_RECORDING_FILE_NOT_FOUND),
        BlobError::Timeout { .. } => ApiError::timeout("recording storage"),
        BlobError::Io { .. } => ApiError::internal_error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use calltrail_core::{CallStatus, NewCallRecord};
    use calltrail_storage::{InMemoryBlobStore, InMemoryCallStore};

    async fn seeded(recording_ref: Option<&str>) -> (InMemoryCallStore, CallId) {
        let store = InMemoryCallStore::new();
        let record = store
            .create(NewCallRecord {
                external_call_id: "ext-1".to_string(),
                phone_client: None,
                phone_line: None,
                direction: None,
                created_at: None,
                answered_at: None,
                ended_at: None,
                status: CallStatus::Answered,
                duration_seconds: 12,
                operator_id: None,
                city: None,
                source: None,
            })
            .await
            .unwrap();
        if let Some(r) = recording_ref {
            store
                .update(
                    "ext-1",
                    calltrail_core::CallRecordPatch {
                        recording_ref: Some(r.to_string()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        (store, record.id)
    }

    fn links(store: InMemoryCallStore, blobs: Option<InMemoryBlobStore>) -> RecordingLinks {
        RecordingLinks::new(
            Arc::new(store),
            blobs.map(|b| Arc::new(b) as Arc<dyn BlobStore>),
            Duration::from_secs(3600),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_unknown_call() {
        let (store, _) = seeded(None).await;
        let err = links(store, Some(InMemoryBlobStore::new()))
            .download_url(999)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CallNotFound);
    }

    #[tokio::test]
    async fn test_call_without_recording() {
        let (store, id) = seeded(None).await;
        let err = links(store, Some(InMemoryBlobStore::new()))
            .download_url(id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RecordingNotFound);
        assert_eq!(err.message, MSG_RECORDING_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_blob_file() {
        let (store, id) = seeded(Some("callcentre/recordings/ext-1_1.mp3")).await;
        let err = links(store, Some(InMemoryBlobStore::new()))
            .download_url(id)
            .await
            .unwrap_err();
        assert_eq!(err.message, MSG_RECORDING_FILE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_storage_not_configured() {
        let (store, id) = seeded(Some("callcentre/recordings/ext-1_1.mp3")).await;
        let err = links(store, None).download_url(id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ServiceUnavailable);
    }

    #[tokio::test]
    async fn test_signed_url_issued() {
        let key = "callcentre/recordings/ext-1_1.mp3";
        let (store, id) = seeded(Some(key)).await;
        let blobs = InMemoryBlobStore::new();
        blobs.put(key, vec![1, 2, 3], "audio/mpeg").await.unwrap();

        let url = links(store, Some(blobs)).download_url(id).await.unwrap();
        assert_eq!(url.call_id, id);
        assert_eq!(url.expires_in, Some(3600));
        assert!(url.url.contains(key));
    }

    #[tokio::test]
    async fn test_provider_link_returned_as_is() {
        let link = "https://rec.example/calls/ext-1.mp3";
        let (store, id) = seeded(Some(link)).await;

        let url = links(store.clone(), Some(InMemoryBlobStore::new()))
            .download_url(id)
            .await
            .unwrap();
        assert_eq!(url.url, link);
        assert_eq!(url.expires_in, None);

        // No blob store needed for a provider link.
        let url = links(store, None).download_url(id).await.unwrap();
        assert_eq!(url.url, link);
    }

    #[test]
    fn test_provider_url_detection() {
        assert!(is_provider_url("https://rec.example/1.mp3"));
        assert!(is_provider_url("HTTP://rec.example/1.mp3"));
        assert!(!is_provider_url("callcentre/recordings/ext-1_1.mp3"));
    }
}
