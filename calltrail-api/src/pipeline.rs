//! Recording Retrieval Pipeline
//!
//! Reacts to a "recording ready" signal:
//!
//! ```text
//! Received ─▶ completed? ─▶ Located ─▶ (settle) ─▶ Downloaded ─▶ Uploaded ─▶ Persisted ─▶ Notified
//!     │            │            │                      │             │            │
//!     └─ no-op ◀───┘            └──────── every failure becomes {success:false, message}
//! ```
//!
//! Each job runs in the caller's task. The settle delay is a timer
//! suspension, so concurrent jobs for other calls keep moving. The persist
//! stage holds the call's [`CallLocks`] entry, shared with the reconciler,
//! so it never interleaves with a lifecycle event for the same call.

use crate::config::RecordingConfig;
use crate::constants::{
    MSG_RECORDING_ARCHIVED, MSG_RECORDING_DOWNLOADED, MSG_RECORDING_NOT_READY,
    RECORDING_CONTENT_TYPE, RECORDING_FILE_EXTENSION,
};
use crate::events::CallEvent;
use crate::notifier::Broadcaster;
use crate::provider::RecordingProvider;
use crate::reconciler::CallLocks;
use crate::telemetry::metrics;
use calltrail_core::{
    BlobError, CallId, CallRecord, CallRecordPatch, ProviderError, RecordingJob, StorageError,
};
use calltrail_storage::{recording_key, BlobStore, CallStore};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Pipeline stage, for logs and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Validate,
    Locate,
    Download,
    Upload,
    Persist,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineStage::Validate => "validate",
            PipelineStage::Locate => "locate",
            PipelineStage::Download => "download",
            PipelineStage::Upload => "upload",
            PipelineStage::Persist => "persist",
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Call not found for entry {entry_id}")]
    CallNotFound { entry_id: String },

    #[error("Store failed during {stage}: {source}")]
    Store {
        stage: PipelineStage,
        source: StorageError,
    },

    #[error("Recording download failed: {0}")]
    Download(#[from] ProviderError),

    #[error("Recording upload failed: {0}")]
    Upload(#[from] BlobError),
}

impl PipelineError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::MissingField { .. } => PipelineStage::Validate,
            PipelineError::CallNotFound { .. } => PipelineStage::Locate,
            PipelineError::Store { stage, .. } => *stage,
            PipelineError::Download(_) => PipelineStage::Download,
            PipelineError::Upload(_) => PipelineStage::Upload,
        }
    }

    fn outcome_label(&self) -> &'static str {
        match self {
            PipelineError::MissingField { .. } => "invalid",
            PipelineError::CallNotFound { .. } => "not_found",
            _ => "failed",
        }
    }
}

/// Terminal success states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The job is not completed yet; the provider will signal again
    NotReady,
    /// Audio stored and the call's recording reference updated
    Archived { record: CallRecord, key: String },
    /// Audio fetched but no blob store is configured
    Downloaded { record: CallRecord, bytes: usize },
}

impl PipelineOutcome {
    fn label(&self) -> &'static str {
        match self {
            PipelineOutcome::NotReady => "not_ready",
            PipelineOutcome::Archived { .. } => "archived",
            PipelineOutcome::Downloaded { .. } => "downloaded",
        }
    }
}

/// Result value handed back to the webhook boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub success: bool,
    pub message: String,
    pub call_id: Option<CallId>,
    pub recording_ref: Option<String>,
    pub failed_stage: Option<PipelineStage>,
}

impl From<Result<PipelineOutcome, PipelineError>> for PipelineReport {
    fn from(result: Result<PipelineOutcome, PipelineError>) -> Self {
        match result {
            Ok(PipelineOutcome::NotReady) => Self {
                success: true,
                message: MSG_RECORDING_NOT_READY.to_string(),
                call_id: None,
                recording_ref: None,
                failed_stage: None,
            },
            Ok(PipelineOutcome::Archived { record, key }) => Self {
                success: true,
                message: MSG_RECORDING_ARCHIVED.to_string(),
                call_id: Some(record.id),
                recording_ref: Some(key),
                failed_stage: None,
            },
            Ok(PipelineOutcome::Downloaded { record, .. }) => Self {
                success: true,
                message: MSG_RECORDING_DOWNLOADED.to_string(),
                call_id: Some(record.id),
                recording_ref: None,
                failed_stage: None,
            },
            Err(e) => Self {
                success: false,
                message: e.to_string(),
                call_id: None,
                recording_ref: None,
                failed_stage: Some(e.stage()),
            },
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

#[derive(Clone)]
pub struct RecordingPipeline {
    store: Arc<dyn CallStore>,
    provider: Arc<dyn RecordingProvider>,
    blobs: Option<Arc<dyn BlobStore>>,
    broadcaster: Broadcaster,
    locks: CallLocks,
    config: RecordingConfig,
    store_timeout: Duration,
}

impl RecordingPipeline {
    pub fn new(
        store: Arc<dyn CallStore>,
        provider: Arc<dyn RecordingProvider>,
        blobs: Option<Arc<dyn BlobStore>>,
        broadcaster: Broadcaster,
        locks: CallLocks,
        config: RecordingConfig,
        store_timeout: Duration,
    ) -> Self {
        if blobs.is_none() {
            tracing::warn!("Blob storage not configured - recordings will be downloaded but not archived");
        }
        Self {
            store,
            provider,
            blobs,
            broadcaster,
            locks,
            config,
            store_timeout,
        }
    }

    /// Run one job to a terminal state. Never fails.
    pub async fn process(&self, job: RecordingJob) -> PipelineReport {
        let result = self.run(&job).await;

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    entry_id = %job.entry_id,
                    recording_id = %job.recording_id,
                    outcome = outcome.label(),
                    "Recording job finished"
                );
            }
            Err(e @ (PipelineError::CallNotFound { .. } | PipelineError::MissingField { .. })) => {
                tracing::info!(
                    entry_id = %job.entry_id,
                    recording_id = %job.recording_id,
                    stage = %e.stage(),
                    error = %e,
                    "Recording job rejected"
                );
            }
            Err(e) => {
                tracing::error!(
                    entry_id = %job.entry_id,
                    recording_id = %job.recording_id,
                    stage = %e.stage(),
                    error = %e,
                    "Recording job failed"
                );
            }
        }
        if let Some(m) = metrics() {
            m.record_recording_job(match &result {
                Ok(outcome) => outcome.label(),
                Err(e) => e.outcome_label(),
            });
        }

        result.into()
    }

    async fn run(&self, job: &RecordingJob) -> Result<PipelineOutcome, PipelineError> {
        if !job.is_completed() {
            tracing::info!(
                entry_id = %job.entry_id,
                job_state = %job.job_state,
                "Recording not completed yet, nothing to do"
            );
            return Ok(PipelineOutcome::NotReady);
        }

        let entry_id = job.entry_id.trim();
        let recording_id = job.recording_id.trim();
        if entry_id.is_empty() {
            return Err(PipelineError::MissingField { field: "entry_id" });
        }
        if recording_id.is_empty() {
            return Err(PipelineError::MissingField {
                field: "recording_id",
            });
        }

        let record = self.locate(entry_id).await?;

        tokio::time::sleep(self.config.settle_delay).await;

        let audio = self.download(recording_id).await?;

        let Some(blobs) = self.blobs.as_ref() else {
            return Ok(PipelineOutcome::Downloaded {
                record,
                bytes: audio.len(),
            });
        };

        let key = recording_key(&recording_filename(&record.external_call_id));
        let key = tokio::time::timeout(
            self.config.upload_timeout,
            blobs.put(&key, audio, RECORDING_CONTENT_TYPE),
        )
        .await
        .map_err(|_| BlobError::Timeout {
            elapsed: self.config.upload_timeout,
        })??;

        let patch = CallRecordPatch {
            recording_ref: Some(key.clone()),
            ..Default::default()
        };
        let _guard = self.locks.lock(&record.external_call_id).await;
        let record = tokio::time::timeout(
            self.store_timeout,
            self.store.update(&record.external_call_id, patch),
        )
        .await
        .map_err(|_| StorageError::Timeout {
            operation: "update",
            elapsed: self.store_timeout,
        })
        .and_then(|r| r)
        .map_err(|source| PipelineError::Store {
            stage: PipelineStage::Persist,
            source,
        })?;

        let _ = self.broadcaster.dispatch(CallEvent::call_updated(&record));
        Ok(PipelineOutcome::Archived { record, key })
    }

    async fn locate(&self, entry_id: &str) -> Result<CallRecord, PipelineError> {
        let found = tokio::time::timeout(
            self.store_timeout,
            self.store.find_matching_external_id(entry_id),
        )
        .await
        .map_err(|_| StorageError::Timeout {
            operation: "find_matching_external_id",
            elapsed: self.store_timeout,
        })
        .and_then(|r| r)
        .map_err(|source| PipelineError::Store {
            stage: PipelineStage::Locate,
            source,
        })?;

        found.ok_or_else(|| PipelineError::CallNotFound {
            entry_id: entry_id.to_string(),
        })
    }

    async fn download(&self, recording_id: &str) -> Result<Vec<u8>, ProviderError> {
        let started = Instant::now();
        let result = tokio::time::timeout(
            self.config.download_timeout,
            self.provider.fetch_recording(recording_id),
        )
        .await
        .map_err(|_| ProviderError::Timeout {
            elapsed: self.config.download_timeout,
        })
        .and_then(|r| r);

        if let Some(m) = metrics() {
            m.observe_download(started.elapsed().as_secs_f64());
        }
        result
    }
}

/// `{external_id}_{millis}.mp3`, with characters unsafe in a key replaced.
fn recording_filename(external_call_id: &str) -> String {
    let safe: String = external_call_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = safe.trim_matches('.');
    format!(
        "{}_{}.{}",
        if safe.is_empty() { "call" } else { safe },
        Utc::now().timestamp_millis(),
        RECORDING_FILE_EXTENSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_filename_is_key_safe() {
        let name = recording_filename("abc/../12:34");
        assert!(name.starts_with("abc_.._12_34_"));
        assert!(name.ends_with(".mp3"));
        assert!(!name.contains('/'));
    }

    #[test]
    fn test_recording_filename_never_empty() {
        assert!(recording_filename("...").starts_with("call_"));
    }

    #[test]
    fn test_report_from_failure_carries_stage() {
        let report: PipelineReport = Err(PipelineError::CallNotFound {
            entry_id: "e-1".to_string(),
        })
        .into();
        assert!(!report.success);
        assert_eq!(report.failed_stage, Some(PipelineStage::Locate));
        assert!(report.message.contains("e-1"));
    }

    #[test]
    fn test_report_not_ready_is_success() {
        let report: PipelineReport = Ok(PipelineOutcome::NotReady).into();
        assert!(report.success);
        assert_eq!(report.message, MSG_RECORDING_NOT_READY);
    }
}
