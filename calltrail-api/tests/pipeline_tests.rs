//! Recording pipeline under virtual time.
//!
//! Every test runs with the tokio clock paused, so the settle delay and the
//! download timeout elapse instantly while still being observable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calltrail_api::config::RecordingConfig;
use calltrail_api::events::CallEventKind;
use calltrail_api::notifier::{Broadcaster, Notifier};
use calltrail_api::pipeline::{PipelineStage, RecordingPipeline};
use calltrail_api::reconciler::CallLocks;
use calltrail_core::{BlobError, CallStatus};
use calltrail_storage::{BlobResult, BlobStore, CallStore, InMemoryBlobStore, InMemoryCallStore};
use calltrail_test_utils::fixtures;
use tokio::time::Instant;

#[path = "support/fakes.rs"]
mod test_fakes;

use test_fakes::{CollectingNotifier, EventSink, ScriptedRecordingProvider, FAKE_AUDIO};

const SETTLE: Duration = Duration::from_secs(3);

fn recording_config() -> RecordingConfig {
    RecordingConfig {
        settle_delay: SETTLE,
        download_timeout: Duration::from_secs(60),
        upload_timeout: Duration::from_secs(30),
        url_ttl: Duration::from_secs(3600),
    }
}

struct Setup {
    pipeline: RecordingPipeline,
    store: InMemoryCallStore,
    provider: Arc<ScriptedRecordingProvider>,
    locks: CallLocks,
    events: EventSink,
}

async fn setup(
    provider: ScriptedRecordingProvider,
    blobs: Option<Arc<dyn BlobStore>>,
    calls: &[&str],
) -> Setup {
    let store = fixtures::seeded_store();
    for id in calls {
        store
            .create(fixtures::new_call(id, CallStatus::Answered))
            .await
            .unwrap();
    }
    let provider = Arc::new(provider);
    let (notifier, events) = CollectingNotifier::new();
    let notifier: Arc<dyn Notifier> = notifier;
    let broadcaster = Broadcaster::new(vec![notifier], vec!["operators".into()], Duration::from_secs(1));
    let locks = CallLocks::new();
    let pipeline = RecordingPipeline::new(
        Arc::new(store.clone()),
        provider.clone(),
        blobs,
        broadcaster,
        locks.clone(),
        recording_config(),
        Duration::from_secs(5),
    );
    Setup {
        pipeline,
        store,
        provider,
        locks,
        events,
    }
}

/// Blob store that refuses every write.
struct ReadOnlyBlobStore;

#[async_trait]
impl BlobStore for ReadOnlyBlobStore {
    async fn put(&self, key: &str, _bytes: Vec<u8>, _content_type: &str) -> BlobResult<String> {
        Err(BlobError::Io {
            key: key.to_string(),
            reason: "read-only file system".to_string(),
        })
    }

    async fn exists(&self, _key: &str) -> BlobResult<bool> {
        Ok(false)
    }

    async fn signed_get_url(&self, _key: &str, _ttl: Duration) -> BlobResult<String> {
        Err(BlobError::NotConfigured)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_incomplete_job_does_nothing() {
    let s = setup(ScriptedRecordingProvider::new(), None, &["MToxMDE="]).await;
    let started = Instant::now();

    let report = s
        .pipeline
        .process(fixtures::recording_job("MToxMDE=", "rec-1", "in_progress"))
        .await;

    assert!(report.success);
    assert_eq!(s.provider.calls(), 0);
    assert!(started.elapsed() < SETTLE);
}

#[tokio::test(start_paused = true)]
async fn test_missing_recording_id_is_rejected() {
    let s = setup(ScriptedRecordingProvider::new(), None, &["MToxMDE="]).await;

    let report = s
        .pipeline
        .process(fixtures::recording_job("MToxMDE=", "  ", "completed"))
        .await;

    assert!(!report.success);
    assert_eq!(report.failed_stage, Some(PipelineStage::Validate));
    assert_eq!(s.provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_call_skips_download() {
    let s = setup(ScriptedRecordingProvider::new(), None, &[]).await;

    let report = s
        .pipeline
        .process(fixtures::recording_job("ghost", "rec-1", "completed"))
        .await;

    assert!(!report.success);
    assert_eq!(report.failed_stage, Some(PipelineStage::Locate));
    assert_eq!(s.provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_archives_after_settle_delay() {
    let blobs = InMemoryBlobStore::new();
    let mut s = setup(
        ScriptedRecordingProvider::new(),
        Some(Arc::new(blobs.clone())),
        &["MToxMDI="],
    )
    .await;
    let started = Instant::now();

    let report = s
        .pipeline
        .process(fixtures::recording_job("MToxMDI=", "rec-2", "Completed"))
        .await;

    assert!(report.success, "{}", report.message);
    assert!(started.elapsed() >= SETTLE);
    let key = report.recording_ref.unwrap();
    let stored = blobs.get(&key).await.unwrap();
    assert_eq!(stored.bytes, FAKE_AUDIO);
    assert_eq!(stored.content_type, "audio/mpeg");

    let call = s.store.find_by_external_id("MToxMDI=").await.unwrap().unwrap();
    assert_eq!(call.recording_ref.as_deref(), Some(key.as_str()));
    assert_eq!(report.call_id, Some(call.id));

    let event = s.events.next().await.unwrap();
    assert_eq!(event.kind, CallEventKind::CallUpdated);
    assert_eq!(event.call.recording_ref.as_deref(), Some(key.as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_jobs_settle_independently() {
    let blobs = InMemoryBlobStore::new();
    let s = setup(
        ScriptedRecordingProvider::new(),
        Some(Arc::new(blobs.clone())),
        &["MToxMDM=", "MToxMDQ="],
    )
    .await;
    let started = Instant::now();

    let (a, b) = tokio::join!(
        s.pipeline.process(fixtures::recording_job("MToxMDM=", "rec-3", "completed")),
        s.pipeline.process(fixtures::recording_job("MToxMDQ=", "rec-4", "completed")),
    );

    assert!(a.success && b.success);
    assert!(started.elapsed() < SETTLE * 2);
    assert_eq!(blobs.len().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_download_timeout_is_reported() {
    let s = setup(
        ScriptedRecordingProvider::with_delay(Duration::from_secs(120)),
        Some(Arc::new(InMemoryBlobStore::new())),
        &["MToxMDU="],
    )
    .await;

    let report = s
        .pipeline
        .process(fixtures::recording_job("MToxMDU=", "rec-5", "completed"))
        .await;

    assert!(!report.success);
    assert_eq!(report.failed_stage, Some(PipelineStage::Download));
    assert!(report.message.contains("timed out"));
    let call = s.store.find_by_external_id("MToxMDU=").await.unwrap().unwrap();
    assert!(call.recording_ref.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_upload_failure_leaves_record_untouched() {
    let mut s = setup(
        ScriptedRecordingProvider::new(),
        Some(Arc::new(ReadOnlyBlobStore)),
        &["MToxMDY="],
    )
    .await;

    let report = s
        .pipeline
        .process(fixtures::recording_job("MToxMDY=", "rec-6", "completed"))
        .await;

    assert!(!report.success);
    assert_eq!(report.failed_stage, Some(PipelineStage::Upload));
    let call = s.store.find_by_external_id("MToxMDY=").await.unwrap().unwrap();
    assert!(call.recording_ref.is_none());
    assert!(s.events.is_quiet(Duration::from_millis(50)).await);
}

#[tokio::test(start_paused = true)]
async fn test_without_blob_storage_only_downloads() {
    let mut s = setup(ScriptedRecordingProvider::new(), None, &["MToxMDc="]).await;

    let report = s
        .pipeline
        .process(fixtures::recording_job("MToxMDc=", "rec-7", "completed"))
        .await;

    assert!(report.success);
    assert_eq!(s.provider.calls(), 1);
    assert!(report.recording_ref.is_none());
    let call = s.store.find_by_external_id("MToxMDc=").await.unwrap().unwrap();
    assert!(call.recording_ref.is_none());
    assert!(s.events.is_quiet(Duration::from_millis(50)).await);
}

#[tokio::test(start_paused = true)]
async fn test_persist_waits_for_call_lock() {
    let blobs = InMemoryBlobStore::new();
    let s = setup(
        ScriptedRecordingProvider::new(),
        Some(Arc::new(blobs.clone())),
        &["MToxMDg="],
    )
    .await;

    let guard = s.locks.lock("MToxMDg=").await;
    let job = {
        let pipeline = s.pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .process(fixtures::recording_job("MToxMDg=", "rec-8", "completed"))
                .await
        })
    };

    tokio::time::sleep(SETTLE * 2).await;
    assert!(!job.is_finished());
    assert_eq!(s.provider.calls(), 1);
    let call = s.store.find_by_external_id("MToxMDg=").await.unwrap().unwrap();
    assert!(call.recording_ref.is_none());

    drop(guard);
    let report = job.await.unwrap();
    assert!(report.success, "{}", report.message);
    let call = s.store.find_by_external_id("MToxMDg=").await.unwrap().unwrap();
    assert_eq!(call.recording_ref, report.recording_ref);
    assert_eq!(s.locks.active(), 0);
}
