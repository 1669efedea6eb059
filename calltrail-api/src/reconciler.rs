//! Call Lifecycle Reconciler
//!
//! Folds a stream of out-of-order, partial and duplicated lifecycle events
//! into one call record per external call id.
//!
//! ```text
//! Unseen ──Appeared──▶ (no record yet)
//!   │                      │
//!   ├──Connected──▶ Answered ──Disconnected──▶ Ended
//!   └──Disconnected / Legacy ─────────────────▶ Ended
//! ```
//!
//! Work for one external id is serialized through [`CallLocks`]; work for
//! different ids runs concurrently. Across processes, the store's atomic
//! create decides the winner and the loser retries as an update.
//!
//! Only store failures surface as errors. A missing operator, missing
//! timestamps or an unknown phase degrade to a partial record.

use crate::directory::OperatorDirectory;
use crate::events::{CallEvent, CallEventKind};
use crate::notifier::Broadcaster;
use crate::telemetry::metrics;
use calltrail_core::{
    derive_outcome, CallDetails, CallOutcome, CallRecord, CallRecordPatch, CallStatus,
    LifecycleEvent, NewCallRecord, OperatorId, ProviderFields, RecordingLink, StorageError,
    Timestamp,
};
use calltrail_storage::{CallStore, StoreResult};
use chrono::Utc;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

// ============================================================================
// PER-CALL LOCKS
// ============================================================================

/// Per-external-id mutexes.
///
/// Entries are removed once the last holder releases them, so the map only
/// contains calls with work in flight.
#[derive(Clone, Default)]
pub struct CallLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl CallLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `external_call_id`.
    pub async fn lock(&self, external_call_id: &str) -> CallLockGuard {
        let mutex = self
            .inner
            .entry(external_call_id.to_string())
            .or_default()
            .clone();
        let guard = mutex.lock_owned().await;
        CallLockGuard {
            locks: self.clone(),
            key: external_call_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of ids with a live lock entry.
    pub fn active(&self) -> usize {
        self.inner.len()
    }
}

pub struct CallLockGuard {
    locks: CallLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for CallLockGuard {
    fn drop(&mut self) {
        // The guard holds an Arc to the mutex; release it before counting.
        drop(self.guard.take());
        self.locks
            .inner
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// The event refers to a call this service has never seen.
    #[error("Call not found: {external_call_id}")]
    CallNotFound { external_call_id: String },

    #[error(transparent)]
    Store(#[from] StorageError),
}

impl ReconcileError {
    /// Soft failures are expected and reported without an error log.
    pub fn is_soft(&self) -> bool {
        matches!(self, ReconcileError::CallNotFound { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            ReconcileError::CallNotFound { .. } => "not_found",
            ReconcileError::Store(StorageError::Timeout { .. }) => "timeout",
            ReconcileError::Store(_) => "error",
        }
    }
}

/// Why an event was acknowledged without touching the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Appeared for a call with no record; the record is created by a
    /// later phase.
    NotYetRecorded,
    /// Connected without a callee line: the call sits in the IVR.
    IvrRouted,
}

impl SkipReason {
    pub fn message(&self) -> &'static str {
        match self {
            SkipReason::NotYetRecorded => "Call not recorded yet",
            SkipReason::IvrRouted => "IVR call skipped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Created,
    Updated,
    Skipped(SkipReason),
}

impl ReconcileAction {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileAction::Created => "created",
            ReconcileAction::Updated => "updated",
            ReconcileAction::Skipped(_) => "skipped",
        }
    }
}

/// What handling one event did.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub action: ReconcileAction,
    /// The record after the event, absent when skipped
    pub record: Option<CallRecord>,
    /// Broadcasts dispatched, in order
    pub broadcasts: Vec<CallEventKind>,
}

impl Reconciliation {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            action: ReconcileAction::Skipped(reason),
            record: None,
            broadcasts: Vec::new(),
        }
    }

    fn stored(action: ReconcileAction, record: CallRecord) -> Self {
        Self {
            action,
            record: Some(record),
            broadcasts: Vec::new(),
        }
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn CallStore>,
    directory: OperatorDirectory,
    broadcaster: Broadcaster,
    locks: CallLocks,
    store_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn CallStore>,
        directory: OperatorDirectory,
        broadcaster: Broadcaster,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            broadcaster,
            locks: CallLocks::new(),
            store_timeout,
        }
    }

    pub fn locks(&self) -> &CallLocks {
        &self.locks
    }

    /// Apply one lifecycle event.
    pub async fn handle(&self, event: LifecycleEvent) -> Result<Reconciliation, ReconcileError> {
        let label = event.label();
        let external_call_id = event.external_call_id().to_string();
        let _guard = self.locks.lock(&external_call_id).await;

        let result = match event {
            LifecycleEvent::Appeared(details) => self.on_appeared(details).await,
            LifecycleEvent::Connected(details) => self.on_connected(details).await,
            LifecycleEvent::Disconnected(details) | LifecycleEvent::Legacy(details) => {
                self.on_finished(details).await
            }
            LifecycleEvent::RecordingLinkOnly(link) => self.on_recording_link(link).await,
        };

        match &result {
            Ok(done) => {
                tracing::debug!(
                    external_call_id = %external_call_id,
                    phase = label,
                    action = done.action.label(),
                    "Lifecycle event reconciled"
                );
            }
            Err(e) if e.is_soft() => {
                tracing::info!(external_call_id = %external_call_id, phase = label, error = %e, "Lifecycle event ignored");
            }
            Err(e) => {
                tracing::error!(external_call_id = %external_call_id, phase = label, error = %e, "Lifecycle event failed");
            }
        }
        if let Some(m) = metrics() {
            let outcome = match &result {
                Ok(done) => done.action.label(),
                Err(e) => e.label(),
            };
            m.record_lifecycle_event(label, outcome);
        }
        result
    }

    // ------------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------------

    async fn on_appeared(&self, details: CallDetails) -> Result<Reconciliation, ReconcileError> {
        let Some(existing) = self.find(&details.external_call_id).await? else {
            tracing::info!(
                external_call_id = %details.external_call_id,
                "Call appeared before any record exists, waiting for a later phase"
            );
            return Ok(Reconciliation::skipped(SkipReason::NotYetRecorded));
        };

        let patch = fill_absent(&existing, &details);
        if patch.is_empty() {
            return Ok(Reconciliation::stored(ReconcileAction::Updated, existing));
        }
        let record = self.update(&details.external_call_id, patch).await?;
        Ok(Reconciliation::stored(ReconcileAction::Updated, record))
    }

    async fn on_connected(&self, details: CallDetails) -> Result<Reconciliation, ReconcileError> {
        let Some(callee) = details.callee.as_deref() else {
            tracing::info!(external_call_id = %details.external_call_id, "Connected without a callee line, IVR call skipped");
            return Ok(Reconciliation::skipped(SkipReason::IvrRouted));
        };

        let operator = self.directory.resolve_by_sip(callee).await;
        if operator.is_none() {
            tracing::warn!(
                external_call_id = %details.external_call_id,
                callee,
                "No operator resolved for connected call"
            );
        }
        let operator_id = operator.map(|o| o.id);

        if let Some(existing) = self.find(&details.external_call_id).await? {
            let patch = connected_patch(&existing, &details, operator_id);
            let record = self.update(&details.external_call_id, patch).await?;
            return Ok(Reconciliation::stored(ReconcileAction::Updated, record));
        }

        let new = NewCallRecord {
            external_call_id: details.external_call_id.clone(),
            phone_client: details.caller.clone(),
            phone_line: details.callee.clone(),
            direction: details.direction,
            created_at: details.fields.create_time,
            answered_at: details.fields.answer_time.or_else(|| Some(Utc::now())),
            ended_at: None,
            status: CallStatus::Answered,
            duration_seconds: 0,
            operator_id,
            city: details.city.clone(),
            source: details.source.clone(),
        };
        let mut done = self
            .create_or_update(new, |existing| {
                connected_patch(existing, &details, operator_id)
            })
            .await?;
        if done.action == ReconcileAction::Created {
            self.announce(&mut done, CallEventKind::CallNew);
        }
        Ok(done)
    }

    /// Disconnected and legacy single-shot events.
    async fn on_finished(&self, details: CallDetails) -> Result<Reconciliation, ReconcileError> {
        let outcome = derive_outcome(&details.fields);
        let existing = self.find(&details.external_call_id).await?;

        let operator_id = match existing.as_ref().and_then(|r| r.operator_id) {
            Some(id) => Some(id),
            None => {
                let resolved = self.directory.resolve(details.callee.as_deref()).await;
                if resolved.is_none() {
                    tracing::warn!(
                        external_call_id = %details.external_call_id,
                        "No operator resolved for finished call, storing without one"
                    );
                }
                resolved.map(|o| o.id)
            }
        };

        let ended_at = details
            .fields
            .end_time
            .or_else(|| existing.as_ref().and_then(|r| r.ended_at))
            .unwrap_or_else(Utc::now);

        let mut done = match existing {
            Some(existing) => {
                let patch = finished_patch(&existing, &details, outcome, ended_at, operator_id);
                let record = self.update(&details.external_call_id, patch).await?;
                Reconciliation::stored(ReconcileAction::Updated, record)
            }
            None => {
                let new = NewCallRecord {
                    external_call_id: details.external_call_id.clone(),
                    phone_client: details.caller.clone(),
                    phone_line: details.callee.clone(),
                    direction: details.direction,
                    created_at: details.fields.create_time,
                    answered_at: details.fields.answer_time,
                    ended_at: Some(ended_at),
                    status: outcome.status,
                    duration_seconds: outcome.duration_seconds,
                    operator_id,
                    city: details.city.clone(),
                    source: details.source.clone(),
                };
                self.create_or_update(new, |existing| {
                    finished_patch(existing, &details, outcome, ended_at, operator_id)
                })
                .await?
            }
        };

        if done.action == ReconcileAction::Created {
            self.announce(&mut done, CallEventKind::CallNew);
        }
        self.announce(&mut done, CallEventKind::CallEnded);
        Ok(done)
    }

    async fn on_recording_link(&self, link: RecordingLink) -> Result<Reconciliation, ReconcileError> {
        if self.find(&link.external_call_id).await?.is_none() {
            return Err(ReconcileError::CallNotFound {
                external_call_id: link.external_call_id,
            });
        }
        let patch = CallRecordPatch {
            recording_ref: Some(link.recording_link),
            ..Default::default()
        };
        let record = self.update(&link.external_call_id, patch).await?;
        let mut done = Reconciliation::stored(ReconcileAction::Updated, record);
        self.announce(&mut done, CallEventKind::CallUpdated);
        Ok(done)
    }

    // ------------------------------------------------------------------------
    // Store access
    // ------------------------------------------------------------------------

    /// Create, or merge into the record a concurrent writer created first.
    ///
    /// The loser re-reads the winner's record and applies `merge` to it, so
    /// the phase rules hold against whatever the winner stored.
    async fn create_or_update<F>(
        &self,
        new: NewCallRecord,
        merge: F,
    ) -> Result<Reconciliation, ReconcileError>
    where
        F: FnOnce(&CallRecord) -> CallRecordPatch,
    {
        let external_call_id = new.external_call_id.clone();
        match self.bounded("create", self.store.create(new)).await {
            Ok(record) => Ok(Reconciliation::stored(ReconcileAction::Created, record)),
            Err(e) if e.is_conflict() => {
                tracing::debug!(
                    external_call_id = %external_call_id,
                    "Lost create race, merging into the stored record"
                );
                let existing = self
                    .find(&external_call_id)
                    .await?
                    .ok_or_else(|| StorageError::call_not_found(&external_call_id))?;
                let patch = merge(&existing);
                let record = if patch.is_empty() {
                    existing
                } else {
                    self.update(&external_call_id, patch).await?
                };
                Ok(Reconciliation::stored(ReconcileAction::Updated, record))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, external_call_id: &str) -> StoreResult<Option<CallRecord>> {
        self.bounded("find_by_external_id", self.store.find_by_external_id(external_call_id))
            .await
    }

    async fn update(&self, external_call_id: &str, patch: CallRecordPatch) -> StoreResult<CallRecord> {
        self.bounded("update", self.store.update(external_call_id, patch))
            .await
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| StorageError::Timeout {
                operation,
                elapsed: self.store_timeout,
            })?
    }

    fn announce(&self, done: &mut Reconciliation, kind: CallEventKind) {
        if let Some(record) = &done.record {
            // Fire and forget; the handle is only useful for bookkeeping.
            let _ = self.broadcaster.dispatch(CallEvent::new(kind, record));
            done.broadcasts.push(kind);
        }
    }
}

/// Patch that fills fields the record is still missing, leaving set
/// fields alone.
fn fill_absent(existing: &CallRecord, details: &CallDetails) -> CallRecordPatch {
    fn absent<T: Clone>(current: &Option<T>, incoming: &Option<T>) -> Option<T> {
        if current.is_none() {
            incoming.clone()
        } else {
            None
        }
    }

    let created_at: Option<Timestamp> = details.fields.create_time;

    CallRecordPatch {
        phone_client: absent(&existing.phone_client, &details.caller),
        phone_line: absent(&existing.phone_line, &details.callee),
        direction: absent(&existing.direction, &details.direction),
        created_at: absent(&existing.created_at, &created_at),
        city: absent(&existing.city, &details.city),
        source: absent(&existing.source, &details.source),
        ..Default::default()
    }
}

/// Connected applied to a stored record.
///
/// A record that already ended keeps its status; only missing fields and
/// the operator are filled in.
fn connected_patch(
    existing: &CallRecord,
    details: &CallDetails,
    operator_id: Option<OperatorId>,
) -> CallRecordPatch {
    let mut patch = fill_absent(existing, details);
    if existing.operator_id.is_none() {
        patch.operator_id = operator_id;
    }
    if !existing.is_ended() {
        patch.status = Some(CallStatus::Answered);
        if existing.answered_at.is_none() {
            patch.answered_at = details.fields.answer_time.or_else(|| Some(Utc::now()));
        }
    }
    patch
}

/// Disconnected or legacy event applied to a stored record.
///
/// Without an outcome signal the derived status is only the `missed`
/// default, so the stored status stays.
fn finished_patch(
    existing: &CallRecord,
    details: &CallDetails,
    outcome: CallOutcome,
    ended_at: Timestamp,
    operator_id: Option<OperatorId>,
) -> CallRecordPatch {
    let mut patch = fill_absent(existing, details);
    patch.ended_at = Some(
        details
            .fields
            .end_time
            .or(existing.ended_at)
            .unwrap_or(ended_at),
    );
    patch.answered_at = details.fields.answer_time;
    patch.duration_seconds = Some(outcome.duration_seconds);
    patch.operator_id = existing.operator_id.or(operator_id);
    if has_outcome_signal(&details.fields) {
        patch.status = Some(outcome.status);
    }
    patch
}

fn has_outcome_signal(fields: &ProviderFields) -> bool {
    fields.disconnect_reason.is_some()
        || fields.result_code.is_some()
        || fields.answer_time.is_some()
        || fields.entry_result.is_some()
}
