//! Async call record store.
//!
//! Narrow persistence interface the reconciler and the recording pipeline
//! talk to. The PostgreSQL implementation lives in `calltrail-api`; this
//! crate ships the in-memory implementation used by tests and by
//! single-process deployments without a database.

use ::async_trait::async_trait;
use calltrail_core::{
    CallId, CallRecord, CallRecordPatch, NewCallRecord, Operator, OperatorId, StorageError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Store result alias.
pub type StoreResult<T> = Result<T, StorageError>;

/// Call record and operator persistence.
///
/// `create` must be atomic on `external_call_id`: a concurrent create for
/// the same id fails with [`StorageError::AlreadyExists`] and the caller
/// retries as an update.
#[async_trait]
pub trait CallStore: Send + Sync {
    // ========================================================================
    // CALL OPERATIONS
    // ========================================================================

    /// Get a call by its provider-assigned id.
    async fn find_by_external_id(&self, external_call_id: &str) -> StoreResult<Option<CallRecord>>;

    /// Get a call by its internal id.
    async fn find_by_id(&self, id: CallId) -> StoreResult<Option<CallRecord>>;

    /// Find a call whose external id equals `fragment`, or failing that,
    /// one whose external id contains it or is contained in it.
    ///
    /// Recording signals carry ids in a slightly different format than
    /// lifecycle events. Exact matches always win; among containment
    /// matches the most recently created record wins.
    async fn find_matching_external_id(&self, fragment: &str) -> StoreResult<Option<CallRecord>>;

    /// Create a call. Fails with `AlreadyExists` on a duplicate external id.
    async fn create(&self, new: NewCallRecord) -> StoreResult<CallRecord>;

    /// Merge `patch` into the call. Fails with `NotFound` if absent.
    async fn update(&self, external_call_id: &str, patch: CallRecordPatch)
        -> StoreResult<CallRecord>;

    // ========================================================================
    // OPERATOR OPERATIONS
    // ========================================================================

    /// Exact match on `sip_address`.
    async fn find_operator_by_sip(&self, sip: &str) -> StoreResult<Option<Operator>>;

    async fn find_operator_by_id(&self, id: OperatorId) -> StoreResult<Option<Operator>>;

    /// Connectivity probe for readiness checks.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

/// In-memory call store.
///
/// Cloning shares the underlying maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCallStore {
    calls: Arc<RwLock<HashMap<String, CallRecord>>>,
    operators: Arc<RwLock<HashMap<OperatorId, Operator>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with operators.
    pub fn with_operators(operators: impl IntoIterator<Item = Operator>) -> Self {
        let operators = operators.into_iter().map(|op| (op.id, op)).collect();
        Self {
            operators: Arc::new(RwLock::new(operators)),
            ..Self::default()
        }
    }

    pub async fn insert_operator(&self, operator: Operator) {
        self.operators.write().await.insert(operator.id, operator);
    }

    /// Get count of stored calls.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Snapshot of every stored call.
    pub async fn all_calls(&self) -> Vec<CallRecord> {
        let mut calls: Vec<_> = self.calls.read().await.values().cloned().collect();
        calls.sort_by_key(|c| c.id);
        calls
    }
}

#[async_trait]
impl CallStore for InMemoryCallStore {
    async fn find_by_external_id(&self, external_call_id: &str) -> StoreResult<Option<CallRecord>> {
        Ok(self.calls.read().await.get(external_call_id).cloned())
    }

    async fn find_by_id(&self, id: CallId) -> StoreResult<Option<CallRecord>> {
        Ok(self
            .calls
            .read()
            .await
            .values()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn find_matching_external_id(&self, fragment: &str) -> StoreResult<Option<CallRecord>> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(None);
        }
        let calls = self.calls.read().await;
        if let Some(exact) = calls.get(fragment) {
            return Ok(Some(exact.clone()));
        }
        Ok(calls
            .values()
            .filter(|c| {
                c.external_call_id.contains(fragment) || fragment.contains(&c.external_call_id)
            })
            .max_by_key(|c| c.id)
            .cloned())
    }

    async fn create(&self, new: NewCallRecord) -> StoreResult<CallRecord> {
        let mut calls = self.calls.write().await;
        if calls.contains_key(&new.external_call_id) {
            return Err(StorageError::call_already_exists(&new.external_call_id));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = CallRecord::from_new(id, new);
        calls.insert(record.external_call_id.clone(), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        external_call_id: &str,
        patch: CallRecordPatch,
    ) -> StoreResult<CallRecord> {
        let mut calls = self.calls.write().await;
        let record = calls
            .get_mut(external_call_id)
            .ok_or_else(|| StorageError::call_not_found(external_call_id))?;
        patch.apply_to(record);
        Ok(record.clone())
    }

    async fn find_operator_by_sip(&self, sip: &str) -> StoreResult<Option<Operator>> {
        Ok(self
            .operators
            .read()
            .await
            .values()
            .find(|op| op.sip_address == sip)
            .cloned())
    }

    async fn find_operator_by_id(&self, id: OperatorId) -> StoreResult<Option<Operator>> {
        Ok(self.operators.read().await.get(&id).cloned())
    }
}
