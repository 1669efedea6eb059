//! calltrail Test Utilities
//!
//! Shared test infrastructure for the calltrail workspace:
//! - Proptest generators for provider payloads and raw fields
//! - Fixtures for operators, payloads and recording jobs
//! - Call store wrappers that inject latency, outages and lost create races
//! - Custom assertions for call records

// Re-export in-memory stores from their source crate
pub use calltrail_storage::{BlobStore, CallStore, InMemoryBlobStore, InMemoryCallStore};

// Re-export core types for convenience
pub use calltrail_core::{
    CallDirection, CallId, CallPhase, CallRecord, CallRecordPatch, CallStatus, LifecycleEvent,
    NewCallRecord, Operator, OperatorId, ProviderFields, RecordingJob, StorageError, Timestamp,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use serde_json::{json, Value};

    /// Provider call ids: base64-ish tokens like `MToxMDE=`.
    pub fn arb_external_call_id() -> impl Strategy<Value = String> {
        "[A-Za-z0-9]{6,16}={0,2}"
    }

    pub fn arb_phone_number() -> impl Strategy<Value = String> {
        "7[0-9]{10}"
    }

    pub fn arb_sip_address() -> impl Strategy<Value = String> {
        "sip:[a-z]{3,10}@pbx\\.example"
    }

    /// Epoch seconds within 2024.
    pub fn arb_epoch_seconds() -> impl Strategy<Value = i64> {
        1_704_067_200i64..1_735_689_600i64
    }

    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        arb_epoch_seconds().prop_filter_map("valid timestamp", |secs| {
            Utc.timestamp_opt(secs, 0).single()
        })
    }

    /// Known disconnect reasons plus an unknown one.
    pub fn arb_disconnect_reason() -> impl Strategy<Value = i64> {
        prop_oneof![Just(1100i64), Just(1120), Just(1101), Just(1102), Just(1110)]
    }

    /// Known SIP result codes plus an unknown one.
    pub fn arb_result_code() -> impl Strategy<Value = i64> {
        prop_oneof![Just(200i64), Just(486), Just(408), Just(480), Just(503)]
    }

    pub fn arb_call_phase() -> impl Strategy<Value = CallPhase> {
        prop_oneof![
            Just(CallPhase::Appeared),
            Just(CallPhase::Connected),
            Just(CallPhase::Disconnected),
        ]
    }

    /// Raw provider fields with consistent create <= answer <= end ordering.
    pub fn arb_provider_fields() -> impl Strategy<Value = ProviderFields> {
        (
            prop::option::of(arb_disconnect_reason()),
            prop::option::of(arb_result_code()),
            prop::option::of(0i64..3600),
            arb_epoch_seconds(),
            prop::option::of(0i64..60),
            prop::option::of(0i64..3600),
        )
            .prop_map(|(reason, code, duration, created, ring, talk)| {
                let at = |secs: i64| Utc.timestamp_opt(secs, 0).single();
                let answer = ring.map(|r| created + r);
                let end = talk.map(|t| answer.unwrap_or(created) + t);
                ProviderFields {
                    disconnect_reason: reason,
                    result_code: code,
                    entry_result: None,
                    duration,
                    create_time: at(created),
                    answer_time: answer.and_then(at),
                    end_time: end.and_then(at),
                }
            })
    }

    /// Lifecycle webhook body for `external_call_id` in `phase`.
    ///
    /// Numbers are randomly sent as JSON numbers or numeric strings, the
    /// way the provider does.
    pub fn arb_lifecycle_payload(
        external_call_id: String,
        phase: CallPhase,
    ) -> impl Strategy<Value = Value> {
        (
            arb_phone_number(),
            arb_sip_address(),
            arb_epoch_seconds(),
            prop::option::of(arb_disconnect_reason()),
            prop::option::of(0i64..900),
            any::<bool>(),
        )
            .prop_map(move |(caller, callee, created, reason, duration, as_strings)| {
                let number = |n: i64| -> Value {
                    if as_strings {
                        Value::String(n.to_string())
                    } else {
                        json!(n)
                    }
                };
                let mut body = json!({
                    "call_id": external_call_id.clone(),
                    "call_state": match phase {
                        CallPhase::Appeared => "Appeared",
                        CallPhase::Connected => "Connected",
                        CallPhase::Disconnected => "Disconnected",
                    },
                    "from": { "number": caller },
                    "to": { "extension": callee },
                    "create_time": number(created),
                });
                if phase == CallPhase::Disconnected {
                    if let Some(reason) = reason {
                        body["disconnect_reason"] = number(reason);
                    }
                    if let Some(duration) = duration {
                        body["duration"] = number(duration);
                        body["end_time"] = number(created + duration + 5);
                    }
                }
                body
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use serde_json::{json, Value};

    /// Routing keys as stored on operators.
    pub const ALICE_SIP: &str = "alice";
    pub const BOB_SIP: &str = "bob";

    /// Addresses as the provider reports them.
    pub const ALICE_URI: &str = "sip:alice@pbx.example";
    pub const BOB_URI: &str = "sip:bob@pbx.example";

    pub fn operator(id: OperatorId, name: &str, sip: &str) -> Operator {
        Operator {
            id,
            name: name.to_string(),
            sip_address: sip.to_string(),
            city: None,
        }
    }

    pub fn alice() -> Operator {
        operator(1, "Alice", ALICE_SIP)
    }

    pub fn bob() -> Operator {
        operator(2, "Bob", BOB_SIP)
    }

    /// Store seeded with [`alice`] and [`bob`].
    pub fn seeded_store() -> InMemoryCallStore {
        InMemoryCallStore::with_operators([alice(), bob()])
    }

    pub fn appeared_payload(external_call_id: &str) -> Value {
        json!({
            "call_id": external_call_id,
            "call_state": "Appeared",
            "from": { "number": "79990001122" },
            "to": { "number": "74950001000" },
            "create_time": 1_717_000_000,
        })
    }

    pub fn connected_payload(external_call_id: &str, callee: &str) -> Value {
        json!({
            "call_id": external_call_id,
            "call_state": "Connected",
            "from": { "number": "79990001122" },
            "to": { "extension": callee },
            "create_time": 1_717_000_000,
            "answer_time": 1_717_000_010,
        })
    }

    pub fn disconnected_payload(external_call_id: &str, reason: i64, duration: i64) -> Value {
        json!({
            "call_id": external_call_id,
            "call_state": "Disconnected",
            "from": { "number": "79990001122" },
            "to": { "number": "74950001000" },
            "disconnect_reason": reason,
            "duration": duration,
            "create_time": 1_717_000_000,
            "end_time": 1_717_000_010 + duration,
        })
    }

    /// Single-shot summary without `call_state`.
    pub fn legacy_payload(external_call_id: &str, result_code: i64, callee: &str) -> Value {
        json!({
            "call_id": external_call_id,
            "from": "79990001122",
            "to": callee,
            "result": result_code,
            "create_time": 1_717_000_000,
            "answer_time": 1_717_000_010,
            "end_time": 1_717_000_070,
        })
    }

    pub fn recording_job(entry_id: &str, recording_id: &str, state: &str) -> RecordingJob {
        RecordingJob {
            entry_id: entry_id.to_string(),
            recording_id: recording_id.to_string(),
            job_state: state.to_string(),
        }
    }

    /// Minimal creation fields for seeding a store directly.
    pub fn new_call(external_call_id: &str, status: CallStatus) -> NewCallRecord {
        NewCallRecord {
            external_call_id: external_call_id.to_string(),
            phone_client: Some("79990001122".to_string()),
            phone_line: Some("74950001000".to_string()),
            direction: Some(CallDirection::Inbound),
            created_at: None,
            answered_at: None,
            ended_at: None,
            status,
            duration_seconds: 0,
            operator_id: None,
            city: None,
            source: None,
        }
    }
}

// ============================================================================
// FAULT-INJECTING STORES
// ============================================================================

pub mod stores {
    use super::*;
    use async_trait::async_trait;
    use calltrail_storage::StoreResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Call store whose every operation fails with `Unavailable`.
    #[derive(Debug, Clone, Default)]
    pub struct UnavailableCallStore;

    impl UnavailableCallStore {
        fn down<T>() -> StoreResult<T> {
            Err(StorageError::Unavailable {
                reason: "store offline".to_string(),
            })
        }
    }

    #[async_trait]
    impl CallStore for UnavailableCallStore {
        async fn find_by_external_id(&self, _: &str) -> StoreResult<Option<CallRecord>> {
            Self::down()
        }

        async fn find_by_id(&self, _: CallId) -> StoreResult<Option<CallRecord>> {
            Self::down()
        }

        async fn find_matching_external_id(&self, _: &str) -> StoreResult<Option<CallRecord>> {
            Self::down()
        }

        async fn create(&self, _: NewCallRecord) -> StoreResult<CallRecord> {
            Self::down()
        }

        async fn update(&self, _: &str, _: CallRecordPatch) -> StoreResult<CallRecord> {
            Self::down()
        }

        async fn find_operator_by_sip(&self, _: &str) -> StoreResult<Option<Operator>> {
            Self::down()
        }

        async fn find_operator_by_id(&self, _: OperatorId) -> StoreResult<Option<Operator>> {
            Self::down()
        }

        async fn ping(&self) -> StoreResult<()> {
            Self::down()
        }
    }

    /// Wraps a store and sleeps before operator lookups.
    ///
    /// Call operations pass straight through, so a slow directory can be
    /// tested against a responsive call table.
    #[derive(Debug, Clone)]
    pub struct SlowDirectoryStore {
        inner: InMemoryCallStore,
        delay: Duration,
    }

    impl SlowDirectoryStore {
        pub fn new(inner: InMemoryCallStore, delay: Duration) -> Self {
            Self { inner, delay }
        }
    }

    #[async_trait]
    impl CallStore for SlowDirectoryStore {
        async fn find_by_external_id(&self, id: &str) -> StoreResult<Option<CallRecord>> {
            self.inner.find_by_external_id(id).await
        }

        async fn find_by_id(&self, id: CallId) -> StoreResult<Option<CallRecord>> {
            self.inner.find_by_id(id).await
        }

        async fn find_matching_external_id(&self, fragment: &str) -> StoreResult<Option<CallRecord>> {
            self.inner.find_matching_external_id(fragment).await
        }

        async fn create(&self, new: NewCallRecord) -> StoreResult<CallRecord> {
            self.inner.create(new).await
        }

        async fn update(&self, id: &str, patch: CallRecordPatch) -> StoreResult<CallRecord> {
            self.inner.update(id, patch).await
        }

        async fn find_operator_by_sip(&self, sip: &str) -> StoreResult<Option<Operator>> {
            tokio::time::sleep(self.delay).await;
            self.inner.find_operator_by_sip(sip).await
        }

        async fn find_operator_by_id(&self, id: OperatorId) -> StoreResult<Option<Operator>> {
            tokio::time::sleep(self.delay).await;
            self.inner.find_operator_by_id(id).await
        }
    }

    /// Wraps a store and answers "not found" to the next N external id
    /// lookups.
    ///
    /// Stands in for a second process that created the record between this
    /// process's lookup and its create: the create then fails with
    /// `AlreadyExists` and the caller has to merge into the stored record.
    #[derive(Debug, Clone)]
    pub struct StaleLookupStore {
        inner: InMemoryCallStore,
        hidden: Arc<AtomicUsize>,
    }

    impl StaleLookupStore {
        pub fn new(inner: InMemoryCallStore) -> Self {
            Self {
                inner,
                hidden: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Hide existing records from the next `lookups` external id lookups.
        pub fn hide_next_lookups(&self, lookups: usize) {
            self.hidden.store(lookups, Ordering::SeqCst);
        }

        fn take_hidden(&self) -> bool {
            self.hidden
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl CallStore for StaleLookupStore {
        async fn find_by_external_id(&self, id: &str) -> StoreResult<Option<CallRecord>> {
            if self.take_hidden() {
                return Ok(None);
            }
            self.inner.find_by_external_id(id).await
        }

        async fn find_by_id(&self, id: CallId) -> StoreResult<Option<CallRecord>> {
            self.inner.find_by_id(id).await
        }

        async fn find_matching_external_id(&self, fragment: &str) -> StoreResult<Option<CallRecord>> {
            self.inner.find_matching_external_id(fragment).await
        }

        async fn create(&self, new: NewCallRecord) -> StoreResult<CallRecord> {
            self.inner.create(new).await
        }

        async fn update(&self, id: &str, patch: CallRecordPatch) -> StoreResult<CallRecord> {
            self.inner.update(id, patch).await
        }

        async fn find_operator_by_sip(&self, sip: &str) -> StoreResult<Option<Operator>> {
            self.inner.find_operator_by_sip(sip).await
        }

        async fn find_operator_by_id(&self, id: OperatorId) -> StoreResult<Option<Operator>> {
            self.inner.find_operator_by_id(id).await
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;

    pub fn assert_status(record: &CallRecord, expected: CallStatus) {
        assert_eq!(
            record.status, expected,
            "call {} has status {:?}, expected {:?}",
            record.external_call_id, record.status, expected
        );
    }

    /// Every field set on `before` is still set on `after`.
    pub fn assert_no_field_cleared(before: &CallRecord, after: &CallRecord) {
        let pairs = [
            ("phone_client", before.phone_client.is_some(), after.phone_client.is_some()),
            ("phone_line", before.phone_line.is_some(), after.phone_line.is_some()),
            ("direction", before.direction.is_some(), after.direction.is_some()),
            ("created_at", before.created_at.is_some(), after.created_at.is_some()),
            ("answered_at", before.answered_at.is_some(), after.answered_at.is_some()),
            ("ended_at", before.ended_at.is_some(), after.ended_at.is_some()),
            ("operator_id", before.operator_id.is_some(), after.operator_id.is_some()),
            ("recording_ref", before.recording_ref.is_some(), after.recording_ref.is_some()),
            ("city", before.city.is_some(), after.city.is_some()),
            ("source", before.source.is_some(), after.source.is_some()),
        ];
        for (field, was_set, is_set) in pairs {
            assert!(
                !was_set || is_set,
                "{} was cleared on call {}",
                field,
                after.external_call_id
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
