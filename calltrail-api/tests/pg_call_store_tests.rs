//! PostgreSQL call store against a live database.
//!
//! Run with `cargo test -p calltrail-api --features db-tests` and the
//! `CALLTRAIL_DB_*` variables pointing at a scratch database. The schema in
//! `sql/schema.sql` is applied before each test.

#![cfg(feature = "db-tests")]

use calltrail_api::{DbConfig, PgCallStore};
use calltrail_core::{CallRecordPatch, CallStatus};
use calltrail_storage::CallStore;
use calltrail_test_utils::fixtures;

const SCHEMA: &str = include_str!("../sql/schema.sql");

async fn store() -> PgCallStore {
    let pool = DbConfig::from_env().create_pool().expect("pool");
    let conn = pool.get().await.expect("database reachable");
    conn.batch_execute(SCHEMA).await.expect("schema applied");
    drop(conn);
    PgCallStore::new(pool)
}

/// Fresh external id so runs never collide with earlier rows.
fn unique_id() -> String {
    format!("test-{}", uuid::Uuid::now_v7().simple())
}

#[tokio::test]
async fn test_ping() {
    let store = store().await;
    store.ping().await.unwrap();
    assert!(store.pool_size() >= 1);
}

#[tokio::test]
async fn test_create_and_find() {
    let store = store().await;
    let id = unique_id();

    let created = store
        .create(fixtures::new_call(&id, CallStatus::Missed))
        .await
        .unwrap();
    assert_eq!(created.external_call_id, id);
    assert_eq!(created.status, CallStatus::Missed);
    assert_eq!(created.duration_seconds, 0);

    let by_external = store.find_by_external_id(&id).await.unwrap().unwrap();
    let by_id = store.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(by_external, created);
    assert_eq!(by_id, created);
}

#[tokio::test]
async fn test_duplicate_create_is_conflict() {
    let store = store().await;
    let id = unique_id();

    store
        .create(fixtures::new_call(&id, CallStatus::Missed))
        .await
        .unwrap();
    let err = store
        .create(fixtures::new_call(&id, CallStatus::Answered))
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    let record = store.find_by_external_id(&id).await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::Missed);
}

#[tokio::test]
async fn test_update_keeps_unset_fields_and_positive_duration() {
    let store = store().await;
    let id = unique_id();
    store
        .create(fixtures::new_call(&id, CallStatus::Answered))
        .await
        .unwrap();

    let updated = store
        .update(
            &id,
            CallRecordPatch {
                duration_seconds: Some(42),
                recording_ref: Some("callcentre/recordings/x.mp3".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.duration_seconds, 42);
    assert_eq!(updated.phone_client.as_deref(), Some("79990001122"));

    let replayed = store
        .update(
            &id,
            CallRecordPatch {
                duration_seconds: Some(0),
                status: Some(CallStatus::Ended),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(replayed.duration_seconds, 42);
    assert_eq!(replayed.status, CallStatus::Ended);
    assert_eq!(
        replayed.recording_ref.as_deref(),
        Some("callcentre/recordings/x.mp3")
    );
}

#[tokio::test]
async fn test_update_missing_is_not_found() {
    let store = store().await;
    let err = store
        .update(&unique_id(), CallRecordPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, calltrail_core::StorageError::NotFound { .. }));
}

#[tokio::test]
async fn test_matching_external_id() {
    let store = store().await;
    let id = unique_id();
    let created = store
        .create(fixtures::new_call(&id, CallStatus::Missed))
        .await
        .unwrap();

    let exact = store.find_matching_external_id(&id).await.unwrap().unwrap();
    assert_eq!(exact.id, created.id);

    let fragment = &id[..id.len() - 4];
    let partial = store.find_matching_external_id(fragment).await.unwrap().unwrap();
    assert_eq!(partial.id, created.id);

    let wrapped = format!("{}-leg1", id);
    let containing = store.find_matching_external_id(&wrapped).await.unwrap().unwrap();
    assert_eq!(containing.id, created.id);

    assert!(store.find_matching_external_id("").await.unwrap().is_none());
}

#[tokio::test]
async fn test_operator_lookup() {
    let store = store().await;
    let sip = unique_id();

    let pool = DbConfig::from_env().create_pool().unwrap();
    let conn = pool.get().await.unwrap();
    let row = conn
        .query_one(
            "INSERT INTO operators (name, sip_address, city) VALUES ($1, $2, $3) RETURNING id",
            &[&"Test Operator", &sip, &"Moscow"],
        )
        .await
        .unwrap();
    let operator_id: i64 = row.get("id");

    let by_sip = store.find_operator_by_sip(&sip).await.unwrap().unwrap();
    assert_eq!(by_sip.id, operator_id);
    assert_eq!(by_sip.city.as_deref(), Some("Moscow"));

    let by_id = store.find_operator_by_id(operator_id).await.unwrap().unwrap();
    assert_eq!(by_id.sip_address, sip);
    assert!(store.find_operator_by_sip("nobody-here").await.unwrap().is_none());
}
