//! Queue replay contract tests
//!
//! Verifies the failure-isolation guarantees of queue drain:
//! - one failing item never blocks the rest of the queue
//! - failures are accounted on the item (retry_count, last_error)
//! - a kept item succeeds on a later pass
//! - create intents referencing an offline record settle that record

mod common;

use std::sync::Arc;

use serde_json::json;
use studyroom_core::engine::{SyncEngine, SyncOutcome};
use studyroom_core::model::{EntityKind, NewQueueItem, QueueAction};
use studyroom_core::traits::OfflineStore;
use studyroom_core::{EngineConfig, MemoryStore, signal_pair};

use common::{MockRemoteApi, capture};

fn online_engine(store: Arc<dyn OfflineStore>, api: Arc<MockRemoteApi>) -> SyncEngine {
    let (conn, _handle) = signal_pair(true);
    let (engine, _status_rx) =
        SyncEngine::new(store, api, Box::new(conn), EngineConfig::default()).unwrap();
    engine.set_online(true);
    engine
}

fn intent(entity: EntityKind, payload: serde_json::Value) -> NewQueueItem {
    NewQueueItem {
        entity,
        action: QueueAction::Create,
        payload,
    }
}

#[tokio::test]
async fn failed_item_is_isolated_and_accounted() {
    let store: Arc<dyn OfflineStore> = Arc::new(MemoryStore::new());
    let api = MockRemoteApi::new();

    // Oldest first: the scripted failure hits the payment intent
    let failing_id = store
        .enqueue(intent(EntityKind::Payment, json!({ "amount": 150000 })))
        .await
        .unwrap();
    store
        .enqueue(intent(EntityKind::Student, json!({ "name": "Mina" })))
        .await
        .unwrap();
    store
        .enqueue(intent(EntityKind::Attendance, json!({ "student_id": 1 })))
        .await
        .unwrap();

    api.fail_next_submits(1);
    let engine = online_engine(store.clone(), api.clone());

    let SyncOutcome::Completed {
        synced,
        failed,
        errors,
    } = engine.sync_pass().await
    else {
        panic!("pass should have run");
    };
    assert_eq!(synced, 2);
    assert_eq!(failed, 1);
    assert_eq!(errors.len(), 1);

    // Only the failing item survived, with its failure recorded
    let queue = store.list_queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, failing_id);
    assert_eq!(queue[0].retry_count, 1);
    assert!(queue[0].last_error.as_deref().unwrap().contains("scripted"));

    let status = engine.status();
    assert_eq!(status.failed_count, 1);
    assert_eq!(status.pending_count, 1);
    assert!(!status.errors.is_empty());

    // Next pass, no scripted failure: the kept item drains
    let outcome = engine.sync_pass().await;
    assert!(matches!(
        outcome,
        SyncOutcome::Completed {
            synced: 1,
            failed: 0,
            ..
        }
    ));
    assert!(store.list_queue().await.unwrap().is_empty());
    assert_eq!(engine.status().pending_count, 0);
    assert!(engine.status().errors.is_empty());
}

#[tokio::test]
async fn attendance_replay_failure_keeps_record_for_next_pass() {
    let store: Arc<dyn OfflineStore> = Arc::new(MemoryStore::new());
    let api = MockRemoteApi::new();

    store.append_attendance(capture(1, 1)).await.unwrap();
    store.append_attendance(capture(2, 1)).await.unwrap();

    api.fail_next_marks(1);
    let engine = online_engine(store.clone(), api.clone());

    let outcome = engine.sync_pass().await;
    assert!(matches!(
        outcome,
        SyncOutcome::Completed {
            synced: 1,
            failed: 1,
            ..
        }
    ));

    // The failed record is untouched and still eligible
    let unsynced = store.list_unsynced_attendance().await.unwrap();
    assert_eq!(unsynced.len(), 1);
    assert_eq!(unsynced[0].student_id, 1);

    let outcome = engine.sync_pass().await;
    assert!(matches!(
        outcome,
        SyncOutcome::Completed {
            synced: 1,
            failed: 0,
            ..
        }
    ));
    assert!(store.list_unsynced_attendance().await.unwrap().is_empty());
}

#[tokio::test]
async fn create_intent_with_offline_id_settles_the_record() {
    let store: Arc<dyn OfflineStore> = Arc::new(MemoryStore::new());
    let api = MockRemoteApi::new();

    let local_id = store.append_attendance(capture(5, 3)).await.unwrap();
    store.mark_synced(local_id).await.unwrap();

    // An intent enqueued by an earlier session, pointing at the record
    store
        .enqueue(intent(
            EntityKind::Attendance,
            json!({ "offline_id": local_id, "student_id": 5 }),
        ))
        .await
        .unwrap();

    let engine = online_engine(store.clone(), api.clone());
    let outcome = engine.sync_pass().await;
    assert!(matches!(
        outcome,
        SyncOutcome::Completed {
            failed: 0,
            ..
        }
    ));

    // Intent drained; settling an already-synced record is idempotent
    assert!(store.list_queue().await.unwrap().is_empty());
    assert!(store.list_unsynced_attendance().await.unwrap().is_empty());
    assert_eq!(api.submitted().len(), 1);
}
