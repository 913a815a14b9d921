//! Durability contract tests
//!
//! Offline captures must survive process restarts: everything committed
//! through the file store is visible after reopening the same path.

mod common;

use std::sync::Arc;

use studyroom_core::engine::{CaptureOutcome, SyncEngine, SyncOutcome};
use studyroom_core::traits::OfflineStore;
use studyroom_core::{EngineConfig, FileStore, signal_pair};

use common::{MockRemoteApi, capture};

#[tokio::test]
async fn offline_capture_survives_restart_and_drains_later() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offline.json");

    // Session 1: offline capture
    {
        let store: Arc<dyn OfflineStore> = Arc::new(FileStore::new(&path).await.unwrap());
        let (conn, _handle) = signal_pair(false);
        let (engine, _status_rx) = SyncEngine::new(
            store,
            MockRemoteApi::new(),
            Box::new(conn),
            EngineConfig::default(),
        )
        .unwrap();

        let outcome = engine.capture_attendance(capture(1, 1)).await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Local { .. }));
    }

    // Session 2: the record is still pending, and a pass drains it
    let store: Arc<dyn OfflineStore> = Arc::new(FileStore::new(&path).await.unwrap());
    let pending = store.list_unsynced_attendance().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].student_id, 1);

    let api = MockRemoteApi::new();
    let (conn, _handle) = signal_pair(true);
    let (engine, _status_rx) =
        SyncEngine::new(store.clone(), api.clone(), Box::new(conn), EngineConfig::default())
            .unwrap();
    engine.set_online(true);

    let outcome = engine.sync_pass().await;
    assert!(matches!(outcome, SyncOutcome::Completed { synced: 1, .. }));
    assert_eq!(api.mark_call_count(), 1);

    // Session 3: the synced flag is durable too
    drop(engine);
    let store = FileStore::new(&path).await.unwrap();
    assert!(store.list_unsynced_attendance().await.unwrap().is_empty());
    assert_eq!(store.list_attendance().await.unwrap().len(), 1);
}

#[tokio::test]
async fn queue_items_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offline.json");

    {
        let store = FileStore::new(&path).await.unwrap();
        store
            .enqueue(studyroom_core::NewQueueItem {
                entity: studyroom_core::EntityKind::Payment,
                action: studyroom_core::QueueAction::Create,
                payload: serde_json::json!({ "amount": 150000 }),
            })
            .await
            .unwrap();
    }

    let store = FileStore::new(&path).await.unwrap();
    let queue = store.list_queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].payload["amount"], 150000);
    assert_eq!(queue[0].retry_count, 0);
}
