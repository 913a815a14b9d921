// # Memory Store
//
// In-memory implementation of OfflineStore.
//
// ## Purpose
//
// The degraded mode: when the host offers no usable persistent storage
// location, the subsystem falls back to session-only operation. Also the
// store of choice for tests.
//
// ## Crash Behavior
//
// All state is lost on restart. Offline captures made in this mode only
// survive as long as the process does, which is why `store::open` logs
// the fallback loudly.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::{
    CachedStudent, NewAttendance, NewQueueItem, OfflineAttendance, QueueItem, QueueItemPatch,
    StoreStatus,
};
use crate::store::tables::Schema;
use crate::traits::OfflineStore;

/// In-memory offline store
///
/// Same transaction semantics as the file store (stage on a clone, swap
/// on success) without persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Schema>>,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_txn<T>(&self, op: impl FnOnce(&mut Schema) -> Result<T, Error>) -> Result<T, Error> {
        let mut guard = self.inner.write().await;
        let mut staged = guard.clone();
        let out = op(&mut staged)?;
        *guard = staged;
        Ok(out)
    }
}

#[async_trait]
impl OfflineStore for MemoryStore {
    async fn replace_students(&self, students: Vec<CachedStudent>) -> Result<(), Error> {
        self.with_txn(|schema| {
            schema.replace_students(students);
            Ok(())
        })
        .await
    }

    async fn students(&self) -> Result<Vec<CachedStudent>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.students.values().cloned().collect())
    }

    async fn student(&self, id: u64) -> Result<Option<CachedStudent>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.students.get(&id).cloned())
    }

    async fn append_attendance(&self, new: NewAttendance) -> Result<u64, Error> {
        self.with_txn(|schema| Ok(schema.append_attendance(new, Utc::now())))
            .await
    }

    async fn list_attendance(&self) -> Result<Vec<OfflineAttendance>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.attendance.all())
    }

    async fn list_unsynced_attendance(&self) -> Result<Vec<OfflineAttendance>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.attendance.unsynced_records())
    }

    async fn mark_synced(&self, local_id: u64) -> Result<(), Error> {
        self.with_txn(|schema| schema.mark_synced(local_id)).await
    }

    async fn delete_attendance(&self, local_id: u64) -> Result<(), Error> {
        self.with_txn(|schema| {
            schema.delete_attendance(local_id);
            Ok(())
        })
        .await
    }

    async fn enqueue(&self, new: NewQueueItem) -> Result<u64, Error> {
        self.with_txn(|schema| Ok(schema.enqueue(new, Utc::now())))
            .await
    }

    async fn list_queue(&self) -> Result<Vec<QueueItem>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.queue.all())
    }

    async fn update_queue_item(&self, id: u64, patch: QueueItemPatch) -> Result<(), Error> {
        self.with_txn(|schema| schema.update_queue_item(id, patch))
            .await
    }

    async fn remove_queue_item(&self, id: u64) -> Result<(), Error> {
        self.with_txn(|schema| {
            schema.remove_queue_item(id);
            Ok(())
        })
        .await
    }

    async fn cleanup(&self, retention: Duration) -> Result<usize, Error> {
        let cutoff = Utc::now() - retention;
        self.with_txn(|schema| Ok(schema.cleanup(cutoff))).await
    }

    async fn status(&self) -> Result<StoreStatus, Error> {
        let guard = self.inner.read().await;
        Ok(guard.counts())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered beyond memory
        Ok(())
    }
}
