// # Offline Store Trait
//
// Defines the interface for durable, transactional CRUD over the three
// locally-owned entity kinds: cached students, offline attendance and
// the generic sync queue.
//
// ## Transactionality
//
// Every multi-step operation (read a record, mutate a field, write it
// back) executes as one transaction: it either commits fully or the
// error propagates and the data model is unchanged. Callers must treat
// a failed write as "nothing happened" and may safely retry.
//
// ## Implementations
//
// - File-backed with crash recovery: `store::FileStore`
// - In-memory (degraded/session-only mode, tests): `store::MemoryStore`
//
// ## Thread Safety
//
// All methods must be safe to call concurrently from multiple tasks; the
// store is the only shared mutable resource in the subsystem and its
// transaction semantics are the only locking the engine relies on beyond
// its single-flight pass guard.

use async_trait::async_trait;
use chrono::Duration;

use crate::model::{
    CachedStudent, NewAttendance, NewQueueItem, OfflineAttendance, QueueItem, QueueItemPatch,
    StoreStatus,
};

/// Trait for local store implementations
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// Clear and rewrite the cached roster in one transaction.
    ///
    /// Readers never observe a half-written roster.
    async fn replace_students(&self, students: Vec<CachedStudent>) -> Result<(), crate::Error>;

    /// All cached roster members
    async fn students(&self) -> Result<Vec<CachedStudent>, crate::Error>;

    /// Look up a cached roster member by remote id
    async fn student(&self, id: u64) -> Result<Option<CachedStudent>, crate::Error>;

    /// Insert an attendance capture with `synced = false` and
    /// `captured_at = now`; returns the assigned local id.
    async fn append_attendance(&self, new: NewAttendance) -> Result<u64, crate::Error>;

    /// All attendance records, in insertion order
    async fn list_attendance(&self) -> Result<Vec<OfflineAttendance>, crate::Error>;

    /// Attendance records not yet accepted by the remote API, in
    /// insertion order
    async fn list_unsynced_attendance(&self) -> Result<Vec<OfflineAttendance>, crate::Error>;

    /// Flip the `synced` flag. Idempotent: a second call is a no-op,
    /// not an error. Unknown ids are an error.
    async fn mark_synced(&self, local_id: u64) -> Result<(), crate::Error>;

    /// Hard delete, used by conflict resolution and retention cleanup
    async fn delete_attendance(&self, local_id: u64) -> Result<(), crate::Error>;

    /// Append an outbound intent to the sync queue; returns its id
    async fn enqueue(&self, new: NewQueueItem) -> Result<u64, crate::Error>;

    /// Queue items oldest first
    async fn list_queue(&self) -> Result<Vec<QueueItem>, crate::Error>;

    /// Apply a partial update to a queue item (retry accounting)
    async fn update_queue_item(&self, id: u64, patch: QueueItemPatch) -> Result<(), crate::Error>;

    /// Remove a queue item after confirmed remote success
    async fn remove_queue_item(&self, id: u64) -> Result<(), crate::Error>;

    /// Delete synced attendance records older than the retention window;
    /// returns the number deleted. Unsynced records are never touched.
    async fn cleanup(&self, retention: Duration) -> Result<usize, crate::Error>;

    /// Derived counts for diagnostics; no side effects
    async fn status(&self) -> Result<StoreStatus, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
