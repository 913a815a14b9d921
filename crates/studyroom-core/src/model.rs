//! Entity types shared by the local store, sync engine and remote API seam
//!
//! Three entity kinds are owned by the local store: cached students,
//! offline attendance records and generic sync-queue items. The sync
//! engine borrows them during a pass but holds no state across passes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Denormalized snapshot of a roster member, cached for offline lookups.
///
/// Refreshed wholesale on every successful roster fetch (replace-all,
/// never merged). Read-only from the engine's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedStudent {
    /// Remote (server-assigned) student id
    pub id: u64,
    /// Display name
    pub name: String,
    /// Roster status as reported by the server (e.g. "active")
    pub status: String,
    /// Server-side fields we cache but do not interpret
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

/// Attendance status for a single student and day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    EarlyLeave,
}

/// An attendance record captured locally, possibly while disconnected.
///
/// `local_id` is assigned by the store; `synced` flips to true exactly
/// once, when the remote API has accepted the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineAttendance {
    /// Device-assigned auto-incrementing id
    pub local_id: u64,
    /// Remote student id
    pub student_id: u64,
    /// Denormalized for display while the roster cache may be stale
    pub student_name: String,
    /// The day this record is for
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    /// Check-in time as "HH:MM", when the UI supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Stamped by the store at insert; drives conflict resolution recency
    pub captured_at: DateTime<Utc>,
    pub synced: bool,
}

impl OfflineAttendance {
    /// The logical slot this record claims. After conflict resolution at
    /// most one unsynced record exists per slot.
    pub fn slot(&self) -> (u64, NaiveDate) {
        (self.student_id, self.date)
    }
}

/// Insert form for an offline attendance capture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttendance {
    pub student_id: u64,
    pub student_name: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Entity kind carried by a sync-queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Attendance,
    Student,
    Payment,
}

/// Mutation kind carried by a sync-queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
    Create,
    Update,
    Delete,
}

/// A generic outbound intent, created whenever an entity-mutating action
/// cannot reach the network immediately.
///
/// Removed only on confirmed remote success. A failed replay increments
/// `retry_count` and records `last_error`; items are never auto-deleted
/// for exceeding a retry ceiling — they stay visible for manual retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Store-assigned auto-incrementing id
    pub id: u64,
    pub entity: EntityKind,
    pub action: QueueAction,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Insert form for a queue item
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub entity: EntityKind,
    pub action: QueueAction,
    pub payload: serde_json::Value,
}

/// Partial update applied to a queue item after a replay attempt
#[derive(Debug, Clone, Default)]
pub struct QueueItemPatch {
    pub retry_count: Option<u32>,
    pub last_error: Option<String>,
}

/// Derived store counts for diagnostics; purely a read, no side effects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub students: usize,
    pub attendance_total: usize,
    pub unsynced: usize,
    pub queue: usize,
}

/// Snapshot published to status subscribers after every mutation.
///
/// This is the only channel by which the UI learns sync progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    /// Completion time of the last sync pass, if any
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Unsynced attendance records plus outstanding queue items
    pub pending_count: usize,
    /// Failures accumulated by the most recent pass
    pub failed_count: usize,
    pub errors: Vec<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            is_online: false,
            is_syncing: false,
            last_sync_time: None,
            pending_count: 0,
            failed_count: 0,
            errors: Vec::new(),
        }
    }
}
