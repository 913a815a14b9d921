// # Store Schema
//
// The typed table arena shared by the file and memory stores. Four
// logical tables: cached students (keyed by remote id), offline
// attendance (auto-increment key, secondary lookups by slot and synced
// flag), and the sync queue (auto-increment key, insertion-ordered).
//
// All mutation logic lives here as synchronous, infallible-or-explicit
// operations on an owned `Schema`; the store implementations wrap these
// in their own locking and persistence to provide transaction semantics.
//
// ## Versioning
//
// The schema carries a version number. Upgrades are additive: older
// files deserialize with serde defaults filling new fields, and
// `migrate()` stamps the current version before the store is usable.
// Files written by a newer version are rejected rather than guessed at.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::Error;
use crate::model::{
    CachedStudent, NewAttendance, NewQueueItem, OfflineAttendance, QueueItem, QueueItemPatch,
    StoreStatus,
};

/// Current schema version.
///
/// Version 1 predates retry accounting on queue items (`retry_count`,
/// `last_error`); those fields deserialize to their defaults.
pub const SCHEMA_VERSION: u32 = 2;

/// The full persisted data model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub version: u32,
    /// Cached roster, keyed by remote student id
    pub students: BTreeMap<u64, CachedStudent>,
    pub attendance: AttendanceTable,
    pub queue: QueueTable,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            students: BTreeMap::new(),
            attendance: AttendanceTable::default(),
            queue: QueueTable::default(),
        }
    }
}

impl Schema {
    /// Bring a freshly deserialized schema up to date: run the structural
    /// migration step and rebuild in-memory indexes.
    ///
    /// Returns true when a migration changed the schema (callers should
    /// persist it before use).
    pub fn finalize_loaded(&mut self) -> Result<bool, Error> {
        let migrated = self.migrate()?;
        self.attendance.rebuild_indexes();
        Ok(migrated)
    }

    fn migrate(&mut self) -> Result<bool, Error> {
        if self.version > SCHEMA_VERSION {
            return Err(Error::store(format!(
                "store schema version {} is newer than supported version {}",
                self.version, SCHEMA_VERSION
            )));
        }
        if self.version == SCHEMA_VERSION {
            return Ok(false);
        }

        // v1 -> v2: retry accounting fields on queue items. Purely
        // additive; serde defaults already filled them on deserialize.
        tracing::info!(
            from = self.version,
            to = SCHEMA_VERSION,
            "migrating store schema"
        );
        self.version = SCHEMA_VERSION;
        Ok(true)
    }

    pub fn replace_students(&mut self, students: Vec<CachedStudent>) {
        self.students.clear();
        for student in students {
            self.students.insert(student.id, student);
        }
    }

    pub fn append_attendance(&mut self, new: NewAttendance, now: DateTime<Utc>) -> u64 {
        self.attendance.insert(new, now)
    }

    pub fn mark_synced(&mut self, local_id: u64) -> Result<(), Error> {
        self.attendance.mark_synced(local_id)
    }

    pub fn delete_attendance(&mut self, local_id: u64) {
        self.attendance.delete(local_id);
    }

    pub fn enqueue(&mut self, new: NewQueueItem, now: DateTime<Utc>) -> u64 {
        self.queue.insert(new, now)
    }

    pub fn update_queue_item(&mut self, id: u64, patch: QueueItemPatch) -> Result<(), Error> {
        self.queue.patch(id, patch)
    }

    pub fn remove_queue_item(&mut self, id: u64) {
        self.queue.remove(id);
    }

    /// Delete synced attendance captured before the cutoff; unsynced
    /// records are kept regardless of age.
    pub fn cleanup(&mut self, cutoff: DateTime<Utc>) -> usize {
        self.attendance.cleanup(cutoff)
    }

    pub fn counts(&self) -> StoreStatus {
        StoreStatus {
            students: self.students.len(),
            attendance_total: self.attendance.rows.len(),
            unsynced: self.attendance.unsynced.len(),
            queue: self.queue.rows.len(),
        }
    }
}

/// Offline attendance table with secondary indexes.
///
/// Rows are keyed by the auto-increment local id, so iteration order is
/// insertion order. The indexes are in-memory only and rebuilt on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttendanceTable {
    next_id: u64,
    pub(crate) rows: BTreeMap<u64, OfflineAttendance>,

    /// Secondary index: local ids per (student_id, date) slot
    #[serde(skip)]
    by_slot: HashMap<(u64, NaiveDate), Vec<u64>>,

    /// Secondary index: local ids with synced = false
    #[serde(skip)]
    pub(crate) unsynced: BTreeSet<u64>,
}

impl AttendanceTable {
    fn insert(&mut self, new: NewAttendance, now: DateTime<Utc>) -> u64 {
        self.next_id += 1;
        let local_id = self.next_id;

        let record = OfflineAttendance {
            local_id,
            student_id: new.student_id,
            student_name: new.student_name,
            date: new.date,
            status: new.status,
            time_in: new.time_in,
            note: new.note,
            captured_at: now,
            synced: false,
        };

        self.by_slot.entry(record.slot()).or_default().push(local_id);
        self.unsynced.insert(local_id);
        self.rows.insert(local_id, record);
        local_id
    }

    fn mark_synced(&mut self, local_id: u64) -> Result<(), Error> {
        let record = self
            .rows
            .get_mut(&local_id)
            .ok_or_else(|| Error::not_found(format!("attendance record {}", local_id)))?;

        // Idempotent: already-synced is a no-op
        record.synced = true;
        self.unsynced.remove(&local_id);
        Ok(())
    }

    fn delete(&mut self, local_id: u64) {
        if let Some(record) = self.rows.remove(&local_id) {
            self.unsynced.remove(&local_id);
            if let Some(ids) = self.by_slot.get_mut(&record.slot()) {
                ids.retain(|id| *id != local_id);
                if ids.is_empty() {
                    self.by_slot.remove(&record.slot());
                }
            }
        }
    }

    fn cleanup(&mut self, cutoff: DateTime<Utc>) -> usize {
        let expired: Vec<u64> = self
            .rows
            .values()
            .filter(|r| r.synced && r.captured_at < cutoff)
            .map(|r| r.local_id)
            .collect();

        for id in &expired {
            self.delete(*id);
        }
        expired.len()
    }

    /// Records in insertion order
    pub fn all(&self) -> Vec<OfflineAttendance> {
        self.rows.values().cloned().collect()
    }

    /// Unsynced records in insertion order, via the synced-flag index
    pub fn unsynced_records(&self) -> Vec<OfflineAttendance> {
        self.unsynced
            .iter()
            .filter_map(|id| self.rows.get(id))
            .cloned()
            .collect()
    }

    fn rebuild_indexes(&mut self) {
        self.by_slot.clear();
        self.unsynced.clear();
        for (id, record) in &self.rows {
            self.by_slot.entry(record.slot()).or_default().push(*id);
            if !record.synced {
                self.unsynced.insert(*id);
            }
            // Guard against files edited by hand or truncated counters
            if *id > self.next_id {
                self.next_id = *id;
            }
        }
    }
}

/// Sync queue table; rows keyed by auto-increment id, so iteration is
/// oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueTable {
    next_id: u64,
    pub(crate) rows: BTreeMap<u64, QueueItem>,
}

impl QueueTable {
    fn insert(&mut self, new: NewQueueItem, now: DateTime<Utc>) -> u64 {
        self.next_id += 1;
        let id = self.next_id;

        self.rows.insert(
            id,
            QueueItem {
                id,
                entity: new.entity,
                action: new.action,
                payload: new.payload,
                enqueued_at: now,
                retry_count: 0,
                last_error: None,
            },
        );
        id
    }

    fn patch(&mut self, id: u64, patch: QueueItemPatch) -> Result<(), Error> {
        let item = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("queue item {}", id)))?;

        if let Some(retry_count) = patch.retry_count {
            item.retry_count = retry_count;
        }
        if let Some(last_error) = patch.last_error {
            item.last_error = Some(last_error);
        }
        Ok(())
    }

    fn remove(&mut self, id: u64) {
        self.rows.remove(&id);
    }

    /// Items oldest first
    pub fn all(&self) -> Vec<QueueItem> {
        self.rows.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttendanceStatus, EntityKind, QueueAction};

    fn new_attendance(student_id: u64, day: u32) -> NewAttendance {
        NewAttendance {
            student_id,
            student_name: format!("student-{}", student_id),
            date: NaiveDate::from_ymd_opt(2024, 7, day).unwrap(),
            status: AttendanceStatus::Present,
            time_in: None,
            note: None,
        }
    }

    #[test]
    fn attendance_ids_increment_from_one() {
        let mut schema = Schema::default();
        let a = schema.append_attendance(new_attendance(1, 1), Utc::now());
        let b = schema.append_attendance(new_attendance(2, 1), Utc::now());
        assert_eq!((a, b), (1, 2));
    }

    #[test]
    fn mark_synced_is_idempotent() {
        let mut schema = Schema::default();
        let id = schema.append_attendance(new_attendance(1, 1), Utc::now());

        schema.mark_synced(id).unwrap();
        let snapshot = schema.clone();
        schema.mark_synced(id).unwrap();

        assert_eq!(schema.counts(), snapshot.counts());
        assert!(schema.attendance.rows[&id].synced);
    }

    #[test]
    fn mark_synced_unknown_id_is_an_error() {
        let mut schema = Schema::default();
        assert!(matches!(schema.mark_synced(99), Err(Error::NotFound(_))));
    }

    #[test]
    fn cleanup_spares_unsynced_records_regardless_of_age() {
        let mut schema = Schema::default();
        let old = Utc::now() - chrono::Duration::days(90);

        let stale_synced = schema.append_attendance(new_attendance(1, 1), old);
        let stale_unsynced = schema.append_attendance(new_attendance(2, 1), old);
        let fresh = schema.append_attendance(new_attendance(3, 1), Utc::now());
        schema.mark_synced(stale_synced).unwrap();
        schema.mark_synced(fresh).unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(30);
        let deleted = schema.cleanup(cutoff);

        assert_eq!(deleted, 1);
        assert!(!schema.attendance.rows.contains_key(&stale_synced));
        assert!(schema.attendance.rows.contains_key(&stale_unsynced));
        assert!(schema.attendance.rows.contains_key(&fresh));
    }

    #[test]
    fn indexes_survive_a_serde_round_trip() {
        let mut schema = Schema::default();
        let a = schema.append_attendance(new_attendance(1, 1), Utc::now());
        let _b = schema.append_attendance(new_attendance(2, 1), Utc::now());
        schema.mark_synced(a).unwrap();

        let json = serde_json::to_string(&schema).unwrap();
        let mut reloaded: Schema = serde_json::from_str(&json).unwrap();
        assert!(!reloaded.finalize_loaded().unwrap());

        let unsynced = reloaded.attendance.unsynced_records();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].student_id, 2);

        // next_id keeps counting after reload
        let c = reloaded.append_attendance(new_attendance(3, 2), Utc::now());
        assert_eq!(c, 3);
    }

    #[test]
    fn v1_schema_migrates_forward() {
        let json = serde_json::json!({
            "version": 1,
            "students": {},
            "attendance": { "next_id": 0, "rows": {} },
            "queue": { "next_id": 0, "rows": {} }
        });

        let mut schema: Schema = serde_json::from_value(json).unwrap();
        assert!(schema.finalize_loaded().unwrap());
        assert_eq!(schema.version, SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_version_is_rejected() {
        let mut schema = Schema {
            version: SCHEMA_VERSION + 1,
            ..Schema::default()
        };
        assert!(schema.finalize_loaded().is_err());
    }

    #[test]
    fn queue_iterates_oldest_first_and_patches() {
        let mut schema = Schema::default();
        let first = schema.enqueue(
            NewQueueItem {
                entity: EntityKind::Attendance,
                action: QueueAction::Create,
                payload: serde_json::json!({ "student_id": 7 }),
            },
            Utc::now(),
        );
        let second = schema.enqueue(
            NewQueueItem {
                entity: EntityKind::Payment,
                action: QueueAction::Update,
                payload: serde_json::json!({}),
            },
            Utc::now(),
        );

        let items = schema.queue.all();
        assert_eq!(items[0].id, first);
        assert_eq!(items[1].id, second);

        schema
            .update_queue_item(
                first,
                QueueItemPatch {
                    retry_count: Some(1),
                    last_error: Some("timeout".into()),
                },
            )
            .unwrap();

        let items = schema.queue.all();
        assert_eq!(items[0].retry_count, 1);
        assert_eq!(items[0].last_error.as_deref(), Some("timeout"));
    }
}
