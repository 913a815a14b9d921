// # File Store
//
// File-backed implementation of OfflineStore with crash recovery.
//
// ## Purpose
//
// Keeps offline captures and the sync queue durable across app restarts
// and crashes, so attendance recorded without connectivity is never lost.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Corruption detection: JSON validation on load
// - Automatic backup: keeps .backup of last known good state
// - Recovery: falls back to backup if corruption detected
//
// ## Transactions
//
// Each mutating operation stages the change on a clone of the schema,
// persists the clone, and only then swaps it in. A failed write leaves
// the in-memory model and the file unchanged, so callers can treat any
// error as "nothing happened".

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::{
    CachedStudent, NewAttendance, NewQueueItem, OfflineAttendance, QueueItem, QueueItemPatch,
    StoreStatus,
};
use crate::store::tables::Schema;
use crate::traits::OfflineStore;

/// File-backed offline store with crash recovery
///
/// Persists the full schema to a JSON file with atomic writes and
/// automatic corruption recovery. Cheap to clone the in-memory model:
/// a single device's roster, captures and queue stay small.
///
/// # Example
///
/// ```rust,no_run
/// use studyroom_core::store::FileStore;
/// use studyroom_core::traits::OfflineStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStore::new("/var/lib/studyroom/offline.json").await?;
///     let status = store.status().await?;
///     println!("{} unsynced records", status.unsynced);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: Arc<RwLock<Schema>>,
}

impl FileStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing store file
    /// 3. If corruption is detected, try the backup
    /// 4. If both fail, start with an empty schema
    /// 5. Run the schema migration step and persist it if it changed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::store(format!(
                        "failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let mut schema = Self::load_with_recovery(&path).await?;
        let migrated = schema.finalize_loaded()?;
        if migrated {
            Self::write_schema(&path, &schema).await?;
        }

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(schema)),
        })
    }

    /// Load the schema with automatic recovery.
    ///
    /// Strategy: main file, then backup on parse failure, then empty.
    /// I/O errors other than corruption propagate.
    async fn load_with_recovery(path: &Path) -> Result<Schema, Error> {
        match Self::load_schema(path).await {
            Ok(schema) => Ok(schema),
            Err(Error::Json(parse_err)) => {
                tracing::warn!(
                    "store file appears corrupted: {}. attempting recovery from backup",
                    parse_err
                );

                let backup = Self::backup_path(path);
                if !backup.exists() {
                    tracing::warn!("no backup file found, starting with empty store");
                    return Ok(Schema::default());
                }

                match Self::load_schema(&backup).await {
                    Ok(schema) => {
                        tracing::info!("recovered store from backup");
                        if let Err(e) = fs::copy(&backup, path).await {
                            tracing::error!("failed to restore store file from backup: {}", e);
                        }
                        Ok(schema)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "backup also unreadable: {}. starting with empty store",
                            backup_err
                        );
                        Ok(Schema::default())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load_schema(path: &Path) -> Result<Schema, Error> {
        if !path.exists() {
            tracing::debug!("store file does not exist: {}", path.display());
            return Ok(Schema::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!(
                "failed to read store file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(serde_json::from_str(&content)?)
    }

    /// Write the schema to disk atomically (temp file, backup, rename)
    async fn write_schema(path: &Path, schema: &Schema) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(schema)
            .map_err(|e| Error::transaction(format!("failed to serialize store: {}", e)))?;

        let temp_path = {
            let mut temp = path.to_path_buf();
            temp.set_extension("tmp");
            temp
        };

        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::transaction(format!(
                    "failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::transaction(format!(
                    "failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::transaction(format!(
                    "failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Keep the last known good state around for corruption recovery
        if path.exists() {
            let backup = Self::backup_path(path);
            if let Err(e) = fs::copy(path, &backup).await {
                tracing::warn!("failed to create store backup: {}", e);
            }
        }

        fs::rename(&temp_path, path).await.map_err(|e| {
            Error::transaction(format!(
                "failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::trace!("store written to {}", path.display());
        Ok(())
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Run a mutating operation as one transaction: stage on a clone,
    /// persist, then swap in. Errors leave memory and disk unchanged.
    async fn with_txn<T>(&self, op: impl FnOnce(&mut Schema) -> Result<T, Error>) -> Result<T, Error> {
        let mut guard = self.state.write().await;
        let mut staged = guard.clone();
        let out = op(&mut staged)?;
        Self::write_schema(&self.path, &staged).await?;
        *guard = staged;
        Ok(out)
    }
}

#[async_trait]
impl OfflineStore for FileStore {
    async fn replace_students(&self, students: Vec<CachedStudent>) -> Result<(), Error> {
        let count = students.len();
        self.with_txn(|schema| {
            schema.replace_students(students);
            Ok(())
        })
        .await?;
        tracing::debug!(count, "roster cache replaced");
        Ok(())
    }

    async fn students(&self) -> Result<Vec<CachedStudent>, Error> {
        let guard = self.state.read().await;
        Ok(guard.students.values().cloned().collect())
    }

    async fn student(&self, id: u64) -> Result<Option<CachedStudent>, Error> {
        let guard = self.state.read().await;
        Ok(guard.students.get(&id).cloned())
    }

    async fn append_attendance(&self, new: NewAttendance) -> Result<u64, Error> {
        let local_id = self
            .with_txn(|schema| Ok(schema.append_attendance(new, Utc::now())))
            .await?;
        tracing::debug!(local_id, "offline attendance appended");
        Ok(local_id)
    }

    async fn list_attendance(&self) -> Result<Vec<OfflineAttendance>, Error> {
        let guard = self.state.read().await;
        Ok(guard.attendance.all())
    }

    async fn list_unsynced_attendance(&self) -> Result<Vec<OfflineAttendance>, Error> {
        let guard = self.state.read().await;
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
        let id = self
            .with_txn(|schema| Ok(schema.enqueue(new, Utc::now())))
            .await?;
        tracing::debug!(id, "queue item enqueued");
        Ok(id)
    }

    async fn list_queue(&self) -> Result<Vec<QueueItem>, Error> {
        let guard = self.state.read().await;
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
        let deleted = self.with_txn(|schema| Ok(schema.cleanup(cutoff))).await?;
        if deleted > 0 {
            tracing::info!(deleted, "retention cleanup removed synced records");
        }
        Ok(deleted)
    }

    async fn status(&self) -> Result<StoreStatus, Error> {
        let guard = self.state.read().await;
        Ok(guard.counts())
    }

    async fn flush(&self) -> Result<(), Error> {
        let guard = self.state.read().await;
        Self::write_schema(&self.path, &guard).await
    }
}
