//! Core sync engine
//!
//! The SyncEngine is responsible for:
//! - Capturing attendance optimistically (direct call when online,
//!   local commit when not)
//! - Draining pending local state against the remote API
//! - Resolving duplicate offline records deterministically
//! - Publishing observable status to subscribers
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ ConnectivitySrc  │── ConnectivityEvent ──┐
//! └──────────────────┘                       │
//! ┌──────────────────┐                       ▼
//! │ Worker / UI      │── SyncTrigger ──▶ ┌────────────┐
//! └──────────────────┘                   │ SyncEngine │
//!                                        └────────────┘
//!                                               │
//!                    ┌──────────────────────────┼──────────────────────┐
//!                    ▼                          ▼                      ▼
//!            ┌──────────────┐           ┌─────────────┐        ┌─────────────┐
//!            │ OfflineStore │           │  RemoteApi  │        │ SyncStatus  │
//!            │ (pending)    │           │  (replay)   │        │ (publish)   │
//!            └──────────────┘           └─────────────┘        └─────────────┘
//! ```
//!
//! ## Sync pass
//!
//! 1. Guard: online and not already syncing, else skip
//! 2. Replay each unsynced attendance record in isolation
//! 3. Drain the generic queue oldest first
//! 4. Recompute counts, stamp the pass time, publish a snapshot
//!
//! The engine is stateless between passes: every pass re-reads the store,
//! which remains the single source of truth.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::Error;
use crate::config::EngineConfig;
use crate::model::{
    CachedStudent, EntityKind, NewAttendance, OfflineAttendance, QueueAction, QueueItem,
    QueueItemPatch, SyncStatus,
};
use crate::traits::{AttendanceUpsert, ConnectivitySource, OfflineStore, RemoteApi, StudentFilter};

/// Why a requested sync pass did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The device is offline
    Offline,
    /// Another pass is already running; the trigger is dropped, not queued
    AlreadySyncing,
}

/// Result of one sync pass
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The pass did not run
    Skipped(SkipReason),
    /// The pass ran to completion, possibly with partial failure
    Completed {
        /// Records and queue items accepted by the remote API
        synced: usize,
        /// Records and queue items whose replay failed (they remain
        /// eligible for the next pass)
        failed: usize,
        errors: Vec<String>,
    },
}

/// How an attendance capture was committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The remote API accepted the record directly
    Remote,
    /// Committed locally; will converge on a later pass
    Local {
        /// Store-assigned id of the pending record
        local_id: u64,
    },
}

/// A sync trigger delivered to the engine's run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Background-sync signal relayed from the interception worker
    Background,
    /// Explicit user-initiated retry
    Manual,
}

/// Cloneable handle for delivering triggers to a running engine
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncTrigger>,
}

impl SyncHandle {
    /// Request a sync pass. Best effort: if the engine is busy and the
    /// channel is full the trigger is dropped — the periodic timer will
    /// pick up any remaining work.
    pub fn trigger(&self, trigger: SyncTrigger) {
        if self.tx.try_send(trigger).is_err() {
            debug!(?trigger, "trigger channel full, dropping sync trigger");
        }
    }
}

/// Core sync engine
///
/// Explicitly constructed and dependency-injected; no global singletons.
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Start the event loop with [`SyncEngine::run()`]
/// 3. The loop runs until a shutdown signal is received
///
/// All engine methods can also be called directly without the loop
/// (UI-driven capture, manual maintenance passes, tests).
pub struct SyncEngine {
    store: Arc<dyn OfflineStore>,
    api: Arc<dyn RemoteApi>,
    connectivity: Box<dyn ConnectivitySource>,
    config: EngineConfig,

    /// Published status; `watch` delivers the current snapshot to new
    /// subscribers immediately and every mutation thereafter
    status_tx: watch::Sender<SyncStatus>,

    /// Single-flight guard: at most one pass at any instant
    syncing: AtomicBool,

    trigger_tx: mpsc::Sender<SyncTrigger>,
    /// Taken by the run loop; running twice is a usage error
    trigger_rx: Mutex<Option<mpsc::Receiver<SyncTrigger>>>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, status receiver); the receiver observes the
    /// initial status immediately and every subsequent change.
    pub fn new(
        store: Arc<dyn OfflineStore>,
        api: Arc<dyn RemoteApi>,
        connectivity: Box<dyn ConnectivitySource>,
        config: EngineConfig,
    ) -> Result<(Self, watch::Receiver<SyncStatus>), Error> {
        config.validate()?;

        let (status_tx, status_rx) = watch::channel(SyncStatus::default());
        let (trigger_tx, trigger_rx) = mpsc::channel(config.trigger_channel_capacity);

        let engine = Self {
            store,
            api,
            connectivity,
            config,
            status_tx,
            syncing: AtomicBool::new(false),
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
        };

        Ok((engine, status_rx))
    }

    /// Subscribe to status snapshots
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// The current status snapshot
    pub fn status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    /// A cloneable handle for delivering sync triggers to the run loop
    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            tx: self.trigger_tx.clone(),
        }
    }

    /// Query the connectivity source and mirror the result into the
    /// published status. The run loop does this at startup; direct users
    /// of [`sync_pass`](Self::sync_pass) may need it too.
    pub async fn refresh_connectivity(&self) -> Result<bool, Error> {
        let online = self.connectivity.current().await.unwrap_or(false);
        self.set_online(online);
        Ok(online)
    }

    /// Mirror a connectivity state into the published status immediately
    /// (no debounce).
    pub fn set_online(&self, online: bool) {
        self.status_tx.send_modify(|status| status.is_online = online);
    }

    /// Capture an attendance action, optimistically.
    ///
    /// Online: try the direct API call first. Offline, or when the direct
    /// call fails: commit locally with `synced = false`. From the UI's
    /// perspective the capture always succeeds immediately; convergence
    /// risk surfaces only through the status indicator. Errors here mean
    /// the local store itself failed.
    pub async fn capture_attendance(&self, new: NewAttendance) -> Result<CaptureOutcome, Error> {
        if self.status().is_online {
            let body = upsert_of(&new);
            match self.api.mark_attendance(&body).await {
                Ok(_) => {
                    debug!(student_id = new.student_id, "attendance accepted directly");
                    return Ok(CaptureOutcome::Remote);
                }
                Err(e) => {
                    warn!(
                        student_id = new.student_id,
                        "direct attendance call failed ({}), committing locally", e
                    );
                }
            }
        }

        let local_id = self.store.append_attendance(new).await?;
        self.refresh_pending().await;

        // The record itself is the replay source; a pass will pick it up
        if self.status().is_online {
            self.handle().trigger(SyncTrigger::Manual);
        }

        Ok(CaptureOutcome::Local { local_id })
    }

    /// Fetch the roster with offline support.
    ///
    /// Online: fetch from the API and replace the cache wholesale.
    /// Offline or fetch failure: serve the cached roster.
    pub async fn refresh_students(
        &self,
        filter: &StudentFilter,
    ) -> Result<Vec<CachedStudent>, Error> {
        if self.status().is_online {
            match self.api.get_students(filter).await {
                Ok(students) => {
                    if let Err(e) = self.store.replace_students(students.clone()).await {
                        warn!("failed to cache roster: {}", e);
                    }
                    return Ok(students);
                }
                Err(e) => {
                    debug!("roster fetch failed ({}), falling back to cache", e);
                }
            }
        }

        self.store.students().await
    }

    /// Run one sync pass.
    ///
    /// Skips (without queueing the trigger) when offline or when another
    /// pass is running. Failures never abort the pass: each record and
    /// queue item is attempted in isolation and errors accumulate into
    /// the published status.
    pub async fn sync_pass(&self) -> SyncOutcome {
        if !self.status().is_online {
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sync pass already running, dropping trigger");
            return SyncOutcome::Skipped(SkipReason::AlreadySyncing);
        }

        self.status_tx.send_modify(|status| {
            status.is_syncing = true;
            status.errors.clear();
        });

        let mut synced = 0usize;
        let mut failed = 0usize;
        let mut errors = Vec::new();

        self.replay_attendance(&mut synced, &mut failed, &mut errors)
            .await;
        self.drain_queue(&mut synced, &mut failed, &mut errors).await;

        let pending = self.pending_count().await;
        self.status_tx.send_modify(|status| {
            status.is_syncing = false;
            status.last_sync_time = Some(chrono::Utc::now());
            status.pending_count = pending;
            status.failed_count = failed;
            status.errors = errors.clone();
        });
        self.syncing.store(false, Ordering::SeqCst);

        info!(synced, failed, pending, "sync pass completed");
        SyncOutcome::Completed {
            synced,
            failed,
            errors,
        }
    }

    /// Phase 1: replay unsynced attendance records as create calls, one
    /// at a time, in store read order.
    async fn replay_attendance(
        &self,
        synced: &mut usize,
        failed: &mut usize,
        errors: &mut Vec<String>,
    ) {
        let records = match self.store.list_unsynced_attendance().await {
            Ok(records) => records,
            Err(e) => {
                error!("failed to read unsynced attendance: {}", e);
                errors.push(format!("store read failed: {}", e));
                return;
            }
        };

        debug!(count = records.len(), "replaying unsynced attendance");
        for record in records {
            match self.api.mark_attendance(&record_upsert(&record)).await {
                Ok(_) => {
                    if let Err(e) = self.store.mark_synced(record.local_id).await {
                        // The server has the record; leaving it unsynced
                        // risks a duplicate next pass, so surface loudly
                        error!(local_id = record.local_id, "failed to flag record synced: {}", e);
                        errors.push(format!("mark synced failed for {}: {}", record.local_id, e));
                        *failed += 1;
                    } else {
                        *synced += 1;
                    }
                }
                Err(e) => {
                    // Record stays untouched and eligible for the next pass
                    warn!(local_id = record.local_id, "attendance replay failed: {}", e);
                    errors.push(format!(
                        "attendance sync failed: {} {} ({})",
                        record.student_name, record.date, e
                    ));
                    *failed += 1;
                }
            }
        }
    }

    /// Phase 2: drain the generic queue oldest first. Success removes
    /// the item; failure increments its retry count and stores the error
    /// text. No backoff and no retry ceiling — failed items stay visible
    /// until they succeed or are removed manually.
    async fn drain_queue(&self, synced: &mut usize, failed: &mut usize, errors: &mut Vec<String>) {
        let items = match self.store.list_queue().await {
            Ok(items) => items,
            Err(e) => {
                error!("failed to read sync queue: {}", e);
                errors.push(format!("queue read failed: {}", e));
                return;
            }
        };

        debug!(count = items.len(), "draining sync queue");
        for item in items {
            match self.api.submit(item.entity, item.action, &item.payload).await {
                Ok(_) => {
                    self.settle_queue_item(&item).await;
                    *synced += 1;
                }
                Err(e) => {
                    warn!(id = item.id, retry = item.retry_count + 1, "queue replay failed: {}", e);
                    let patch = QueueItemPatch {
                        retry_count: Some(item.retry_count + 1),
                        last_error: Some(e.to_string()),
                    };
                    if let Err(patch_err) = self.store.update_queue_item(item.id, patch).await {
                        error!(id = item.id, "failed to record replay failure: {}", patch_err);
                    }
                    errors.push(format!("queue item {} failed: {}", item.id, e));
                    *failed += 1;
                }
            }
        }
    }

    /// Remove a successfully replayed queue item, flagging the offline
    /// record it referenced (if any) as synced first.
    async fn settle_queue_item(&self, item: &QueueItem) {
        if item.entity == EntityKind::Attendance && item.action == QueueAction::Create {
            if let Some(local_id) = item.payload.get("offline_id").and_then(|v| v.as_u64()) {
                if let Err(e) = self.store.mark_synced(local_id).await {
                    debug!(local_id, "offline record already settled: {}", e);
                }
            }
        }
        if let Err(e) = self.store.remove_queue_item(item.id).await {
            error!(id = item.id, "failed to remove replayed queue item: {}", e);
        }
    }

    /// Deterministic duplicate reduction: group attendance by
    /// `(student_id, date)` and keep only the most recently captured
    /// record per group, hard-deleting the rest.
    ///
    /// An explicit maintenance pass, not part of every sync pass.
    /// Returns the number of records deleted.
    pub async fn resolve_conflicts(&self) -> Result<usize, Error> {
        let records = self.store.list_attendance().await?;

        let mut groups: std::collections::HashMap<_, Vec<OfflineAttendance>> =
            std::collections::HashMap::new();
        for record in records {
            groups.entry(record.slot()).or_default().push(record);
        }

        let mut deleted = 0usize;
        for (slot, mut group) in groups {
            if group.len() < 2 {
                continue;
            }
            // Most recent capture wins; local id breaks timestamp ties
            group.sort_by(|a, b| {
                b.captured_at
                    .cmp(&a.captured_at)
                    .then(b.local_id.cmp(&a.local_id))
            });
            debug!(?slot, conflicts = group.len(), keep = group[0].local_id, "resolving duplicates");

            for stale in &group[1..] {
                self.store.delete_attendance(stale.local_id).await?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!(deleted, "conflict resolution removed duplicate records");
        }
        self.refresh_pending().await;
        Ok(deleted)
    }

    /// Retention sweep: delete synced attendance older than the
    /// configured window, then refresh the pending counts.
    pub async fn cleanup(&self) -> Result<usize, Error> {
        let deleted = self
            .store
            .cleanup(chrono::Duration::days(self.config.retention_days))
            .await?;
        self.refresh_pending().await;
        Ok(deleted)
    }

    async fn pending_count(&self) -> usize {
        match self.store.status().await {
            Ok(status) => status.unsynced + status.queue,
            Err(e) => {
                warn!("failed to read store status: {}", e);
                self.status_tx.borrow().pending_count
            }
        }
    }

    async fn refresh_pending(&self) {
        let pending = self.pending_count().await;
        self.status_tx
            .send_modify(|status| status.pending_count = pending);
    }

    /// Run the engine's event loop until shutdown.
    ///
    /// Triggers a pass on: offline→online transition, a received trigger
    /// (background sync or manual retry), and the periodic timer while
    /// online. Pass errors are absorbed into status; nothing here is
    /// fatal.
    pub async fn run(&self) -> Result<(), Error> {
        self.run_internal(None).await
    }

    /// Internal run implementation that accepts an optional shutdown
    /// signal (for testing).
    async fn run_internal(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<(), Error> {
        let mut trigger_rx = self
            .trigger_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::config("sync engine is already running"))?;

        let online = self.refresh_connectivity().await?;
        self.refresh_pending().await;
        info!(online, "sync engine started");

        let mut conn_stream = self.connectivity.watch();
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.periodic_interval_secs,
        ));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The immediate first tick doubles as the startup sync attempt
        if let Some(mut rx) = shutdown_rx {
            // Test mode: wait for the provided shutdown signal
            loop {
                tokio::select! {
                    Some(event) = conn_stream.next() => self.handle_connectivity(event).await,
                    Some(trigger) = trigger_rx.recv() => self.handle_trigger(trigger).await,
                    _ = interval.tick() => { self.sync_pass().await; }
                    _ = &mut rx => {
                        info!("shutdown signal received");
                        break;
                    }
                }
            }
        } else {
            // Production mode: wait for SIGINT/SIGTERM
            loop {
                tokio::select! {
                    Some(event) = conn_stream.next() => self.handle_connectivity(event).await,
                    Some(trigger) = trigger_rx.recv() => self.handle_trigger(trigger).await,
                    _ = interval.tick() => { self.sync_pass().await; }
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutdown signal received");
                        break;
                    }
                }
            }
        }

        self.store.flush().await?;
        info!("store flushed, sync engine stopped");
        Ok(())
    }

    async fn handle_connectivity(&self, event: crate::traits::ConnectivityEvent) {
        info!(online = event.online, "connectivity changed");
        self.set_online(event.online);
        if event.came_online() {
            self.sync_pass().await;
        }
    }

    async fn handle_trigger(&self, trigger: SyncTrigger) {
        debug!(?trigger, "sync trigger received");
        self.sync_pass().await;
    }

    /// Test-only helper to run the engine with a controlled shutdown
    /// signal.
    ///
    /// **TESTING ONLY**: contract tests require deterministic shutdown.
    /// Production code should use `run()`, which manages shutdown via OS
    /// signals.
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<(), Error> {
        self.run_internal(shutdown_rx).await
    }
}

fn upsert_of(new: &NewAttendance) -> AttendanceUpsert {
    AttendanceUpsert {
        student_id: new.student_id,
        date: new.date,
        status: new.status,
        time_in: new.time_in.clone(),
        note: new.note.clone(),
    }
}

fn record_upsert(record: &OfflineAttendance) -> AttendanceUpsert {
    AttendanceUpsert {
        student_id: record.student_id,
        date: record.date,
        status: record.status,
        time_in: record.time_in.clone(),
        note: record.note.clone(),
    }
}
