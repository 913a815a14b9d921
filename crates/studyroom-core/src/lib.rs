// # studyroom-core
//
// Core library for the offline-first sync subsystem of the StudyRoom
// attendance app.
//
// ## Architecture Overview
//
// - **OfflineStore**: Trait for the transactional local store (roster
//   cache, offline attendance, generic sync queue)
// - **RemoteApi**: Trait for the backend API the pending data replays
//   against
// - **ConnectivitySource**: Trait for online/offline detection and
//   transition events
// - **SyncEngine**: Orchestrates capture → persist → replay → status
// - **Worker**: Network-interception layer (cache-first shell,
//   network-first API, background-sync and push relay)
//
// ## Design Principles
//
// 1. **Local-first**: every capture commits locally before the network
//    is consulted; the store is the single source of truth
// 2. **Separation of Concerns**: core logic is separate from the HTTP
//    implementations, which live in sibling crates
// 3. **Event-Driven**: connectivity transitions and sync triggers drive
//    the engine through async streams and channels
// 4. **Nothing is fatal**: network and replay failures degrade into
//    observable status, never into process errors

pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod model;
pub mod store;
pub mod traits;
pub mod worker;

// Re-export core types for convenience
pub use config::{AppConfig, EngineConfig, StoreConfig, WorkerConfig};
pub use connectivity::{ConnectivityHandle, SignalConnectivity, signal_pair};
pub use engine::{CaptureOutcome, SkipReason, SyncEngine, SyncHandle, SyncOutcome, SyncTrigger};
pub use error::{Error, Result};
pub use model::{
    AttendanceStatus, CachedStudent, EntityKind, NewAttendance, NewQueueItem, OfflineAttendance,
    QueueAction, QueueItem, QueueItemPatch, StoreStatus, SyncStatus,
};
pub use store::{FileStore, MemoryStore};
pub use traits::{
    ApiAck, AttendanceUpsert, ConnectivityEvent, ConnectivitySource, OfflineStore, RemoteApi,
    StudentFilter,
};
pub use worker::{ClickAction, Notification, PageMessage, Worker, WorkerHandle};
