// # Remote API Trait
//
// Defines the calls this subsystem issues against the tutoring backend.
// The backend itself is a black box reachable over request/response calls;
// only the surface consumed by sync is modeled here.
//
// ## Implementations
//
// - HTTP/REST: `studyroom-api-http` crate
//
// ## Trust boundaries
//
// Implementations are stateless single-shot callers:
// - No retry logic or backoff (owned by the sync engine)
// - No access to the local store (owned by the engine)
// - Timeout semantics belong to the client, not the engine; a hung call
//   hangs the current pass step

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{AttendanceStatus, CachedStudent, EntityKind, QueueAction};

/// Acknowledgement returned by a successful remote mutation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiAck {
    /// Server-assigned id of the created/updated entity, when reported
    pub remote_id: Option<u64>,
    /// Raw response payload, for callers that need more than the id
    pub data: serde_json::Value,
}

/// Body of an attendance create/update call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceUpsert {
    pub student_id: u64,
    pub date: chrono::NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Filter applied to a roster fetch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudentFilter {
    /// Restrict to active roster members
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// Server-side name search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl StudentFilter {
    /// Filter for active roster members only
    pub fn active() -> Self {
        Self {
            is_active: Some(true),
            search: None,
        }
    }
}

/// Trait for remote API client implementations
///
/// All methods are single API calls. A `success: false` envelope from the
/// backend is an error, not an `Ok`; the engine decides what to do with it.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Create an attendance record (the offline-replay fast path)
    async fn mark_attendance(&self, body: &AttendanceUpsert) -> Result<ApiAck, crate::Error>;

    /// Update an existing attendance record
    async fn update_attendance(
        &self,
        id: u64,
        body: &AttendanceUpsert,
    ) -> Result<ApiAck, crate::Error>;

    /// Fetch the roster; source of truth for the replace-all cache refresh
    async fn get_students(&self, filter: &StudentFilter)
    -> Result<Vec<CachedStudent>, crate::Error>;

    /// Dispatch a generic queue intent to the appropriate remote call
    ///
    /// Used by queue replay: the engine does not interpret payloads, it
    /// hands `(entity, action, payload)` to the client, which maps them to
    /// an endpoint and method.
    async fn submit(
        &self,
        entity: EntityKind,
        action: QueueAction,
        payload: &serde_json::Value,
    ) -> Result<ApiAck, crate::Error>;
}
