//! Test doubles and common utilities for sync contract tests
//!
//! This module provides controlled doubles for the remote API and the
//! worker's network side, so tests can script failures and count calls
//! without any real I/O.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use studyroom_core::error::Result;
use studyroom_core::model::{
    AttendanceStatus, CachedStudent, EntityKind, NewAttendance, QueueAction,
};
use studyroom_core::traits::{ApiAck, AttendanceUpsert, RemoteApi, StudentFilter};
use studyroom_core::worker::{NetworkFetch, Request, Response};
use studyroom_core::Error;

/// A mock RemoteApi with scripted failures and call counters
#[derive(Default)]
pub struct MockRemoteApi {
    /// Number of mark_attendance() calls
    mark_calls: AtomicUsize,
    /// Number of submit() calls
    submit_calls: AtomicUsize,
    /// Number of get_students() calls
    student_calls: AtomicUsize,
    /// Fail the next N mark_attendance() calls
    fail_marks: AtomicUsize,
    /// Fail the next N submit() calls
    fail_submits: AtomicUsize,
    /// Artificial latency per call, for overlap tests
    delay: std::sync::Mutex<Option<Duration>>,
    /// Roster returned by get_students()
    roster: std::sync::Mutex<Vec<CachedStudent>>,
    /// Every accepted attendance body, in call order
    marked: std::sync::Mutex<Vec<AttendanceUpsert>>,
    /// Every accepted queue intent, in call order
    submitted: std::sync::Mutex<Vec<(EntityKind, QueueAction, Value)>>,
}

impl MockRemoteApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_call_count(&self) -> usize {
        self.mark_calls.load(Ordering::SeqCst)
    }

    pub fn submit_call_count(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn student_call_count(&self) -> usize {
        self.student_calls.load(Ordering::SeqCst)
    }

    /// Script the next `n` mark_attendance() calls to fail
    pub fn fail_next_marks(&self, n: usize) {
        self.fail_marks.store(n, Ordering::SeqCst);
    }

    /// Script the next `n` submit() calls to fail
    pub fn fail_next_submits(&self, n: usize) {
        self.fail_submits.store(n, Ordering::SeqCst);
    }

    /// Add artificial latency to every call
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Set the roster returned by get_students()
    pub fn set_roster(&self, roster: Vec<CachedStudent>) {
        *self.roster.lock().unwrap() = roster;
    }

    pub fn marked(&self) -> Vec<AttendanceUpsert> {
        self.marked.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<(EntityKind, QueueAction, Value)> {
        self.submitted.lock().unwrap().clone()
    }

    async fn maybe_delay(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn take_scripted_failure(&self, counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RemoteApi for MockRemoteApi {
    async fn mark_attendance(&self, body: &AttendanceUpsert) -> Result<ApiAck> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;

        if self.take_scripted_failure(&self.fail_marks) {
            return Err(Error::api("/api/v1/attendance", "scripted failure"));
        }

        self.marked.lock().unwrap().push(body.clone());
        Ok(ApiAck {
            remote_id: Some(1),
            data: serde_json::json!({ "id": 1 }),
        })
    }

    async fn update_attendance(&self, id: u64, body: &AttendanceUpsert) -> Result<ApiAck> {
        self.maybe_delay().await;
        self.marked.lock().unwrap().push(body.clone());
        Ok(ApiAck {
            remote_id: Some(id),
            data: serde_json::json!({ "id": id }),
        })
    }

    async fn get_students(&self, _filter: &StudentFilter) -> Result<Vec<CachedStudent>> {
        self.student_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;
        Ok(self.roster.lock().unwrap().clone())
    }

    async fn submit(
        &self,
        entity: EntityKind,
        action: QueueAction,
        payload: &Value,
    ) -> Result<ApiAck> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;

        if self.take_scripted_failure(&self.fail_submits) {
            return Err(Error::api("/api/v1", "scripted failure"));
        }

        self.submitted
            .lock()
            .unwrap()
            .push((entity, action, payload.clone()));
        Ok(ApiAck::default())
    }
}

/// An in-memory network double for the interception worker
#[derive(Default)]
pub struct ScriptedFetch {
    routes: std::sync::Mutex<HashMap<String, Response>>,
    /// When set, every fetch fails as if the network were unreachable
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedFetch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `response` for GETs of `path`
    pub fn route(&self, path: &str, response: Response) {
        self.routes.lock().unwrap().insert(path.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkFetch for ScriptedFetch {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::worker("network unreachable"));
        }

        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(request.cache_key())
            .cloned()
            .unwrap_or(Response {
                status: 404,
                content_type: "text/plain".to_string(),
                body: "not found".to_string(),
            }))
    }
}

/// Wrapper so tests can share one double across Arc seams
pub struct SharedFetch(pub Arc<ScriptedFetch>);

#[async_trait]
impl NetworkFetch for SharedFetch {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.0.fetch(request).await
    }
}

/// An attendance capture for the given student on the given day
pub fn capture(student_id: u64, day: u32) -> NewAttendance {
    NewAttendance {
        student_id,
        student_name: format!("student-{}", student_id),
        date: chrono::NaiveDate::from_ymd_opt(2024, 7, day).unwrap(),
        status: AttendanceStatus::Present,
        time_in: Some("16:00".to_string()),
        note: None,
    }
}

/// A roster entry
pub fn student(id: u64, name: &str) -> CachedStudent {
    CachedStudent {
        id,
        name: name.to_string(),
        status: "active".to_string(),
        extra: Value::Null,
    }
}
