// # Fetch Types and Network Seam
//
// Request/response model for the interception worker.
//
// ## Purpose
//
// The worker routes requests between cache and network without knowing
// how either side is implemented. `NetworkFetch` is the seam: production
// hosts back it with a real HTTP client, tests with a scripted double.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Error;

/// HTTP method of an intercepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    /// Only GET responses are cacheable
    pub fn cacheable(self) -> bool {
        self == Method::Get
    }
}

/// An intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Path component, e.g. `/api/v1/students?is_active=true`
    pub path: String,
    /// Whether this is a page navigation (top-level document load)
    pub navigation: bool,
}

impl Request {
    /// A plain GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            navigation: false,
        }
    }

    /// A top-level navigation request
    pub fn navigate(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            navigation: true,
        }
    }

    /// A request with an arbitrary method
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            navigation: false,
        }
    }

    /// Cache key for this request: the full path, query string included,
    /// so `?is_active=true` and `?search=kim` cache independently
    pub fn cache_key(&self) -> &str {
        &self.path
    }

    /// Path with any query string stripped, for route matching
    pub fn path_without_query(&self) -> &str {
        match self.path.split_once('?') {
            Some((path, _)) => path,
            None => &self.path,
        }
    }
}

/// A response flowing back to the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl Response {
    /// A 200 response with an arbitrary content type
    pub fn ok(content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// A 200 JSON response
    pub fn json(body: impl Into<String>) -> Self {
        Self::ok("application/json", body)
    }

    /// The synthesized 503 body served when an API request cannot be
    /// satisfied from network or cache
    pub fn offline() -> Self {
        Self {
            status: 503,
            content_type: "application/json".to_string(),
            body: serde_json::json!({
                "success": false,
                "error": "offline",
                "message": "You are offline. Changes will sync when the connection returns.",
            })
            .to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network side of the worker
#[async_trait]
pub trait NetworkFetch: Send + Sync {
    /// Perform the request against the real network
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_get_is_cacheable() {
        assert!(Method::Get.cacheable());
        assert!(!Method::Post.cacheable());
        assert!(!Method::Put.cacheable());
    }

    #[test]
    fn cache_key_keeps_the_query_string() {
        let request = Request::get("/api/v1/students?is_active=true");
        assert_eq!(request.cache_key(), "/api/v1/students?is_active=true");
        assert_eq!(request.path_without_query(), "/api/v1/students");

        let request = Request::get("/attendance");
        assert_eq!(request.cache_key(), "/attendance");
        assert_eq!(request.path_without_query(), "/attendance");
    }

    #[test]
    fn offline_response_is_machine_readable() {
        let response = Response::offline();
        assert_eq!(response.status, 503);

        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "offline");
    }
}
