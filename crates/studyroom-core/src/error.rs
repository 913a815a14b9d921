//! Error types for the offline sync system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the offline sync system
#[derive(Error, Debug)]
pub enum Error {
    /// Local store errors (open, read, persist)
    #[error("store error: {0}")]
    Store(String),

    /// A store transaction did not commit; the data model is unchanged
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// Remote API call failed or returned an unsuccessful envelope
    #[error("api error ({endpoint}): {message}")]
    Api {
        /// The endpoint or operation that failed
        endpoint: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network-level I/O errors
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Interception worker errors (install, cache, routing)
    #[error("worker error: {0}")]
    Worker(String),

    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a transaction error
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Create a remote API error
    pub fn api(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a worker error
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
