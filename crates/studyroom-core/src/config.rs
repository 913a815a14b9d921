//! Configuration types for the offline sync system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Sync engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Network-interception worker settings
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            worker: WorkerConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.store.validate()?;
        self.engine.validate()?;
        self.worker.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Local store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// File-backed persistent store
    File {
        /// Path to the store file
        path: String,
    },

    /// In-memory store (session-only, not persistent)
    #[default]
    Memory,
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("store file path cannot be empty"));
                }
                Ok(())
            }
            StoreConfig::Memory => Ok(()),
        }
    }
}

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval of the periodic sync trigger while online (in seconds)
    #[serde(default = "default_periodic_interval_secs")]
    pub periodic_interval_secs: u64,

    /// Retention window for synced attendance records (in days).
    ///
    /// Unsynced records are never auto-deleted regardless of age.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Capacity of the trigger channel behind [`SyncHandle`].
    ///
    /// Triggers received while a pass is running are dropped, not queued,
    /// so a small capacity is sufficient.
    ///
    /// [`SyncHandle`]: crate::engine::SyncHandle
    #[serde(default = "default_trigger_channel_capacity")]
    pub trigger_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.periodic_interval_secs == 0 {
            return Err(crate::Error::config("periodic interval must be > 0"));
        }
        if self.retention_days <= 0 {
            return Err(crate::Error::config("retention window must be > 0 days"));
        }
        if self.trigger_channel_capacity == 0 {
            return Err(crate::Error::config("trigger channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            periodic_interval_secs: default_periodic_interval_secs(),
            retention_days: default_retention_days(),
            trigger_channel_capacity: default_trigger_channel_capacity(),
        }
    }
}

/// Network-interception worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name of the versioned static-asset cache
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Name of the versioned API response cache
    #[serde(default = "default_api_cache_name")]
    pub api_cache_name: String,

    /// Shell routes and assets pre-populated at install time.
    ///
    /// Installation fails if any of these cannot be fetched.
    #[serde(default = "default_shell_assets")]
    pub shell_assets: Vec<String>,

    /// Path prefixes routed with the network-first policy
    #[serde(default = "default_api_prefixes")]
    pub api_prefixes: Vec<String>,

    /// Path prefixes always treated as static assets (bundler output)
    #[serde(default = "default_static_prefixes")]
    pub static_prefixes: Vec<String>,

    /// File extensions served cache-first
    #[serde(default = "default_static_extensions")]
    pub static_extensions: Vec<String>,

    /// Background-sync tag the worker reacts to
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,
}

impl WorkerConfig {
    /// Validate the worker configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.cache_name.is_empty() || self.api_cache_name.is_empty() {
            return Err(crate::Error::config("cache names cannot be empty"));
        }
        if self.cache_name == self.api_cache_name {
            return Err(crate::Error::config(
                "static and api cache names must differ",
            ));
        }
        if self.sync_tag.is_empty() {
            return Err(crate::Error::config("sync tag cannot be empty"));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            api_cache_name: default_api_cache_name(),
            shell_assets: default_shell_assets(),
            api_prefixes: default_api_prefixes(),
            static_prefixes: default_static_prefixes(),
            static_extensions: default_static_extensions(),
            sync_tag: default_sync_tag(),
        }
    }
}

fn default_periodic_interval_secs() -> u64 {
    300
}

fn default_retention_days() -> i64 {
    30
}

fn default_trigger_channel_capacity() -> usize {
    16
}

fn default_cache_name() -> String {
    "study-room-v1".to_string()
}

fn default_api_cache_name() -> String {
    "study-room-api-v1".to_string()
}

fn default_shell_assets() -> Vec<String> {
    ["/", "/attendance", "/students", "/payments", "/manifest.json"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_api_prefixes() -> Vec<String> {
    [
        "/api/v1/students",
        "/api/v1/attendance",
        "/api/v1/payments",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_static_prefixes() -> Vec<String> {
    ["/_next/"].into_iter().map(String::from).collect()
}

fn default_static_extensions() -> Vec<String> {
    [".js", ".css", ".png", ".jpg", ".ico"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_sync_tag() -> String {
    "sync-offline-data".to_string()
}
