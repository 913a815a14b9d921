// # studyroomd - Offline Sync Daemon
//
// Thin host process for the StudyRoom offline sync subsystem:
// 1. Reads configuration from environment variables
// 2. Initializes logging and the runtime
// 3. Wires store, API client, connectivity probe, engine, and worker
// 4. Runs the sync engine until SIGINT/SIGTERM
//
// All sync logic lives in studyroom-core; nothing here retries, caches,
// or interprets data.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Backend
// - `STUDYROOM_API_URL`: Base URL of the backend (required)
// - `STUDYROOM_HEALTH_URL`: Connectivity probe URL
//   (default: `{STUDYROOM_API_URL}/api/v1/health`)
// - `STUDYROOM_PROBE_INTERVAL`: Probe interval in seconds (default 30)
//
// ### Store
// - `STUDYROOM_STORE_TYPE`: Store type (file, memory; default file)
// - `STUDYROOM_STORE_PATH`: Path to the store file (for file store)
//
// ### Engine
// - `STUDYROOM_SYNC_INTERVAL`: Periodic sync interval in seconds (default 300)
// - `STUDYROOM_RETENTION_DAYS`: Retention for synced records (default 30)
//
// ### Logging
// - `STUDYROOM_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export STUDYROOM_API_URL=https://studyroom.example.com
// export STUDYROOM_STORE_TYPE=file
// export STUDYROOM_STORE_PATH=/var/lib/studyroom/offline.json
//
// studyroomd
// ```

use anyhow::Result;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use studyroom_core::worker::{Method, NetworkFetch, Request, Response, Worker};
use studyroom_core::{
    AppConfig, EngineConfig, Error, PageMessage, StoreConfig, SyncEngine, SyncTrigger,
};
use studyroom_api_http::HttpRemoteApi;
use studyroom_net_http::HttpConnectivitySource;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration, assembled from environment variables
struct Config {
    api_url: String,
    health_url: String,
    probe_interval_secs: u64,
    store_type: String,
    store_path: Option<String>,
    sync_interval_secs: u64,
    retention_days: i64,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let api_url = env::var("STUDYROOM_API_URL")
            .map_err(|_| anyhow::anyhow!(
                "STUDYROOM_API_URL is required. \
                Set it via: export STUDYROOM_API_URL=https://studyroom.example.com"
            ))?;
        let api_url = api_url.trim_end_matches('/').to_string();

        Ok(Self {
            health_url: env::var("STUDYROOM_HEALTH_URL")
                .unwrap_or_else(|_| format!("{}/api/v1/health", api_url)),
            probe_interval_secs: env::var("STUDYROOM_PROBE_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            store_type: env::var("STUDYROOM_STORE_TYPE").unwrap_or_else(|_| "file".to_string()),
            store_path: env::var("STUDYROOM_STORE_PATH").ok(),
            sync_interval_secs: env::var("STUDYROOM_SYNC_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            retention_days: env::var("STUDYROOM_RETENTION_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            log_level: env::var("STUDYROOM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_url,
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("https://") && !self.api_url.starts_with("http://") {
            anyhow::bail!(
                "STUDYROOM_API_URL must use HTTP or HTTPS scheme. Got: {}",
                self.api_url
            );
        }

        match self.store_type.as_str() {
            "file" => {
                let path = self.store_path.as_deref().unwrap_or_default();
                if path.is_empty() {
                    anyhow::bail!(
                        "STUDYROOM_STORE_PATH is required when STUDYROOM_STORE_TYPE=file. \
                        Set it via: export STUDYROOM_STORE_PATH=/var/lib/studyroom/offline.json"
                    );
                }
            }
            "memory" => {}
            other => anyhow::bail!(
                "STUDYROOM_STORE_TYPE '{}' is not supported. Supported types: file, memory",
                other
            ),
        }

        if !(30..=3600).contains(&self.sync_interval_secs) {
            anyhow::bail!(
                "STUDYROOM_SYNC_INTERVAL must be between 30 and 3600 seconds. Got: {}",
                self.sync_interval_secs
            );
        }

        if !(5..=600).contains(&self.probe_interval_secs) {
            anyhow::bail!(
                "STUDYROOM_PROBE_INTERVAL must be between 5 and 600 seconds. Got: {}",
                self.probe_interval_secs
            );
        }

        if !(1..=365).contains(&self.retention_days) {
            anyhow::bail!(
                "STUDYROOM_RETENTION_DAYS must be between 1 and 365. Got: {}",
                self.retention_days
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!(
                "STUDYROOM_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            ),
        }

        Ok(())
    }

    fn app_config(&self) -> AppConfig {
        AppConfig {
            store: match self.store_type.as_str() {
                "memory" => StoreConfig::Memory,
                _ => StoreConfig::File {
                    path: self.store_path.clone().unwrap_or_default(),
                },
            },
            engine: EngineConfig {
                periodic_interval_secs: self.sync_interval_secs,
                retention_days: self.retention_days,
                ..EngineConfig::default()
            },
            worker: Default::default(),
        }
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    info!("Starting studyroomd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            DaemonExitCode::RuntimeError
        } else {
            DaemonExitCode::CleanShutdown
        }
    })
    .into()
}

/// Plain HTTP backend for the interception worker's network side
struct HttpFetch {
    base_url: String,
    client: reqwest::Client,
}

impl HttpFetch {
    fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
        })
    }

    fn builder(&self, request: &Request) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, request.path);
        match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
            Method::Patch => self.client.patch(&url),
        }
    }
}

#[async_trait::async_trait]
impl NetworkFetch for HttpFetch {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, Error> {
        let response = self
            .builder(request)
            .send()
            .await
            .map_err(|e| Error::worker(format!("fetch {} failed: {}", request.path, e)))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| Error::worker(format!("read {} failed: {}", request.path, e)))?;

        Ok(Response {
            status,
            content_type,
            body,
        })
    }
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let app_config = config.app_config();
    app_config.validate()?;

    // Local store, degrading to memory-only if the file is unusable
    let (store, persistent) = studyroom_core::store::open(&app_config.store).await;
    info!(persistent, "local store opened");
    let store: Arc<dyn studyroom_core::OfflineStore> = Arc::from(store);

    // Backend API client and connectivity probe
    let api = Arc::new(HttpRemoteApi::new(&config.api_url)?);
    let connectivity = HttpConnectivitySource::with_interval(
        &config.health_url,
        Duration::from_secs(config.probe_interval_secs),
    )?;

    let (engine, mut status_rx) = SyncEngine::new(
        store,
        api,
        Box::new(connectivity),
        app_config.engine.clone(),
    )?;

    // Interception worker: pre-cache the shell and bridge its
    // background-sync broadcasts into engine triggers. An unreachable
    // backend at startup is not fatal; sync still runs without the worker.
    let _worker_handle = match start_worker(&app_config, &config, &engine).await {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("worker unavailable, continuing without it: {}", e);
            None
        }
    };

    // Log status transitions as they are published
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow().clone();
            info!(
                online = status.is_online,
                syncing = status.is_syncing,
                pending = status.pending_count,
                failed = status.failed_count,
                "sync status"
            );
        }
    });

    info!("Starting sync engine");
    engine.run().await?;

    info!("Shutting down daemon");
    Ok(())
}

/// Install and activate the interception worker, bridging its
/// background-sync broadcasts into engine triggers.
async fn start_worker(
    app_config: &AppConfig,
    config: &Config,
    engine: &SyncEngine,
) -> Result<studyroom_core::WorkerHandle> {
    let mut worker = Worker::new(
        app_config.worker.clone(),
        Box::new(HttpFetch::new(&config.api_url)?),
    )?;
    worker.install().await?;
    worker.activate().await?;

    let (handle, _join) = studyroom_core::worker::spawn(worker);
    let mut pages = handle.subscribe();
    let sync = engine.handle();
    tokio::spawn(async move {
        while let Ok(message) = pages.recv().await {
            if message == PageMessage::SyncOfflineData {
                sync.trigger(SyncTrigger::Background);
            }
        }
    });

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            api_url: "https://studyroom.example.com".to_string(),
            health_url: "https://studyroom.example.com/api/v1/health".to_string(),
            probe_interval_secs: 30,
            store_type: "memory".to_string(),
            store_path: None,
            sync_interval_secs: 300,
            retention_days: 30,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn file_store_requires_path() {
        let mut config = base_config();
        config.store_type = "file".to_string();
        assert!(config.validate().is_err());

        config.store_path = Some("/var/lib/studyroom/offline.json".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_intervals() {
        let mut config = base_config();
        config.sync_interval_secs = 5;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.probe_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = base_config();
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn http_fetch_preserves_the_request_method() {
        let fetch = HttpFetch::new("https://studyroom.example.com").unwrap();
        let cases = [
            (Method::Get, reqwest::Method::GET),
            (Method::Post, reqwest::Method::POST),
            (Method::Put, reqwest::Method::PUT),
            (Method::Delete, reqwest::Method::DELETE),
            (Method::Patch, reqwest::Method::PATCH),
        ];

        for (method, expected) in cases {
            let built = fetch
                .builder(&Request::new(method, "/api/v1/attendance"))
                .build()
                .unwrap();
            assert_eq!(built.method(), expected);
            assert_eq!(built.url().path(), "/api/v1/attendance");
        }
    }

    #[test]
    fn app_config_maps_store_type() {
        let mut config = base_config();
        assert!(matches!(config.app_config().store, StoreConfig::Memory));

        config.store_type = "file".to_string();
        config.store_path = Some("/tmp/offline.json".to_string());
        assert!(matches!(config.app_config().store, StoreConfig::File { .. }));
    }
}
