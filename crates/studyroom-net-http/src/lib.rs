// # HTTP Connectivity Probe
//
// This crate provides a polling `ConnectivitySource` for the sync system.
//
// ## Purpose
//
// This is the **self-contained connectivity source** for hosts without a
// platform online/offline signal: daemons, CI, headless deployments.
// Hosts that do receive platform events should prefer
// `studyroom_core::SignalConnectivity` and feed those events in directly.
//
// ## Semantics
//
// Reachability, not health: any HTTP response from the probe URL counts
// as online, including error statuses — a backend returning 500 is still
// reachable. Only a failed request (DNS, connect, timeout) means offline.

use studyroom_core::traits::{ConnectivityEvent, ConnectivitySource};
use studyroom_core::{Error, Result};

use std::pin::Pin;
use std::time::Duration;

use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Default polling interval for the connectivity probe
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default per-probe timeout; a probe slower than this counts as offline
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP polling connectivity source
pub struct HttpConnectivitySource {
    /// URL probed for reachability, e.g. the backend's `/api/v1/health`
    url: String,

    /// Polling interval
    poll_interval: Duration,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpConnectivitySource {
    /// Create a new probe against the given URL with the default interval
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_interval(url, Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS))
    }

    /// Create with a custom polling interval
    pub fn with_interval(url: impl Into<String>, poll_interval: Duration) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(Error::config("connectivity probe URL must not be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url,
            poll_interval,
            client,
        })
    }

    async fn probe(client: &reqwest::Client, url: &str) -> bool {
        match client.get(url).send().await {
            Ok(response) => {
                tracing::debug!(status = response.status().as_u16(), "probe reachable");
                true
            }
            Err(e) => {
                tracing::debug!("probe failed: {}", e);
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl ConnectivitySource for HttpConnectivitySource {
    async fn current(&self) -> Result<bool> {
        Ok(Self::probe(&self.client, &self.url).await)
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = ConnectivityEvent> + Send + 'static>> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let url = self.url.clone();
        let poll_interval = self.poll_interval;
        let client = self.client.clone();

        tokio::spawn(async move {
            tracing::info!(url = %url, interval = ?poll_interval, "starting connectivity monitoring");

            let mut last_known: Option<bool> = None;

            loop {
                let online = Self::probe(&client, &url).await;

                if last_known != Some(online) {
                    tracing::info!(online, "connectivity changed: {:?} -> {}", last_known, online);
                    if tx.send(ConnectivityEvent::new(online, last_known)).is_err() {
                        tracing::debug!("receiver dropped, stopping monitor");
                        break;
                    }
                    last_known = Some(online);
                }

                tokio::time::sleep(poll_interval).await;
            }
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }
}
