//! Network-interception worker
//!
//! Sits between the pages and the network, making the app shell and the
//! most recent API data available offline:
//!
//! - static assets and navigations are served cache-first
//! - API requests are served network-first with a cached fallback
//! - background-sync and push signals are relayed to subscribed pages
//!
//! The worker runs as its own task and communicates exclusively through
//! message passing: `mpsc` requests with `oneshot` replies in, a
//! `broadcast` channel of [`PageMessage`] out. It never touches the store
//! or the remote API directly — on a background-sync signal it only
//! broadcasts, and whoever holds the engine's `SyncHandle` reacts.

pub mod cache;
pub mod fetch;

pub use cache::CacheStorage;
pub use fetch::{Method, NetworkFetch, Request, Response};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::Error;
use crate::config::WorkerConfig;

/// Capacity of the page broadcast channel; slow pages drop messages
/// rather than back-pressuring the worker
const PAGE_CHANNEL_CAPACITY: usize = 32;

/// A message broadcast from the worker to all subscribed pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    /// The platform delivered the registered background-sync tag;
    /// pending offline data should be drained
    SyncOfflineData,
    /// A push notification arrived and should be shown
    ShowNotification(Notification),
}

/// A push notification, parsed from the raw push payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default = "Notification::default_title")]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default = "Notification::default_tag")]
    pub tag: String,
    #[serde(default = "Notification::default_url")]
    pub url: String,
}

impl Notification {
    fn default_title() -> String {
        "StudyRoom".to_string()
    }

    fn default_tag() -> String {
        "study-room".to_string()
    }

    fn default_url() -> String {
        "/".to_string()
    }

    /// Parse a raw push payload. A payload that is not valid JSON still
    /// produces a notification, with the raw text as the body.
    pub fn from_payload(payload: &str) -> Self {
        match serde_json::from_str(payload) {
            Ok(notification) => notification,
            Err(e) => {
                debug!("push payload is not JSON ({}), using raw text", e);
                Self {
                    title: Self::default_title(),
                    body: payload.to_string(),
                    tag: Self::default_tag(),
                    url: Self::default_url(),
                }
            }
        }
    }
}

impl Default for Notification {
    fn default() -> Self {
        Self {
            title: Self::default_title(),
            body: String::new(),
            tag: Self::default_tag(),
            url: Self::default_url(),
        }
    }
}

/// How a notification click should be handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
    /// An open page already shows the target; bring it to the front
    Focus { url: String },
    /// No open page matches; open a new one
    Open { url: String },
}

/// Route classes recognized by the fetch handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Api,
    Shell,
    PassThrough,
}

/// The interception worker
///
/// Construct with [`Worker::new()`], then drive the lifecycle in order:
/// [`install`](Worker::install), [`activate`](Worker::activate), then
/// either call the handlers directly or hand the worker to
/// [`spawn`] and talk to it through the returned [`WorkerHandle`].
pub struct Worker {
    config: WorkerConfig,
    caches: CacheStorage,
    net: Box<dyn NetworkFetch>,
    pages: broadcast::Sender<PageMessage>,
    activated: bool,
}

impl Worker {
    pub fn new(config: WorkerConfig, net: Box<dyn NetworkFetch>) -> Result<Self, Error> {
        if config.cache_name.is_empty() || config.api_cache_name.is_empty() {
            return Err(Error::config("worker cache names must not be empty"));
        }
        let (pages, _) = broadcast::channel(PAGE_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            caches: CacheStorage::new(),
            net,
            pages,
            activated: false,
        })
    }

    /// Subscribe to page messages
    pub fn subscribe(&self) -> broadcast::Receiver<PageMessage> {
        self.pages.subscribe()
    }

    /// Install: pre-fetch every shell asset into the versioned static
    /// cache. Any fetch failure aborts the installation — a partially
    /// cached shell would serve a broken app offline.
    pub async fn install(&mut self) -> Result<(), Error> {
        info!(cache = %self.config.cache_name, assets = self.config.shell_assets.len(), "installing worker");

        for asset in self.config.shell_assets.clone() {
            let request = Request::get(&asset);
            let response = self.net.fetch(&request).await.map_err(|e| {
                Error::worker(format!("failed to pre-cache shell asset {}: {}", asset, e))
            })?;
            if !response.is_success() {
                return Err(Error::worker(format!(
                    "shell asset {} returned status {}",
                    asset, response.status
                )));
            }
            self.caches.put(&self.config.cache_name, &asset, response);
        }

        info!("worker installed");
        Ok(())
    }

    /// Activate: delete every cache from a previous worker generation,
    /// then claim the pages.
    pub async fn activate(&mut self) -> Result<(), Error> {
        let stale: Vec<String> = self
            .caches
            .names()
            .into_iter()
            .filter(|name| name != &self.config.cache_name && name != &self.config.api_cache_name)
            .collect();

        for name in stale {
            info!(cache = %name, "deleting stale cache");
            self.caches.delete_cache(&name);
        }

        self.activated = true;
        info!("worker activated, pages claimed");
        Ok(())
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Route and serve one intercepted request. Never fails: every
    /// degraded path has a synthesized response.
    pub async fn handle_fetch(&mut self, request: Request) -> Response {
        match self.classify(&request) {
            Route::Api => self.fetch_api(request).await,
            Route::Shell => self.fetch_shell(request).await,
            Route::PassThrough => match self.net.fetch(&request).await {
                Ok(response) => response,
                Err(e) => {
                    debug!(path = %request.path, "pass-through fetch failed: {}", e);
                    Response::offline()
                }
            },
        }
    }

    fn classify(&self, request: &Request) -> Route {
        if self
            .config
            .api_prefixes
            .iter()
            .any(|prefix| request.path.starts_with(prefix.as_str()))
        {
            return Route::Api;
        }
        if request.navigation
            || self
                .config
                .shell_assets
                .iter()
                .any(|asset| asset == &request.path)
            || self.is_static_asset(request)
        {
            return Route::Shell;
        }
        Route::PassThrough
    }

    /// Bundler output and other fingerprinted files are static assets
    /// even when they are not in the pre-cached shell list.
    fn is_static_asset(&self, request: &Request) -> bool {
        let path = request.path_without_query();
        self.config
            .static_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
            || self
                .config
                .static_extensions
                .iter()
                .any(|ext| path.ends_with(ext.as_str()))
    }

    /// Network-first: fresh data when reachable, last-known data when
    /// not, an explicit offline envelope when neither exists.
    async fn fetch_api(&mut self, request: Request) -> Response {
        match self.net.fetch(&request).await {
            Ok(response) => {
                if request.method.cacheable() && response.is_success() {
                    self.caches.put(
                        &self.config.api_cache_name,
                        request.cache_key(),
                        response.clone(),
                    );
                }
                response
            }
            Err(e) => {
                debug!(path = %request.path, "api fetch failed, trying cache: {}", e);
                match self.caches.get(&self.config.api_cache_name, request.cache_key()) {
                    Some(cached) => cached.clone(),
                    None => Response::offline(),
                }
            }
        }
    }

    /// Cache-first: the shell must render instantly and offline. A miss
    /// populates the cache from the network; a failed navigation with no
    /// cache entry falls back to the cached root document.
    async fn fetch_shell(&mut self, request: Request) -> Response {
        if let Some(cached) = self.caches.get(&self.config.cache_name, request.cache_key()) {
            return cached.clone();
        }

        match self.net.fetch(&request).await {
            Ok(response) => {
                if request.method.cacheable() && response.is_success() {
                    self.caches
                        .put(&self.config.cache_name, request.cache_key(), response.clone());
                }
                response
            }
            Err(e) => {
                warn!(path = %request.path, "shell fetch failed with no cache entry: {}", e);
                if request.navigation {
                    if let Some(root) = self.caches.get(&self.config.cache_name, "/") {
                        return root.clone();
                    }
                }
                Response::offline()
            }
        }
    }

    /// Background-sync delivery. Only the registered tag is relayed;
    /// unknown tags are ignored.
    pub fn on_sync(&self, tag: &str) {
        if tag != self.config.sync_tag {
            debug!(tag, "ignoring unknown sync tag");
            return;
        }
        info!(tag, "background sync fired, notifying pages");
        if self.pages.send(PageMessage::SyncOfflineData).is_err() {
            debug!("no pages subscribed for sync message");
        }
    }

    /// Push delivery: parse the payload (with defaults for anything
    /// missing) and relay it for display.
    pub fn on_push(&self, payload: &str) {
        let notification = Notification::from_payload(payload);
        info!(title = %notification.title, "push received");
        if self
            .pages
            .send(PageMessage::ShowNotification(notification))
            .is_err()
        {
            debug!("no pages subscribed for push message");
        }
    }

    /// Decide what a click on a notification should do: focus an already
    /// open page showing the target, or open a new one.
    pub fn notification_click(&self, target: &str, open_pages: &[String]) -> ClickAction {
        for page in open_pages {
            if page == target || page.ends_with(target) {
                return ClickAction::Focus { url: page.clone() };
            }
        }
        ClickAction::Open {
            url: target.to_string(),
        }
    }
}

/// Requests accepted by a running worker task
#[derive(Debug)]
enum WorkerRequest {
    Fetch {
        request: Request,
        reply: oneshot::Sender<Response>,
    },
    Sync {
        tag: String,
    },
    Push {
        payload: String,
    },
    NotificationClick {
        target: String,
        open_pages: Vec<String>,
        reply: oneshot::Sender<ClickAction>,
    },
}

/// Cloneable handle to a spawned worker task
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerRequest>,
    pages: broadcast::Sender<PageMessage>,
}

impl WorkerHandle {
    /// Route a request through the worker
    pub async fn fetch(&self, request: Request) -> Result<Response, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerRequest::Fetch { request, reply })
            .await
            .map_err(|_| Error::worker("worker task has stopped"))?;
        rx.await.map_err(|_| Error::worker("worker task has stopped"))
    }

    /// Deliver a background-sync signal
    pub async fn sync(&self, tag: impl Into<String>) -> Result<(), Error> {
        self.tx
            .send(WorkerRequest::Sync { tag: tag.into() })
            .await
            .map_err(|_| Error::worker("worker task has stopped"))
    }

    /// Deliver a push payload
    pub async fn push(&self, payload: impl Into<String>) -> Result<(), Error> {
        self.tx
            .send(WorkerRequest::Push {
                payload: payload.into(),
            })
            .await
            .map_err(|_| Error::worker("worker task has stopped"))
    }

    /// Resolve a notification click against the currently open pages
    pub async fn notification_click(
        &self,
        target: impl Into<String>,
        open_pages: Vec<String>,
    ) -> Result<ClickAction, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerRequest::NotificationClick {
                target: target.into(),
                open_pages,
                reply,
            })
            .await
            .map_err(|_| Error::worker("worker task has stopped"))?;
        rx.await.map_err(|_| Error::worker("worker task has stopped"))
    }

    /// Subscribe to page messages
    pub fn subscribe(&self) -> broadcast::Receiver<PageMessage> {
        self.pages.subscribe()
    }
}

/// Spawn an activated worker onto its own task.
///
/// The task runs until every handle is dropped.
pub fn spawn(mut worker: Worker) -> (WorkerHandle, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<WorkerRequest>(32);
    let pages = worker.pages.clone();

    let join = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            match request {
                WorkerRequest::Fetch { request, reply } => {
                    let response = worker.handle_fetch(request).await;
                    let _ = reply.send(response);
                }
                WorkerRequest::Sync { tag } => worker.on_sync(&tag),
                WorkerRequest::Push { payload } => worker.on_push(&payload),
                WorkerRequest::NotificationClick {
                    target,
                    open_pages,
                    reply,
                } => {
                    let _ = reply.send(worker.notification_click(&target, &open_pages));
                }
            }
        }
        debug!("worker task stopped");
    });

    (WorkerHandle { tx, pages }, join)
}
