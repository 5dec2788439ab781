//! The worker: install, activate, fetch and message entry points.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pathfinder_common::{retry_with_backoff, with_timeout, RetryConfig};
use pathfinder_net::{CacheMode, Fetcher, NetError, Request, Response};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::background::BackgroundTasks;
use crate::cache::{CacheStore, RequestKey};
use crate::clients::Clients;
use crate::config::WorkerConfig;
use crate::fetch::{is_cacheable, FetchOutcome};
use crate::lifecycle::{Lifecycle, SkipWaiting, WorkerPhase};
use crate::message::ControlMessage;
use crate::ServiceWorkerError;

/// Unique identifier for a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Capabilities shared by every worker version of one app.
#[derive(Clone)]
pub struct WorkerContext {
    pub caches: Arc<dyn CacheStore>,
    pub network: Arc<dyn Fetcher>,
    pub clients: Arc<RwLock<Clients>>,
}

impl WorkerContext {
    pub fn new(caches: Arc<dyn CacheStore>, network: Arc<dyn Fetcher>) -> Self {
        Self {
            caches,
            network,
            clients: Arc::new(RwLock::new(Clients::new())),
        }
    }
}

/// Events emitted while a worker runs.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    StateChange {
        worker_id: ServiceWorkerId,
        from: WorkerPhase,
        to: WorkerPhase,
    },
    AssetCached {
        url: Url,
    },
    AssetFailed {
        url: Url,
        error: String,
    },
    CacheDeleted {
        name: String,
    },
    ControllerChange {
        client_id: String,
        version: String,
    },
}

/// A manifest entry that could not be precached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetFailure {
    pub url: Url,
    pub error: String,
}

/// Outcome of [`ServiceWorker::install`].
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub version: String,
    pub cached: Vec<Url>,
    pub failed: Vec<AssetFailure>,
    /// Present when install went straight on to activation.
    pub activation: Option<ActivationReport>,
}

/// Outcome of [`ServiceWorker::activate`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivationReport {
    pub version: String,
    /// Stale caches removed.
    pub deleted: Vec<String>,
    /// Stale caches that survived every delete attempt.
    pub failed_deletions: Vec<String>,
    /// Clients whose controller changed to this version.
    pub claimed: Vec<String>,
}

/// One deployed version of the offline worker.
pub struct ServiceWorker {
    id: ServiceWorkerId,
    config: Arc<WorkerConfig>,
    assets: Vec<Url>,
    fallback_key: RequestKey,
    context: WorkerContext,
    lifecycle: RwLock<Lifecycle>,
    background: BackgroundTasks,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl ServiceWorker {
    /// Create a worker and the receiver for its events.
    pub fn new(
        config: WorkerConfig,
        context: WorkerContext,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WorkerEvent>), ServiceWorkerError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let worker = Self::with_event_sender(config, context, event_tx)?;
        Ok((worker, event_rx))
    }

    /// Create a worker that reports into an existing event channel.
    pub fn with_event_sender(
        config: WorkerConfig,
        context: WorkerContext,
        event_tx: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<Self, ServiceWorkerError> {
        config.validate()?;
        let assets = config.resolved_assets()?;
        let fallback_key = RequestKey::from_url(&config.resolve(&config.offline_fallback)?);

        Ok(Self {
            id: ServiceWorkerId::new(),
            config: Arc::new(config),
            assets,
            fallback_key,
            context,
            lifecycle: RwLock::new(Lifecycle::new()),
            background: BackgroundTasks::new(),
            event_tx,
        })
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    /// The cache version identifier this worker owns.
    pub fn version(&self) -> &str {
        &self.config.version_id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub async fn phase(&self) -> WorkerPhase {
        self.lifecycle.read().await.phase()
    }

    async fn advance(&self, to: WorkerPhase) -> Result<(), ServiceWorkerError> {
        let from = self.lifecycle.write().await.advance(to)?;
        debug!(version = %self.version(), %from, %to, "Worker state changed");
        self.emit(WorkerEvent::StateChange {
            worker_id: self.id,
            from,
            to,
        });
        Ok(())
    }

    fn emit(&self, event: WorkerEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Precache the asset manifest into the current cache.
    ///
    /// A single asset failing is logged and recorded, never fatal. Only a
    /// failure to open the cache itself aborts install and makes the worker
    /// redundant.
    pub async fn install(&self) -> Result<InstallReport, ServiceWorkerError> {
        self.advance(WorkerPhase::Installing).await?;
        info!(version = %self.version(), assets = self.assets.len(), "Installing service worker");

        if let Err(e) = self.context.caches.open(self.version()).await {
            error!(version = %self.version(), error = %e, "Failed to open cache, install abandoned");
            self.advance(WorkerPhase::Redundant).await?;
            return Err(e);
        }

        let results = join_all(self.assets.iter().map(|url| self.precache(url))).await;

        let mut report = InstallReport {
            version: self.version().to_string(),
            cached: Vec::new(),
            failed: Vec::new(),
            activation: None,
        };
        for (url, result) in self.assets.iter().zip(results) {
            match result {
                Ok(()) => {
                    trace!(url = %url, "Asset cached");
                    report.cached.push(url.clone());
                    self.emit(WorkerEvent::AssetCached { url: url.clone() });
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to cache asset");
                    self.emit(WorkerEvent::AssetFailed {
                        url: url.clone(),
                        error: e.to_string(),
                    });
                    report.failed.push(AssetFailure {
                        url: url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let activate_now = {
            let mut lifecycle = self.lifecycle.write().await;
            let from = lifecycle.advance(WorkerPhase::Installed)?;
            self.emit(WorkerEvent::StateChange {
                worker_id: self.id,
                from,
                to: WorkerPhase::Installed,
            });
            if self.config.skip_waiting_on_install {
                lifecycle.request_skip_waiting();
            }
            lifecycle.skip_waiting_requested()
        };

        info!(
            version = %self.version(),
            cached = report.cached.len(),
            failed = report.failed.len(),
            "Install complete"
        );

        if activate_now {
            report.activation = self.activate_if_waiting().await?;
        }
        Ok(report)
    }

    async fn precache(&self, url: &Url) -> Result<(), ServiceWorkerError> {
        let request = Request::get(url.clone()).with_cache_mode(CacheMode::Reload);
        let response = self.fetch_network(request).await?;
        if !response.ok() {
            return Err(ServiceWorkerError::BadStatus {
                url: url.clone(),
                status: response.status,
            });
        }
        self.context
            .caches
            .put(self.version(), RequestKey::from_url(url), response)
            .await
    }

    /// The configured network timeout is enforced here and nowhere else.
    async fn fetch_network(&self, request: Request) -> Result<Response, ServiceWorkerError> {
        let fetch = self.context.network.fetch(request);
        let result = match self.config.network_timeout() {
            Some(limit) => with_timeout(limit, fetch)
                .await
                .map_err(|_| ServiceWorkerError::Timeout(limit))?,
            None => fetch.await,
        };
        result.map_err(|e| match e {
            NetError::Timeout(limit) => ServiceWorkerError::Timeout(limit),
            e => ServiceWorkerError::Network(e),
        })
    }

    /// Evict stale caches, claim every client and start serving fetches.
    ///
    /// Deletions run concurrently and are retried; one that still fails is
    /// logged and reported but does not block activation.
    pub async fn activate(&self) -> Result<ActivationReport, ServiceWorkerError> {
        self.advance(WorkerPhase::Activating).await?;
        info!(version = %self.version(), "Activating service worker");

        let names = match self.context.caches.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Could not list caches, skipping eviction");
                Vec::new()
            }
        };
        let stale: Vec<String> = names
            .into_iter()
            .filter(|name| name != self.version())
            .collect();

        let retry = RetryConfig::attempts(self.config.cache_delete_attempts)
            .with_initial_delay(Duration::from_millis(50));
        let results = join_all(stale.iter().map(|name| {
            let retry = &retry;
            async move { retry_with_backoff(retry, || self.context.caches.delete(name)).await }
        }))
        .await;

        let mut report = ActivationReport {
            version: self.version().to_string(),
            ..Default::default()
        };
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => {
                    info!(cache = %name, "Deleted stale cache");
                    self.emit(WorkerEvent::CacheDeleted { name: name.clone() });
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!(cache = %name, error = %e, "Failed to delete stale cache");
                    report.failed_deletions.push(name);
                }
            }
        }

        report.claimed = self.context.clients.write().await.claim(self.version());
        for client_id in &report.claimed {
            self.emit(WorkerEvent::ControllerChange {
                client_id: client_id.clone(),
                version: self.version().to_string(),
            });
        }

        self.advance(WorkerPhase::Active).await?;
        info!(
            version = %self.version(),
            deleted = report.deleted.len(),
            claimed = report.claimed.len(),
            "Activation complete"
        );
        Ok(report)
    }

    /// Activate unless another caller already started activation.
    async fn activate_if_waiting(&self) -> Result<Option<ActivationReport>, ServiceWorkerError> {
        match self.activate().await {
            Ok(report) => Ok(Some(report)),
            Err(ServiceWorkerError::InvalidTransition { from, .. }) if from != WorkerPhase::Installed => {
                debug!(version = %self.version(), %from, "Activation already handled");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Request activation without waiting for clients to close.
    ///
    /// A request made during install is remembered and honoured when install
    /// finishes.
    pub async fn skip_waiting(&self) -> Result<Option<ActivationReport>, ServiceWorkerError> {
        let decision = self.lifecycle.write().await.request_skip_waiting();
        debug!(version = %self.version(), ?decision, "Skip waiting requested");
        match decision {
            SkipWaiting::ActivateNow => self.activate_if_waiting().await,
            SkipWaiting::Deferred | SkipWaiting::Ignored => Ok(None),
        }
    }

    /// Handle a message posted by the foreground app.
    pub async fn handle_message(
        &self,
        data: &Value,
    ) -> Result<Option<ActivationReport>, ServiceWorkerError> {
        match ControlMessage::parse(data) {
            Some(ControlMessage::SkipWaiting) => self.skip_waiting().await,
            None => {
                debug!(version = %self.version(), "Ignoring unrecognized message");
                Ok(None)
            }
        }
    }

    /// Mark this version as replaced.
    pub async fn retire(&self) -> Result<(), ServiceWorkerError> {
        self.advance(WorkerPhase::Redundant).await
    }

    /// Intercept a fetch.
    ///
    /// Cache-first for anything already stored. On a miss the network
    /// answers and a cacheable response is copied into the cache in the
    /// background. If the network fails outright, navigations get the
    /// cached root document; everything else gets the error.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchOutcome, ServiceWorkerError> {
        if !self.phase().await.can_intercept_fetch() {
            return Ok(FetchOutcome::Passthrough(request));
        }
        let Some(key) = RequestKey::for_request(&request) else {
            trace!(url = %request.url, method = %request.method, "Not intercepting non-GET request");
            return Ok(FetchOutcome::Passthrough(request));
        };
        if self.config.is_excluded(&request.url) {
            trace!(url = %request.url, "Not intercepting excluded scheme");
            return Ok(FetchOutcome::Passthrough(request));
        }

        match self.context.caches.match_in(self.version(), &key).await {
            Ok(Some(response)) => {
                debug!(url = %request.url, "Serving from cache");
                return Ok(FetchOutcome::Cache(response));
            }
            Ok(None) => {}
            Err(e) => warn!(url = %request.url, error = %e, "Cache lookup failed"),
        }

        debug!(url = %request.url, "Fetching from network");
        let is_navigation = request.is_navigation();
        let url = request.url.clone();

        match self.fetch_network(request).await {
            Ok(response) => {
                if is_cacheable(&response) {
                    self.store_in_background(key, response.clone()).await;
                } else {
                    trace!(
                        url = %url,
                        status = %response.status,
                        response_type = ?response.response_type,
                        "Response not cacheable"
                    );
                }
                Ok(FetchOutcome::Network(response))
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Network failed");
                if is_navigation {
                    if let Some(fallback) = self.offline_fallback().await {
                        info!(url = %url, fallback = %self.fallback_key, "Serving offline fallback");
                        return Ok(FetchOutcome::OfflineFallback(fallback));
                    }
                }
                Err(e)
            }
        }
    }

    async fn offline_fallback(&self) -> Option<Response> {
        match self
            .context
            .caches
            .match_in(self.version(), &self.fallback_key)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Offline fallback lookup failed");
                None
            }
        }
    }

    async fn store_in_background(&self, key: RequestKey, response: Response) {
        let caches = Arc::clone(&self.context.caches);
        let version = self.version().to_string();
        self.background
            .spawn(async move {
                match caches.put(&version, key.clone(), response).await {
                    Ok(()) => trace!(url = %key, cache = %version, "Stored network response"),
                    Err(e) => warn!(url = %key, error = %e, "Opportunistic cache write failed"),
                }
            })
            .await;
    }

    /// Wait for pending background cache writes.
    pub async fn wait_for_background(&self) {
        self.background.settle().await;
    }
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("id", &self.id)
            .field("version", &self.config.version_id)
            .finish_non_exhaustive()
    }
}
