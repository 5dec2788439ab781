//! Registration: which worker version is installing, waiting and active.

use std::sync::Arc;

use pathfinder_net::{Request, Response};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};
use url::Url;

use crate::clients::Clients;
use crate::config::WorkerConfig;
use crate::fetch::FetchOutcome;
use crate::worker::{ActivationReport, InstallReport, ServiceWorker, WorkerContext, WorkerEvent};
use crate::ServiceWorkerError;

#[derive(Debug, Default)]
struct Slots {
    installing: Option<Arc<ServiceWorker>>,
    waiting: Option<Arc<ServiceWorker>>,
    active: Option<Arc<ServiceWorker>>,
}

/// A service worker registration for one application scope.
pub struct ServiceWorkerRegistration {
    scope: Url,
    context: WorkerContext,
    slots: RwLock<Slots>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl ServiceWorkerRegistration {
    /// Create a registration and the receiver for events of all its workers.
    pub fn new(scope: Url, context: WorkerContext) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                scope,
                context,
                slots: RwLock::new(Slots::default()),
                event_tx,
            },
            event_rx,
        )
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn clients(&self) -> Arc<RwLock<Clients>> {
        Arc::clone(&self.context.clients)
    }

    pub async fn installing(&self) -> Option<Arc<ServiceWorker>> {
        self.slots.read().await.installing.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<ServiceWorker>> {
        self.slots.read().await.waiting.clone()
    }

    pub async fn active(&self) -> Option<Arc<ServiceWorker>> {
        self.slots.read().await.active.clone()
    }

    /// Deploy a worker version: install it, then promote or park it.
    pub async fn register(&self, config: WorkerConfig) -> Result<InstallReport, ServiceWorkerError> {
        let worker = Arc::new(ServiceWorker::with_event_sender(
            config,
            self.context.clone(),
            self.event_tx.clone(),
        )?);
        info!(scope = %self.scope, version = %worker.version(), "Registering service worker");

        self.slots.write().await.installing = Some(Arc::clone(&worker));
        let result = worker.install().await;
        self.slots.write().await.installing = None;
        let report = result?;

        // A newer install always supersedes whatever was waiting.
        let superseded = self.slots.write().await.waiting.take();
        if let Some(previous) = superseded {
            retire(&previous).await;
        }

        if worker.phase().await.can_intercept_fetch() {
            self.promote(worker).await;
        } else {
            self.slots.write().await.waiting = Some(worker);
        }
        Ok(report)
    }

    /// Deliver a control message to the waiting worker, or the active one if
    /// nothing is waiting.
    pub async fn post_message(
        &self,
        data: &Value,
    ) -> Result<Option<ActivationReport>, ServiceWorkerError> {
        let target = {
            let slots = self.slots.read().await;
            slots.waiting.clone().or_else(|| slots.active.clone())
        };
        let Some(worker) = target else {
            return Ok(None);
        };

        let report = worker.handle_message(data).await?;
        if report.is_some() {
            self.promote(worker).await;
        }
        Ok(report)
    }

    /// Activate the waiting worker, as the browser does once every client
    /// of the old version has closed.
    pub async fn activate_waiting(&self) -> Result<Option<ActivationReport>, ServiceWorkerError> {
        let Some(worker) = self.waiting().await else {
            return Ok(None);
        };
        let report = worker.activate().await?;
        self.promote(worker).await;
        Ok(Some(report))
    }

    /// Route a request through the active worker, performing passthroughs
    /// on the network directly.
    pub async fn fetch(&self, request: Request) -> Result<Response, ServiceWorkerError> {
        let request = match self.active().await {
            Some(worker) => match worker.handle_fetch(request).await? {
                FetchOutcome::Passthrough(request) => request,
                FetchOutcome::Cache(response)
                | FetchOutcome::Network(response)
                | FetchOutcome::OfflineFallback(response) => return Ok(response),
            },
            None => request,
        };
        Ok(self.context.network.fetch(request).await?)
    }

    /// Retire every worker of this registration.
    pub async fn unregister(&self) {
        let slots = std::mem::take(&mut *self.slots.write().await);
        for worker in [slots.installing, slots.waiting, slots.active]
            .into_iter()
            .flatten()
        {
            retire(&worker).await;
        }
        info!(scope = %self.scope, "Unregistered");
    }

    async fn promote(&self, worker: Arc<ServiceWorker>) {
        let mut slots = self.slots.write().await;
        if slots
            .waiting
            .as_ref()
            .is_some_and(|w| w.id() == worker.id())
        {
            slots.waiting = None;
        }
        if let Some(previous) = slots.active.replace(Arc::clone(&worker)) {
            if previous.id() != worker.id() {
                retire(&previous).await;
            }
        }
        info!(scope = %self.scope, version = %worker.version(), "Worker is now active");
    }
}

async fn retire(worker: &ServiceWorker) {
    if let Err(e) = worker.retire().await {
        warn!(version = %worker.version(), error = %e, "Could not retire worker");
    }
}
