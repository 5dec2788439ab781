//! # Pathfinder Service Worker
//!
//! Offline caching layer for the Habit Pathfinder web app, modelled as an
//! explicit service-worker state machine.
//!
//! ## Features
//!
//! - **Install**: precache a fixed asset manifest into a versioned cache
//! - **Activate**: evict every cache whose version is not current, claim clients
//! - **Fetch**: cache-first for known requests, network with opportunistic
//!   caching otherwise, stored root document as the offline fallback
//! - **Control channel**: `{"type": "SKIP_WAITING"}` forces activation
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerRegistration
//!     ├── installing / waiting / active (ServiceWorker)
//!     └── WorkerContext
//!             ├── CacheStore   (version id → RequestKey → Response)
//!             ├── Fetcher      (network)
//!             └── Clients      (open app instances)
//! ```
//!
//! Each worker is a pure function of its [`WorkerConfig`] and the
//! capabilities in [`WorkerContext`]; nothing is global.

use std::time::Duration;

use pathfinder_common::{PathfinderError, Retryable};
use pathfinder_net::{NetError, StatusCode, Url};
use thiserror::Error;

pub mod background;
pub mod cache;
pub mod clients;
pub mod config;
pub mod fetch;
pub mod lifecycle;
pub mod message;
pub mod registration;
pub mod worker;

pub use background::BackgroundTasks;
pub use cache::{Cache, CacheEntry, CacheStorage, CacheStore, MemoryCacheStore, RequestKey};
pub use clients::{Client, Clients};
pub use config::WorkerConfig;
pub use fetch::{is_cacheable, FetchOutcome};
pub use lifecycle::{Lifecycle, SkipWaiting, WorkerPhase};
pub use message::ControlMessage;
pub use registration::ServiceWorkerRegistration;
pub use worker::{
    ActivationReport, AssetFailure, InstallReport, ServiceWorker, ServiceWorkerId, WorkerContext,
    WorkerEvent,
};

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: WorkerPhase, to: WorkerPhase },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Unexpected status {status} for {url}")]
    BadStatus { url: Url, status: StatusCode },

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Config(#[from] PathfinderError),
}

impl Retryable for ServiceWorkerError {
    /// Storage and network trouble may clear up; logic errors will not.
    fn is_retryable(&self) -> bool {
        match self {
            ServiceWorkerError::Cache(_)
            | ServiceWorkerError::Network(_)
            | ServiceWorkerError::Timeout(_) => true,
            ServiceWorkerError::Config(e) => e.is_retryable(),
            ServiceWorkerError::InvalidTransition { .. } | ServiceWorkerError::BadStatus { .. } => {
                false
            }
        }
    }
}
