//! Fetch interception results and the cacheability rule.

use pathfinder_net::{Request, Response, ResponseType, StatusCode};

/// How the worker answered a fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs the request itself.
    Passthrough(Request),
    /// Served from the current cache without touching the network.
    Cache(Response),
    /// Live network response.
    Network(Response),
    /// Network failed; the cached root document stands in.
    OfflineFallback(Response),
}

impl FetchOutcome {
    /// The response, if the worker produced one.
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Passthrough(_) => None,
            FetchOutcome::Cache(r) | FetchOutcome::Network(r) | FetchOutcome::OfflineFallback(r) => {
                Some(r)
            }
        }
    }

    /// Short label for logs and reports.
    pub fn source(&self) -> &'static str {
        match self {
            FetchOutcome::Passthrough(_) => "passthrough",
            FetchOutcome::Cache(_) => "cache",
            FetchOutcome::Network(_) => "network",
            FetchOutcome::OfflineFallback(_) => "offline-fallback",
        }
    }
}

/// Only a same-origin 200 may be stored and replayed.
///
/// Opaque, CORS, redirected-away and non-200 responses pass through
/// uncached.
pub fn is_cacheable(response: &Response) -> bool {
    response.status == StatusCode::OK && response.response_type == ResponseType::Basic
}
