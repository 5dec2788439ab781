//! # Pathfinder Net
//!
//! Request and response model plus the network capability used by the
//! offline worker.
//!
//! ## Design Goals
//!
//! 1. **Injected network**: the worker only sees the [`Fetcher`] trait
//! 2. **Response typing**: every response carries a [`ResponseType`] so the
//!    cache layer can tell same-origin responses from opaque ones
//! 3. **Cheap snapshots**: bodies are [`Bytes`], so cloning a response for
//!    the cache does not copy the payload

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod loader;
pub mod request;
pub mod response;

pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
pub use loader::{HttpFetcher, LoaderConfig};
pub use request::{CacheMode, Destination, Request, RequestId};
pub use response::{Response, ResponseType};
pub use url::Url;

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Network capability: performs a request and yields the live response.
///
/// A returned `Ok` may still carry a non-2xx status; `Err` means the request
/// never produced a response at all (offline, DNS failure, refused, ...).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: Request) -> Result<Response, NetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            NetError::UnsupportedScheme("chrome-extension".into()).to_string(),
            "Unsupported URL scheme: chrome-extension"
        );
        assert_eq!(
            NetError::Timeout(Duration::from_secs(2)).to_string(),
            "Timeout after 2s"
        );
    }
}
