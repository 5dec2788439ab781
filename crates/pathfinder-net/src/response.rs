//! Response model.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use url::Url;

use crate::NetError;

/// How much of a response the application is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// Same-origin, fully transparent.
    #[default]
    Basic,
    /// Cross-origin, exposed through CORS.
    Cors,
    /// Cross-origin without CORS; status and body are not meaningful.
    Opaque,
}

/// HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub response_type: ResponseType,
    /// Whether at least one redirect was followed.
    pub redirected: bool,
}

impl Response {
    /// Create a same-origin response.
    pub fn new(url: Url, status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
            redirected: false,
        }
    }

    /// Create an opaque response, as produced by a no-cors cross-origin fetch.
    pub fn opaque(url: Url) -> Self {
        Self {
            url,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            response_type: ResponseType::Opaque,
            redirected: false,
        }
    }

    /// Set the response type.
    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Mark the response as the result of a redirect.
    pub fn with_redirected(mut self, redirected: bool) -> Self {
        self.redirected = redirected;
        self
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}
