//! reqwest-backed [`Fetcher`] implementation.
//!
//! Redirects are followed here rather than by reqwest so that every hop can
//! be checked against the application origin. A response is only `Basic`
//! when the request and every hop of its redirect chain stayed same-origin.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, LOCATION, PRAGMA};
use http::{HeaderMap, Method, StatusCode};
use reqwest::Client;
use tracing::{debug, info, trace};
use url::{Origin, Url};

use crate::{CacheMode, Fetcher, NetError, Request, Response, ResponseType};

/// Loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Per-request timeout; `None` leaves it to the OS network stack.
    pub default_timeout: Option<Duration>,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("habit-pathfinder-sw/{}", env!("CARGO_PKG_VERSION")),
            default_timeout: None,
            max_redirects: 10,
        }
    }
}

/// Network fetcher scoped to one application origin.
pub struct HttpFetcher {
    client: Client,
    origin: Origin,
    timeout: Option<Duration>,
    max_redirects: usize,
}

impl HttpFetcher {
    /// Create a fetcher for the application served from `app_url`.
    pub fn new(app_url: &Url, config: LoaderConfig) -> Result<Self, NetError> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = config.default_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!(origin = %app_url.origin().ascii_serialization(), "HttpFetcher initialized");

        Ok(Self {
            client,
            origin: app_url.origin(),
            timeout: config.default_timeout,
            max_redirects: config.max_redirects,
        })
    }

    /// `left_origin` is set once the request or any redirect hop was
    /// cross-origin.
    fn classify(&self, left_origin: bool, headers: &HeaderMap) -> ResponseType {
        if !left_origin {
            ResponseType::Basic
        } else if headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN) {
            ResponseType::Cors
        } else {
            ResponseType::Opaque
        }
    }

    fn is_cross_origin(&self, url: &Url) -> bool {
        url.origin() != self.origin
    }

    fn map_reqwest(&self, e: reqwest::Error) -> NetError {
        match self.timeout {
            Some(timeout) if e.is_timeout() => NetError::Timeout(timeout),
            _ => NetError::Http(e),
        }
    }

    async fn send(
        &self,
        request: &Request,
        method: &Method,
        url: &Url,
        body: Option<Bytes>,
    ) -> Result<reqwest::Response, NetError> {
        let mut builder = self.client.request(method.clone(), url.clone());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if request.cache_mode == CacheMode::Reload {
            builder = builder
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        builder.send().await.map_err(|e| self.map_reqwest(e))
    }
}

/// Where a redirect response points, if it is one we follow.
fn redirect_target(current: &Url, response: &reqwest::Response) -> Result<Option<Url>, NetError> {
    let follows = matches!(
        response.status(),
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    );
    if !follows {
        return Ok(None);
    }
    let Some(location) = response.headers().get(LOCATION) else {
        return Ok(None);
    };
    let location = location
        .to_str()
        .map_err(|_| NetError::InvalidUrl(format!("{location:?}")))?;
    current
        .join(location)
        .map(Some)
        .map_err(|e| NetError::InvalidUrl(format!("{location}: {e}")))
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        let scheme = request.url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(NetError::UnsupportedScheme(scheme.to_string()));
        }

        debug!(
            id = ?request.id,
            url = %request.url,
            method = %request.method,
            "Fetching resource"
        );

        let mut method = request.method.clone();
        let mut body = request.body.clone();
        let mut url = request.url.clone();
        let mut left_origin = self.is_cross_origin(&url);
        let mut hops = 0;

        let response = loop {
            let response = self.send(&request, &method, &url, body.clone()).await?;
            let Some(next) = redirect_target(&url, &response)? else {
                break response;
            };
            if hops == self.max_redirects {
                return Err(NetError::RequestFailed(format!(
                    "too many redirects fetching {}",
                    request.url
                )));
            }
            hops += 1;

            let status = response.status();
            if status == StatusCode::SEE_OTHER
                || (method == Method::POST
                    && matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND))
            {
                method = Method::GET;
                body = None;
            }
            left_origin |= self.is_cross_origin(&next);
            trace!(from = %url, to = %next, %status, "Following redirect");
            url = next;
        };

        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().clone();
        let redirected = hops > 0;
        let response_type = self.classify(left_origin, &headers);

        let body = response.bytes().await.map_err(|e| self.map_reqwest(e))?;

        trace!(
            url = %final_url,
            status = %status,
            response_type = ?response_type,
            redirected,
            body_len = body.len(),
            "Response received"
        );

        let body = match response_type {
            ResponseType::Opaque => Bytes::new(),
            _ => body,
        };

        Ok(Response {
            url: final_url,
            status,
            headers,
            body,
            response_type,
            redirected,
        })
    }
}
