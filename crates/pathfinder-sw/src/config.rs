//! Worker configuration.
//!
//! The version identifier and asset manifest are fixed at build time; the
//! release process bumps `version_id` whenever either the manifest or the
//! interception logic changes. The worker never hashes assets itself.

use std::path::Path;
use std::time::Duration;

use pathfinder_common::{PathfinderError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration injected into a worker at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Cache version identifier; also the name of the current cache.
    pub version_id: String,

    /// Application scope that asset paths are resolved against.
    pub origin: Url,

    /// Paths that must be precached during install, in order.
    pub assets: Vec<String>,

    /// URL schemes that are never intercepted.
    pub excluded_schemes: Vec<String>,

    /// Document served to failed navigations. Must be in `assets`.
    pub offline_fallback: String,

    /// Activate straight after install instead of waiting.
    pub skip_waiting_on_install: bool,

    /// Network timeout in milliseconds; unset means no timeout.
    pub network_timeout_ms: Option<u64>,

    /// Attempts per stale cache deletion during activation.
    pub cache_delete_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version_id: "habit-pathfinder-v5".to_string(),
            origin: Url::parse("http://localhost:8080/").expect("static URL is valid"),
            assets: [
                "/",
                "/index.html",
                "/manifest.json",
                "/icon-16x16.png",
                "/icon-32x32.png",
                "/icon-192x192.png",
                "/icon-512x512.png",
                "/favicon.ico",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            excluded_schemes: vec![
                "chrome-extension".to_string(),
                "moz-extension".to_string(),
                "safari-web-extension".to_string(),
            ],
            offline_fallback: "/index.html".to_string(),
            skip_waiting_on_install: true,
            network_timeout_ms: None,
            cache_delete_attempts: 3,
        }
    }
}

impl WorkerConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Check the invariants the worker relies on.
    pub fn validate(&self) -> Result<()> {
        if self.version_id.trim().is_empty() {
            return Err(PathfinderError::config("version_id must not be empty"));
        }
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(PathfinderError::config(format!(
                "origin must be http(s), got {}",
                self.origin
            )));
        }
        if self.assets.is_empty() {
            return Err(PathfinderError::config("asset manifest is empty"));
        }

        let assets = self.resolved_assets()?;
        let fallback = self.resolve(&self.offline_fallback)?;
        if !assets.contains(&fallback) {
            return Err(PathfinderError::config(format!(
                "offline fallback {} is not in the asset manifest",
                self.offline_fallback
            )));
        }
        Ok(())
    }

    /// Resolve a manifest path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.origin.join(path).map_err(|e| {
            PathfinderError::config_with_source(format!("invalid asset path {path:?}"), e)
        })
    }

    /// Every manifest entry as an absolute URL, in manifest order.
    pub fn resolved_assets(&self) -> Result<Vec<Url>> {
        self.assets.iter().map(|path| self.resolve(path)).collect()
    }

    /// Whether requests to this URL bypass the worker entirely.
    ///
    /// Anything that is not http(s) is excluded as well, since it can never
    /// be stored in the cache.
    pub fn is_excluded(&self, url: &Url) -> bool {
        let scheme = url.scheme();
        self.excluded_schemes.iter().any(|s| s == scheme) || !matches!(scheme, "http" | "https")
    }

    /// Network timeout, if configured.
    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout_ms.map(Duration::from_millis)
    }
}
