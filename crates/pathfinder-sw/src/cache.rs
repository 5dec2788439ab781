//! Versioned cache storage.
//!
//! ```text
//! CacheStorage
//!     └── Cache (one per version id)
//!             └── RequestKey → CacheEntry
//! ```
//!
//! [`CacheStore`] is the capability the worker is handed; every method is an
//! independent atomic step. A lookup followed by a store is not transactional,
//! so two concurrent misses for the same URL both write and the last one wins.

use std::fmt;
use std::time::SystemTime;

use async_trait::async_trait;
use hashbrown::HashMap;
use pathfinder_net::{Method, Request, Response};
use tokio::sync::RwLock;
use url::Url;

use crate::ServiceWorkerError;

/// Lookup key for a cached request: the URL without its fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    /// Key for a GET of `url`.
    pub fn from_url(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(url.into())
    }

    /// Key for a request, or `None` if the method is never cacheable.
    pub fn for_request(request: &Request) -> Option<Self> {
        (request.method == Method::GET).then(|| Self::from_url(&request.url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: RequestKey,
    /// Immutable snapshot of the network response.
    pub response: Response,
    pub cached_at: SystemTime,
}

/// A single named cache.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name (the version id).
    pub name: String,

    entries: HashMap<RequestKey, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, key: &RequestKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Add or replace an entry.
    pub fn put(&mut self, key: RequestKey, response: Response) {
        let entry = CacheEntry {
            key: key.clone(),
            response,
            cached_at: SystemTime::now(),
        };
        self.entries.insert(key, entry);
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &RequestKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<&RequestKey> {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All caches, by name.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Get an existing cache.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// All cache names, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.caches.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Asynchronous cache capability handed to a worker.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the named cache if it does not exist.
    async fn open(&self, name: &str) -> Result<(), ServiceWorkerError>;

    async fn has(&self, name: &str) -> Result<bool, ServiceWorkerError>;

    /// Names of every cache.
    async fn keys(&self) -> Result<Vec<String>, ServiceWorkerError>;

    /// Delete a whole cache. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, ServiceWorkerError>;

    /// Look up a request in one cache.
    async fn match_in(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<Response>, ServiceWorkerError>;

    /// Store a response, creating the cache if needed.
    async fn put(
        &self,
        name: &str,
        key: RequestKey,
        response: Response,
    ) -> Result<(), ServiceWorkerError>;

    /// Keys stored in one cache; empty if the cache does not exist.
    async fn entry_keys(&self, name: &str) -> Result<Vec<RequestKey>, ServiceWorkerError>;
}

/// In-process [`CacheStore`].
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    storage: RwLock<CacheStorage>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, name: &str) -> Result<(), ServiceWorkerError> {
        self.storage.write().await.open(name);
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, ServiceWorkerError> {
        Ok(self.storage.read().await.has(name))
    }

    async fn keys(&self) -> Result<Vec<String>, ServiceWorkerError> {
        Ok(self
            .storage
            .read()
            .await
            .keys()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, ServiceWorkerError> {
        Ok(self.storage.write().await.delete(name))
    }

    async fn match_in(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<Response>, ServiceWorkerError> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(name)
            .and_then(|cache| cache.match_request(key))
            .map(|entry| entry.response.clone()))
    }

    async fn put(
        &self,
        name: &str,
        key: RequestKey,
        response: Response,
    ) -> Result<(), ServiceWorkerError> {
        self.storage.write().await.open(name).put(key, response);
        Ok(())
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<RequestKey>, ServiceWorkerError> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(name)
            .map(|cache| cache.keys().into_iter().cloned().collect())
            .unwrap_or_default())
    }
}
