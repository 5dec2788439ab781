//! Open application instances the worker may control.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use url::Url;

/// A client (open page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: String,
    pub url: Url,
    /// Version id of the controlling worker, if any.
    pub controller: Option<String>,
}

impl Client {
    /// Create an uncontrolled client.
    pub fn new(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            controller: None,
        }
    }

    pub fn is_controlled(&self) -> bool {
        self.controller.is_some()
    }
}

/// Clients registry.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new uncontrolled window for `url` and return its id.
    pub fn open_window(&mut self, url: Url) -> String {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed));
        self.add(Client::new(id.clone(), url));
        id
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Clients controlled by the given version.
    pub fn controlled_by(&self, version: &str) -> Vec<&Client> {
        self.clients
            .values()
            .filter(|c| c.controller.as_deref() == Some(version))
            .collect()
    }

    /// Make `version` the controller of every client.
    ///
    /// Returns the ids whose controller changed, sorted.
    pub fn claim(&mut self, version: &str) -> Vec<String> {
        let mut changed: Vec<String> = self
            .clients
            .values_mut()
            .filter(|c| c.controller.as_deref() != Some(version))
            .map(|c| {
                c.controller = Some(version.to_string());
                c.id.clone()
            })
            .collect();
        changed.sort();
        changed
    }
}
