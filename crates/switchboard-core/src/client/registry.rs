//! Name-indexed registry of provider clients.

use std::collections::HashMap;

use super::box_client::BoxProviderClient;

/// Clients available for dispatch, keyed by provider name.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, BoxProviderClient>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own name, replacing any previous one.
    pub fn register(&mut self, client: BoxProviderClient) {
        self.clients.insert(client.name().to_string(), client);
    }

    pub fn with(mut self, client: BoxProviderClient) -> Self {
        self.register(client);
        self
    }

    pub fn get(&self, name: &str) -> Option<&BoxProviderClient> {
        self.clients.get(name)
    }

    /// Registered provider names, sorted.
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
