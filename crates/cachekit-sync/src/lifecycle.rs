//! Worker lifecycle state and client control.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use url::Url;

/// Lifecycle phase of a sync worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerPhase {
    /// Created, nothing staged yet.
    Idle,
    /// Staging the application shell.
    Installing,
    /// Shell staged, waiting to activate.
    Installed,
    /// Reconciling the content cache.
    Activating,
    /// Active and serving intercepted fetches.
    Activated,
    /// Install failed; this worker will never activate.
    Redundant,
}

impl Default for WorkerPhase {
    fn default() -> Self {
        Self::Idle
    }
}

/// Events emitted by the worker for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Lifecycle phase changed.
    PhaseChanged(WorkerPhase),
    /// The worker asked to leave the waiting phase immediately.
    SkipWaitingRequested,
    /// The worker took control of connected clients.
    ClientsClaimed { count: usize },
    /// Reconciliation failed and every partition was deleted.
    CacheTornDown,
}

/// A connected client page.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Page URL.
    pub url: Url,

    /// Whether this worker controls the client.
    pub controlled: bool,
}

/// Registry of connected clients.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Client>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. New clients start uncontrolled.
    pub fn add(&mut self, id: impl Into<String>, url: Url) {
        let id = id.into();
        self.clients.insert(
            id.clone(),
            Client {
                id,
                url,
                controlled: false,
            },
        );
    }

    /// Remove a client (e.g., page closed).
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Take control of every connected client immediately, without waiting
    /// for a navigation. Returns how many clients changed hands.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if !client.controlled {
                client.controlled = true;
                claimed += 1;
            }
        }
        claimed
    }

    /// Number of controlled clients.
    pub fn controlled_count(&self) -> usize {
        self.clients.values().filter(|c| c.controlled).count()
    }

    /// Number of connected clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are connected.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://app.example/").unwrap()
    }

    #[test]
    fn test_phase_default() {
        assert_eq!(WorkerPhase::default(), WorkerPhase::Idle);
    }

    #[test]
    fn test_new_clients_start_uncontrolled() {
        let mut registry = ClientRegistry::new();
        registry.add("tab-1", page());

        assert_eq!(registry.len(), 1);
        assert!(!registry.get("tab-1").unwrap().controlled);
        assert_eq!(registry.controlled_count(), 0);
    }

    #[test]
    fn test_claim_controls_all_clients() {
        let mut registry = ClientRegistry::new();
        registry.add("tab-1", page());
        registry.add("tab-2", page());

        assert_eq!(registry.claim(), 2);
        assert_eq!(registry.controlled_count(), 2);

        // Already controlled, nothing changes hands.
        assert_eq!(registry.claim(), 0);
    }

    #[test]
    fn test_remove_client() {
        let mut registry = ClientRegistry::new();
        registry.add("tab-1", page());
        assert!(registry.remove("tab-1").is_some());
        assert!(registry.is_empty());
    }
}
