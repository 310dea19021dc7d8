//! Worker lifecycle and client bookkeeping.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use hashbrown::HashMap;
use url::Url;

use crate::ServiceWorkerError;

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceWorkerState {
    /// Registered, install not started.
    #[default]
    Parsed,
    /// Install handler running.
    Installing,
    /// Installed, waiting to activate.
    Installed,
    /// Activate handler running.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced by a newer worker.
    Redundant,
}

impl fmt::Display for ServiceWorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceWorkerState::Parsed => "parsed",
            ServiceWorkerState::Installing => "installing",
            ServiceWorkerState::Installed => "installed",
            ServiceWorkerState::Activating => "activating",
            ServiceWorkerState::Activated => "activated",
            ServiceWorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// A service worker instance.
#[derive(Debug, Clone)]
pub struct ServiceWorker {
    pub id: ServiceWorkerId,
    pub script_url: Url,
    pub state: ServiceWorkerState,
    /// Time of last state change.
    pub state_changed_at: Instant,
}

impl ServiceWorker {
    pub fn new(script_url: Url) -> Self {
        Self {
            id: ServiceWorkerId::new(),
            script_url,
            state: ServiceWorkerState::Parsed,
            state_changed_at: Instant::now(),
        }
    }

    pub fn set_state(&mut self, state: ServiceWorkerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }
}

/// Installing / waiting / active worker slots.
#[derive(Debug, Default)]
pub struct ServiceWorkerRegistration {
    pub installing: Option<ServiceWorker>,
    pub waiting: Option<ServiceWorker>,
    pub active: Option<ServiceWorker>,
    /// Set by the install handler; lets the waiting worker activate while
    /// clients are still controlled by the previous one.
    skip_waiting: bool,
}

impl ServiceWorkerRegistration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start installing a new worker. Any earlier install in progress is discarded.
    pub fn begin_install(&mut self, script_url: Url) -> ServiceWorkerId {
        let mut worker = ServiceWorker::new(script_url);
        worker.set_state(ServiceWorkerState::Installing);
        let id = worker.id;
        if let Some(mut stale) = self.installing.replace(worker) {
            stale.set_state(ServiceWorkerState::Redundant);
        }
        self.skip_waiting = false;
        id
    }

    /// Move the installing worker to the waiting slot.
    pub fn install_complete(&mut self) -> Result<ServiceWorkerId, ServiceWorkerError> {
        let mut worker = self
            .installing
            .take()
            .ok_or_else(|| ServiceWorkerError::StateError("No worker is installing".to_string()))?;
        worker.set_state(ServiceWorkerState::Installed);
        let id = worker.id;
        if let Some(mut replaced) = self.waiting.replace(worker) {
            replaced.set_state(ServiceWorkerState::Redundant);
        }
        Ok(id)
    }

    pub fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    pub fn skips_waiting(&self) -> bool {
        self.skip_waiting
    }

    /// Whether the waiting worker may activate now.
    pub fn ready_to_activate(&self, clients_of_active: usize) -> bool {
        self.waiting.is_some() && (self.skip_waiting || clients_of_active == 0)
    }

    /// Promote the waiting worker; the previous active worker becomes redundant.
    pub fn activate(&mut self, clients_of_active: usize) -> Result<ServiceWorkerId, ServiceWorkerError> {
        if !self.ready_to_activate(clients_of_active) {
            return Err(ServiceWorkerError::StateError(match self.waiting {
                None => "No worker is waiting to activate".to_string(),
                Some(_) => format!(
                    "Waiting worker blocked by {} client(s) of the active worker",
                    clients_of_active
                ),
            }));
        }

        let mut worker = self
            .waiting
            .take()
            .ok_or_else(|| ServiceWorkerError::StateError("No worker is waiting".to_string()))?;
        worker.set_state(ServiceWorkerState::Activating);

        if let Some(mut old) = self.active.take() {
            old.set_state(ServiceWorkerState::Redundant);
        }

        worker.set_state(ServiceWorkerState::Activated);
        let id = worker.id;
        self.active = Some(worker);
        Ok(id)
    }

    pub fn active_id(&self) -> Option<ServiceWorkerId> {
        self.active.as_ref().map(|w| w.id)
    }
}

/// An open application window.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub url: Url,
    /// Worker currently controlling this client.
    pub controller: Option<ServiceWorkerId>,
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened window. It starts uncontrolled.
    pub fn open_window(&mut self, url: Url) -> Client {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed));
        let client = Client {
            id: id.clone(),
            url,
            controller: None,
        };
        self.clients.insert(id, client.clone());
        client
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Number of clients controlled by `worker`.
    pub fn controlled_by(&self, worker: ServiceWorkerId) -> usize {
        self.clients
            .values()
            .filter(|c| c.controller == Some(worker))
            .count()
    }

    /// Make `worker` the controller of every client. Returns how many changed hands.
    pub fn claim(&mut self, worker: ServiceWorkerId) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if client.controller != Some(worker) {
                client.controller = Some(worker);
                claimed += 1;
            }
        }
        claimed
    }
}
