//! Pages and workers the service worker can see and control.

use crate::{ServiceWorkerError, ServiceWorkerId};
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    SharedWorker,
    All,
}

/// A client (open page or worker).
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub url: Url,
    pub client_type: ClientType,
    /// Whether focused.
    pub focused: bool,
    /// Worker currently controlling this client.
    pub controller: Option<ServiceWorkerId>,
}

impl Client {
    /// Create an uncontrolled, unfocused window client.
    pub fn window(url: Url) -> Self {
        Self {
            id: next_client_id(),
            url,
            client_type: ClientType::Window,
            focused: false,
            controller: None,
        }
    }
}

/// Options for [`Clients::match_all`].
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
    /// Insertion order, so matches come back oldest first.
    order: Vec<String>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) -> String {
        let id = client.id.clone();
        if self.clients.insert(id.clone(), client).is_none() {
            self.order.push(id.clone());
        }
        id
    }

    /// Remove a client (page closed).
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.order.retain(|existing| existing != id);
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

    /// Match clients, oldest first.
    pub fn match_all(&self, controller: ServiceWorkerId, options: &ClientMatchOptions) -> Vec<&Client> {
        self.order
            .iter()
            .filter_map(|id| self.clients.get(id))
            .filter(|c| options.include_uncontrolled || c.controller == Some(controller))
            .filter(|c| match options.client_type {
                ClientType::All => true,
                t => c.client_type == t,
            })
            .collect()
    }

    /// Navigate a window client and focus it.
    pub fn navigate_and_focus(&mut self, id: &str, url: Url) -> Result<(), ServiceWorkerError> {
        let client = self
            .clients
            .get_mut(id)
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("client {id}")))?;
        if client.client_type != ClientType::Window {
            return Err(ServiceWorkerError::State(
                "Can only navigate window clients".to_string(),
            ));
        }
        client.url = url;
        client.focused = true;
        for (other_id, other) in self.clients.iter_mut() {
            if other_id != id {
                other.focused = false;
            }
        }
        Ok(())
    }

    /// Open a new focused window.
    pub fn open_window(&mut self, url: Url) -> Client {
        for client in self.clients.values_mut() {
            client.focused = false;
        }
        let mut client = Client::window(url);
        client.focused = true;
        self.add(client.clone());
        client
    }

    /// Make `worker` the controller of every window and worker client
    /// inside `scope`. Returns how many clients changed controller.
    pub fn claim(&mut self, worker: ServiceWorkerId, scope: &Url) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if client.url.as_str().starts_with(scope.as_str()) && client.controller != Some(worker) {
                client.controller = Some(worker);
                claimed += 1;
            }
        }
        claimed
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
