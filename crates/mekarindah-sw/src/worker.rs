//! The service worker and its event dispatch.

use crate::cache::{CacheStore, MemoryCacheStorage};
use crate::clients::Clients;
use crate::config::WorkerConfig;
use crate::fetch::Fetcher;
use crate::lifecycle::{self, ActivationReport};
use crate::message::ClientMessage;
use crate::push::{self, ClickOutcome, Notification, NotificationCenter, PushPayload};
use crate::request::{Request, Response};
use crate::strategy::StrategyContext;
use crate::{Result, ServiceWorkerId};
use bytes::Bytes;
use futures::future::BoxFuture;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ==================== Host Services ====================

/// Capabilities the host hands to every worker generation.
#[derive(Clone)]
pub struct HostServices {
    pub caches: Arc<dyn CacheStore>,
    pub fetcher: Arc<dyn Fetcher>,
    pub clients: Arc<RwLock<Clients>>,
    pub notifications: Arc<RwLock<NotificationCenter>>,
}

impl HostServices {
    /// Create host services with empty client and notification registries.
    pub fn new(caches: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            caches,
            fetcher,
            clients: Arc::new(RwLock::new(Clients::new())),
            notifications: Arc::new(RwLock::new(NotificationCenter::new())),
        }
    }

    /// Host services backed by an in-memory cache store.
    pub fn in_memory(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new(Arc::new(MemoryCacheStorage::new()), fetcher)
    }
}

// ==================== Pending Work ====================

/// Background tasks the host must let finish before the worker may stop.
#[derive(Debug, Clone, Default)]
pub struct PendingWork {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl PendingWork {
    /// Keep the worker alive until `handle` completes.
    pub async fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Await every tracked task, including ones added while waiting.
    pub async fn wait_idle(&self) {
        loop {
            let batch = std::mem::take(&mut *self.handles.lock().await);
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Background task did not complete");
                }
            }
        }
    }

    /// Number of tracked tasks still running.
    pub async fn in_flight(&self) -> usize {
        self.handles
            .lock()
            .await
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }
}

// ==================== Events ====================

/// Events the host dispatches to a worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Push(Option<Bytes>),
    NotificationClick {
        notification: Notification,
        action: Option<String>,
    },
    Message(JsonValue),
    Sync {
        tag: String,
    },
}

impl WorkerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Fetch(_) => "fetch",
            WorkerEvent::Push(_) => "push",
            WorkerEvent::NotificationClick { .. } => "notificationclick",
            WorkerEvent::Message(_) => "message",
            WorkerEvent::Sync { .. } => "sync",
        }
    }
}

/// The effect of handling an event.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    /// Static assets were cached.
    Installed { assets: usize },
    Activated(ActivationReport),
    /// The worker answered a fetch.
    Respond(Response),
    /// The fetch was not intercepted; the host goes to the network.
    Passthrough,
    NotificationShown(Notification),
    NotificationClicked(ClickOutcome),
    /// A message was handled; `None` if it was not recognised.
    MessageHandled(Option<ClientMessage>),
    /// A sync event; `ran` is false for tags this worker ignores.
    Synced { ran: bool },
}

// ==================== Service Worker ====================

/// One generation of the service worker.
pub struct ServiceWorker {
    id: ServiceWorkerId,
    config: Arc<WorkerConfig>,
    host: HostServices,
    pending: PendingWork,
    skip_waiting: AtomicBool,
}

impl ServiceWorker {
    /// Create a worker.
    pub fn new(config: WorkerConfig, host: HostServices) -> Self {
        Self {
            id: ServiceWorkerId::new(),
            config: Arc::new(config),
            host,
            pending: PendingWork::default(),
            skip_waiting: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn host(&self) -> &HostServices {
        &self.host
    }

    /// Ask to be activated without waiting for old clients to close.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Wait for background work (cache refreshes) to settle.
    pub async fn wait_until_idle(&self) {
        self.pending.wait_idle().await;
    }

    /// Background tasks still running.
    pub async fn pending_tasks(&self) -> usize {
        self.pending.in_flight().await
    }

    fn strategy_context(&self) -> StrategyContext {
        StrategyContext {
            config: Arc::clone(&self.config),
            caches: Arc::clone(&self.host.caches),
            fetcher: Arc::clone(&self.host.fetcher),
            pending: self.pending.clone(),
        }
    }

    /// Decide whether to answer a fetch.
    ///
    /// `None` means the request is not intercepted. Otherwise the returned
    /// future produces the response and owns everything it needs.
    pub fn handle_fetch(&self, request: Request) -> Option<BoxFuture<'static, Result<Response>>> {
        self.strategy_context().respond(request)
    }

    /// Handle one event to completion.
    pub async fn handle_event(&self, event: WorkerEvent) -> Result<EventOutcome> {
        debug!(worker = %self.id, event = event.name(), "Dispatching event");
        match event {
            WorkerEvent::Install => self.on_install().await,
            WorkerEvent::Activate => {
                let report = lifecycle::activate(
                    &self.config,
                    self.id,
                    self.host.caches.as_ref(),
                    &self.host.clients,
                )
                .await?;
                Ok(EventOutcome::Activated(report))
            }
            WorkerEvent::Fetch(request) => match self.handle_fetch(request) {
                Some(response) => Ok(EventOutcome::Respond(response.await?)),
                None => Ok(EventOutcome::Passthrough),
            },
            WorkerEvent::Push(data) => Ok(self.on_push(data.as_deref()).await),
            WorkerEvent::NotificationClick {
                notification,
                action,
            } => {
                let outcome = push::notification_click(
                    &self.config,
                    self.id,
                    &self.host.clients,
                    &self.host.notifications,
                    &notification,
                    action.as_deref(),
                )
                .await?;
                Ok(EventOutcome::NotificationClicked(outcome))
            }
            WorkerEvent::Message(data) => Ok(self.on_message(&data).await),
            WorkerEvent::Sync { tag } => Ok(self.on_sync(&tag).await),
        }
    }

    async fn on_install(&self) -> Result<EventOutcome> {
        let assets = lifecycle::install(
            &self.config,
            self.host.caches.as_ref(),
            self.host.fetcher.as_ref(),
        )
        .await?;
        self.skip_waiting();
        Ok(EventOutcome::Installed { assets })
    }

    async fn on_push(&self, data: Option<&[u8]>) -> EventOutcome {
        info!(worker = %self.id, has_data = data.is_some(), "Push notification received");
        let payload = PushPayload::parse(data);
        let notification = Notification::from_payload(payload, &self.config.notification);
        self.host
            .notifications
            .write()
            .await
            .show(notification.clone());
        EventOutcome::NotificationShown(notification)
    }

    async fn on_message(&self, data: &JsonValue) -> EventOutcome {
        info!(worker = %self.id, data = %data, "Message received");
        let message = ClientMessage::parse(data);
        match message {
            Some(ClientMessage::SkipWaiting) => self.skip_waiting(),
            Some(ClientMessage::ClearCache) => {
                if self.host.caches.delete(&self.config.cache_name).await {
                    info!(cache = %self.config.cache_name, "Cache cleared");
                } else {
                    debug!(cache = %self.config.cache_name, "Cache already absent");
                }
            }
            None => {}
        }
        EventOutcome::MessageHandled(message)
    }

    async fn on_sync(&self, tag: &str) -> EventOutcome {
        info!(worker = %self.id, tag, "Background sync");
        if tag != self.config.sync_tag {
            return EventOutcome::Synced { ran: false };
        }
        self.sync_data().await;
        EventOutcome::Synced { ran: true }
    }

    // TODO: replay writes queued while offline once the site has any.
    async fn sync_data(&self) {
        info!(worker = %self.id, "Syncing data");
    }
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("id", &self.id)
            .field("cache_name", &self.config.cache_name)
            .field("skip_waiting", &self.skip_waiting_requested())
            .finish()
    }
}
