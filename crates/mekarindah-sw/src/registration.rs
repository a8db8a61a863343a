//! Worker generations for one scope: installing, waiting and active.

use crate::request::Request;
use crate::worker::{EventOutcome, ServiceWorker, WorkerEvent};
use crate::{Result, ServiceWorkerError, ServiceWorkerId, ServiceWorkerState};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};
use url::Url;

/// Events emitted as generations change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerEvent {
    /// State changed.
    StateChange {
        worker_id: ServiceWorkerId,
        new_state: ServiceWorkerState,
    },
    /// A new worker now controls the scope's pages.
    ControllerChange { worker_id: ServiceWorkerId },
}

struct Slot {
    worker: Arc<ServiceWorker>,
    state: ServiceWorkerState,
}

#[derive(Default)]
struct Registration {
    installing: Option<Slot>,
    waiting: Option<Slot>,
    active: Option<Slot>,
}

impl Registration {
    fn state_of(&self, id: ServiceWorkerId) -> Option<ServiceWorkerState> {
        [&self.installing, &self.waiting, &self.active]
            .into_iter()
            .flatten()
            .find(|slot| slot.worker.id() == id)
            .map(|slot| slot.state)
    }
}

/// Service worker container for one scope.
pub struct ServiceWorkerContainer {
    scope: Url,
    registration: RwLock<Registration>,
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl ServiceWorkerContainer {
    /// Create a new container.
    pub fn new(scope: Url) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                scope,
                registration: RwLock::new(Registration::default()),
                event_tx,
            },
            event_rx,
        )
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    fn emit_state(&self, worker_id: ServiceWorkerId, new_state: ServiceWorkerState) {
        let _ = self.event_tx.send(ServiceWorkerEvent::StateChange {
            worker_id,
            new_state,
        });
    }

    /// Install a new worker generation.
    ///
    /// On failure the new worker becomes redundant and the active one keeps
    /// running. On success it waits, or activates at once if it asked to
    /// skip waiting or nothing is active yet.
    pub async fn register(&self, worker: Arc<ServiceWorker>) -> Result<()> {
        let id = worker.id();
        {
            let mut reg = self.registration.write().await;
            if let Some(previous) = reg.installing.take() {
                self.emit_state(previous.worker.id(), ServiceWorkerState::Redundant);
            }
            reg.installing = Some(Slot {
                worker: Arc::clone(&worker),
                state: ServiceWorkerState::Installing,
            });
        }
        self.emit_state(id, ServiceWorkerState::Installing);

        let installed = worker.handle_event(WorkerEvent::Install).await;

        let activate_now = {
            let mut reg = self.registration.write().await;
            let still_installing = reg
                .installing
                .as_ref()
                .is_some_and(|slot| slot.worker.id() == id);
            if still_installing {
                reg.installing = None;
            }

            if let Err(e) = installed {
                error!(worker = %id, error = %e, "Install failed, keeping previous worker");
                self.emit_state(id, ServiceWorkerState::Redundant);
                return Err(e);
            }
            if !still_installing {
                self.emit_state(id, ServiceWorkerState::Redundant);
                return Err(ServiceWorkerError::State(format!(
                    "{id} was superseded during install"
                )));
            }

            if let Some(previous) = reg.waiting.take() {
                self.emit_state(previous.worker.id(), ServiceWorkerState::Redundant);
            }
            reg.waiting = Some(Slot {
                worker: Arc::clone(&worker),
                state: ServiceWorkerState::Installed,
            });
            self.emit_state(id, ServiceWorkerState::Installed);

            worker.skip_waiting_requested() || reg.active.is_none()
        };

        if activate_now {
            self.activate_waiting().await?;
        } else {
            info!(worker = %id, "Installed, waiting for clients to close");
        }
        Ok(())
    }

    /// Promote the waiting worker to active.
    ///
    /// Background work of the outgoing worker settles before the activate
    /// handler runs, so its late cache writes cannot outlive the purge.
    pub async fn activate_waiting(&self) -> Result<()> {
        let (worker, outgoing) = {
            let mut reg = self.registration.write().await;
            let slot = reg
                .waiting
                .take()
                .ok_or_else(|| ServiceWorkerError::State("No waiting worker".to_string()))?;
            let outgoing = reg.active.take().map(|old| old.worker);
            reg.active = Some(Slot {
                worker: Arc::clone(&slot.worker),
                state: ServiceWorkerState::Activating,
            });
            (slot.worker, outgoing)
        };
        let id = worker.id();
        self.emit_state(id, ServiceWorkerState::Activating);

        if let Some(old) = outgoing {
            old.wait_until_idle().await;
            self.emit_state(old.id(), ServiceWorkerState::Redundant);
        }

        // Activation failures do not roll back; the worker is active either way.
        if let Err(e) = worker.handle_event(WorkerEvent::Activate).await {
            warn!(worker = %id, error = %e, "Activate handler failed");
        }

        {
            let mut reg = self.registration.write().await;
            if let Some(slot) = reg.active.as_mut().filter(|s| s.worker.id() == id) {
                slot.state = ServiceWorkerState::Activated;
            }
        }
        self.emit_state(id, ServiceWorkerState::Activated);
        info!(scope = %self.scope, worker = %id, "Worker activated");
        let _ = self
            .event_tx
            .send(ServiceWorkerEvent::ControllerChange { worker_id: id });
        Ok(())
    }

    pub async fn active(&self) -> Option<Arc<ServiceWorker>> {
        let reg = self.registration.read().await;
        reg.active.as_ref().map(|s| Arc::clone(&s.worker))
    }

    pub async fn waiting(&self) -> Option<Arc<ServiceWorker>> {
        let reg = self.registration.read().await;
        reg.waiting.as_ref().map(|s| Arc::clone(&s.worker))
    }

    /// State of a worker still held by this registration.
    pub async fn state_of(&self, id: ServiceWorkerId) -> Option<ServiceWorkerState> {
        self.registration.read().await.state_of(id)
    }

    /// Route a fetch to the active worker; passthrough when none.
    pub async fn fetch(&self, request: Request) -> Result<EventOutcome> {
        match self.active().await {
            Some(worker) => worker.handle_event(WorkerEvent::Fetch(request)).await,
            None => Ok(EventOutcome::Passthrough),
        }
    }

    /// Dispatch any event to the active worker.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
        let worker = self
            .active()
            .await
            .ok_or_else(|| ServiceWorkerError::State("No active worker".to_string()))?;
        worker.handle_event(event).await
    }

    /// Post a message from a page to the active worker.
    pub async fn post_message(&self, data: JsonValue) -> Result<EventOutcome> {
        self.dispatch(WorkerEvent::Message(data)).await
    }

    /// Post a message to the waiting worker; activates it if it asks to
    /// skip waiting.
    pub async fn post_message_to_waiting(&self, data: JsonValue) -> Result<EventOutcome> {
        let worker = self
            .waiting()
            .await
            .ok_or_else(|| ServiceWorkerError::State("No waiting worker".to_string()))?;
        let outcome = worker.handle_event(WorkerEvent::Message(data)).await?;
        if worker.skip_waiting_requested() {
            self.activate_waiting().await?;
        }
        Ok(outcome)
    }
}
