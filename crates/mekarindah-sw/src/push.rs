//! Push messages, notifications and notification clicks.

use crate::clients::{ClientMatchOptions, ClientType, Clients};
use crate::config::{NotificationDefaults, WorkerConfig};
use crate::{Result, ServiceWorkerError, ServiceWorkerId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Action id that dismisses a notification without navigating.
pub const CLOSE_ACTION: &str = "close";

/// Action id that opens the site.
pub const OPEN_ACTION: &str = "open";

// ==================== Payload ====================

/// Data carried by a push message. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub url: Option<String>,
}

impl PushPayload {
    /// Parse raw push data.
    ///
    /// A JSON object supplies the fields it has. A JSON string is the body.
    /// Anything else is taken as a plain-text body.
    pub fn parse(data: Option<&[u8]>) -> Self {
        let Some(data) = data else {
            return Self::default();
        };
        match serde_json::from_slice::<JsonValue>(data) {
            Ok(JsonValue::String(text)) => Self::text(text),
            Ok(value @ JsonValue::Object(_)) => match serde_json::from_value(value) {
                Ok(payload) => payload,
                Err(e) => {
                    debug!(error = %e, "Push data has unexpected fields, using it as text");
                    Self::text(String::from_utf8_lossy(data).into_owned())
                }
            },
            Ok(_) => Self::text(String::from_utf8_lossy(data).into_owned()),
            Err(e) => {
                debug!(error = %e, "Push data is not JSON, using it as text");
                Self::text(String::from_utf8_lossy(data).into_owned())
            }
        }
    }

    fn text(body: String) -> Self {
        Self {
            body: Some(body),
            ..Default::default()
        }
    }
}

// ==================== Notifications ====================

/// A button shown on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Display options for a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    /// URL opened when the notification is clicked.
    pub url: String,
    pub actions: Vec<NotificationAction>,
}

/// A displayed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub title: String,
    pub options: NotificationOptions,
}

impl Notification {
    /// Build a notification from a payload, filling gaps from defaults.
    pub fn from_payload(payload: PushPayload, defaults: &NotificationDefaults) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let options = NotificationOptions {
            body: payload.body.unwrap_or_else(|| defaults.body.clone()),
            icon: payload.icon.unwrap_or_else(|| defaults.icon.clone()),
            badge: payload.badge.unwrap_or_else(|| defaults.badge.clone()),
            vibrate: defaults.vibrate.clone(),
            url: payload.url.unwrap_or_else(|| defaults.url.clone()),
            actions: vec![
                NotificationAction {
                    action: OPEN_ACTION.to_string(),
                    title: defaults.open_action_title.clone(),
                },
                NotificationAction {
                    action: CLOSE_ACTION.to_string(),
                    title: defaults.close_action_title.clone(),
                },
            ],
        };

        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            title: payload.title.unwrap_or_else(|| defaults.title.clone()),
            options,
        }
    }
}

/// Notifications currently on screen.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    shown: Vec<Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display a notification.
    pub fn show(&mut self, notification: Notification) {
        self.shown.push(notification);
    }

    /// Dismiss a notification. Returns whether it was on screen.
    pub fn close(&mut self, id: u64) -> bool {
        let before = self.shown.len();
        self.shown.retain(|n| n.id != id);
        self.shown.len() != before
    }

    /// Notifications on screen, oldest first.
    pub fn shown(&self) -> &[Notification] {
        &self.shown
    }
}

// ==================== Click ====================

/// What a notification click did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The close action; nothing else happened.
    Dismissed,
    /// An existing window was navigated and focused.
    Focused { client_id: String },
    /// A new window was opened.
    Opened { client_id: String },
}

/// Handle a click on a notification.
pub async fn notification_click(
    config: &WorkerConfig,
    worker: ServiceWorkerId,
    clients: &RwLock<Clients>,
    notifications: &RwLock<NotificationCenter>,
    notification: &Notification,
    action: Option<&str>,
) -> Result<ClickOutcome> {
    info!(id = notification.id, action = ?action, "Notification clicked");
    notifications.write().await.close(notification.id);

    if action == Some(CLOSE_ACTION) {
        return Ok(ClickOutcome::Dismissed);
    }

    let target = config
        .resolve(&notification.options.url)
        .map_err(|e| ServiceWorkerError::InvalidUrl(format!("{}: {e}", notification.options.url)))?;

    let mut clients = clients.write().await;
    let options = ClientMatchOptions {
        include_uncontrolled: true,
        client_type: ClientType::Window,
    };
    let existing = clients
        .match_all(worker, &options)
        .into_iter()
        .find(|c| config.is_same_origin(&c.url))
        .map(|c| c.id.clone());

    match existing {
        Some(client_id) => {
            clients.navigate_and_focus(&client_id, target)?;
            Ok(ClickOutcome::Focused { client_id })
        }
        None => {
            let client = clients.open_window(target);
            Ok(ClickOutcome::Opened {
                client_id: client.id,
            })
        }
    }
}
