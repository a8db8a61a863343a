//! # Mekarindah Service Worker
//!
//! Offline support for the Masjid Mekarindah website, modelled as a
//! service worker whose host capabilities are injected.
//!
//! ## Features
//!
//! - **Pre-caching**: static assets fetched and stored atomically at install
//! - **Fetch strategies**: network-first for API hosts, cache-first for
//!   images, stale-while-revalidate for everything else
//! - **Cache versioning**: obsolete caches purged on activation
//! - **Push**: notifications with open/close actions
//! - **Client messages**: `SKIP_WAITING` and `CLEAR_CACHE`
//! - **Background sync**: `sync-data` hook
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerContainer (one scope)
//!     ├── installing / waiting / active (ServiceWorker)
//!     │
//!     └── ServiceWorker::handle_event(WorkerEvent)
//!             ├── Install   → lifecycle::install
//!             ├── Activate  → lifecycle::activate
//!             ├── Fetch     → strategy::{network_first, cache_first, stale_while_revalidate}
//!             ├── Push / NotificationClick → push
//!             ├── Message   → message
//!             └── Sync
//!
//! HostServices
//!     ├── CacheStore   (MemoryCacheStorage)
//!     ├── Fetcher      (HttpFetcher)
//!     ├── Clients
//!     └── NotificationCenter
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod config;
pub mod fetch;
pub mod lifecycle;
pub mod message;
pub mod push;
pub mod registration;
pub mod request;
pub mod strategy;
pub mod worker;

pub use cache::{CacheEntry, CacheKey, CacheStore, MemoryCacheStorage};
pub use clients::{Client, ClientMatchOptions, ClientType, Clients};
pub use config::{NotificationDefaults, WorkerConfig};
pub use fetch::{FetchError, Fetcher, FetcherConfig, HttpFetcher};
pub use lifecycle::ActivationReport;
pub use message::ClientMessage;
pub use push::{
    ClickOutcome, Notification, NotificationAction, NotificationCenter, NotificationOptions,
    PushPayload,
};
pub use registration::{ServiceWorkerContainer, ServiceWorkerEvent};
pub use request::{Request, RequestDestination, RequestMode, Response};
pub use strategy::{Strategy, StrategyContext};
pub use worker::{EventOutcome, HostServices, PendingWork, ServiceWorker, WorkerEvent};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Network error: {0}")]
    Network(#[from] FetchError),

    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl ServiceWorkerError {
    /// Whether this error came from the network.
    pub fn is_network(&self) -> bool {
        matches!(self, ServiceWorkerError::Network(_))
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            ServiceWorkerError::Network(_) => "network",
            ServiceWorkerError::InstallFailed(_) => "install",
            ServiceWorkerError::Cache(_) => "cache",
            ServiceWorkerError::State(_) => "state",
            ServiceWorkerError::InvalidUrl(_) => "invalid_url",
            ServiceWorkerError::NotFound(_) => "not_found",
            ServiceWorkerError::Task(_) => "task",
        }
    }
}

/// Result type alias for service worker operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;

// ==================== Types ====================

/// Unique identifier for a service worker generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ServiceWorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sw-{}", self.0)
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceWorkerState {
    /// Created, install not yet run.
    #[default]
    Parsed,
    /// Installing (install event).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}
