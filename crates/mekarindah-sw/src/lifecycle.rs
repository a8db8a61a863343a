//! Install and activate steps.

use crate::cache::CacheStore;
use crate::clients::Clients;
use crate::config::WorkerConfig;
use crate::fetch::Fetcher;
use crate::request::{Request, Response};
use crate::{Result, ServiceWorkerError, ServiceWorkerId};
use futures::future::try_join_all;
use tokio::sync::RwLock;
use tracing::{error, info};

/// What activation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Obsolete caches that were deleted.
    pub deleted_caches: Vec<String>,
    /// Clients that switched to this worker.
    pub claimed_clients: usize,
}

/// Pre-cache every static asset into the current cache.
///
/// All assets are fetched before anything is written; one failed fetch or
/// non-ok status fails the whole install and leaves the store untouched.
pub async fn install(
    config: &WorkerConfig,
    caches: &dyn CacheStore,
    fetcher: &dyn Fetcher,
) -> Result<usize> {
    info!(cache = %config.cache_name, assets = config.static_assets.len(), "Installing service worker");

    let requests = config
        .static_assets
        .iter()
        .map(|asset| {
            config
                .resolve(asset)
                .map(Request::get)
                .map_err(|e| ServiceWorkerError::InstallFailed(format!("bad asset URL {asset}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let entries = match try_join_all(requests.into_iter().map(|request| fetch_asset(fetcher, request))).await {
        Ok(entries) => entries,
        Err(e) => {
            error!(cache = %config.cache_name, error = %e, "Failed to cache static assets");
            return Err(e);
        }
    };

    let count = entries.len();
    caches.put_all(&config.cache_name, entries).await?;
    info!(cache = %config.cache_name, count, "Static assets cached successfully");
    Ok(count)
}

async fn fetch_asset(fetcher: &dyn Fetcher, request: Request) -> Result<(Request, Response)> {
    let response = fetcher
        .fetch(&request)
        .await
        .map_err(|e| ServiceWorkerError::InstallFailed(format!("{}: {e}", request.url)))?;
    if !response.ok() {
        return Err(ServiceWorkerError::InstallFailed(format!(
            "{} returned {}",
            request.url, response.status
        )));
    }
    Ok((request, response))
}

/// Delete obsolete caches and take control of open clients.
pub async fn activate(
    config: &WorkerConfig,
    worker: ServiceWorkerId,
    caches: &dyn CacheStore,
    clients: &RwLock<Clients>,
) -> Result<ActivationReport> {
    info!(worker = %worker, "Activating service worker");

    let mut report = ActivationReport::default();
    for name in caches.keys().await {
        if name != config.cache_name {
            info!(cache = %name, "Deleting old cache");
            caches.delete(&name).await;
            report.deleted_caches.push(name);
        }
    }
    caches.open(&config.cache_name).await?;

    report.claimed_clients = clients.write().await.claim(worker, &config.origin);
    info!(
        worker = %worker,
        deleted = report.deleted_caches.len(),
        claimed = report.claimed_clients,
        "Service worker activated"
    );
    Ok(report)
}
