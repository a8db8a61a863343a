//! Caching strategies and the fetch dispatcher that picks between them.

use crate::cache::CacheStore;
use crate::config::WorkerConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::request::{Request, RequestDestination, Response};
use crate::worker::PendingWork;
use crate::{Result, ServiceWorkerError};
use futures::future::{BoxFuture, FutureExt};
use http::Method;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// How a request is resolved against the cache and the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Network, falling back to cache, then the offline page.
    NetworkFirst,
    /// Cache, falling back to network, then an empty 404.
    CacheFirst,
    /// Cache immediately, refresh from network in the background.
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::NetworkFirst => "network-first",
            Strategy::CacheFirst => "cache-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }

    /// Run this strategy for a request.
    pub async fn run(self, ctx: &StrategyContext, request: Request) -> Result<Response> {
        match self {
            Strategy::NetworkFirst => network_first(ctx, request).await,
            Strategy::CacheFirst => cache_first(ctx, request).await,
            Strategy::StaleWhileRevalidate => stale_while_revalidate(ctx, request).await,
        }
    }
}

/// Pick a strategy for a request, or `None` when the request must go to
/// the network untouched (non-GET, non-http(s)).
pub fn classify(config: &WorkerConfig, request: &Request) -> Option<Strategy> {
    if request.method != Method::GET || !request.is_http() {
        return None;
    }

    let is_api = request
        .url
        .host_str()
        .is_some_and(|host| config.is_api_host(host));

    if is_api {
        Some(Strategy::NetworkFirst)
    } else if request.destination == RequestDestination::Image {
        Some(Strategy::CacheFirst)
    } else {
        Some(Strategy::StaleWhileRevalidate)
    }
}

/// Capabilities a strategy runs against.
#[derive(Clone)]
pub struct StrategyContext {
    pub config: Arc<WorkerConfig>,
    pub caches: Arc<dyn CacheStore>,
    pub fetcher: Arc<dyn Fetcher>,
    pub pending: PendingWork,
}

impl StrategyContext {
    /// Classify and, if intercepted, return the future that produces the
    /// response.
    pub fn respond(&self, request: Request) -> Option<BoxFuture<'static, Result<Response>>> {
        let strategy = classify(&self.config, &request)?;
        debug!(url = %request.url, strategy = strategy.name(), "Intercepting request");

        let ctx = self.clone();
        Some(async move { strategy.run(&ctx, request).await }.boxed())
    }

    async fn store(&self, request: &Request, response: &Response) {
        if let Err(e) = self
            .caches
            .put(&self.config.cache_name, request, response)
            .await
        {
            warn!(url = %request.url, error = %e, "Failed to cache response");
        }
    }

    async fn offline_page(&self) -> Option<Response> {
        let url = match self.config.resolve(&self.config.offline_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(offline_url = %self.config.offline_url, error = %e, "Bad offline URL");
                return None;
            }
        };
        self.caches.match_any(&Request::get(url)).await
    }
}

/// Network first: try network, fall back to cache.
pub async fn network_first(ctx: &StrategyContext, request: Request) -> Result<Response> {
    match ctx.fetcher.fetch(&request).await {
        Ok(response) => {
            if response.ok() {
                ctx.store(&request, &response).await;
            }
            Ok(response)
        }
        Err(err) => {
            info!(url = %request.url, error = %err, "Network failed, trying cache");

            if let Some(cached) = ctx.caches.match_any(&request).await {
                return Ok(cached);
            }

            if request.is_navigation() {
                if let Some(page) = ctx.offline_page().await {
                    return Ok(page);
                }
                warn!(url = %request.url, "Offline page is not cached");
            }

            Err(err.into())
        }
    }
}

/// Cache first: try cache, fall back to network.
///
/// Never fails; a miss that cannot be fetched becomes an empty 404.
pub async fn cache_first(ctx: &StrategyContext, request: Request) -> Result<Response> {
    if let Some(cached) = ctx.caches.match_any(&request).await {
        return Ok(cached);
    }

    match ctx.fetcher.fetch(&request).await {
        Ok(response) => {
            if response.ok() {
                ctx.store(&request, &response).await;
            }
            Ok(response)
        }
        Err(err) => {
            info!(url = %request.url, error = %err, "Failed to fetch image");
            Ok(Response::not_found())
        }
    }
}

/// Stale while revalidate: return the cached copy at once and refresh it
/// from the network in the background.
///
/// The refresh always runs to completion. With no cached copy the caller
/// waits for that same refresh; its failure is then the caller's error.
pub async fn stale_while_revalidate(ctx: &StrategyContext, request: Request) -> Result<Response> {
    let cached = ctx.caches.match_in(&ctx.config.cache_name, &request).await;

    let (tx, rx) = oneshot::channel();
    let refresh_ctx = ctx.clone();
    let refresh_request = request.clone();
    let handle = tokio::spawn(async move {
        let outcome = revalidate(&refresh_ctx, &refresh_request).await;
        if let Err(ref e) = outcome {
            debug!(url = %refresh_request.url, error = %e, "Network request failed");
        }
        // Nobody is listening when a stale copy was already served.
        let _ = tx.send(outcome);
    });
    ctx.pending.track(handle).await;

    if let Some(hit) = cached {
        return Ok(hit);
    }

    match rx.await {
        Ok(outcome) => outcome.map_err(ServiceWorkerError::from),
        Err(_) => Err(ServiceWorkerError::Task(format!(
            "revalidation of {} ended without a result",
            request.url
        ))),
    }
}

async fn revalidate(
    ctx: &StrategyContext,
    request: &Request,
) -> std::result::Result<Response, FetchError> {
    let response = ctx.fetcher.fetch(request).await?;
    if response.ok() {
        ctx.store(request, &response).await;
    }
    Ok(response)
}
