//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use http::StatusCode;
use mekarindah_sw::{
    FetchError, Fetcher, HostServices, MemoryCacheStorage, Request, Response, ServiceWorker,
    WorkerConfig,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use url::Url;

/// A canned network reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(StatusCode, &'static str),
    /// 200 with the body, once the gate is notified.
    Held(Arc<Notify>, &'static str),
    Fail,
}

/// Fetcher answering from a routing table and recording every call.
/// Unknown URLs fail like an unreachable network.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetcher that serves every static asset of `config` with 200.
    pub fn serving_assets(config: &WorkerConfig) -> Self {
        let fetcher = Self::new();
        for asset in &config.static_assets {
            let url = config.resolve(asset).unwrap();
            fetcher.route(url.as_str(), Reply::Ok(StatusCode::OK, "asset"));
        }
        fetcher
    }

    pub fn route(&self, url: &str, reply: Reply) {
        self.routes.lock().unwrap().insert(url.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == url).count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());
        let reply = self.routes.lock().unwrap().get(&url).cloned();
        match reply {
            Some(Reply::Ok(status, body)) => {
                Ok(Response::new(status, body).with_url(request.url.clone()))
            }
            Some(Reply::Held(gate, body)) => {
                gate.notified().await;
                Ok(Response::new(StatusCode::OK, body).with_url(request.url.clone()))
            }
            Some(Reply::Fail) | None => Err(FetchError::RequestFailed(format!(
                "network unreachable: {url}"
            ))),
        }
    }
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// Worker over an in-memory store and the given fetcher.
pub fn worker_with(fetcher: Arc<ScriptedFetcher>) -> (ServiceWorker, Arc<MemoryCacheStorage>) {
    worker_with_config(WorkerConfig::default(), fetcher)
}

pub fn worker_with_config(
    config: WorkerConfig,
    fetcher: Arc<ScriptedFetcher>,
) -> (ServiceWorker, Arc<MemoryCacheStorage>) {
    let caches = Arc::new(MemoryCacheStorage::new());
    let host = HostServices::new(caches.clone(), fetcher);
    (ServiceWorker::new(config, host), caches)
}
