//! Cache store capability and its in-memory implementation.

use crate::request::{Request, Response};
use crate::{Result, ServiceWorkerError};
use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, Method, StatusCode};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::trace;
use url::Url;

// ==================== Keys & Entries ====================

/// Identity of a cached request: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: Method,
    pub url: String,
}

impl CacheKey {
    /// Key for a request.
    pub fn for_request(request: &Request) -> Self {
        let mut url = request.url.clone();
        url.set_fragment(None);
        Self {
            method: request.method.clone(),
            url: url.into(),
        }
    }
}

/// A stored response snapshot.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub url: Url,
    pub method: Method,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    fn new(request: &Request, response: &Response) -> Self {
        Self {
            url: request.url.clone(),
            method: request.method.clone(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild the response this entry was stored from.
    pub fn to_response(&self) -> Response {
        Response {
            url: Some(self.url.clone()),
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            from_cache: true,
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ==================== Cache ====================

/// A single named cache.
#[derive(Debug, Default)]
pub struct Cache {
    pub name: String,
    entries: HashMap<CacheKey, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        self.entries.get(&CacheKey::for_request(request))
    }

    /// Store an entry, replacing any previous one for the same key.
    pub fn put(&mut self, request: &Request, response: &Response) -> Result<()> {
        if request.method != Method::GET {
            return Err(ServiceWorkerError::Cache(format!(
                "cannot cache {} request for {}",
                request.method, request.url
            )));
        }
        self.entries
            .insert(CacheKey::for_request(request), CacheEntry::new(request, response));
        Ok(())
    }

    /// Delete an entry.
    pub fn delete(&mut self, request: &Request) -> bool {
        self.entries.remove(&CacheKey::for_request(request)).is_some()
    }

    /// All keys in this cache.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Store ====================

/// Named-cache storage provided by the host.
///
/// Each operation is atomic at the key level. `put_all` is atomic as a
/// whole: either every entry lands or none does.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a cache, creating it if missing.
    async fn open(&self, name: &str) -> Result<()>;

    /// Check if a cache exists.
    async fn has(&self, name: &str) -> bool;

    /// Delete a cache. Returns whether it existed.
    async fn delete(&self, name: &str) -> bool;

    /// Names of every cache, oldest first.
    async fn keys(&self) -> Vec<String>;

    /// Match a request inside one cache.
    async fn match_in(&self, name: &str, request: &Request) -> Option<Response>;

    /// Match a request across all caches, oldest first.
    async fn match_any(&self, request: &Request) -> Option<Response>;

    /// Store a response in a cache, creating the cache if missing.
    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()>;

    /// Store many responses at once.
    async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()>;

    /// Keys stored in one cache; empty if the cache does not exist.
    async fn entry_keys(&self, name: &str) -> Vec<CacheKey>;
}

/// Named caches plus the order they were created in.
#[derive(Debug, Default)]
struct Shelves {
    caches: HashMap<String, Cache>,
    order: Vec<String>,
}

impl Shelves {
    fn get_or_create(&mut self, name: &str) -> &mut Cache {
        if !self.caches.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    fn remove(&mut self, name: &str) -> bool {
        self.order.retain(|n| n != name);
        self.caches.remove(name).is_some()
    }

    fn in_order(&self) -> impl Iterator<Item = &Cache> {
        self.order.iter().filter_map(|name| self.caches.get(name))
    }
}

/// In-memory cache storage.
///
/// Caches are listed and searched in creation order.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    shelves: RwLock<Shelves>,
}

impl MemoryCacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.shelves.write().await.get_or_create(name);
        Ok(())
    }

    async fn has(&self, name: &str) -> bool {
        self.shelves.read().await.caches.contains_key(name)
    }

    async fn delete(&self, name: &str) -> bool {
        self.shelves.write().await.remove(name)
    }

    async fn keys(&self) -> Vec<String> {
        self.shelves.read().await.order.clone()
    }

    async fn match_in(&self, name: &str, request: &Request) -> Option<Response> {
        let shelves = self.shelves.read().await;
        let hit = shelves
            .caches
            .get(name)
            .and_then(|cache| cache.match_request(request))
            .map(CacheEntry::to_response);
        trace!(cache = name, url = %request.url, hit = hit.is_some(), "Cache lookup");
        hit
    }

    async fn match_any(&self, request: &Request) -> Option<Response> {
        let shelves = self.shelves.read().await;
        let hit = shelves
            .in_order()
            .find_map(|cache| cache.match_request(request))
            .map(CacheEntry::to_response);
        hit
    }

    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
        self.shelves
            .write()
            .await
            .get_or_create(name)
            .put(request, response)
    }

    async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()> {
        // Stage into a copy so a rejected entry leaves the cache untouched.
        let mut shelves = self.shelves.write().await;
        let mut staged = Cache::new(name);
        if let Some(existing) = shelves.caches.get(name) {
            staged.entries = existing.entries.clone();
        }
        for (request, response) in &entries {
            staged.put(request, response)?;
        }
        *shelves.get_or_create(name) = staged;
        Ok(())
    }

    async fn entry_keys(&self, name: &str) -> Vec<CacheKey> {
        self.shelves
            .read()
            .await
            .caches
            .get(name)
            .map(Cache::keys)
            .unwrap_or_default()
    }
}
