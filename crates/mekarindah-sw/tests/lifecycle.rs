//! Install, activate and generation handover.

mod common;

use common::{url, worker_with, worker_with_config, Reply, ScriptedFetcher};
use http::StatusCode;
use mekarindah_sw::{
    CacheStore, Client, ClientMessage, EventOutcome, HostServices, MemoryCacheStorage, Request,
    Response,
    ServiceWorker, ServiceWorkerContainer, ServiceWorkerError, ServiceWorkerEvent,
    ServiceWorkerState, WorkerConfig, WorkerEvent,
};
use std::sync::Arc;
use tokio::sync::Notify;

const CACHE: &str = "masjid-mekarindah-v1.0.0";

#[tokio::test]
async fn test_install_caches_every_static_asset() {
    let config = WorkerConfig::default();
    let fetcher = Arc::new(ScriptedFetcher::serving_assets(&config));
    let (worker, caches) = worker_with(fetcher);

    let outcome = worker.handle_event(WorkerEvent::Install).await.unwrap();
    assert!(matches!(outcome, EventOutcome::Installed { assets: 7 }));

    for asset in &config.static_assets {
        let request = Request::get(config.resolve(asset).unwrap());
        assert!(
            caches.match_in(CACHE, &request).await.is_some(),
            "{asset} was not cached"
        );
    }
    assert!(worker.skip_waiting_requested());
}

#[tokio::test]
async fn test_install_fails_when_one_asset_fails() {
    let config = WorkerConfig::default();
    let fetcher = Arc::new(ScriptedFetcher::serving_assets(&config));
    fetcher.route("http://localhost:8080/manifest.json", Reply::Fail);
    let (worker, caches) = worker_with(fetcher);

    let result = worker.handle_event(WorkerEvent::Install).await;
    assert!(matches!(result, Err(ServiceWorkerError::InstallFailed(_))));
    assert!(!caches.has(CACHE).await);
}

#[tokio::test]
async fn test_install_fails_on_error_status() {
    let config = WorkerConfig::default();
    let fetcher = Arc::new(ScriptedFetcher::serving_assets(&config));
    fetcher.route(
        "http://localhost:8080/icons/icon-512x512.png",
        Reply::Ok(StatusCode::NOT_FOUND, ""),
    );
    let (worker, caches) = worker_with(fetcher);

    assert!(worker.handle_event(WorkerEvent::Install).await.is_err());
    assert!(caches.keys().await.is_empty());
}

#[tokio::test]
async fn test_activate_leaves_only_current_cache() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let (worker, caches) = worker_with(fetcher);

    caches.open("masjid-mekarindah-v0.9.0").await.unwrap();
    caches.open("debug-scratch").await.unwrap();
    caches.open(CACHE).await.unwrap();

    let outcome = worker.handle_event(WorkerEvent::Activate).await.unwrap();
    let EventOutcome::Activated(report) = outcome else {
        panic!("expected activation report");
    };

    assert_eq!(report.deleted_caches.len(), 2);
    assert_eq!(caches.keys().await, vec![CACHE.to_string()]);
}

#[tokio::test]
async fn test_activate_creates_missing_current_cache() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let (worker, caches) = worker_with(fetcher);
    caches.open("masjid-mekarindah-v0.9.0").await.unwrap();

    worker.handle_event(WorkerEvent::Activate).await.unwrap();
    assert_eq!(caches.keys().await, vec![CACHE.to_string()]);
}

#[tokio::test]
async fn test_activate_claims_open_pages() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let (worker, _caches) = worker_with(fetcher);
    let page = worker
        .host()
        .clients
        .write()
        .await
        .add(Client::window(url("http://localhost:8080/jadwal")));

    let outcome = worker.handle_event(WorkerEvent::Activate).await.unwrap();
    assert!(matches!(
        outcome,
        EventOutcome::Activated(ref report) if report.claimed_clients == 1
    ));

    let clients = worker.host().clients.read().await;
    assert_eq!(clients.get(&page).unwrap().controller, Some(worker.id()));
}

#[tokio::test]
async fn test_clear_cache_message_deletes_store() {
    let config = WorkerConfig::default();
    let fetcher = Arc::new(ScriptedFetcher::serving_assets(&config));
    let (worker, caches) = worker_with(fetcher);
    worker.handle_event(WorkerEvent::Install).await.unwrap();
    assert!(caches.has(CACHE).await);

    let outcome = worker
        .handle_event(WorkerEvent::Message(ClientMessage::ClearCache.to_json()))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        EventOutcome::MessageHandled(Some(ClientMessage::ClearCache))
    ));
    assert!(!caches.has(CACHE).await);
}

#[tokio::test]
async fn test_unknown_message_is_ignored() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let (worker, _caches) = worker_with(fetcher);

    let outcome = worker
        .handle_event(WorkerEvent::Message(serde_json::json!({ "type": "RELOAD" })))
        .await
        .unwrap();
    assert!(matches!(outcome, EventOutcome::MessageHandled(None)));
    assert!(!worker.skip_waiting_requested());
}

// ==================== Container ====================

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ServiceWorkerEvent>) -> Vec<ServiceWorkerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_container_activates_first_worker() {
    let config = WorkerConfig::default();
    let fetcher = Arc::new(ScriptedFetcher::serving_assets(&config));
    let (worker, _caches) = worker_with(fetcher);
    let worker = Arc::new(worker);

    let (container, mut rx) = ServiceWorkerContainer::new(url("http://localhost:8080/"));
    container.register(Arc::clone(&worker)).await.unwrap();

    assert_eq!(container.active().await.unwrap().id(), worker.id());
    assert_eq!(
        container.state_of(worker.id()).await,
        Some(ServiceWorkerState::Activated)
    );
    assert!(drain(&mut rx).contains(&ServiceWorkerEvent::ControllerChange {
        worker_id: worker.id()
    }));
}

#[tokio::test]
async fn test_failed_install_keeps_previous_worker_active() {
    let config = WorkerConfig::default();
    let caches = Arc::new(MemoryCacheStorage::new());
    let good = Arc::new(ScriptedFetcher::serving_assets(&config));
    let v1 = Arc::new(ServiceWorker::new(
        config.clone(),
        HostServices::new(caches.clone(), good),
    ));

    let (container, mut rx) = ServiceWorkerContainer::new(url("http://localhost:8080/"));
    container.register(Arc::clone(&v1)).await.unwrap();
    drain(&mut rx);

    let v2_config = WorkerConfig {
        cache_name: "masjid-mekarindah-v2.0.0".to_string(),
        ..config
    };
    let broken = Arc::new(ScriptedFetcher::new());
    let v2 = Arc::new(ServiceWorker::new(
        v2_config,
        HostServices::new(caches.clone(), broken),
    ));

    let result = container.register(Arc::clone(&v2)).await;
    assert!(matches!(result, Err(ServiceWorkerError::InstallFailed(_))));
    assert_eq!(container.active().await.unwrap().id(), v1.id());
    assert!(container.waiting().await.is_none());
    assert!(drain(&mut rx).contains(&ServiceWorkerEvent::StateChange {
        worker_id: v2.id(),
        new_state: ServiceWorkerState::Redundant,
    }));
    assert_eq!(caches.keys().await, vec![CACHE.to_string()]);
}

#[tokio::test]
async fn test_new_generation_replaces_old_cache() {
    let v1_config = WorkerConfig::default();
    let v2_config = WorkerConfig {
        cache_name: "masjid-mekarindah-v2.0.0".to_string(),
        ..WorkerConfig::default()
    };
    let caches = Arc::new(MemoryCacheStorage::new());
    let fetcher = Arc::new(ScriptedFetcher::serving_assets(&v1_config));
    let host = HostServices::new(caches.clone(), fetcher);
    let page = host
        .clients
        .write()
        .await
        .add(Client::window(url("http://localhost:8080/")));

    let (container, _rx) = ServiceWorkerContainer::new(url("http://localhost:8080/"));
    let v1 = Arc::new(ServiceWorker::new(v1_config, host.clone()));
    container.register(Arc::clone(&v1)).await.unwrap();

    let v2 = Arc::new(ServiceWorker::new(v2_config, host.clone()));
    container.register(Arc::clone(&v2)).await.unwrap();

    assert_eq!(container.active().await.unwrap().id(), v2.id());
    assert_eq!(container.state_of(v1.id()).await, None);
    assert_eq!(caches.keys().await, vec!["masjid-mekarindah-v2.0.0".to_string()]);
    assert_eq!(
        host.clients.read().await.get(&page).unwrap().controller,
        Some(v2.id())
    );
}

#[tokio::test]
async fn test_outgoing_refresh_settles_before_activation() {
    let about = "http://localhost:8080/about.html";
    let v1_config = WorkerConfig::default();
    let v2_config = WorkerConfig {
        cache_name: "masjid-mekarindah-v2.0.0".to_string(),
        ..WorkerConfig::default()
    };
    let gate = Arc::new(Notify::new());
    let caches = Arc::new(MemoryCacheStorage::new());
    let fetcher = Arc::new(ScriptedFetcher::serving_assets(&v1_config));
    fetcher.route(about, Reply::Held(Arc::clone(&gate), "fresh"));
    let host = HostServices::new(caches.clone(), fetcher);

    let container = Arc::new(ServiceWorkerContainer::new(url("http://localhost:8080/")).0);
    let v1 = Arc::new(ServiceWorker::new(v1_config, host.clone()));
    container.register(Arc::clone(&v1)).await.unwrap();

    let request = Request::get(url(about));
    caches
        .put(CACHE, &request, &Response::new(StatusCode::OK, "stale"))
        .await
        .unwrap();
    container.fetch(request).await.unwrap();
    assert_eq!(v1.pending_tasks().await, 1);

    let v2 = Arc::new(ServiceWorker::new(v2_config, host.clone()));
    let registering = tokio::spawn({
        let container = Arc::clone(&container);
        let v2 = Arc::clone(&v2);
        async move { container.register(v2).await }
    });

    while container.state_of(v2.id()).await != Some(ServiceWorkerState::Activating) {
        tokio::task::yield_now().await;
    }
    // v1's refresh is still held, so the old cache has not been purged yet.
    assert!(caches.has(CACHE).await);

    gate.notify_one();
    registering.await.unwrap().unwrap();

    assert_eq!(v1.pending_tasks().await, 0);
    assert_eq!(caches.keys().await, vec!["masjid-mekarindah-v2.0.0".to_string()]);
}

#[tokio::test]
async fn test_messages_without_workers_fail() {
    let (container, _rx) = ServiceWorkerContainer::new(url("http://localhost:8080/"));
    assert!(matches!(
        container.post_message_to_waiting(ClientMessage::SkipWaiting.to_json()).await,
        Err(ServiceWorkerError::State(_))
    ));
    assert!(matches!(
        container.post_message(ClientMessage::ClearCache.to_json()).await,
        Err(ServiceWorkerError::State(_))
    ));
}

#[tokio::test]
async fn test_container_fetch_without_active_worker_passes_through() {
    let (container, _rx) = ServiceWorkerContainer::new(url("http://localhost:8080/"));
    let outcome = container
        .fetch(Request::get(url("http://localhost:8080/")))
        .await
        .unwrap();
    assert!(matches!(outcome, EventOutcome::Passthrough));
}

#[tokio::test]
async fn test_container_routes_fetch_to_active_worker() {
    let config = WorkerConfig::default();
    let fetcher = Arc::new(ScriptedFetcher::serving_assets(&config));
    let (worker, _caches) = worker_with_config(config, fetcher.clone());

    let (container, _rx) = ServiceWorkerContainer::new(url("http://localhost:8080/"));
    container.register(Arc::new(worker)).await.unwrap();

    let outcome = container
        .fetch(Request::get(url("http://localhost:8080/index.html")))
        .await
        .unwrap();
    let EventOutcome::Respond(response) = outcome else {
        panic!("expected a response");
    };
    assert!(response.from_cache);
    assert_eq!(response.text(), "asset");
}
