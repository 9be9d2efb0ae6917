//! Background task lifecycle.

use std::sync::Arc;
use std::time::Duration;

use strata_jobs::{cleanup_task, CleanupConfig};
use strata_provider::AgentRegistry;
use strata_storage::BackingStore;
use strata_test_utils::fixtures::{self, INSTANCES};
use strata_test_utils::CacheItem;
use tokio::sync::watch;

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_task_sweeps_until_shutdown() {
    let store: Arc<dyn BackingStore> = fixtures::memory_store();
    fixtures::seed(
        store.clone(),
        &[fixtures::prod_caching_agent(), fixtures::test_caching_agent()],
    );
    store
        .merge("onDemand", "prod/TestAgent", &[CacheItem::new("od-1")], true, false)
        .unwrap();
    let (registry, _provider) =
        fixtures::registry_with(store.clone(), vec![fixtures::prod_caching_agent()]);
    let registry: Arc<dyn AgentRegistry> = Arc::new(registry);

    let config = CleanupConfig {
        on_demand_max_age: Duration::ZERO,
        ..CleanupConfig::development()
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(cleanup_task(store.clone(), registry, config, shutdown_rx));

    // Both intervals tick immediately on start.
    let watched = store.clone();
    wait_until(move || {
        matches!(watched.identifiers(INSTANCES), Ok(ids) if ids.len() == 1)
            && matches!(watched.identifiers("onDemand"), Ok(ids) if ids.is_empty())
    })
    .await;

    shutdown_tx.send(true).expect("task should be listening");
    let metrics = handle.await.expect("task should not panic");
    let snapshot = metrics.snapshot();

    assert!(snapshot.sweeps >= 1);
    assert_eq!(snapshot.resources_deleted, 1);
    assert_eq!(snapshot.relationships_deleted, 1);
    assert_eq!(snapshot.on_demand_expired, 1);
    assert_eq!(snapshot.errors, 0);
}

#[tokio::test]
async fn test_invalid_config_returns_immediately() {
    let store: Arc<dyn BackingStore> = fixtures::memory_store();
    let registry: Arc<dyn AgentRegistry> = Arc::new(Vec::new());
    let config = CleanupConfig {
        delete_batch_size: 0,
        ..CleanupConfig::development()
    };

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = cleanup_task(store, registry, config, shutdown_rx).await;
    assert_eq!(metrics.snapshot().errors, 1);
    assert_eq!(metrics.snapshot().sweeps, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_registry_counts_skipped_sweep() {
    let store: Arc<dyn BackingStore> = fixtures::memory_store();
    let registry: Arc<dyn AgentRegistry> = Arc::new(Vec::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(cleanup_task(
        store,
        registry,
        CleanupConfig::development(),
        shutdown_rx,
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown_tx.send(true).expect("task should be listening");
    let snapshot = handle.await.expect("task should not panic").snapshot();

    assert_eq!(snapshot.sweeps, 1);
    assert_eq!(snapshot.sweeps_skipped, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_shutdown_sender_stops_task() {
    let store: Arc<dyn BackingStore> = fixtures::memory_store();
    let registry: Arc<dyn AgentRegistry> = Arc::new(Vec::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(cleanup_task(
        store,
        registry,
        CleanupConfig::development(),
        shutdown_rx,
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(shutdown_tx);

    let metrics = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("task should stop once the sender is gone")
        .expect("task should not panic");
    assert_eq!(metrics.snapshot().errors, 0);
}
