//! Unknown-agent cleanup scenarios against seeded stores.

use std::sync::Arc;
use std::time::Duration;

use strata_core::CacheItem;
use strata_jobs::{CleanupConfig, UnknownAgentCleanup};
use strata_provider::AgentRegistry;
use strata_storage::{BackingStore, LmdbEngine, Store};
use strata_test_utils::assertions::{assert_ids, assert_rel_agents};
use strata_test_utils::fixtures::{self, CUSTOM_RESOURCE_TYPE, INSTANCES, SERVER_GROUPS};
use strata_test_utils::StoreConfig;
use tempfile::TempDir;

/// Store seeded by prod and test agents, registry holding only prod.
fn prod_only() -> (Arc<dyn BackingStore>, Arc<dyn AgentRegistry>) {
    let store: Arc<dyn BackingStore> = fixtures::memory_store();
    fixtures::seed(
        store.clone(),
        &[fixtures::prod_caching_agent(), fixtures::test_caching_agent()],
    );
    let (registry, _provider) =
        fixtures::registry_with(store.clone(), vec![fixtures::prod_caching_agent()]);
    let registry: Arc<dyn AgentRegistry> = Arc::new(registry);
    (store, registry)
}

fn sweep(
    store: &Arc<dyn BackingStore>,
    registry: &Arc<dyn AgentRegistry>,
    config: CleanupConfig,
) -> UnknownAgentCleanup {
    UnknownAgentCleanup::new(store.clone(), registry.clone(), config)
        .expect("cleanup config should be valid")
}

fn assert_prod_untouched(store: &dyn BackingStore) {
    assert_ids(store, INSTANCES, &[&fixtures::instance_id("prod")]);
    assert_rel_agents(store, INSTANCES, &["serverGroups:prod/TestAgent"]);
    assert_rel_agents(store, SERVER_GROUPS, &["instances:prod/TestAgent"]);
}

#[test]
fn test_removed_agent_data_is_deleted() {
    let (store, registry) = prod_only();

    let report = sweep(&store, &registry, CleanupConfig::development())
        .run()
        .expect("sweep should succeed");

    assert!(!report.skipped);
    assert_eq!(report.types_scanned, vec![INSTANCES.to_string()]);
    assert_eq!(report.resources_deleted, 1);
    assert_eq!(report.relationships_deleted, 1);
    assert_prod_untouched(store.as_ref());
}

#[test]
fn test_deregistered_agent_data_is_deleted() {
    let store: Arc<dyn BackingStore> = fixtures::memory_store();
    let test = fixtures::test_caching_agent();
    let (registry, provider) = fixtures::registry_with(
        store.clone(),
        vec![fixtures::prod_caching_agent(), test.clone()],
    );
    fixtures::seed(store.clone(), &registry.registered_agents().unwrap());
    let registry: Arc<dyn AgentRegistry> = Arc::new(registry);

    let report = sweep(&store, &registry, CleanupConfig::development())
        .run()
        .unwrap();
    assert_eq!(report.total_deleted(), 0);

    assert!(provider.deregister_agent(&test.agent).unwrap());
    let report = sweep(&store, &registry, CleanupConfig::development())
        .run()
        .unwrap();
    assert_eq!(report.resources_deleted, 1);
    assert_prod_untouched(store.as_ref());
}

#[test]
fn test_sweep_is_idempotent() {
    let (store, registry) = prod_only();
    let sweep = sweep(&store, &registry, CleanupConfig::development());

    assert_eq!(sweep.run().unwrap().total_deleted(), 2);
    let second = sweep.run().unwrap();
    assert_eq!(second.total_deleted(), 0);
    assert_eq!(second.preserved, 0);
    assert_prod_untouched(store.as_ref());
}

#[test]
fn test_missing_custom_resource_table_is_noop() {
    let store: Arc<dyn BackingStore> = fixtures::memory_store();
    fixtures::seed(store.clone(), &[fixtures::prod_caching_agent()]);
    let (registry, _provider) = fixtures::registry_with(
        store.clone(),
        vec![
            fixtures::prod_caching_agent(),
            fixtures::unregistered_custom_resource_agent(),
        ],
    );
    let registry: Arc<dyn AgentRegistry> = Arc::new(registry);

    let report = sweep(&store, &registry, CleanupConfig::development())
        .run()
        .expect("missing tables must not fail the sweep");

    assert!(report
        .types_scanned
        .iter()
        .any(|t| t == CUSTOM_RESOURCE_TYPE));
    assert_eq!(report.total_deleted(), 0);
    assert!(store.identifiers(CUSTOM_RESOURCE_TYPE).unwrap().is_empty());
}

#[test]
fn test_empty_registry_deletes_nothing() {
    let store: Arc<dyn BackingStore> = fixtures::memory_store();
    fixtures::seed(store.clone(), &[fixtures::test_caching_agent()]);
    let registry: Arc<dyn AgentRegistry> = Arc::new(Vec::new());

    let report = sweep(&store, &registry, CleanupConfig::development())
        .run()
        .unwrap();

    assert!(report.skipped);
    assert_ids(store.as_ref(), INSTANCES, &[&fixtures::instance_id("test")]);
}

#[test]
fn test_dry_run_reports_without_deleting() {
    let (store, registry) = prod_only();

    let report = sweep(
        &store,
        &registry,
        CleanupConfig::development().with_dry_run(true),
    )
    .run()
    .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.resources_deleted, 1);
    assert_eq!(report.relationships_deleted, 1);
    assert_ids(
        store.as_ref(),
        INSTANCES,
        &[&fixtures::instance_id("prod"), &fixtures::instance_id("test")],
    );
}

#[test]
fn test_excluded_types_are_kept() {
    let (store, registry) = prod_only();

    let report = sweep(
        &store,
        &registry,
        CleanupConfig::development().with_excluded_types([INSTANCES]),
    )
    .run()
    .unwrap();

    assert!(report.types_scanned.is_empty());
    assert_eq!(store.identifiers(INSTANCES).unwrap().len(), 2);
}

#[test]
fn test_sharding_filter_preserves_unhandled_agents() {
    let (store, registry) = prod_only();

    let report = sweep(&store, &registry, CleanupConfig::development())
        .with_sharding(Arc::new(|agent: &str| agent.starts_with("staging/")))
        .run()
        .unwrap();

    assert_eq!(report.total_deleted(), 0);
    assert_eq!(report.preserved, 2);
    assert_eq!(store.identifiers(INSTANCES).unwrap().len(), 2);
}

#[test]
fn test_recent_rows_are_protected() {
    let (store, registry) = prod_only();

    let report = sweep(
        &store,
        &registry,
        CleanupConfig::development().with_min_record_age(Duration::from_secs(3600)),
    )
    .run()
    .unwrap();

    assert_eq!(report.total_deleted(), 0);
    assert_eq!(report.preserved, 2);
}

#[test]
fn test_delete_batches_cover_every_row() {
    let store: Arc<dyn BackingStore> = fixtures::memory_store();
    let items: Vec<CacheItem> = (0..25).map(|i| CacheItem::new(format!("i-{i}"))).collect();
    store
        .merge(INSTANCES, "gone/TestAgent", &items, true, true)
        .unwrap();
    let (registry, _provider) =
        fixtures::registry_with(store.clone(), vec![fixtures::prod_caching_agent()]);
    let registry: Arc<dyn AgentRegistry> = Arc::new(registry);

    let config = CleanupConfig {
        delete_batch_size: 4,
        ..CleanupConfig::development()
    };
    let report = sweep(&store, &registry, config).run().unwrap();

    assert_eq!(report.resources_deleted, 25);
    assert!(store.identifiers(INSTANCES).unwrap().is_empty());
}

#[test]
fn test_shared_id_keeps_live_agent_row() {
    let store: Arc<dyn BackingStore> = fixtures::memory_store();
    let item = CacheItem::new("shared");
    store
        .merge(INSTANCES, "prod/TestAgent", &[item.clone()], true, true)
        .unwrap();
    store
        .merge(INSTANCES, "gone/TestAgent", &[item], true, true)
        .unwrap();
    let (registry, _provider) =
        fixtures::registry_with(store.clone(), vec![fixtures::prod_caching_agent()]);
    let registry: Arc<dyn AgentRegistry> = Arc::new(registry);

    let report = sweep(&store, &registry, CleanupConfig::development())
        .run()
        .unwrap();

    assert_eq!(report.resources_deleted, 1);
    let owners = store.resource_owners(INSTANCES).unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].agent, "prod/TestAgent");
}

#[test]
fn test_sweep_over_lmdb_store() {
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    let engine = LmdbEngine::open_at(temp_dir.path(), 16, 128).expect("engine should open");
    let store: Arc<dyn BackingStore> =
        Arc::new(Store::new(engine, StoreConfig::default()).expect("store should open"));
    fixtures::seed(
        store.clone(),
        &[fixtures::prod_caching_agent(), fixtures::test_caching_agent()],
    );
    let (registry, _provider) =
        fixtures::registry_with(store.clone(), vec![fixtures::prod_caching_agent()]);
    let registry: Arc<dyn AgentRegistry> = Arc::new(registry);

    let report = sweep(&store, &registry, CleanupConfig::development())
        .run()
        .unwrap();

    assert_eq!(report.total_deleted(), 2);
    assert_prod_untouched(store.as_ref());
}
