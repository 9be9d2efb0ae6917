//! Backing store behaviour over the LMDB engine.

use std::time::Duration;

use serde_json::json;
use strata_core::{CacheFilter, CacheItem, StoreConfig};
use strata_storage::{BackingStore, LmdbEngine, LmdbStore, Store};
use tempfile::TempDir;

fn create_test_store() -> (LmdbStore, TempDir) {
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    let engine =
        LmdbEngine::open_at(temp_dir.path(), 16, 128).expect("engine creation should succeed");
    let store = Store::new(engine, StoreConfig::default()).expect("store creation should succeed");
    (store, temp_dir)
}

#[test]
fn test_merge_and_read_back() {
    let (store, _temp_dir) = create_test_store();
    let item = CacheItem::new("aws:instances:prod:us-east-1:i-abcd1234")
        .with_attribute("zone", json!("us-east-1a"))
        .with_relationship(
            "serverGroups",
            ["aws:serverGroups:myapp-prod:prod:us-east-1:myapp-prod-v000"],
        );

    store
        .merge("instances", "prod/TestAgent", &[item], true, true)
        .expect("merge should succeed");

    let stored = store
        .get(
            "instances",
            "aws:instances:prod:us-east-1:i-abcd1234",
            &CacheFilter::All,
        )
        .expect("get should succeed")
        .expect("item should exist");
    assert_eq!(stored.attributes["zone"], json!("us-east-1a"));
    assert_eq!(stored.related("serverGroups").map(|r| r.len()), Some(1));
}

#[test]
fn test_supersede_and_evict() {
    let (store, _temp_dir) = create_test_store();
    let a = CacheItem::new("a").with_attribute("n", json!(1));
    let b = CacheItem::new("b").with_attribute("n", json!(2));

    store
        .merge("instances", "prod/TestAgent", &[a.clone(), b], true, true)
        .unwrap();
    store
        .merge("instances", "prod/TestAgent", &[a], true, true)
        .unwrap();
    assert_eq!(store.identifiers("instances").unwrap(), vec!["a"]);

    assert_eq!(store.evict("instances", "a").unwrap(), 1);
    assert!(store.identifiers("instances").unwrap().is_empty());
}

#[test]
fn test_missing_type_is_empty() {
    let (store, _temp_dir) = create_test_store();
    assert!(store
        .get_all("cloud.google.com.BackendConfig", &CacheFilter::All)
        .unwrap()
        .is_empty());
    assert!(store
        .filter_identifiers("cloud.google.com.BackendConfig", "*")
        .unwrap()
        .is_empty());
}

#[test]
fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    {
        let engine = LmdbEngine::open_at(temp_dir.path(), 16, 128).unwrap();
        let store = Store::new(engine, StoreConfig::default()).unwrap();
        store
            .merge("instances", "prod/TestAgent", &[CacheItem::new("a")], true, true)
            .unwrap();
    }

    let engine = LmdbEngine::open_at(temp_dir.path(), 16, 128).unwrap();
    let store = Store::new(engine, StoreConfig::default()).unwrap();
    assert_eq!(store.identifiers("instances").unwrap(), vec!["a"]);

    // Table cache starts cold after reopen; merging must still work.
    store
        .merge("instances", "prod/TestAgent", &[], true, true)
        .unwrap();
    assert!(store.identifiers("instances").unwrap().is_empty());
}

#[test]
fn test_on_demand_types_expire_after_reopen() {
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    {
        let engine = LmdbEngine::open_at(temp_dir.path(), 16, 128).unwrap();
        let store = Store::new(engine, StoreConfig::default()).unwrap();
        store
            .merge(
                "kubernetesOnDemand",
                "prod/TestAgent",
                &[CacheItem::new("pod-1")],
                true,
                false,
            )
            .unwrap();
    }

    let engine = LmdbEngine::open_at(temp_dir.path(), 16, 128).unwrap();
    let store = Store::new(engine, StoreConfig::default()).unwrap();
    assert_eq!(store.clean_on_demand(Duration::ZERO).unwrap(), 1);
    assert!(store.identifiers("kubernetesOnDemand").unwrap().is_empty());
}
