//! Merge policy scenarios run through the provider cache.

use std::sync::Arc;
use std::thread;

use serde_json::json;
use strata_core::{CacheFilter, CacheItem, CacheResult};
use strata_provider::{Authority, ProviderCache};
use strata_storage::BackingStore;
use strata_test_utils::assertions::{assert_ids, assert_rel_agents, assert_reserved_delimiter};
use strata_test_utils::fixtures::{self, INSTANCES, SERVER_GROUPS};

fn cache() -> (ProviderCache, Arc<dyn BackingStore>) {
    let store: Arc<dyn BackingStore> = fixtures::memory_store();
    (ProviderCache::new(store.clone()), store)
}

#[test]
fn test_relationship_edges_namespaced_by_agent() {
    let (cache, store) = cache();
    let prod = fixtures::prod_caching_agent();
    let test = fixtures::test_caching_agent();

    thread::scope(|s| {
        for agent in [&prod, &test] {
            let cache = &cache;
            s.spawn(move || {
                let result = CacheResult::new().with_items(
                    SERVER_GROUPS,
                    vec![CacheItem::new("shared-sg").with_relationship(
                        INSTANCES,
                        [fixtures::instance_id(&agent.scope)],
                    )],
                );
                cache
                    .put_cache_result(agent.agent.as_str(), &agent.authority(), &result)
                    .expect("concurrent merge should succeed");
            });
        }
    });

    assert_rel_agents(
        store.as_ref(),
        SERVER_GROUPS,
        &["instances:prod/TestAgent", "instances:test/TestAgent"],
    );
    let sg = store
        .get(SERVER_GROUPS, "shared-sg", &CacheFilter::All)
        .unwrap();
    // Server groups are not authoritative for these agents: edges only.
    assert!(sg.is_none());

    // Re-merging one agent's edges leaves the other's intact.
    cache
        .put_cache_result(
            prod.agent.as_str(),
            &prod.authority(),
            &CacheResult::new().with_items(
                SERVER_GROUPS,
                vec![CacheItem::new("shared-sg")
                    .with_relationship(INSTANCES, [fixtures::instance_id("prod")])],
            ),
        )
        .unwrap();
    assert_eq!(store.relationships(SERVER_GROUPS).unwrap().len(), 2);
}

#[test]
fn test_edges_independently_evictable() {
    let (cache, store) = cache();
    fixtures::seed(
        store.clone(),
        &[fixtures::prod_caching_agent(), fixtures::test_caching_agent()],
    );

    cache
        .evict_deleted_items(INSTANCES, &[fixtures::instance_id("test")])
        .unwrap();

    assert_ids(store.as_ref(), INSTANCES, &[&fixtures::instance_id("prod")]);
    assert_rel_agents(store.as_ref(), INSTANCES, &["serverGroups:prod/TestAgent"]);
    assert_rel_agents(store.as_ref(), SERVER_GROUPS, &["instances:prod/TestAgent"]);
}

#[test]
fn test_concurrent_authoritative_agents_in_one_type() {
    let (cache, store) = cache();
    let agents: Vec<_> = ["a", "b", "c", "d"]
        .into_iter()
        .map(fixtures::caching_agent)
        .collect();

    thread::scope(|s| {
        for agent in &agents {
            let cache = &cache;
            s.spawn(move || {
                for round in 0..5 {
                    let items: Vec<CacheItem> = (0..=round)
                        .map(|i| {
                            CacheItem::new(format!("{}-{}", agent.scope, i))
                                .with_attribute("round", json!(round))
                        })
                        .collect();
                    cache
                        .put_cache_result(
                            agent.agent.as_str(),
                            &agent.authority(),
                            &CacheResult::new().with_items(INSTANCES, items),
                        )
                        .expect("merge should succeed");
                }
            });
        }
    });

    assert_eq!(store.identifiers(INSTANCES).unwrap().len(), 4 * 5);
}

#[test]
fn test_on_demand_isolated_from_declared_types() {
    let (cache, store) = cache();
    let agent = fixtures::prod_caching_agent();

    fixtures::seed(store.clone(), &[agent.clone()]);
    let result = CacheResult::new()
        .with_items("onDemand", vec![CacheItem::new("od-1")])
        .with_items(INSTANCES, vec![fixtures::scoped_instance("prod")]);
    cache
        .put_cache_result(agent.agent.as_str(), &agent.authority(), &result)
        .unwrap();

    assert_ids(store.as_ref(), INSTANCES, &[&fixtures::instance_id("prod")]);
    assert_ids(store.as_ref(), "onDemand", &["od-1"]);

    // An on-demand merge without the type does not clean it.
    cache
        .put_cache_result(
            agent.agent.as_str(),
            &agent.authority(),
            &CacheResult::new().with_items("onDemand", vec![CacheItem::new("od-2")]),
        )
        .unwrap();
    assert_ids(store.as_ref(), INSTANCES, &[&fixtures::instance_id("prod")]);
    assert_ids(store.as_ref(), "onDemand", &["od-1", "od-2"]);
}

#[test]
fn test_validation_across_read_and_write_apis() {
    let (cache, _store) = cache();
    assert_reserved_delimiter(&cache.get("instances:prod", "x"));
    assert_reserved_delimiter(&cache.get_all("instances:prod", &CacheFilter::All));
    assert_reserved_delimiter(&cache.filter_identifiers("instances:prod", "*"));
    assert_reserved_delimiter(&cache.existing_identifiers("instances:prod", &[]));
    assert_reserved_delimiter(&cache.put_cache_data("instances:prod", CacheItem::new("x")));
    assert_reserved_delimiter(&cache.evict_deleted_items("instances:prod", &[]));
    assert_reserved_delimiter(&cache.put_cache_result(
        "prod/TestAgent",
        &Authority::of(["instances:prod"]),
        &CacheResult::new(),
    ));
}

#[test]
fn test_read_filters_through_cache() {
    let (cache, store) = cache();
    fixtures::seed(store, &[fixtures::prod_caching_agent()]);

    let id = fixtures::instance_id("prod");
    let full = cache.get(INSTANCES, &id).unwrap().unwrap();
    assert!(full.related(SERVER_GROUPS).is_some());

    let bare = cache
        .get_filtered(INSTANCES, &id, &CacheFilter::None)
        .unwrap()
        .unwrap();
    assert!(bare.relationships.is_empty());
    assert_eq!(bare.attributes["account"], json!("prod"));

    assert_eq!(
        cache
            .filter_identifiers(INSTANCES, "aws:instances:prod:*")
            .unwrap(),
        vec![id]
    );
}
