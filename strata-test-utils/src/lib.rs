//! STRATA Test Utilities
//!
//! Centralized test infrastructure for the STRATA workspace:
//! - Proptest generators for items, results and agent identities
//! - Fixtures for the prod/test agent scenario
//! - Custom assertions for STRATA-specific validation

pub use strata_core::{
    AgentIdentity, CacheFilter, CacheItem, CacheResult, StorageError, StoreConfig, StrataError,
    StrataResult, ValidationError,
};
pub use strata_provider::{AgentRegistration, Authority, Provider, ProviderCache, ProviderRegistry};
pub use strata_storage::{BackingStore, MemoryEngine, MemoryStore, Store};

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for STRATA data.

    use super::*;
    use proptest::collection::{btree_map, btree_set, vec};
    use proptest::prelude::*;

    /// Valid resource type names (never contain `:`).
    pub fn arb_resource_type() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("instances".to_string()),
            Just("serverGroups".to_string()),
            Just("loadBalancers".to_string()),
            Just("securityGroups".to_string()),
            "[a-z][a-zA-Z0-9.]{0,40}",
        ]
    }

    /// Ids shaped like `aws:instances:<account>:<region>:<name>`.
    pub fn arb_item_id() -> impl Strategy<Value = String> {
        ("[a-z]{2,8}", "[a-z]{2}-[a-z]{4,7}-[1-3]", "[a-z0-9-]{4,16}")
            .prop_map(|(account, region, name)| format!("aws:instances:{account}:{region}:{name}"))
    }

    pub fn arb_agent_identity() -> impl Strategy<Value = AgentIdentity> {
        ("[a-z]{2,10}", "[A-Z][A-Za-z]{2,20}Agent")
            .prop_map(|(scope, name)| AgentIdentity::new(&scope, &name))
    }

    pub fn arb_attribute_value() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            any::<i64>().prop_map(serde_json::Value::from),
            "[a-z0-9 -]{0,20}".prop_map(serde_json::Value::from),
            any::<bool>().prop_map(serde_json::Value::from),
            Just(serde_json::Value::Null),
        ]
    }

    pub fn arb_cache_item() -> impl Strategy<Value = CacheItem> {
        (
            arb_item_id(),
            btree_map("[a-z]{1,10}", arb_attribute_value(), 0..5),
            btree_map(
                prop_oneof![Just("serverGroups".to_string()), Just("loadBalancers".to_string())],
                btree_set("[a-z0-9-]{3,12}", 0..3),
                0..2,
            ),
            proptest::option::of(0u64..86_400),
        )
            .prop_map(|(id, attributes, relationships, ttl_seconds)| CacheItem {
                id,
                attributes,
                relationships,
                ttl_seconds,
            })
    }

    /// Items with distinct ids.
    pub fn arb_distinct_items(max: usize) -> impl Strategy<Value = Vec<CacheItem>> {
        vec(arb_cache_item(), 0..max).prop_map(|items| {
            let mut seen = std::collections::HashSet::new();
            items
                .into_iter()
                .filter(|item| seen.insert(item.id.clone()))
                .collect()
        })
    }

    pub fn arb_cache_result() -> impl Strategy<Value = CacheResult> {
        btree_map(arb_resource_type(), arb_distinct_items(6), 0..4).prop_map(|cache_results| {
            CacheResult {
                cache_results,
                evictions: Default::default(),
            }
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Fixtures for the prod/test agent scenario.

    use std::sync::Arc;

    use super::*;

    pub const PROVIDER: &str = "aws";
    pub const INSTANCES: &str = "instances";
    pub const SERVER_GROUPS: &str = "serverGroups";
    pub const TEST_AGENT: &str = "TestAgent";

    /// Custom resource kind that is never instantiated in storage.
    pub const CUSTOM_RESOURCE_TYPE: &str = "cloud.google.com.BackendConfig";
    pub const CUSTOM_RESOURCE_SCOPE: &str = "unregisteredCustomResources";

    pub fn instance_id(scope: &str) -> String {
        format!("aws:instances:{scope}:us-east-1:i-abcd1234")
    }

    pub fn server_group_id(scope: &str) -> String {
        format!("aws:serverGroups:myapp-{scope}:{scope}:us-east-1:myapp-{scope}-v000")
    }

    /// `<scope>/TestAgent`, authoritative for instances, linking server groups.
    pub fn caching_agent(scope: &str) -> AgentRegistration {
        AgentRegistration::new(PROVIDER, scope, TEST_AGENT)
            .authoritative_for([INSTANCES])
            .with_types([SERVER_GROUPS])
    }

    pub fn prod_caching_agent() -> AgentRegistration {
        caching_agent("prod")
    }

    pub fn test_caching_agent() -> AgentRegistration {
        caching_agent("test")
    }

    /// Agent authoritative for a custom kind whose tables never exist.
    pub fn unregistered_custom_resource_agent() -> AgentRegistration {
        AgentRegistration::new(PROVIDER, CUSTOM_RESOURCE_SCOPE, TEST_AGENT)
            .authoritative_for([CUSTOM_RESOURCE_TYPE])
    }

    /// One instance in `scope` linked to that scope's server group.
    pub fn scoped_instance(scope: &str) -> CacheItem {
        CacheItem::new(instance_id(scope))
            .with_attribute("account", serde_json::Value::from(scope))
            .with_attribute("region", serde_json::Value::from("us-east-1"))
            .with_relationship(SERVER_GROUPS, [server_group_id(scope)])
    }

    pub fn scoped_result(scope: &str) -> CacheResult {
        CacheResult::new().with_items(INSTANCES, vec![scoped_instance(scope)])
    }

    pub fn memory_store() -> Arc<MemoryStore> {
        match Store::new(MemoryEngine::new(), StoreConfig::default()) {
            Ok(store) => Arc::new(store),
            Err(e) => panic!("default store config must be valid: {e}"),
        }
    }

    /// Store each agent's scoped result through a provider cache.
    pub fn seed(store: Arc<dyn BackingStore>, agents: &[AgentRegistration]) {
        let cache = ProviderCache::new(store);
        for agent in agents {
            if let Err(e) = cache.put_cache_result(
                agent.agent.as_str(),
                &agent.authority(),
                &scoped_result(&agent.scope),
            ) {
                panic!("seeding {} failed: {e}", agent.agent);
            }
        }
    }

    /// Provider registry holding one `aws` provider with `agents`.
    pub fn registry_with(
        store: Arc<dyn BackingStore>,
        agents: Vec<AgentRegistration>,
    ) -> (ProviderRegistry, Arc<Provider>) {
        let provider = Arc::new(Provider::new(PROVIDER, store));
        for agent in agents {
            if let Err(e) = provider.register_agent(agent) {
                panic!("fixture agent must be valid: {e}");
            }
        }
        let registry = ProviderRegistry::new();
        if let Err(e) = registry.register(provider.clone()) {
            panic!("registering fixture provider failed: {e}");
        }
        (registry, provider)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for STRATA-specific validation.

    use super::*;

    /// Assert that a StrataResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &StrataResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a StrataResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &StrataResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that a StrataResult is a Validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &StrataResult<T>) {
        match result {
            Err(StrataError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert that a StrataResult is a ReservedDelimiter validation error.
    #[track_caller]
    pub fn assert_reserved_delimiter<T: std::fmt::Debug>(result: &StrataResult<T>) {
        match result {
            Err(StrataError::Validation(ValidationError::ReservedDelimiter { .. })) => {}
            other => panic!("Expected ReservedDelimiter error, got: {:?}", other),
        }
    }

    /// Assert the stored ids of `resource_type`, in sorted order.
    #[track_caller]
    pub fn assert_ids(store: &dyn BackingStore, resource_type: &str, expected: &[&str]) {
        let ids = match store.identifiers(resource_type) {
            Ok(ids) => ids,
            Err(e) => panic!("identifiers({resource_type}) failed: {e}"),
        };
        let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(ids, expected, "Unexpected ids for {}", resource_type);
    }

    /// Assert the `relType:agent` keys of every edge stored for `resource_type`.
    #[track_caller]
    pub fn assert_rel_agents(store: &dyn BackingStore, resource_type: &str, expected: &[&str]) {
        let edges = match store.relationships(resource_type) {
            Ok(edges) => edges,
            Err(e) => panic!("relationships({resource_type}) failed: {e}"),
        };
        let mut actual: Vec<String> = edges.iter().map(|edge| edge.rel_agent()).collect();
        actual.sort();
        let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(actual, expected, "Unexpected edges for {}", resource_type);
    }
}
