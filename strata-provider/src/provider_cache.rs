//! Provider cache: the merge policy between caching agents and the store.
//!
//! For each cache result the policy decides which types are merged
//! authoritatively (with supersede-by-omission), which only contribute
//! relationships, and when explicit evictions apply. The cache holds no
//! state of its own; every call goes straight to the backing store.

use std::collections::BTreeSet;
use std::sync::Arc;

use strata_core::{
    is_on_demand, split_relationship_key, validate_resource_type, CacheFilter, CacheItem,
    CacheResult, StrataResult,
};
use strata_storage::{BackingStore, MergeStats};

use crate::agent::Authority;

/// Agent recorded for rows written through [`ProviderCache::put_cache_data`].
pub const UNKNOWN_AGENT: &str = "unknown";

/// Merge policy for one provider.
#[derive(Clone)]
pub struct ProviderCache {
    store: Arc<dyn BackingStore>,
}

impl std::fmt::Debug for ProviderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCache").finish_non_exhaustive()
    }
}

/// Reject a result containing any bad resource type before writing anything.
fn validate_result(result: &CacheResult) -> StrataResult<()> {
    for resource_type in result.resource_types() {
        validate_resource_type(resource_type)?;
    }
    for items in result.cache_results.values() {
        for item in items {
            for key in item.relationships.keys() {
                validate_resource_type(split_relationship_key(key).0)?;
            }
        }
    }
    Ok(())
}

impl ProviderCache {
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn BackingStore> {
        &self.store
    }

    /// Store a complete cache result from `source`.
    ///
    /// Order of application:
    /// 1. on-demand types, authoritative without cleanup
    /// 2. effective authoritative types, with cleanup
    /// 3. when no authority is in effect and no on-demand type is present,
    ///    every other type, authoritative without cleanup
    /// 4. remaining types as relationship-only contributions
    /// 5. explicit evictions
    pub fn put_cache_result(
        &self,
        source: &str,
        authority: &Authority,
        result: &CacheResult,
    ) -> StrataResult<MergeStats> {
        authority.validate()?;
        validate_result(result)?;

        let effective = authority.effective_for(result);
        let mut handled: BTreeSet<&str> = BTreeSet::new();
        let mut stats = MergeStats::default();
        let mut on_demand_present = false;

        for (resource_type, items) in &result.cache_results {
            if is_on_demand(resource_type) {
                stats.absorb(self.store.merge(resource_type, source, items, true, false)?);
                handled.insert(resource_type);
                on_demand_present = true;
            }
        }

        for resource_type in &effective {
            if let Some(items) = result.cache_results.get(*resource_type) {
                stats.absorb(self.store.merge(resource_type, source, items, true, true)?);
                handled.insert(resource_type);
            }
        }

        // On-demand keys count as authority for this call.
        if effective.is_empty() && !on_demand_present {
            for (resource_type, items) in &result.cache_results {
                if handled.insert(resource_type) {
                    stats.absorb(self.store.merge(resource_type, source, items, true, false)?);
                }
            }
        }

        for (resource_type, items) in &result.cache_results {
            if !handled.contains(resource_type.as_str()) {
                stats.absorb(self.store.merge(resource_type, source, items, false, true)?);
            }
        }

        for (resource_type, ids) in &result.evictions {
            stats.items_deleted += self.store.evict_all(resource_type, ids)?;
        }

        tracing::debug!(
            source,
            types = result.cache_results.len(),
            authoritative = effective.len(),
            stored = stats.items_stored,
            deleted = stats.items_deleted,
            "Stored cache result"
        );

        Ok(stats)
    }

    /// Store a partial cache result from `source`.
    ///
    /// Same authoritative split as [`put_cache_result`](Self::put_cache_result),
    /// but nothing is ever deleted: no cleanup, no evictions, and on-demand
    /// types get no special handling.
    pub fn add_cache_result(
        &self,
        source: &str,
        authority: &Authority,
        result: &CacheResult,
    ) -> StrataResult<MergeStats> {
        authority.validate()?;
        validate_result(result)?;

        let declared: BTreeSet<&str> = authority
            .authoritative
            .iter()
            .chain(&authority.also_authoritative_for)
            .map(String::as_str)
            .collect();
        let no_authority = declared.is_empty();

        let mut stats = MergeStats::default();
        for (resource_type, items) in &result.cache_results {
            let authoritative = no_authority || declared.contains(resource_type.as_str());
            stats.absorb(
                self.store
                    .merge(resource_type, source, items, authoritative, false)?,
            );
        }
        Ok(stats)
    }

    /// Upsert one item without any authority semantics.
    pub fn put_cache_data(&self, resource_type: &str, item: CacheItem) -> StrataResult<MergeStats> {
        self.store
            .merge(resource_type, UNKNOWN_AGENT, &[item], true, false)
    }

    /// Delete items an agent knows to be gone.
    pub fn evict_deleted_items(&self, resource_type: &str, ids: &[String]) -> StrataResult<usize> {
        self.store.evict_all(resource_type, ids)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn get(&self, resource_type: &str, id: &str) -> StrataResult<Option<CacheItem>> {
        self.store.get(resource_type, id, &CacheFilter::All)
    }

    pub fn get_filtered(
        &self,
        resource_type: &str,
        id: &str,
        filter: &CacheFilter,
    ) -> StrataResult<Option<CacheItem>> {
        self.store.get(resource_type, id, filter)
    }

    pub fn get_all(
        &self,
        resource_type: &str,
        filter: &CacheFilter,
    ) -> StrataResult<Vec<CacheItem>> {
        self.store.get_all(resource_type, filter)
    }

    pub fn get_all_by_ids(
        &self,
        resource_type: &str,
        ids: &[String],
        filter: &CacheFilter,
    ) -> StrataResult<Vec<CacheItem>> {
        self.store.get_all_by_ids(resource_type, ids, filter)
    }

    pub fn identifiers(&self, resource_type: &str) -> StrataResult<Vec<String>> {
        self.store.identifiers(resource_type)
    }

    pub fn filter_identifiers(&self, resource_type: &str, glob: &str) -> StrataResult<Vec<String>> {
        self.store.filter_identifiers(resource_type, glob)
    }

    pub fn existing_identifiers(
        &self,
        resource_type: &str,
        ids: &[String],
    ) -> StrataResult<Vec<String>> {
        self.store.existing_identifiers(resource_type, ids)
    }
}
