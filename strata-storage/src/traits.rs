//! Backing store trait and merge statistics.
//!
//! The trait is object safe so the provider cache and the cleanup jobs can
//! hold an `Arc<dyn BackingStore>` regardless of the engine underneath.

use std::time::Duration;

use strata_core::{CacheFilter, CacheItem, StrataResult};

use crate::rows::{RelationshipRecord, ResourceOwner};

/// Per-resource-type storage with agent-tagged rows and edges.
///
/// # Missing Tables
///
/// A resource type whose physical tables were never created behaves as
/// empty. Reads return nothing, deletes do nothing, and none of them fail.
///
/// # Validation
///
/// Every method rejects resource types that are empty or contain `:` with
/// a validation error before touching storage.
pub trait BackingStore: Send + Sync {
    /// Upsert `items` for `(resource_type, agent)`.
    ///
    /// Relationship edges are stored tagged with `agent` so edges from
    /// different agents never collide. When `authoritative` and `cleanup`
    /// are both set, rows previously stored by `agent` for this type and
    /// absent from `items` are deleted together with their edges.
    /// Non-authoritative merges write edges only and never delete items.
    fn merge(
        &self,
        resource_type: &str,
        agent: &str,
        items: &[CacheItem],
        authoritative: bool,
        cleanup: bool,
    ) -> StrataResult<MergeStats>;

    /// Delete `ids` and every edge touching them, whoever asserted them.
    /// Returns the number of resource rows removed.
    fn evict_all(&self, resource_type: &str, ids: &[String]) -> StrataResult<usize>;

    fn evict(&self, resource_type: &str, id: &str) -> StrataResult<usize> {
        self.evict_all(resource_type, &[id.to_string()])
    }

    fn get(
        &self,
        resource_type: &str,
        id: &str,
        filter: &CacheFilter,
    ) -> StrataResult<Option<CacheItem>> {
        let mut items = self.get_all_by_ids(resource_type, &[id.to_string()], filter)?;
        Ok(items.pop())
    }

    fn get_all(&self, resource_type: &str, filter: &CacheFilter) -> StrataResult<Vec<CacheItem>>;

    /// Items among `ids` that exist. Missing ids are skipped.
    fn get_all_by_ids(
        &self,
        resource_type: &str,
        ids: &[String],
        filter: &CacheFilter,
    ) -> StrataResult<Vec<CacheItem>>;

    /// Every stored id of `resource_type`, sorted.
    fn identifiers(&self, resource_type: &str) -> StrataResult<Vec<String>>;

    /// Stored ids matching a glob pattern.
    fn filter_identifiers(&self, resource_type: &str, glob: &str) -> StrataResult<Vec<String>>;

    /// The subset of `ids` currently stored.
    fn existing_identifiers(&self, resource_type: &str, ids: &[String])
        -> StrataResult<Vec<String>>;

    /// Owner and age of every stored row.
    fn resource_owners(&self, resource_type: &str) -> StrataResult<Vec<ResourceOwner>>;

    /// Delete exactly the given `(id, agent)` rows. Edges are left alone.
    fn delete_resources(
        &self,
        resource_type: &str,
        owners: &[ResourceOwner],
    ) -> StrataResult<usize>;

    /// Every edge row stored in `resource_type`'s relationship table.
    fn relationships(&self, resource_type: &str) -> StrataResult<Vec<RelationshipRecord>>;

    /// Delete edge rows of `resource_type` and their counterparts.
    fn delete_relationships(
        &self,
        resource_type: &str,
        records: &[RelationshipRecord],
    ) -> StrataResult<usize>;

    /// Delete on-demand rows older than `max_age`.
    fn clean_on_demand(&self, max_age: Duration) -> StrataResult<usize>;
}

/// What one merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub items_seen: usize,
    pub items_stored: usize,
    pub items_unchanged: usize,
    pub duplicates: usize,
    /// Items dropped for over-length or malformed ids.
    pub dropped: usize,
    pub relationships_stored: usize,
    pub relationships_deleted: usize,
    pub items_deleted: usize,
}

impl MergeStats {
    /// Fold another merge's statistics into this one.
    pub fn absorb(&mut self, other: MergeStats) {
        self.items_seen += other.items_seen;
        self.items_stored += other.items_stored;
        self.items_unchanged += other.items_unchanged;
        self.duplicates += other.duplicates;
        self.dropped += other.dropped;
        self.relationships_stored += other.relationships_stored;
        self.relationships_deleted += other.relationships_deleted;
        self.items_deleted += other.items_deleted;
    }
}
