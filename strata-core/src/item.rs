//! Cached items and the per-run results caching agents produce.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Attribute map of a cached item. Values are opaque JSON.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Relationship map: related resource type -> related item ids.
pub type Relationships = BTreeMap<String, BTreeSet<String>>;

/// One cached infrastructure object.
///
/// `id` is unique within its resource type and stable for the lifetime of the
/// object it represents. Attributes and relationships are replaced wholesale
/// on every merge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheItem {
    pub id: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub relationships: Relationships,
    /// Expiry hint in seconds. Stored, not enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

impl CacheItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Add related ids of `relationship_type`, merging with any already present.
    pub fn with_relationship<I, S>(mut self, relationship_type: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationships
            .entry(relationship_type.into())
            .or_default()
            .extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }

    /// Ids related to this item under `relationship_type`.
    pub fn related(&self, relationship_type: &str) -> Option<&BTreeSet<String>> {
        self.relationships.get(relationship_type)
    }

    /// Drop attributes whose value is JSON `null`.
    pub fn strip_null_attributes(&mut self) {
        self.attributes.retain(|_, v| !v.is_null());
    }
}

/// Output of one caching-agent run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheResult {
    /// Items reported per resource type.
    #[serde(default)]
    pub cache_results: BTreeMap<String, Vec<CacheItem>>,
    /// Ids the agent knows to be gone, per resource type.
    #[serde(default)]
    pub evictions: BTreeMap<String, Vec<String>>,
}

impl CacheResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `items` under `resource_type`.
    pub fn with_items(mut self, resource_type: impl Into<String>, items: Vec<CacheItem>) -> Self {
        self.cache_results
            .entry(resource_type.into())
            .or_default()
            .extend(items);
        self
    }

    /// Append explicit evictions under `resource_type`.
    pub fn with_evictions<I, S>(mut self, resource_type: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.evictions
            .entry(resource_type.into())
            .or_default()
            .extend(ids.into_iter().map(Into::into));
        self
    }

    /// Every resource type mentioned, in items or evictions.
    pub fn resource_types(&self) -> BTreeSet<&str> {
        self.cache_results
            .keys()
            .chain(self.evictions.keys())
            .map(String::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.cache_results.is_empty() && self.evictions.is_empty()
    }
}
