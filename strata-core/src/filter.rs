//! Relationship filters for read accessors.
//!
//! Reads never mutate state; the filter only decides which relationship
//! types are attached to returned items.

use serde::{Deserialize, Serialize};

/// Which relationships a read should return.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheFilter {
    /// Every relationship type.
    #[default]
    All,
    /// No relationships at all.
    None,
    /// Only relationship types starting with one of these prefixes.
    Prefixes(Vec<String>),
}

impl CacheFilter {
    /// Restrict relationships to the given type prefixes.
    pub fn relationships<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Prefixes(prefixes.into_iter().map(Into::into).collect())
    }

    /// Whether relationships of `relationship_type` pass this filter.
    pub fn allows(&self, relationship_type: &str) -> bool {
        match self {
            CacheFilter::All => true,
            CacheFilter::None => false,
            CacheFilter::Prefixes(prefixes) => prefixes
                .iter()
                .any(|prefix| relationship_type.starts_with(prefix.as_str())),
        }
    }

    /// Whether any relationship lookup is needed at all.
    pub fn wants_relationships(&self) -> bool {
        match self {
            CacheFilter::All => true,
            CacheFilter::None => false,
            CacheFilter::Prefixes(prefixes) => !prefixes.is_empty(),
        }
    }
}
