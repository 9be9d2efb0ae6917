//! Physical table naming.
//!
//! Logical resource types map to physical table names of bounded length.
//! Names that fit are used verbatim (lower-cased, with characters outside
//! `[a-z0-9_]` replaced by `_`). Names that would overflow keep their
//! prefix and suffix, truncate the type, and append a fixed-width SHA-256
//! digest of the untruncated `type + suffix`.

use sha2::{Digest, Sha256};

pub use strata_core::config::{HASH_LENGTH, RELATIONSHIP_SUFFIX};
use strata_core::StoreConfig;

/// Derive a physical name for `logical_name` bounded by `max_length`.
///
/// Pure and deterministic. The suffix is never truncated.
///
/// Short names are normalized and therefore lossy: `serverGroups` and
/// `ServerGroups` share a table, as do `server.groups` and `server-groups`.
/// Hashed names digest the logical name and stay case-sensitive.
pub fn physical_name(prefix: &str, logical_name: &str, suffix: &str, max_length: usize) -> String {
    let normalized = normalize(logical_name);
    if prefix.len() + normalized.len() + suffix.len() <= max_length {
        return format!("{prefix}{normalized}{suffix}");
    }

    let hash = short_hash(&format!("{logical_name}{suffix}"));
    let room = max_length.saturating_sub(prefix.len() + HASH_LENGTH + suffix.len());
    // normalize() only produces ASCII, so byte truncation is char-safe.
    let truncated = &normalized[..room.min(normalized.len())];

    format!("{prefix}{truncated}{hash}{suffix}")
}

/// Bound an agent identity to `max_length` characters.
///
/// Identities that fit are returned unchanged. Longer ones keep a readable
/// head followed by `-` and a digest of the full identity.
pub fn bounded_agent_name(agent: &str, max_length: usize) -> String {
    if agent.chars().count() <= max_length {
        return agent.to_string();
    }

    let hash = short_hash(agent);
    let room = max_length.saturating_sub(HASH_LENGTH + 1);
    let head: String = agent.chars().take(room).collect();

    format!("{head}-{hash}")
}

fn normalize(logical_name: &str) -> String {
    logical_name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(HASH_LENGTH);
    encoded
}

/// Table names for one store configuration.
#[derive(Debug, Clone)]
pub struct NamingScheme {
    prefix: String,
    max_table_name_length: usize,
    max_agent_length: usize,
}

impl NamingScheme {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            prefix: config.table_prefix(),
            max_table_name_length: config.max_table_name_length,
            max_agent_length: config.max_agent_length,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Table holding the items of `resource_type`.
    pub fn resource_table(&self, resource_type: &str) -> String {
        physical_name(&self.prefix, resource_type, "", self.max_table_name_length)
    }

    /// Table holding the relationship edges of `resource_type`.
    pub fn relationship_table(&self, resource_type: &str) -> String {
        physical_name(
            &self.prefix,
            resource_type,
            RELATIONSHIP_SUFFIX,
            self.max_table_name_length,
        )
    }

    /// Table listing the on-demand types written through this scheme.
    ///
    /// `$` never survives normalization, so no resource type maps here.
    pub fn on_demand_catalog(&self) -> String {
        format!("{}$on_demand", self.prefix)
    }

    /// Agent identity as it is stored in rows.
    pub fn agent_name(&self, agent: &str) -> String {
        bounded_agent_name(agent, self.max_agent_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAX: usize = 64;

    #[test]
    fn test_short_names_are_verbatim_lowercase() {
        assert_eq!(
            physical_name("cats_v1_", "serverGroups", "", MAX),
            "cats_v1_servergroups"
        );
        assert_eq!(
            physical_name("cats_v1_", "serverGroups", RELATIONSHIP_SUFFIX, MAX),
            "cats_v1_servergroups_rel"
        );
    }

    #[test]
    fn test_special_characters_are_normalized() {
        assert_eq!(
            physical_name("cats_v1_", "cloud.google.com.BackendConfig", "", MAX),
            "cats_v1_cloud_google_com_backendconfig"
        );
    }

    #[test]
    fn test_normalization_merges_case_and_punctuation() {
        assert_eq!(
            physical_name("cats_v1_", "serverGroups", "", MAX),
            physical_name("cats_v1_", "ServerGroups", "", MAX)
        );
        assert_eq!(
            physical_name("cats_v1_", "server.groups", "", MAX),
            physical_name("cats_v1_", "server-groups", "", MAX)
        );
        assert_ne!(
            physical_name("cats_v1_", "serverGroups", "", MAX),
            physical_name("cats_v1_", "server.groups", "", MAX)
        );

        let long = "customResourceDefinition".repeat(4);
        assert_ne!(
            physical_name("cats_v1_", &long, "", MAX),
            physical_name("cats_v1_", &long.to_uppercase(), "", MAX)
        );
    }

    #[test]
    fn test_on_demand_catalog_is_outside_type_tables() {
        let scheme = NamingScheme::new(&StoreConfig::default());
        let catalog = scheme.on_demand_catalog();
        assert!(catalog.starts_with("cats_v1_"));
        assert!(catalog.len() <= MAX);
        assert_ne!(catalog, scheme.resource_table("$on_demand"));
    }

    #[test]
    fn test_long_name_is_bounded_and_keeps_suffix() {
        let long = "a".repeat(100);
        let name = physical_name("cats_v1_", &long, RELATIONSHIP_SUFFIX, MAX);
        assert_eq!(name.len(), MAX);
        assert!(name.starts_with("cats_v1_aaaa"));
        assert!(name.ends_with(RELATIONSHIP_SUFFIX));
    }

    #[test]
    fn test_resource_and_relationship_tables_differ_when_hashed() {
        let long = "customResourceDefinition".repeat(4);
        let scheme = NamingScheme::new(&StoreConfig::default());
        assert_ne!(scheme.resource_table(&long), scheme.relationship_table(&long));
    }

    #[test]
    fn test_agent_name_bounding() {
        assert_eq!(bounded_agent_name("prod/TestAgent", 127), "prod/TestAgent");

        let long = format!("prod/{}", "X".repeat(200));
        let bounded = bounded_agent_name(&long, 127);
        assert_eq!(bounded.chars().count(), 127);
        assert_eq!(bounded, bounded_agent_name(&long, 127));
    }

    #[test]
    fn test_scheme_uses_namespace() {
        let scheme = NamingScheme::new(&StoreConfig {
            table_namespace: Some("k8s".to_string()),
            ..Default::default()
        });
        assert_eq!(scheme.resource_table("pods"), "cats_v1_k8s_pods");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Property: naming is a pure function bounded by the maximum length.
        #[test]
        fn prop_physical_name_deterministic_and_bounded(
            name in "[A-Za-z0-9._-]{1,160}",
            rel in any::<bool>(),
        ) {
            let suffix = if rel { RELATIONSHIP_SUFFIX } else { "" };
            let first = physical_name("cats_v1_", &name, suffix, MAX);
            let second = physical_name("cats_v1_", &name, suffix, MAX);
            prop_assert_eq!(&first, &second);
            prop_assert!(first.len() <= MAX);
            prop_assert!(first.ends_with(suffix));
        }

        /// Property: the longest namespaces validation accepts keep names bounded.
        #[test]
        fn prop_valid_namespace_bounds_every_name(
            namespace in "[a-z0-9_]{1,35}",
            name in "[A-Za-z0-9.]{1,160}",
        ) {
            let config = StoreConfig {
                table_namespace: Some(namespace),
                ..StoreConfig::default()
            };
            prop_assert!(config.validate().is_ok());
            let scheme = NamingScheme::new(&config);
            prop_assert!(scheme.resource_table(&name).len() <= MAX);
            prop_assert!(scheme.relationship_table(&name).len() <= MAX);
            prop_assert!(scheme.on_demand_catalog().len() <= MAX);
        }

        /// Property: distinct over-length names sharing a long prefix differ.
        #[test]
        fn prop_long_names_are_discriminated(
            tail_a in "[a-z]{1,20}",
            tail_b in "[a-z]{1,20}",
        ) {
            prop_assume!(tail_a != tail_b);
            let shared = "verylongcustomresourcekind".repeat(3);
            let a = physical_name("cats_v1_", &format!("{shared}{tail_a}"), "", MAX);
            let b = physical_name("cats_v1_", &format!("{shared}{tail_b}"), "", MAX);
            prop_assert_ne!(&a, &b);
            prop_assert!(a.len() <= MAX && b.len() <= MAX);
        }
    }
}
