//! Resource-type namespaces, agent identities and relationship keys.
//!
//! A resource type is a plain string such as `instances` or `serverGroups`.
//! The `:` character is reserved: stored relationship keys take the form
//! `relationshipType:agentIdentity`, so a type containing `:` would make
//! those keys ambiguous.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Reserved delimiter between a relationship type and its asserting agent.
pub const RELATIONSHIP_DELIMITER: char = ':';

/// Namespace for sparse, event-driven overrides.
pub const ON_DEMAND_NAMESPACE: &str = "onDemand";

/// Common resource types reported by caching agents.
pub mod types {
    pub const APPLICATIONS: &str = "applications";
    pub const CLUSTERS: &str = "clusters";
    pub const SERVER_GROUPS: &str = "serverGroups";
    pub const INSTANCES: &str = "instances";
    pub const LOAD_BALANCERS: &str = "loadBalancers";
    pub const SECURITY_GROUPS: &str = "securityGroups";
    pub const ON_DEMAND: &str = super::ON_DEMAND_NAMESPACE;
}

/// Reject empty resource types and types containing the reserved delimiter.
pub fn validate_resource_type(resource_type: &str) -> Result<(), ValidationError> {
    if resource_type.is_empty() {
        return Err(ValidationError::EmptyResourceType);
    }
    if resource_type.contains(RELATIONSHIP_DELIMITER) {
        return Err(ValidationError::ReservedDelimiter {
            resource_type: resource_type.to_string(),
        });
    }
    Ok(())
}

/// Validate every resource type in `types`, failing on the first bad one.
pub fn validate_resource_types<'a, I>(types: I) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = &'a str>,
{
    types.into_iter().try_for_each(validate_resource_type)
}

/// Whether `resource_type` belongs to the on-demand namespace.
///
/// Matching is case-insensitive and by containment, so `onDemand` and
/// `kubernetesOnDemand` both qualify.
pub fn is_on_demand(resource_type: &str) -> bool {
    resource_type
        .to_ascii_lowercase()
        .contains(&ON_DEMAND_NAMESPACE.to_ascii_lowercase())
}

/// Build the stored key for a relationship asserted by `agent`.
pub fn relationship_key(relationship_type: &str, agent: &str) -> String {
    format!("{relationship_type}{RELATIONSHIP_DELIMITER}{agent}")
}

/// Split a stored relationship key into its type and asserting agent.
///
/// Keys without a delimiter are returned with no agent.
pub fn split_relationship_key(key: &str) -> (&str, Option<&str>) {
    match key.split_once(RELATIONSHIP_DELIMITER) {
        Some((rel_type, agent)) => (rel_type, Some(agent)),
        None => (key, None),
    }
}

// ============================================================================
// AGENT IDENTITY
// ============================================================================

/// Identity of a caching agent, conventionally `<scope>/<AgentName>`.
///
/// The scope usually names a cloud account or partition. Identities are
/// compared as plain strings; the scope is only a convenience for callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentIdentity(String);

impl AgentIdentity {
    /// Build an identity from a scope and an agent name.
    pub fn new(scope: &str, agent_name: &str) -> Self {
        Self(format!("{scope}/{agent_name}"))
    }

    /// Wrap an already formatted identity.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The scope portion, if the identity follows the `<scope>/<name>` form.
    pub fn scope(&self) -> Option<&str> {
        self.0.split_once('/').map(|(scope, _)| scope)
    }

    /// The agent-name portion (the whole identity when there is no scope).
    pub fn agent_name(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(_, name)| name)
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentIdentity {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for AgentIdentity {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl AsRef<str> for AgentIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
