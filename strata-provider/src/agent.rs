//! Caching agent registrations and declared authority.
//!
//! Authority is declared, never inferred from agent names. An agent that is
//! the source of truth for an extra type only when it reports it (cluster
//! caching agents reporting `clusters`, for instance) says so through
//! `also_authoritative_for`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strata_core::{
    is_on_demand, validate_resource_type, AgentIdentity, CacheResult, StrataResult,
    ValidationError,
};

/// A registered caching agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRegistration {
    /// Identity stamped on every row and edge this agent writes.
    pub agent: AgentIdentity,
    /// Provider the agent belongs to, e.g. `aws`.
    pub provider: String,
    /// Partition the agent covers, usually a cloud account.
    pub scope: String,
    /// Resource types the agent can report.
    #[serde(default)]
    pub types: BTreeSet<String>,
    /// Types for which the agent's report is the complete truth.
    #[serde(default)]
    pub authoritative: BTreeSet<String>,
    /// Types the agent is authoritative for whenever they appear in a result.
    #[serde(default)]
    pub also_authoritative_for: BTreeSet<String>,
}

impl AgentRegistration {
    /// Register `<scope>/<agent_name>` under `provider`.
    pub fn new(provider: impl Into<String>, scope: &str, agent_name: &str) -> Self {
        Self {
            agent: AgentIdentity::new(scope, agent_name),
            provider: provider.into(),
            scope: scope.to_string(),
            types: BTreeSet::new(),
            authoritative: BTreeSet::new(),
            also_authoritative_for: BTreeSet::new(),
        }
    }

    /// Types the agent reports without owning them.
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.extend(types.into_iter().map(Into::into));
        self
    }

    /// Types the agent reports and owns.
    pub fn authoritative_for<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for resource_type in types {
            let resource_type = resource_type.into();
            self.types.insert(resource_type.clone());
            self.authoritative.insert(resource_type);
        }
        self
    }

    pub fn also_authoritative_for<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.also_authoritative_for
            .extend(types.into_iter().map(Into::into));
        self
    }

    /// Every type this agent may write rows or edges into.
    pub fn produced_types(&self) -> impl Iterator<Item = &str> {
        self.types
            .iter()
            .chain(self.authoritative.iter())
            .chain(self.also_authoritative_for.iter())
            .map(String::as_str)
    }

    /// Whether the agent owns rows of `resource_type`.
    pub fn is_authoritative_for(&self, resource_type: &str) -> bool {
        self.authoritative.contains(resource_type)
            || self.also_authoritative_for.contains(resource_type)
    }

    pub fn authority(&self) -> Authority {
        Authority {
            authoritative: self.authoritative.clone(),
            also_authoritative_for: self.also_authoritative_for.clone(),
        }
    }

    /// Check type names and that the agent identity is set.
    pub fn validate(&self) -> StrataResult<()> {
        if self.agent.as_str().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "agent".to_string(),
                reason: "agent identity must not be empty".to_string(),
            }
            .into());
        }
        if self.provider.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "provider".to_string(),
                reason: "provider must not be empty".to_string(),
            }
            .into());
        }
        for resource_type in self.produced_types() {
            validate_resource_type(resource_type)?;
        }
        Ok(())
    }
}

/// Authority an agent declares for one cache result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    #[serde(default)]
    pub authoritative: BTreeSet<String>,
    #[serde(default)]
    pub also_authoritative_for: BTreeSet<String>,
}

impl Authority {
    /// No declared authority.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            authoritative: types.into_iter().map(Into::into).collect(),
            also_authoritative_for: BTreeSet::new(),
        }
    }

    pub fn also_for<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.also_authoritative_for
            .extend(types.into_iter().map(Into::into));
        self
    }

    pub fn validate(&self) -> StrataResult<()> {
        for resource_type in self.authoritative.iter().chain(&self.also_authoritative_for) {
            validate_resource_type(resource_type)?;
        }
        Ok(())
    }

    /// Authoritative types in effect for `result`, on-demand types excluded.
    ///
    /// `also_authoritative_for` types count only when the result carries them.
    pub fn effective_for<'a>(&'a self, result: &CacheResult) -> BTreeSet<&'a str> {
        self.authoritative
            .iter()
            .map(String::as_str)
            .chain(
                self.also_authoritative_for
                    .iter()
                    .map(String::as_str)
                    .filter(|t| result.cache_results.contains_key(*t)),
            )
            .filter(|t| !is_on_demand(t))
            .collect()
    }
}

impl From<&AgentRegistration> for Authority {
    fn from(registration: &AgentRegistration) -> Self {
        registration.authority()
    }
}
