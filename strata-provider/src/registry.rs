//! Providers and the registry that maps provider names to them.
//!
//! The registry is an ordinary value handed to whoever needs it; there is
//! no process-wide instance.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use strata_core::{AgentIdentity, StorageError, StrataResult, ValidationError};
use strata_storage::BackingStore;

use crate::agent::AgentRegistration;
use crate::provider_cache::ProviderCache;

/// Source of the agents currently registered, queried by the cleanup sweep.
pub trait AgentRegistry: Send + Sync {
    fn registered_agents(&self) -> StrataResult<Vec<AgentRegistration>>;
}

impl AgentRegistry for Vec<AgentRegistration> {
    fn registered_agents(&self) -> StrataResult<Vec<AgentRegistration>> {
        Ok(self.clone())
    }
}

/// One logical provider (e.g. `aws`) with its agents and merge policy.
#[derive(Debug)]
pub struct Provider {
    name: String,
    agents: RwLock<Vec<AgentRegistration>>,
    cache: ProviderCache,
}

impl Provider {
    pub fn new(name: impl Into<String>, store: Arc<dyn BackingStore>) -> Self {
        Self {
            name: name.into(),
            agents: RwLock::new(Vec::new()),
            cache: ProviderCache::new(store),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache(&self) -> &ProviderCache {
        &self.cache
    }

    /// Register an agent, replacing any registration with the same identity.
    pub fn register_agent(&self, registration: AgentRegistration) -> StrataResult<()> {
        registration.validate()?;
        if registration.provider != self.name {
            return Err(ValidationError::InvalidValue {
                field: "provider".to_string(),
                reason: format!(
                    "agent {} belongs to '{}', not '{}'",
                    registration.agent, registration.provider, self.name
                ),
            }
            .into());
        }

        let mut agents = self.agents.write().map_err(|_| StorageError::LockPoisoned)?;
        agents.retain(|existing| existing.agent != registration.agent);
        tracing::info!(
            provider = %self.name,
            agent = %registration.agent,
            "Registered caching agent"
        );
        agents.push(registration);
        Ok(())
    }

    /// Remove an agent. Returns whether it was registered.
    pub fn deregister_agent(&self, agent: &AgentIdentity) -> StrataResult<bool> {
        let mut agents = self.agents.write().map_err(|_| StorageError::LockPoisoned)?;
        let before = agents.len();
        agents.retain(|existing| &existing.agent != agent);
        let removed = agents.len() != before;
        if removed {
            tracing::info!(provider = %self.name, agent = %agent, "Deregistered caching agent");
        }
        Ok(removed)
    }

    pub fn agents(&self) -> StrataResult<Vec<AgentRegistration>> {
        let agents = self.agents.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(agents.clone())
    }
}

/// Provider name -> provider.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: RwLock<BTreeMap<String, Arc<Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider, returning the one it replaced, if any.
    pub fn register(&self, provider: Arc<Provider>) -> StrataResult<Option<Arc<Provider>>> {
        let mut providers = self.providers.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(providers.insert(provider.name().to_string(), provider))
    }

    pub fn provider(&self, name: &str) -> StrataResult<Option<Arc<Provider>>> {
        let providers = self.providers.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(providers.get(name).cloned())
    }

    pub fn providers(&self) -> StrataResult<Vec<Arc<Provider>>> {
        let providers = self.providers.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(providers.values().cloned().collect())
    }

    /// Cache of the named provider.
    pub fn cache(&self, name: &str) -> StrataResult<Option<ProviderCache>> {
        Ok(self.provider(name)?.map(|p| p.cache().clone()))
    }
}

impl AgentRegistry for ProviderRegistry {
    fn registered_agents(&self) -> StrataResult<Vec<AgentRegistration>> {
        let mut agents = Vec::new();
        for provider in self.providers()? {
            agents.extend(provider.agents()?);
        }
        Ok(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::StoreConfig;
    use strata_storage::{MemoryEngine, Store};

    fn store() -> Arc<dyn BackingStore> {
        Arc::new(Store::new(MemoryEngine::new(), StoreConfig::default()).unwrap())
    }

    #[test]
    fn test_registry_collects_agents_across_providers() {
        let store = store();
        let registry = ProviderRegistry::new();

        let aws = Arc::new(Provider::new("aws", store.clone()));
        aws.register_agent(
            AgentRegistration::new("aws", "prod", "TestAgent").authoritative_for(["instances"]),
        )
        .unwrap();
        let k8s = Arc::new(Provider::new("kubernetes", store));
        k8s.register_agent(AgentRegistration::new("kubernetes", "dev", "PodAgent"))
            .unwrap();

        registry.register(aws).unwrap();
        registry.register(k8s).unwrap();

        assert_eq!(registry.registered_agents().unwrap().len(), 2);
        assert!(registry.provider("aws").unwrap().is_some());
        assert!(registry.cache("gcp").unwrap().is_none());
    }

    #[test]
    fn test_reregistration_replaces() {
        let provider = Provider::new("aws", store());
        let agent = AgentRegistration::new("aws", "prod", "TestAgent");
        provider.register_agent(agent.clone()).unwrap();
        provider
            .register_agent(agent.clone().authoritative_for(["instances"]))
            .unwrap();

        let agents = provider.agents().unwrap();
        assert_eq!(agents.len(), 1);
        assert!(agents[0].authoritative.contains("instances"));

        assert!(provider.deregister_agent(&agent.agent).unwrap());
        assert!(!provider.deregister_agent(&agent.agent).unwrap());
    }

    #[test]
    fn test_wrong_provider_rejected() {
        let provider = Provider::new("aws", store());
        let result = provider.register_agent(AgentRegistration::new("gcp", "prod", "A"));
        assert!(result.is_err());
    }
}
