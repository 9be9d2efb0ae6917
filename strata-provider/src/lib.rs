//! STRATA Provider - Merge Policy and Provider Registry
//!
//! Caching agents hand their results to a [`ProviderCache`], which decides
//! per resource type whether the agent's report replaces, adds to, or only
//! links into what is stored.

pub mod agent;
pub mod provider_cache;
pub mod registry;

pub use agent::{AgentRegistration, Authority};
pub use provider_cache::{ProviderCache, UNKNOWN_AGENT};
pub use registry::{AgentRegistry, Provider, ProviderRegistry};
