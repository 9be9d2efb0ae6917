//! Unknown-Agent Cleanup Sweep
//!
//! Removes rows and relationship edges left behind by caching agents that
//! are no longer registered. The registry, not the store, decides which
//! agents are alive:
//!
//! 1. Collect every registered agent and the types it may write.
//! 2. For each type some agent is authoritative for, delete resource rows
//!    whose agent is not live for that type.
//! 3. Then delete edges in that type's relationship table whose agent is
//!    live neither for the table's type nor for the edge's related type.
//!    Mirrors in the related type go with them.
//!
//! Types whose tables were never created are empty to the store, so a
//! freshly configured custom kind sweeps as a no-op. Re-running the sweep
//! against a clean store deletes nothing.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use strata_core::{is_on_demand, StrataResult};
use strata_provider::AgentRegistry;
use strata_storage::rows::now_millis;
use strata_storage::{bounded_agent_name, BackingStore, RelationshipRecord, ResourceOwner};

use crate::config::CleanupConfig;

/// Decides which agents this process may clean up after.
///
/// Several sweepers can share one store; each only touches rows whose
/// agent it handles. Unknown agents no sweeper handles are kept.
pub trait ShardingFilter: Send + Sync {
    fn handles(&self, agent: &str) -> bool;
}

/// Handles every agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ShardingFilter for AllowAll {
    fn handles(&self, _agent: &str) -> bool {
        true
    }
}

impl<F> ShardingFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn handles(&self, agent: &str) -> bool {
        self(agent)
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// No agents were registered, so nothing was examined.
    pub skipped: bool,
    pub dry_run: bool,
    pub types_scanned: Vec<String>,
    pub resources_deleted: usize,
    pub relationships_deleted: usize,
    /// Unknown rows and edges kept by the sharding filter or the age guard.
    pub preserved: usize,
}

impl CleanupReport {
    pub fn total_deleted(&self) -> usize {
        self.resources_deleted + self.relationships_deleted
    }
}

/// Agents that may write each resource type, in stored (bounded) form.
#[derive(Debug, Default)]
struct LiveAgents {
    by_type: BTreeMap<String, HashSet<String>>,
    authoritative_types: BTreeSet<String>,
}

impl LiveAgents {
    fn is_live(&self, resource_type: &str, agent: &str) -> bool {
        self.by_type
            .get(resource_type)
            .is_some_and(|agents| agents.contains(agent))
    }

    fn edge_is_live(&self, resource_type: &str, edge: &RelationshipRecord) -> bool {
        self.is_live(resource_type, &edge.agent) || self.is_live(&edge.rel_type, &edge.agent)
    }
}

/// The unknown-agent cleanup sweep.
///
/// Stateless apart from its collaborators; clone it freely.
#[derive(Clone)]
pub struct UnknownAgentCleanup {
    store: Arc<dyn BackingStore>,
    registry: Arc<dyn AgentRegistry>,
    config: CleanupConfig,
    sharding: Arc<dyn ShardingFilter>,
}

impl std::fmt::Debug for UnknownAgentCleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnknownAgentCleanup")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl UnknownAgentCleanup {
    pub fn new(
        store: Arc<dyn BackingStore>,
        registry: Arc<dyn AgentRegistry>,
        config: CleanupConfig,
    ) -> StrataResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            registry,
            config,
            sharding: Arc::new(AllowAll),
        })
    }

    pub fn with_sharding(mut self, sharding: Arc<dyn ShardingFilter>) -> Self {
        self.sharding = sharding;
        self
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.config
    }

    /// Run one sweep.
    pub fn run(&self) -> StrataResult<CleanupReport> {
        let mut report = CleanupReport {
            dry_run: self.config.dry_run,
            ..CleanupReport::default()
        };

        let live = self.live_agents()?;
        if live.by_type.is_empty() {
            tracing::warn!("No caching agents registered, skipping unknown-agent cleanup");
            report.skipped = true;
            return Ok(report);
        }

        let cutoff = self.cutoff();
        for resource_type in &live.authoritative_types {
            if self.config.excluded_types.contains(resource_type) || is_on_demand(resource_type) {
                tracing::debug!(resource_type = %resource_type, "Type excluded from cleanup");
                continue;
            }
            report.types_scanned.push(resource_type.clone());
            self.sweep_resources(resource_type, &live, cutoff, &mut report)?;
            self.sweep_relationships(resource_type, &live, cutoff, &mut report)?;
        }

        if report.total_deleted() > 0 || report.preserved > 0 {
            tracing::info!(
                types = report.types_scanned.len(),
                resources = report.resources_deleted,
                relationships = report.relationships_deleted,
                preserved = report.preserved,
                dry_run = report.dry_run,
                "Unknown-agent cleanup completed"
            );
        } else {
            tracing::trace!("Unknown-agent cleanup completed with nothing to delete");
        }

        Ok(report)
    }

    fn live_agents(&self) -> StrataResult<LiveAgents> {
        let mut live = LiveAgents::default();
        for registration in self.registry.registered_agents()? {
            let agent =
                bounded_agent_name(registration.agent.as_str(), self.config.max_agent_length);
            for resource_type in registration.produced_types() {
                live.by_type
                    .entry(resource_type.to_string())
                    .or_default()
                    .insert(agent.clone());
            }
            live.authoritative_types.extend(
                registration
                    .authoritative
                    .iter()
                    .chain(&registration.also_authoritative_for)
                    .cloned(),
            );
        }
        Ok(live)
    }

    /// Rows written after this instant are protected.
    fn cutoff(&self) -> i64 {
        let age = i64::try_from(self.config.min_record_age.as_millis()).unwrap_or(i64::MAX);
        now_millis().saturating_sub(age)
    }

    /// Whether an unknown row may go, counting those that may not.
    fn eligible(
        &self,
        agent: &str,
        last_updated: i64,
        cutoff: i64,
        report: &mut CleanupReport,
    ) -> bool {
        if !self.sharding.handles(agent) || last_updated > cutoff {
            report.preserved += 1;
            return false;
        }
        true
    }

    fn sweep_resources(
        &self,
        resource_type: &str,
        live: &LiveAgents,
        cutoff: i64,
        report: &mut CleanupReport,
    ) -> StrataResult<()> {
        let unknown: Vec<ResourceOwner> = self
            .store
            .resource_owners(resource_type)?
            .into_iter()
            .filter(|owner| !live.is_live(resource_type, &owner.agent))
            .filter(|owner| self.eligible(&owner.agent, owner.last_updated, cutoff, report))
            .collect();

        if unknown.is_empty() {
            return Ok(());
        }
        self.log_deletions(
            resource_type,
            unknown.iter().map(|o| (o.id.as_str(), o.agent.as_str())),
        );

        if self.config.dry_run {
            report.resources_deleted += unknown.len();
            return Ok(());
        }
        for chunk in unknown.chunks(self.config.delete_batch_size) {
            report.resources_deleted += self.store.delete_resources(resource_type, chunk)?;
        }
        Ok(())
    }

    fn sweep_relationships(
        &self,
        resource_type: &str,
        live: &LiveAgents,
        cutoff: i64,
        report: &mut CleanupReport,
    ) -> StrataResult<()> {
        let unknown: Vec<RelationshipRecord> = self
            .store
            .relationships(resource_type)?
            .into_iter()
            .filter(|edge| !live.edge_is_live(resource_type, edge))
            .filter(|edge| self.eligible(&edge.agent, edge.last_updated, cutoff, report))
            .collect();

        if unknown.is_empty() {
            return Ok(());
        }
        self.log_deletions(
            resource_type,
            unknown.iter().map(|e| (e.id.as_str(), e.agent.as_str())),
        );

        if self.config.dry_run {
            report.relationships_deleted += unknown.len();
            return Ok(());
        }
        for chunk in unknown.chunks(self.config.delete_batch_size) {
            report.relationships_deleted += self.store.delete_relationships(resource_type, chunk)?;
        }
        Ok(())
    }

    fn log_deletions<'a>(
        &self,
        resource_type: &str,
        rows: impl Iterator<Item = (&'a str, &'a str)>,
    ) {
        if !self.config.log_deletions {
            return;
        }
        for (id, agent) in rows {
            if self.config.dry_run {
                tracing::warn!(
                    resource_type = %resource_type,
                    id = %id,
                    agent = %agent,
                    "Dry run: would delete row of unknown agent"
                );
            } else {
                tracing::info!(
                    resource_type = %resource_type,
                    id = %id,
                    agent = %agent,
                    "Deleting row of unknown agent"
                );
            }
        }
    }
}
