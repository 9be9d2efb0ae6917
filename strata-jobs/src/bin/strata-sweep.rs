//! Unknown-Agent Cleanup Binary
//!
//! Opens an LMDB-backed store, loads caching agent registrations from a
//! TOML file and runs the cleanup task until Ctrl-C.
//!
//! Usage:
//!   strata-sweep <agents.toml> [--once]
//!
//! The agents file holds one `[[agents]]` table per registration:
//!
//! ```toml
//! [[agents]]
//! agent = "prod/TestAgent"
//! provider = "aws"
//! scope = "prod"
//! types = ["instances", "serverGroups"]
//! authoritative = ["instances"]
//! ```
//!
//! Store, LMDB and cleanup settings come from `STRATA_*` environment
//! variables. `--once` runs a single sweep and on-demand expiry, then exits.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use strata_core::{ConfigError, StoreConfig, StrataResult};
use strata_jobs::{cleanup_task, run_sweep, CleanupConfig, CleanupMetrics, UnknownAgentCleanup};
use strata_provider::{AgentRegistration, Provider, ProviderRegistry};
use strata_storage::{BackingStore, LmdbConfig, LmdbEngine, Store};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Default, Deserialize)]
struct AgentsFile {
    #[serde(default)]
    agents: Vec<AgentRegistration>,
}

#[tokio::main]
async fn main() -> StrataResult<()> {
    init_tracing()?;

    let (agents_path, once) = parse_args()?;

    let store_config = StoreConfig::from_env();
    let lmdb_config = LmdbConfig::from_env();
    lmdb_config.validate()?;
    let engine = LmdbEngine::open(&lmdb_config)?;
    let store: Arc<dyn BackingStore> = Arc::new(Store::new(engine, store_config.clone())?);

    let registry = Arc::new(load_registry(&agents_path, store.clone())?);

    let config = CleanupConfig {
        max_agent_length: store_config.max_agent_length,
        ..CleanupConfig::from_env()
    };
    config.validate()?;

    if once {
        let sweep = UnknownAgentCleanup::new(store.clone(), registry, config.clone())?;
        let metrics = CleanupMetrics::new();
        if let Some(report) = run_sweep(&sweep, &config, &metrics).await {
            tracing::info!(
                resources = report.resources_deleted,
                relationships = report.relationships_deleted,
                preserved = report.preserved,
                skipped = report.skipped,
                dry_run = report.dry_run,
                "Single sweep finished"
            );
        }
        let expired = store.clean_on_demand(config.on_demand_max_age)?;
        tracing::info!(count = expired, "Expired on-demand rows");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(cleanup_task(store, registry, config, shutdown_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    if let Err(e) = handle.await {
        tracing::error!(error = %e, "Cleanup task ended abnormally");
    }
    Ok(())
}

fn init_tracing() -> StrataResult<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| {
            ConfigError::InvalidValue {
                field: "RUST_LOG".to_string(),
                value: std::env::var("RUST_LOG").unwrap_or_default(),
                reason: format!("failed to init subscriber: {e}"),
            }
            .into()
        })
}

fn parse_args() -> StrataResult<(PathBuf, bool)> {
    let mut path = None;
    let mut once = false;
    for arg in std::env::args().skip(1) {
        if arg == "--once" {
            once = true;
        } else {
            path = Some(PathBuf::from(arg));
        }
    }
    match path {
        Some(path) => Ok((path, once)),
        None => Err(ConfigError::MissingRequired {
            field: "agents file".to_string(),
        }
        .into()),
    }
}

/// Build a registry with one provider per distinct provider name in the file.
fn load_registry(path: &Path, store: Arc<dyn BackingStore>) -> StrataResult<ProviderRegistry> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        field: "agents file".to_string(),
        value: path.display().to_string(),
        reason,
    };
    let source = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let file: AgentsFile = toml::from_str(&source).map_err(|e| invalid(e.to_string()))?;

    let registry = ProviderRegistry::new();
    for registration in file.agents {
        let provider = match registry.provider(&registration.provider)? {
            Some(provider) => provider,
            None => {
                let provider =
                    Arc::new(Provider::new(registration.provider.clone(), store.clone()));
                registry.register(provider.clone())?;
                provider
            }
        };
        provider.register_agent(registration)?;
    }

    tracing::info!(
        path = %path.display(),
        providers = registry.providers()?.len(),
        "Loaded caching agent registrations"
    );
    Ok(registry)
}
