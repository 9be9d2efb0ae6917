//! Cleanup Background Task
//!
//! Runs the unknown-agent sweep and on-demand expiry on their own
//! intervals until a shutdown signal arrives. The store is synchronous, so
//! each pass runs on the blocking pool and is abandoned after
//! `CleanupConfig::timeout`. An abandoned pass is simply retried on the
//! next tick; the sweep is idempotent.
//!
//! ```ignore
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let config = CleanupConfig::from_env();
//! let handle = tokio::spawn(cleanup_task(store, registry, config, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let metrics = handle.await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use strata_provider::AgentRegistry;
use strata_storage::BackingStore;
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::config::CleanupConfig;
use crate::unknown_agent::{CleanupReport, UnknownAgentCleanup};

// ============================================================================
// METRICS
// ============================================================================

/// Counters for cleanup activity since the task started.
#[derive(Debug, Default)]
pub struct CleanupMetrics {
    pub sweeps: AtomicU64,
    pub sweeps_skipped: AtomicU64,
    pub resources_deleted: AtomicU64,
    pub relationships_deleted: AtomicU64,
    pub on_demand_expired: AtomicU64,
    pub timeouts: AtomicU64,
    pub errors: AtomicU64,
}

impl CleanupMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> CleanupSnapshot {
        CleanupSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            sweeps_skipped: self.sweeps_skipped.load(Ordering::Relaxed),
            resources_deleted: self.resources_deleted.load(Ordering::Relaxed),
            relationships_deleted: self.relationships_deleted.load(Ordering::Relaxed),
            on_demand_expired: self.on_demand_expired.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn record(&self, report: &CleanupReport) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        if report.skipped {
            self.sweeps_skipped.fetch_add(1, Ordering::Relaxed);
        }
        // Dry runs delete nothing.
        if !report.dry_run {
            self.resources_deleted
                .fetch_add(report.resources_deleted as u64, Ordering::Relaxed);
            self.relationships_deleted
                .fetch_add(report.relationships_deleted as u64, Ordering::Relaxed);
        }
    }
}

/// Snapshot of cleanup metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSnapshot {
    pub sweeps: u64,
    pub sweeps_skipped: u64,
    pub resources_deleted: u64,
    pub relationships_deleted: u64,
    pub on_demand_expired: u64,
    pub timeouts: u64,
    pub errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that periodically sweeps unknown-agent data and expires
/// on-demand rows.
///
/// Returns the metrics collected during the task's lifetime. An invalid
/// configuration is logged and the task returns immediately.
pub async fn cleanup_task(
    store: Arc<dyn BackingStore>,
    registry: Arc<dyn AgentRegistry>,
    config: CleanupConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<CleanupMetrics> {
    let metrics = Arc::new(CleanupMetrics::new());

    let sweep = match UnknownAgentCleanup::new(store.clone(), registry, config.clone()) {
        Ok(sweep) => sweep,
        Err(e) => {
            tracing::error!(error = %e, "Invalid cleanup configuration, cleanup task not started");
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return metrics;
        }
    };

    let mut sweep_interval = interval(config.check_interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut on_demand_interval = interval(config.on_demand_interval);
    on_demand_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        check_interval_secs = config.check_interval.as_secs(),
        on_demand_interval_secs = config.on_demand_interval.as_secs(),
        dry_run = config.dry_run,
        "Cleanup task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    tracing::info!("Shutdown sender dropped, cleanup task shutting down");
                    break;
                }
                if *shutdown_rx.borrow() {
                    tracing::info!("Cleanup task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                run_sweep(&sweep, &config, &metrics).await;
            }

            _ = on_demand_interval.tick() => {
                expire_on_demand(&store, &config, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps = snapshot.sweeps,
        resources_deleted = snapshot.resources_deleted,
        relationships_deleted = snapshot.relationships_deleted,
        on_demand_expired = snapshot.on_demand_expired,
        timeouts = snapshot.timeouts,
        errors = snapshot.errors,
        "Cleanup task completed"
    );

    metrics
}

/// Perform one sweep on the blocking pool, bounded by the configured timeout.
pub async fn run_sweep(
    sweep: &UnknownAgentCleanup,
    config: &CleanupConfig,
    metrics: &CleanupMetrics,
) -> Option<CleanupReport> {
    let job = sweep.clone();
    let handle = tokio::task::spawn_blocking(move || job.run());

    match timeout(config.timeout, handle).await {
        Ok(Ok(Ok(report))) => {
            metrics.record(&report);
            Some(report)
        }
        Ok(Ok(Err(e))) => {
            tracing::error!(error = %e, "Unknown-agent cleanup failed");
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            None
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Unknown-agent cleanup panicked");
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            None
        }
        Err(_) => {
            tracing::error!(
                timeout_secs = config.timeout.as_secs(),
                "Unknown-agent cleanup timed out"
            );
            metrics.timeouts.fetch_add(1, Ordering::Relaxed);
            None
        }
    }
}

async fn expire_on_demand(
    store: &Arc<dyn BackingStore>,
    config: &CleanupConfig,
    metrics: &CleanupMetrics,
) {
    let store = store.clone();
    let max_age = config.on_demand_max_age;
    let handle = tokio::task::spawn_blocking(move || store.clean_on_demand(max_age));

    match timeout(config.timeout, handle).await {
        Ok(Ok(Ok(count))) => {
            if count > 0 {
                tracing::info!(count, "Expired on-demand rows");
            }
            metrics
                .on_demand_expired
                .fetch_add(count as u64, Ordering::Relaxed);
        }
        Ok(Ok(Err(e))) => {
            tracing::error!(error = %e, "On-demand expiry failed");
            metrics.errors.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "On-demand expiry panicked");
            metrics.errors.fetch_add(1, Ordering::Relaxed);
        }
        Err(_) => {
            tracing::error!("On-demand expiry timed out");
            metrics.timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }
}
