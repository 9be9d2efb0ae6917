//! STRATA Jobs - Background Housekeeping
//!
//! - `unknown_agent`: deletes rows and edges of agents that are no longer
//!   registered
//! - `task`: runs that sweep and on-demand expiry periodically
//!
//! # Usage
//!
//! ```ignore
//! use strata_jobs::{cleanup_task, CleanupConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(cleanup_task(store, registry, CleanupConfig::from_env(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod config;
pub mod task;
pub mod unknown_agent;

pub use config::CleanupConfig;
pub use task::{cleanup_task, run_sweep, CleanupMetrics, CleanupSnapshot};
pub use unknown_agent::{AllowAll, CleanupReport, ShardingFilter, UnknownAgentCleanup};
