//! Cleanup job configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use strata_core::config::DEFAULT_MAX_AGENT_LENGTH;
use strata_core::{validate_resource_type, ConfigError, StrataResult};

pub const DEFAULT_CLEANUP_CHECK_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_CLEANUP_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_CLEANUP_MIN_RECORD_AGE_SECS: u64 = 600;
pub const DEFAULT_CLEANUP_DELETE_BATCH_SIZE: usize = 100;
pub const DEFAULT_ON_DEMAND_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_ON_DEMAND_MAX_AGE_SECS: u64 = 600;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the unknown-agent cleanup sweep and its background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupConfig {
    /// How often the sweep runs (default: 1 hour)
    pub check_interval: Duration,

    /// Upper bound on one sweep before it is abandoned (default: 10 minutes)
    pub timeout: Duration,

    /// Report what would be deleted without deleting it (default: false)
    pub dry_run: bool,

    /// Resource types never swept
    pub excluded_types: BTreeSet<String>,

    /// Rows and edges written more recently than this are kept even when
    /// their agent is unknown (default: 10 minutes)
    pub min_record_age: Duration,

    /// Rows per delete call (default: 100)
    pub delete_batch_size: usize,

    /// How often expired on-demand rows are removed (default: 5 minutes)
    pub on_demand_interval: Duration,

    /// Age after which on-demand rows expire (default: 10 minutes)
    pub on_demand_max_age: Duration,

    /// Longest agent identity the store keeps verbatim. Must match the
    /// store's `max_agent_length` so live identities compare equal to
    /// stored ones.
    pub max_agent_length: usize,

    /// Whether to log each deleted row (default: true)
    pub log_deletions: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_CLEANUP_CHECK_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_CLEANUP_TIMEOUT_SECS),
            dry_run: false,
            excluded_types: BTreeSet::new(),
            min_record_age: Duration::from_secs(DEFAULT_CLEANUP_MIN_RECORD_AGE_SECS),
            delete_batch_size: DEFAULT_CLEANUP_DELETE_BATCH_SIZE,
            on_demand_interval: Duration::from_secs(DEFAULT_ON_DEMAND_INTERVAL_SECS),
            on_demand_max_age: Duration::from_secs(DEFAULT_ON_DEMAND_MAX_AGE_SECS),
            max_agent_length: DEFAULT_MAX_AGENT_LENGTH,
            log_deletions: true,
        }
    }
}

impl CleanupConfig {
    /// Create CleanupConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `STRATA_CLEANUP_CHECK_INTERVAL_SECS`: sweep interval (default: 3600)
    /// - `STRATA_CLEANUP_TIMEOUT_SECS`: sweep timeout (default: 600)
    /// - `STRATA_CLEANUP_DRY_RUN`: report only (default: false)
    /// - `STRATA_CLEANUP_EXCLUDED_TYPES`: comma-separated types never swept
    /// - `STRATA_CLEANUP_MIN_RECORD_AGE_SECS`: protection window (default: 600)
    /// - `STRATA_CLEANUP_DELETE_BATCH_SIZE`: rows per delete (default: 100)
    /// - `STRATA_CLEANUP_ON_DEMAND_INTERVAL_SECS`: on-demand expiry interval (default: 300)
    /// - `STRATA_CLEANUP_ON_DEMAND_MAX_AGE_SECS`: on-demand row lifetime (default: 600)
    /// - `STRATA_MAX_AGENT_LENGTH`: shared with the store (default: 127)
    /// - `STRATA_CLEANUP_LOG_DELETIONS`: log each deletion (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let excluded_types = std::env::var("STRATA_CLEANUP_EXCLUDED_TYPES")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            check_interval: env_secs(
                "STRATA_CLEANUP_CHECK_INTERVAL_SECS",
                DEFAULT_CLEANUP_CHECK_INTERVAL_SECS,
            ),
            timeout: env_secs("STRATA_CLEANUP_TIMEOUT_SECS", DEFAULT_CLEANUP_TIMEOUT_SECS),
            dry_run: std::env::var("STRATA_CLEANUP_DRY_RUN")
                .ok()
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(false),
            excluded_types,
            min_record_age: env_secs(
                "STRATA_CLEANUP_MIN_RECORD_AGE_SECS",
                DEFAULT_CLEANUP_MIN_RECORD_AGE_SECS,
            ),
            delete_batch_size: std::env::var("STRATA_CLEANUP_DELETE_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.delete_batch_size),
            on_demand_interval: env_secs(
                "STRATA_CLEANUP_ON_DEMAND_INTERVAL_SECS",
                DEFAULT_ON_DEMAND_INTERVAL_SECS,
            ),
            on_demand_max_age: env_secs(
                "STRATA_CLEANUP_ON_DEMAND_MAX_AGE_SECS",
                DEFAULT_ON_DEMAND_MAX_AGE_SECS,
            ),
            max_agent_length: std::env::var("STRATA_MAX_AGENT_LENGTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_agent_length),
            log_deletions: std::env::var("STRATA_CLEANUP_LOG_DELETIONS")
                .ok()
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(true),
        }
    }

    /// Create a configuration for development/testing: short intervals and
    /// no protection window.
    pub fn development() -> Self {
        Self {
            check_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            min_record_age: Duration::ZERO,
            delete_batch_size: 10,
            on_demand_interval: Duration::from_secs(10),
            on_demand_max_age: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Create a configuration for production with a wider protection window.
    pub fn production() -> Self {
        Self {
            min_record_age: Duration::from_secs(3600),
            ..Self::default()
        }
    }

    pub fn with_excluded_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_min_record_age(mut self, min_record_age: Duration) -> Self {
        self.min_record_age = min_record_age;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> StrataResult<()> {
        for (field, value) in [
            ("check_interval", self.check_interval),
            ("timeout", self.timeout),
            ("on_demand_interval", self.on_demand_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{value:?}"),
                    reason: "must be greater than 0".to_string(),
                }
                .into());
            }
        }

        if self.delete_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "delete_batch_size".to_string(),
                value: "0".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.max_agent_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_agent_length".to_string(),
                value: "0".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        for resource_type in &self.excluded_types {
            validate_resource_type(resource_type)?;
        }

        Ok(())
    }
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}
