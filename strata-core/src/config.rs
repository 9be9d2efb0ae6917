//! Store configuration

use serde::{Deserialize, Serialize};

use crate::{ConfigError, StrataResult};

/// Default prefix of every physical table name.
pub const DEFAULT_TABLE_PREFIX: &str = "cats_v1_";

/// Longest physical table name any engine will be asked to create.
pub const DEFAULT_MAX_TABLE_NAME_LENGTH: usize = 64;

/// Longest item id that is stored. Longer ids are dropped.
pub const DEFAULT_MAX_ID_LENGTH: usize = 352;

/// Longest agent identity stored verbatim. Longer ones are hashed.
pub const DEFAULT_MAX_AGENT_LENGTH: usize = 127;

pub const DEFAULT_READ_BATCH_SIZE: usize = 500;
pub const DEFAULT_WRITE_BATCH_SIZE: usize = 100;

/// Hex characters of digest appended to over-length table names.
pub const HASH_LENGTH: usize = 16;

/// Suffix marking relationship tables.
pub const RELATIONSHIP_SUFFIX: &str = "_rel";

/// Shortest table-name limit that still leaves room for a hash.
const MIN_TABLE_NAME_LENGTH: usize = 32;

/// Configuration for the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Optional namespace inserted after the table prefix, e.g. `cats_v1_{ns}_`.
    pub table_namespace: Option<String>,
    pub max_table_name_length: usize,
    pub max_id_length: usize,
    pub max_agent_length: usize,
    pub read_batch_size: usize,
    pub write_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_namespace: None,
            max_table_name_length: DEFAULT_MAX_TABLE_NAME_LENGTH,
            max_id_length: DEFAULT_MAX_ID_LENGTH,
            max_agent_length: DEFAULT_MAX_AGENT_LENGTH,
            read_batch_size: DEFAULT_READ_BATCH_SIZE,
            write_batch_size: DEFAULT_WRITE_BATCH_SIZE,
        }
    }
}

impl StoreConfig {
    /// Create StoreConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `STRATA_TABLE_NAMESPACE`: namespace inserted into table names (default: none)
    /// - `STRATA_MAX_TABLE_NAME_LENGTH`: physical name limit (default: 64)
    /// - `STRATA_MAX_ID_LENGTH`: longest stored id (default: 352)
    /// - `STRATA_MAX_AGENT_LENGTH`: longest verbatim agent identity (default: 127)
    /// - `STRATA_READ_BATCH_SIZE`: ids per read batch (default: 500)
    /// - `STRATA_WRITE_BATCH_SIZE`: rows per write batch (default: 100)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            table_namespace: std::env::var("STRATA_TABLE_NAMESPACE")
                .ok()
                .filter(|s| !s.is_empty()),
            max_table_name_length: env_usize(
                "STRATA_MAX_TABLE_NAME_LENGTH",
                defaults.max_table_name_length,
            ),
            max_id_length: env_usize("STRATA_MAX_ID_LENGTH", defaults.max_id_length),
            max_agent_length: env_usize("STRATA_MAX_AGENT_LENGTH", defaults.max_agent_length),
            read_batch_size: env_usize("STRATA_READ_BATCH_SIZE", defaults.read_batch_size),
            write_batch_size: env_usize("STRATA_WRITE_BATCH_SIZE", defaults.write_batch_size),
        }
    }

    /// Table prefix including the namespace, e.g. `cats_v1_` or `cats_v1_aws_`.
    pub fn table_prefix(&self) -> String {
        match &self.table_namespace {
            Some(ns) => format!("{DEFAULT_TABLE_PREFIX}{ns}_"),
            None => DEFAULT_TABLE_PREFIX.to_string(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> StrataResult<()> {
        if self.max_table_name_length < MIN_TABLE_NAME_LENGTH {
            return Err(ConfigError::InvalidValue {
                field: "max_table_name_length".to_string(),
                value: self.max_table_name_length.to_string(),
                reason: format!("must be at least {MIN_TABLE_NAME_LENGTH}"),
            }
            .into());
        }

        // A hashed relationship table name is prefix + hash + suffix at minimum.
        let prefix = self.table_prefix();
        let hashed_minimum = prefix.len() + HASH_LENGTH + RELATIONSHIP_SUFFIX.len();
        if hashed_minimum > self.max_table_name_length {
            return Err(ConfigError::InvalidValue {
                field: "table_namespace".to_string(),
                value: prefix,
                reason: format!(
                    "hashed table names need {hashed_minimum} characters, limit is {}",
                    self.max_table_name_length
                ),
            }
            .into());
        }

        if let Some(ns) = &self.table_namespace {
            if !ns.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(ConfigError::InvalidValue {
                    field: "table_namespace".to_string(),
                    value: ns.clone(),
                    reason: "only ASCII letters, digits and '_' are allowed".to_string(),
                }
                .into());
            }
        }

        for (field, value) in [
            ("max_id_length", self.max_id_length),
            ("max_agent_length", self.max_agent_length),
            ("read_batch_size", self.read_batch_size),
            ("write_batch_size", self.write_batch_size),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    reason: "must be greater than 0".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.table_prefix(), "cats_v1_");
    }

    #[test]
    fn test_namespace_in_prefix() {
        let config = StoreConfig {
            table_namespace: Some("aws".to_string()),
            ..Default::default()
        };
        assert_eq!(config.table_prefix(), "cats_v1_aws_");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_short_table_names() {
        let config = StoreConfig {
            max_table_name_length: 8,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_namespace_must_leave_room_for_hashed_names() {
        // cats_v1_ + 35 + _ = 44 characters, plus 16 hash and "_rel" = 64.
        let at_limit = StoreConfig {
            table_namespace: Some("n".repeat(35)),
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());

        let over_limit = StoreConfig {
            table_namespace: Some("n".repeat(36)),
            ..Default::default()
        };
        assert!(over_limit.validate().is_err());

        let far_over = StoreConfig {
            table_namespace: Some("n".repeat(39)),
            ..Default::default()
        };
        assert!(matches!(
            far_over.validate(),
            Err(crate::StrataError::Config(ConfigError::InvalidValue { ref field, .. }))
                if field == "table_namespace"
        ));
    }

    #[test]
    fn test_rejects_bad_namespace() {
        let config = StoreConfig {
            table_namespace: Some("bad-ns".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_batch() {
        let config = StoreConfig {
            write_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
