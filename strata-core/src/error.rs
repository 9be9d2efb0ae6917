//! Error types for STRATA operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The physical table has never been created.
    ///
    /// Engines report this; the store recovers from it and treats the
    /// resource type as empty.
    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("I/O error: {reason}")]
    Io { reason: String },
}

/// Validation errors. Raised before any I/O is attempted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Resource type '{resource_type}' contains the reserved delimiter ':'")]
    ReservedDelimiter { resource_type: String },

    #[error("Resource type must not be empty")]
    EmptyResourceType,

    #[error("Invalid identifier pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all STRATA errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrataError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl StrataError {
    /// True when this error only says a physical table does not exist yet.
    pub fn is_missing_table(&self) -> bool {
        matches!(self, StrataError::Storage(StorageError::TableNotFound { .. }))
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(e: serde_json::Error) -> Self {
        StrataError::Storage(StorageError::Serialization {
            reason: e.to_string(),
        })
    }
}

/// Result type alias for STRATA operations.
pub type StrataResult<T> = Result<T, StrataError>;

// =============================================================================
// TESTS
// =============================================================================
