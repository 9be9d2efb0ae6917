//! Physical table engines.
//!
//! An engine stores opaque byte values under string keys in named tables.
//! It knows nothing about items, agents or relationships; the [`Store`]
//! builds those semantics on top of it.
//!
//! Engines report reads against a table that was never created as
//! [`StorageError::TableNotFound`]. Deletes against such a table are no-ops.
//!
//! [`Store`]: crate::Store
//! [`StorageError::TableNotFound`]: strata_core::StorageError::TableNotFound

pub mod lmdb;
pub mod memory;

pub use lmdb::{LmdbConfig, LmdbEngine, LmdbEngineError};
pub use memory::MemoryEngine;

use strata_core::StrataResult;

/// A single mutation applied by [`TableEngine::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOp {
    Put {
        table: String,
        key: String,
        value: Vec<u8>,
    },
    Delete {
        table: String,
        key: String,
    },
}

impl TableOp {
    pub fn put(table: impl Into<String>, key: impl Into<String>, value: Vec<u8>) -> Self {
        TableOp::Put {
            table: table.into(),
            key: key.into(),
            value,
        }
    }

    pub fn delete(table: impl Into<String>, key: impl Into<String>) -> Self {
        TableOp::Delete {
            table: table.into(),
            key: key.into(),
        }
    }

    pub fn table(&self) -> &str {
        match self {
            TableOp::Put { table, .. } | TableOp::Delete { table, .. } => table,
        }
    }
}

/// Key/value storage addressed by physical table name.
///
/// Implementations must be safe to share between threads. Each call is
/// independent; [`apply`](TableEngine::apply) is atomic for its batch.
pub trait TableEngine: Send + Sync {
    /// Whether `table` has been created.
    fn has_table(&self, table: &str) -> StrataResult<bool>;

    /// Create `table` if it does not exist yet.
    fn create_table(&self, table: &str) -> StrataResult<()>;

    /// Read one value.
    fn get(&self, table: &str, key: &str) -> StrataResult<Option<Vec<u8>>>;

    /// Read several values in one pass, in the order of `keys`.
    fn get_many(&self, table: &str, keys: &[String]) -> StrataResult<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|key| self.get(table, key)).collect()
    }

    /// All entries whose key starts with `prefix`, in key order.
    /// An empty prefix returns the whole table.
    fn scan_prefix(&self, table: &str, prefix: &str) -> StrataResult<Vec<(String, Vec<u8>)>>;

    /// Apply a batch of mutations atomically.
    ///
    /// A `Put` into a missing table fails the batch with `TableNotFound`;
    /// a `Delete` from a missing table is skipped.
    fn apply(&self, ops: Vec<TableOp>) -> StrataResult<()>;
}
