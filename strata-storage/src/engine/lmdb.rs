//! LMDB-backed table engine.
//!
//! Uses the heed crate (Rust bindings for LMDB). Every physical table is a
//! named LMDB database inside a single environment, so the environment must
//! be opened with enough `max_dbs` for every resource type and its
//! relationship table.
//!
//! # Thread Safety
//!
//! LMDB serializes writers and gives readers a consistent snapshot:
//! - Read transactions for `get` and `scan_prefix`
//! - One write transaction per `apply` batch, committed atomically
//! - Database handles are cached behind an `RwLock` after first open

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use serde::{Deserialize, Serialize};
use strata_core::{ConfigError, StorageError, StrataError, StrataResult};

use super::{TableEngine, TableOp};

type Table = Database<Str, Bytes>;

/// Error type for LMDB engine operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbEngineError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open or create a named database.
    #[error("Failed to open database '{table}': {reason}")]
    DbOpen { table: String, reason: String },

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbEngineError to StrataError.
impl From<LmdbEngineError> for StrataError {
    fn from(e: LmdbEngineError) -> Self {
        match e {
            LmdbEngineError::Io(io) => StrataError::Storage(StorageError::Io {
                reason: io.to_string(),
            }),
            other => StrataError::Storage(StorageError::TransactionFailed {
                reason: other.to_string(),
            }),
        }
    }
}

fn txn_error(e: heed::Error) -> LmdbEngineError {
    LmdbEngineError::Transaction(e.to_string())
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the LMDB environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmdbConfig {
    /// Directory holding the LMDB files. Created if missing.
    pub path: PathBuf,
    /// Maximum size of the memory map in megabytes.
    pub map_size_mb: usize,
    /// Maximum number of named databases (physical tables).
    pub max_tables: u32,
}

impl Default for LmdbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./strata-cache"),
            map_size_mb: 1024,
            max_tables: 4096,
        }
    }
}

impl LmdbConfig {
    /// Create LmdbConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `STRATA_LMDB_PATH`: data directory (default: ./strata-cache)
    /// - `STRATA_LMDB_MAP_SIZE_MB`: map size in megabytes (default: 1024)
    /// - `STRATA_LMDB_MAX_TABLES`: named database limit (default: 4096)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            path: std::env::var("STRATA_LMDB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            map_size_mb: std::env::var("STRATA_LMDB_MAP_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.map_size_mb),
            max_tables: std::env::var("STRATA_LMDB_MAX_TABLES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_tables),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> StrataResult<()> {
        if self.map_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "map_size_mb".to_string(),
                value: "0".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.max_tables < 2 {
            return Err(ConfigError::InvalidValue {
                field: "max_tables".to_string(),
                value: self.max_tables.to_string(),
                reason: "must allow at least one resource and one relationship table"
                    .to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// LMDB table engine.
///
/// # Example
///
/// ```ignore
/// use strata_storage::{LmdbConfig, LmdbEngine, Store};
///
/// let engine = LmdbEngine::open(&LmdbConfig::default().with_path("/tmp/strata"))?;
/// let store = Store::new(engine, StoreConfig::default())?;
/// ```
pub struct LmdbEngine {
    env: Env,
    tables: RwLock<HashMap<String, Table>>,
}

impl LmdbEngine {
    /// Open (or create) an environment at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    pub fn open(config: &LmdbConfig) -> Result<Self, LmdbEngineError> {
        Self::open_at(&config.path, config.map_size_mb, config.max_tables)
    }

    pub fn open_at<P: AsRef<Path>>(
        path: P,
        map_size_mb: usize,
        max_tables: u32,
    ) -> Result<Self, LmdbEngineError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per engine and the
        // directory is not shared with other processes using other flags.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size_mb * 1024 * 1024)
                .max_dbs(max_tables)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbEngineError::EnvOpen(e.to_string()))?;

        Ok(Self {
            env,
            tables: RwLock::new(HashMap::new()),
        })
    }

    fn cached(&self, table: &str) -> StrataResult<Option<Table>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables.get(table).copied())
    }

    fn remember(&self, table: &str, db: Table) -> StrataResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        tables.insert(table.to_string(), db);
        Ok(())
    }

    /// Look up a database handle using an open transaction.
    fn lookup(&self, txn: &RoTxn<'_>, table: &str) -> StrataResult<Option<Table>> {
        if let Some(db) = self.cached(table)? {
            return Ok(Some(db));
        }
        let opened: Option<Table> = self
            .env
            .open_database(txn, Some(table))
            .map_err(|e| LmdbEngineError::DbOpen {
                table: table.to_string(),
                reason: e.to_string(),
            })?;
        Ok(opened)
    }

    /// Resolve a handle outside of any caller transaction.
    fn resolve(&self, table: &str) -> StrataResult<Option<Table>> {
        if let Some(db) = self.cached(table)? {
            return Ok(Some(db));
        }

        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let opened = self.lookup(&rtxn, table)?;
        // Committing makes the handle usable by later transactions.
        rtxn.commit().map_err(txn_error)?;

        if let Some(db) = opened {
            self.remember(table, db)?;
        }
        Ok(opened)
    }

    fn require(&self, table: &str) -> StrataResult<Table> {
        self.resolve(table)?.ok_or_else(|| {
            StorageError::TableNotFound {
                table: table.to_string(),
            }
            .into()
        })
    }
}

impl TableEngine for LmdbEngine {
    fn has_table(&self, table: &str) -> StrataResult<bool> {
        Ok(self.resolve(table)?.is_some())
    }

    fn create_table(&self, table: &str) -> StrataResult<()> {
        if self.resolve(table)?.is_some() {
            return Ok(());
        }

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let db: Table = self
            .env
            .create_database(&mut wtxn, Some(table))
            .map_err(|e| LmdbEngineError::DbOpen {
                table: table.to_string(),
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(txn_error)?;

        self.remember(table, db)
    }

    fn get(&self, table: &str, key: &str) -> StrataResult<Option<Vec<u8>>> {
        let db = self.require(table)?;
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let value = db.get(&rtxn, key).map_err(txn_error)?;
        Ok(value.map(<[u8]>::to_vec))
    }

    fn get_many(&self, table: &str, keys: &[String]) -> StrataResult<Vec<Option<Vec<u8>>>> {
        let db = self.require(table)?;
        let rtxn = self.env.read_txn().map_err(txn_error)?;

        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let value = db.get(&rtxn, key.as_str()).map_err(txn_error)?;
            values.push(value.map(<[u8]>::to_vec));
        }
        Ok(values)
    }

    fn scan_prefix(&self, table: &str, prefix: &str) -> StrataResult<Vec<(String, Vec<u8>)>> {
        let db = self.require(table)?;
        let rtxn = self.env.read_txn().map_err(txn_error)?;

        let mut entries = Vec::new();
        let iter = db.prefix_iter(&rtxn, prefix).map_err(txn_error)?;
        for result in iter {
            let (key, value) = result.map_err(txn_error)?;
            entries.push((key.to_string(), value.to_vec()));
        }
        Ok(entries)
    }

    fn apply(&self, ops: Vec<TableOp>) -> StrataResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut opened = Vec::new();

        for op in &ops {
            let db = match self.lookup(&wtxn, op.table())? {
                Some(db) => db,
                None => match op {
                    TableOp::Put { table, .. } => {
                        // Dropping the transaction aborts the batch.
                        return Err(StorageError::TableNotFound {
                            table: table.clone(),
                        }
                        .into());
                    }
                    TableOp::Delete { .. } => continue,
                },
            };
            opened.push((op.table().to_string(), db));

            match op {
                TableOp::Put { key, value, .. } => {
                    db.put(&mut wtxn, key.as_str(), value.as_slice())
                        .map_err(txn_error)?;
                }
                TableOp::Delete { key, .. } => {
                    db.delete(&mut wtxn, key.as_str()).map_err(txn_error)?;
                }
            }
        }

        wtxn.commit().map_err(txn_error)?;

        for (table, db) in opened {
            self.remember(&table, db)?;
        }
        Ok(())
    }
}
