//! In-memory table engine.
//!
//! Used by tests and by deployments that do not need the cache to survive
//! restarts. Tables are ordered maps so prefix scans return keys in order.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::RwLock;

use strata_core::{StorageError, StrataResult};

use super::{TableEngine, TableOp};

type Table = BTreeMap<String, Vec<u8>>;

/// In-memory engine backed by one lock over all tables.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all created tables, sorted.
    pub fn table_names(&self) -> StrataResult<Vec<String>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Number of entries in `table`, or `None` if it does not exist.
    pub fn row_count(&self, table: &str) -> StrataResult<Option<usize>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables.get(table).map(BTreeMap::len))
    }
}

fn missing(table: &str) -> StorageError {
    StorageError::TableNotFound {
        table: table.to_string(),
    }
}

impl TableEngine for MemoryEngine {
    fn has_table(&self, table: &str) -> StrataResult<bool> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables.contains_key(table))
    }

    fn create_table(&self, table: &str) -> StrataResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        tables.entry(table.to_string()).or_default();
        Ok(())
    }

    fn get(&self, table: &str, key: &str) -> StrataResult<Option<Vec<u8>>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let rows = tables.get(table).ok_or_else(|| missing(table))?;
        Ok(rows.get(key).cloned())
    }

    fn get_many(&self, table: &str, keys: &[String]) -> StrataResult<Vec<Option<Vec<u8>>>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let rows = tables.get(table).ok_or_else(|| missing(table))?;
        Ok(keys.iter().map(|key| rows.get(key).cloned()).collect())
    }

    fn scan_prefix(&self, table: &str, prefix: &str) -> StrataResult<Vec<(String, Vec<u8>)>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let rows = tables.get(table).ok_or_else(|| missing(table))?;

        Ok(rows
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn apply(&self, ops: Vec<TableOp>) -> StrataResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;

        // Check first so a failing batch leaves nothing half-written.
        for op in &ops {
            if let TableOp::Put { table, .. } = op {
                if !tables.contains_key(table) {
                    return Err(missing(table).into());
                }
            }
        }

        for op in ops {
            match op {
                TableOp::Put { table, key, value } => {
                    if let Some(rows) = tables.get_mut(&table) {
                        rows.insert(key, value);
                    }
                }
                TableOp::Delete { table, key } => {
                    if let Some(rows) = tables.get_mut(&table) {
                        rows.remove(&key);
                    }
                }
            }
        }

        Ok(())
    }
}
