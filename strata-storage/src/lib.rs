//! STRATA Storage - Naming Scheme, Table Engines and Backing Store
//!
//! The [`Store`] owns every persisted row. It sits on a [`TableEngine`]
//! (in memory or LMDB) and names physical tables through the
//! [`NamingScheme`]. Callers normally hold it as `Arc<dyn BackingStore>`.

pub mod engine;
pub mod glob;
pub mod naming;
pub mod rows;
pub mod store;
pub mod traits;

pub use engine::{LmdbConfig, LmdbEngine, LmdbEngineError, MemoryEngine, TableEngine, TableOp};
pub use naming::{bounded_agent_name, physical_name, NamingScheme, HASH_LENGTH, RELATIONSHIP_SUFFIX};
pub use rows::{Direction, RelationshipRecord, ResourceOwner, ResourceRow};
pub use store::Store;
pub use traits::{BackingStore, MergeStats};

/// In-memory store, used by tests and short-lived tools.
pub type MemoryStore = Store<MemoryEngine>;

/// LMDB-backed store.
pub type LmdbStore = Store<LmdbEngine>;
