//! STRATA Core - Cache Data Types
//!
//! Pure data structures shared by the store, the provider cache and the
//! cleanup jobs. This crate performs no I/O.

pub mod config;
pub mod error;
pub mod filter;
pub mod item;
pub mod namespace;

pub use config::StoreConfig;
pub use error::{ConfigError, StorageError, StrataError, StrataResult, ValidationError};
pub use filter::CacheFilter;
pub use item::{Attributes, CacheItem, CacheResult, Relationships};
pub use namespace::{
    is_on_demand, relationship_key, split_relationship_key, types, validate_resource_type,
    validate_resource_types, AgentIdentity, ON_DEMAND_NAMESPACE, RELATIONSHIP_DELIMITER,
};
