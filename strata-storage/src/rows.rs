//! Row layouts stored in resource and relationship tables.
//!
//! Resource rows are keyed `{id}␟{agent}` so several agents may hold a row
//! for the same id without overwriting each other. Relationship rows are
//! keyed `{id}␟{rel_type}␟{agent}␟{rel_id}␟{f|r}`; the trailing marker keeps a
//! forward edge and the mirror of an opposite edge apart.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strata_core::{relationship_key, Attributes, StrataResult};

/// Separator between key components. Ids containing it are rejected.
pub const KEY_SEPARATOR: char = '\u{1f}';

/// Key prefix matching every row of `id`.
pub fn id_prefix(id: &str) -> String {
    format!("{id}{KEY_SEPARATOR}")
}

pub fn resource_key(id: &str, agent: &str) -> String {
    format!("{id}{KEY_SEPARATOR}{agent}")
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// RESOURCE ROWS
// ============================================================================

/// One agent's stored copy of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRow {
    pub id: String,
    pub agent: String,
    /// Hex SHA-256 over attributes and ttl.
    pub body_hash: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
    /// Milliseconds since the Unix epoch.
    pub last_updated: i64,
}

impl ResourceRow {
    pub fn key(&self) -> String {
        resource_key(&self.id, &self.agent)
    }

    pub fn encode(&self) -> StrataResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> StrataResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Body hash of an item's attributes and ttl.
pub fn body_hash(attributes: &Attributes, ttl_seconds: Option<u64>) -> StrataResult<String> {
    #[derive(Serialize)]
    struct Body<'a> {
        attributes: &'a Attributes,
        ttl_seconds: Option<u64>,
    }

    let body = serde_json::to_vec(&Body {
        attributes,
        ttl_seconds,
    })?;
    Ok(hex::encode(Sha256::digest(&body)))
}

/// Which agent owns a stored row and when it was last written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceOwner {
    pub id: String,
    pub agent: String,
    pub last_updated: i64,
}

impl From<&ResourceRow> for ResourceOwner {
    fn from(row: &ResourceRow) -> Self {
        Self {
            id: row.id.clone(),
            agent: row.agent.clone(),
            last_updated: row.last_updated,
        }
    }
}

// ============================================================================
// RELATIONSHIP ROWS
// ============================================================================

/// Whether an edge was asserted from this table's item or mirrors one that was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    fn marker(self) -> char {
        match self {
            Direction::Forward => 'f',
            Direction::Reverse => 'r',
        }
    }

    pub fn flip(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// One stored relationship edge.
///
/// Lives in the relationship table of the type that `id` belongs to.
/// `rel_type` is the type of `rel_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: String,
    pub rel_id: String,
    pub rel_type: String,
    pub agent: String,
    pub direction: Direction,
    pub last_updated: i64,
}

impl RelationshipRecord {
    pub fn forward(id: &str, rel_type: &str, rel_id: &str, agent: &str, now: i64) -> Self {
        Self {
            id: id.to_string(),
            rel_id: rel_id.to_string(),
            rel_type: rel_type.to_string(),
            agent: agent.to_string(),
            direction: Direction::Forward,
            last_updated: now,
        }
    }

    /// Stored relationship key, `relType:agent`.
    pub fn rel_agent(&self) -> String {
        relationship_key(&self.rel_type, &self.agent)
    }

    pub fn key(&self) -> String {
        let sep = KEY_SEPARATOR;
        format!(
            "{}{sep}{}{sep}{}{sep}{}{sep}{}",
            self.id,
            self.rel_type,
            self.agent,
            self.rel_id,
            self.direction.marker()
        )
    }

    /// The matching row in `rel_type`'s table, given this row's own type.
    pub fn counterpart(&self, own_type: &str) -> Self {
        Self {
            id: self.rel_id.clone(),
            rel_id: self.id.clone(),
            rel_type: own_type.to_string(),
            agent: self.agent.clone(),
            direction: self.direction.flip(),
            last_updated: self.last_updated,
        }
    }

    pub fn encode(&self) -> StrataResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> StrataResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
