//! The backing store: merge, evict and read primitives over a table engine.
//!
//! # Layout
//!
//! Every resource type owns two physical tables named by the
//! [`NamingScheme`]: a resource table of [`ResourceRow`]s keyed by
//! `(id, agent)` and a relationship table of [`RelationshipRecord`]s.
//! A forward edge `A (type T) -> B (type R)` asserted by agent `g` is stored
//! in `T`'s relationship table and mirrored as a reverse edge `B -> A` in
//! `R`'s, so reads of either side see the link.
//!
//! # Concurrency
//!
//! Rows and edges carry the agent that wrote them in their keys. Two agents
//! merging into the same type therefore never overwrite each other's data
//! and the store takes no lock of its own beyond the created-table cache.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use strata_core::{
    is_on_demand, split_relationship_key, validate_resource_type, CacheFilter, CacheItem,
    StorageError, StoreConfig, StrataResult, ON_DEMAND_NAMESPACE,
};

use crate::engine::{TableEngine, TableOp};
use crate::glob;
use crate::naming::NamingScheme;
use crate::rows::{
    body_hash, id_prefix, now_millis, resource_key, Direction, RelationshipRecord, ResourceOwner,
    ResourceRow, KEY_SEPARATOR,
};
use crate::traits::{BackingStore, MergeStats};

/// An item that passed validation, ready to be written.
struct PreparedItem {
    item: CacheItem,
    /// `(rel_type, rel_id)` pairs asserted by the item.
    edges: BTreeSet<(String, String)>,
}

/// Backing store over any [`TableEngine`].
pub struct Store<E: TableEngine> {
    engine: E,
    naming: NamingScheme,
    config: StoreConfig,
    created: RwLock<HashSet<String>>,
}

impl<E: TableEngine> Store<E> {
    pub fn new(engine: E, config: StoreConfig) -> StrataResult<Self> {
        config.validate()?;
        let naming = NamingScheme::new(&config);

        tracing::info!(
            prefix = naming.prefix(),
            max_table_name_length = config.max_table_name_length,
            "Backing store ready"
        );

        Ok(Self {
            engine,
            naming,
            config,
            created: RwLock::new(HashSet::new()),
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn naming(&self) -> &NamingScheme {
        &self.naming
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------------

    fn ensure_table(&self, table: &str) -> StrataResult<()> {
        {
            let created = self.created.read().map_err(|_| StorageError::LockPoisoned)?;
            if created.contains(table) {
                return Ok(());
            }
        }

        self.engine.create_table(table)?;
        let mut created = self.created.write().map_err(|_| StorageError::LockPoisoned)?;
        created.insert(table.to_string());
        Ok(())
    }

    fn is_created(&self, table: &str) -> StrataResult<bool> {
        let created = self.created.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(created.contains(table))
    }

    fn ensure_type(&self, resource_type: &str) -> StrataResult<()> {
        let table = self.naming.resource_table(resource_type);
        let first_use = !self.is_created(&table)?;

        self.ensure_table(&table)?;
        self.ensure_table(&self.naming.relationship_table(resource_type))?;

        if first_use {
            if table != format!("{}{resource_type}", self.naming.prefix()) {
                tracing::debug!(
                    resource_type,
                    table = %table,
                    "Resource type stored under a normalized table name"
                );
            }
            if is_on_demand(resource_type) {
                self.register_on_demand(resource_type)?;
            }
        }
        Ok(())
    }

    /// Record an on-demand type so expiry can find it later.
    fn register_on_demand(&self, resource_type: &str) -> StrataResult<()> {
        let catalog = self.naming.on_demand_catalog();
        self.ensure_table(&catalog)?;
        self.write(vec![TableOp::put(catalog, resource_type, Vec::new())])
    }

    /// Every on-demand type ever written to this store.
    fn on_demand_types(&self) -> StrataResult<BTreeSet<String>> {
        let mut types: BTreeSet<String> = self
            .scan(&self.naming.on_demand_catalog(), "")?
            .into_iter()
            .map(|(resource_type, _)| resource_type)
            .collect();
        types.insert(ON_DEMAND_NAMESPACE.to_string());
        Ok(types)
    }

    /// Prefix scan that treats a missing table as empty.
    fn scan(&self, table: &str, prefix: &str) -> StrataResult<Vec<(String, Vec<u8>)>> {
        match self.engine.scan_prefix(table, prefix) {
            Ok(entries) => Ok(entries),
            Err(e) if e.is_missing_table() => {
                tracing::trace!(table, "Table does not exist, treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn resource_rows(&self, resource_type: &str, prefix: &str) -> StrataResult<Vec<ResourceRow>> {
        self.scan(&self.naming.resource_table(resource_type), prefix)?
            .iter()
            .map(|(_, value)| ResourceRow::decode(value))
            .collect()
    }

    fn relationship_rows(
        &self,
        resource_type: &str,
        prefix: &str,
    ) -> StrataResult<Vec<RelationshipRecord>> {
        self.scan(&self.naming.relationship_table(resource_type), prefix)?
            .iter()
            .map(|(_, value)| RelationshipRecord::decode(value))
            .collect()
    }

    /// Rows for a set of ids. Large requests use one full scan.
    fn resource_rows_for(
        &self,
        resource_type: &str,
        ids: &[String],
    ) -> StrataResult<Vec<ResourceRow>> {
        if ids.len() > self.config.read_batch_size {
            let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
            let mut rows = self.resource_rows(resource_type, "")?;
            rows.retain(|row| wanted.contains(row.id.as_str()));
            return Ok(rows);
        }

        let mut rows = Vec::new();
        for id in unique(ids) {
            rows.extend(self.resource_rows(resource_type, &id_prefix(id))?);
        }
        Ok(rows)
    }

    fn relationship_rows_for(
        &self,
        resource_type: &str,
        ids: &[String],
    ) -> StrataResult<Vec<RelationshipRecord>> {
        if ids.len() > self.config.read_batch_size {
            let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
            let mut edges = self.relationship_rows(resource_type, "")?;
            edges.retain(|edge| wanted.contains(edge.id.as_str()));
            return Ok(edges);
        }

        let mut edges = Vec::new();
        for id in unique(ids) {
            edges.extend(self.relationship_rows(resource_type, &id_prefix(id))?);
        }
        Ok(edges)
    }

    /// Apply `ops` in write batches. Each batch is atomic; the whole call is not.
    fn write(&self, ops: Vec<TableOp>) -> StrataResult<()> {
        let mut ops = ops.into_iter().peekable();
        while ops.peek().is_some() {
            let batch: Vec<TableOp> = ops.by_ref().take(self.config.write_batch_size).collect();
            self.engine.apply(batch)?;
        }
        Ok(())
    }

    /// Delete ops for an edge and the row mirroring it in the related type.
    fn edge_deletes(&self, resource_type: &str, edge: &RelationshipRecord) -> [TableOp; 2] {
        let counterpart = edge.counterpart(resource_type);
        [
            TableOp::delete(self.naming.relationship_table(resource_type), edge.key()),
            TableOp::delete(
                self.naming.relationship_table(&edge.rel_type),
                counterpart.key(),
            ),
        ]
    }

    fn edge_puts(
        &self,
        resource_type: &str,
        edge: &RelationshipRecord,
    ) -> StrataResult<[TableOp; 2]> {
        let counterpart = edge.counterpart(resource_type);
        Ok([
            TableOp::put(
                self.naming.relationship_table(resource_type),
                edge.key(),
                edge.encode()?,
            ),
            TableOp::put(
                self.naming.relationship_table(&edge.rel_type),
                counterpart.key(),
                counterpart.encode()?,
            ),
        ])
    }

    // ------------------------------------------------------------------------
    // Merge
    // ------------------------------------------------------------------------

    fn valid_id(&self, id: &str) -> bool {
        !id.is_empty()
            && !id.contains(KEY_SEPARATOR)
            && id.chars().count() <= self.config.max_id_length
    }

    /// Validate and normalize incoming items. Performs no I/O.
    fn prepare(
        &self,
        resource_type: &str,
        items: &[CacheItem],
        stats: &mut MergeStats,
    ) -> StrataResult<Vec<PreparedItem>> {
        let mut seen = HashSet::new();
        let mut prepared = Vec::with_capacity(items.len());

        for item in items {
            stats.items_seen += 1;

            let mut edges = BTreeSet::new();
            for (key, rel_ids) in &item.relationships {
                // Keys may already carry an agent suffix; only the type matters.
                let (rel_type, _) = split_relationship_key(key);
                validate_resource_type(rel_type)?;

                for rel_id in rel_ids {
                    if self.valid_id(rel_id) {
                        edges.insert((rel_type.to_string(), rel_id.clone()));
                    } else {
                        tracing::error!(
                            resource_type,
                            id = %item.id,
                            rel_type,
                            "Dropping relationship to over-length or malformed id"
                        );
                    }
                }
            }

            if !self.valid_id(&item.id) {
                tracing::error!(
                    resource_type,
                    id_length = item.id.chars().count(),
                    max_id_length = self.config.max_id_length,
                    "Dropping item with over-length or malformed id"
                );
                stats.dropped += 1;
                continue;
            }

            if !seen.insert(item.id.as_str()) {
                tracing::warn!(
                    resource_type,
                    id = %item.id,
                    "Duplicate id in merge, keeping first"
                );
                stats.duplicates += 1;
                continue;
            }

            let mut item = item.clone();
            item.strip_null_attributes();
            item.relationships.clear();
            prepared.push(PreparedItem { item, edges });
        }

        Ok(prepared)
    }

    /// Ops that bring `agent`'s forward edges from one item in line with `wanted`.
    fn reconcile_edges(
        &self,
        resource_type: &str,
        agent: &str,
        prepared: &PreparedItem,
        replace: bool,
        now: i64,
        ops: &mut Vec<TableOp>,
        stats: &mut MergeStats,
    ) -> StrataResult<()> {
        let existing: Vec<RelationshipRecord> = self
            .relationship_rows(resource_type, &id_prefix(&prepared.item.id))?
            .into_iter()
            .filter(|edge| edge.agent == agent && edge.direction == Direction::Forward)
            .collect();
        let existing_pairs: HashSet<(&str, &str)> = existing
            .iter()
            .map(|edge| (edge.rel_type.as_str(), edge.rel_id.as_str()))
            .collect();

        for (rel_type, rel_id) in &prepared.edges {
            if existing_pairs.contains(&(rel_type.as_str(), rel_id.as_str())) {
                continue;
            }
            let edge =
                RelationshipRecord::forward(&prepared.item.id, rel_type, rel_id, agent, now);
            ops.extend(self.edge_puts(resource_type, &edge)?);
            stats.relationships_stored += 1;
        }

        if replace {
            for edge in &existing {
                if !prepared
                    .edges
                    .contains(&(edge.rel_type.clone(), edge.rel_id.clone()))
                {
                    ops.extend(self.edge_deletes(resource_type, edge));
                    stats.relationships_deleted += 1;
                }
            }
        }

        Ok(())
    }

    fn merge_items(
        &self,
        resource_type: &str,
        agent: &str,
        items: &[CacheItem],
        authoritative: bool,
        cleanup: bool,
    ) -> StrataResult<MergeStats> {
        validate_resource_type(resource_type)?;

        let mut stats = MergeStats::default();
        let prepared = self.prepare(resource_type, items, &mut stats)?;

        // On-demand rows are created and expired by different writers, so
        // ownership is pinned to the namespace itself.
        let agent = if is_on_demand(resource_type) {
            ON_DEMAND_NAMESPACE
        } else {
            agent
        };
        let agent = self.naming.agent_name(agent);

        if prepared.is_empty() && !(authoritative && cleanup) {
            return Ok(stats);
        }

        self.ensure_type(resource_type)?;
        let related: BTreeSet<&str> = prepared
            .iter()
            .flat_map(|p| p.edges.iter().map(|(rel_type, _)| rel_type.as_str()))
            .collect();
        for rel_type in related {
            self.ensure_table(&self.naming.relationship_table(rel_type))?;
        }

        let now = now_millis();
        let resource_table = self.naming.resource_table(resource_type);
        let mut ops = Vec::new();

        if authoritative {
            let existing: HashMap<String, ResourceRow> = self
                .resource_rows(resource_type, "")?
                .into_iter()
                .filter(|row| row.agent == agent)
                .map(|row| (row.id.clone(), row))
                .collect();

            for p in &prepared {
                let hash = body_hash(&p.item.attributes, p.item.ttl_seconds)?;
                if existing
                    .get(&p.item.id)
                    .is_some_and(|row| row.body_hash == hash)
                {
                    stats.items_unchanged += 1;
                    continue;
                }

                let row = ResourceRow {
                    id: p.item.id.clone(),
                    agent: agent.clone(),
                    body_hash: hash,
                    attributes: p.item.attributes.clone(),
                    ttl_seconds: p.item.ttl_seconds,
                    last_updated: now,
                };
                ops.push(TableOp::put(&resource_table, row.key(), row.encode()?));
                stats.items_stored += 1;
            }

            if cleanup {
                let current: HashSet<&str> =
                    prepared.iter().map(|p| p.item.id.as_str()).collect();
                let stale: Vec<&ResourceRow> = existing
                    .values()
                    .filter(|row| !current.contains(row.id.as_str()))
                    .collect();

                if current.is_empty() && !stale.is_empty() {
                    tracing::warn!(
                        resource_type,
                        agent = %agent,
                        count = stale.len(),
                        "Authoritative merge with no items clears every row of this agent"
                    );
                }

                for row in stale {
                    ops.push(TableOp::delete(&resource_table, row.key()));
                    stats.items_deleted += 1;

                    for edge in self.relationship_rows(resource_type, &id_prefix(&row.id))? {
                        if edge.agent == agent && edge.direction == Direction::Forward {
                            ops.extend(self.edge_deletes(resource_type, &edge));
                            stats.relationships_deleted += 1;
                        }
                    }
                }
            }
        }

        // Authoritative items are replaced wholesale, edges included.
        let replace_edges = authoritative || cleanup;
        for p in &prepared {
            self.reconcile_edges(
                resource_type,
                &agent,
                p,
                replace_edges,
                now,
                &mut ops,
                &mut stats,
            )?;
        }

        self.write(ops)?;

        tracing::debug!(
            resource_type,
            agent = %agent,
            authoritative,
            cleanup,
            seen = stats.items_seen,
            stored = stats.items_stored,
            unchanged = stats.items_unchanged,
            deleted = stats.items_deleted,
            relationships_stored = stats.relationships_stored,
            relationships_deleted = stats.relationships_deleted,
            "Merged items"
        );

        Ok(stats)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    fn load(
        &self,
        resource_type: &str,
        rows: Vec<ResourceRow>,
        ids: Option<&[String]>,
        filter: &CacheFilter,
    ) -> StrataResult<Vec<CacheItem>> {
        let mut grouped: BTreeMap<String, Vec<ResourceRow>> = BTreeMap::new();
        for row in rows {
            grouped.entry(row.id.clone()).or_default().push(row);
        }

        let mut items: BTreeMap<String, CacheItem> = grouped
            .into_iter()
            .map(|(id, rows)| (id, combine(rows)))
            .collect();

        if filter.wants_relationships() && !items.is_empty() {
            let edges = match ids {
                Some(ids) => self.relationship_rows_for(resource_type, ids)?,
                None => self.relationship_rows(resource_type, "")?,
            };
            for edge in edges {
                if !filter.allows(&edge.rel_type) {
                    continue;
                }
                if let Some(item) = items.get_mut(&edge.id) {
                    item.relationships
                        .entry(edge.rel_type)
                        .or_default()
                        .insert(edge.rel_id);
                }
            }
        }

        Ok(match ids {
            Some(ids) => unique(ids)
                .into_iter()
                .filter_map(|id| items.remove(id))
                .collect(),
            None => items.into_values().collect(),
        })
    }
}

/// Combine every agent's row for one id; the newest row wins per attribute.
fn combine(mut rows: Vec<ResourceRow>) -> CacheItem {
    rows.sort_by(|a, b| {
        b.last_updated
            .cmp(&a.last_updated)
            .then_with(|| a.agent.cmp(&b.agent))
    });

    let mut rows = rows.into_iter();
    let Some(primary) = rows.next() else {
        return CacheItem::default();
    };

    let mut item = CacheItem {
        id: primary.id,
        attributes: primary.attributes,
        relationships: Default::default(),
        ttl_seconds: primary.ttl_seconds,
    };
    for row in rows {
        for (key, value) in row.attributes {
            item.attributes.entry(key).or_insert(value);
        }
    }
    item
}

/// `ids` with duplicates removed, first occurrence kept.
fn unique(ids: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(String::as_str)
        .filter(|id| seen.insert(*id))
        .collect()
}

fn id_of_key(key: &str) -> &str {
    key.split_once(KEY_SEPARATOR).map_or(key, |(id, _)| id)
}

impl<E: TableEngine> BackingStore for Store<E> {
    fn merge(
        &self,
        resource_type: &str,
        agent: &str,
        items: &[CacheItem],
        authoritative: bool,
        cleanup: bool,
    ) -> StrataResult<MergeStats> {
        self.merge_items(resource_type, agent, items, authoritative, cleanup)
    }

    fn evict_all(&self, resource_type: &str, ids: &[String]) -> StrataResult<usize> {
        validate_resource_type(resource_type)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let resource_table = self.naming.resource_table(resource_type);
        let mut ops = Vec::new();

        let rows = self.resource_rows_for(resource_type, ids)?;
        let evicted = rows.len();
        for row in &rows {
            ops.push(TableOp::delete(&resource_table, row.key()));
        }

        let edges = self.relationship_rows_for(resource_type, ids)?;
        for edge in &edges {
            ops.extend(self.edge_deletes(resource_type, edge));
        }

        self.write(ops)?;

        if evicted > 0 || !edges.is_empty() {
            tracing::info!(
                resource_type,
                requested = ids.len(),
                count = evicted,
                relationships = edges.len(),
                "Evicted items"
            );
        }
        Ok(evicted)
    }

    fn get_all(&self, resource_type: &str, filter: &CacheFilter) -> StrataResult<Vec<CacheItem>> {
        validate_resource_type(resource_type)?;
        let rows = self.resource_rows(resource_type, "")?;
        self.load(resource_type, rows, None, filter)
    }

    fn get_all_by_ids(
        &self,
        resource_type: &str,
        ids: &[String],
        filter: &CacheFilter,
    ) -> StrataResult<Vec<CacheItem>> {
        validate_resource_type(resource_type)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.resource_rows_for(resource_type, ids)?;
        self.load(resource_type, rows, Some(ids), filter)
    }

    fn identifiers(&self, resource_type: &str) -> StrataResult<Vec<String>> {
        validate_resource_type(resource_type)?;
        let ids: BTreeSet<String> = self
            .scan(&self.naming.resource_table(resource_type), "")?
            .into_iter()
            .map(|(key, _)| id_of_key(&key).to_string())
            .collect();
        Ok(ids.into_iter().collect())
    }

    fn filter_identifiers(&self, resource_type: &str, glob: &str) -> StrataResult<Vec<String>> {
        validate_resource_type(resource_type)?;
        let pattern = glob::compile(glob)?;
        let mut ids = self.identifiers(resource_type)?;
        ids.retain(|id| pattern.is_match(id));
        Ok(ids)
    }

    fn existing_identifiers(
        &self,
        resource_type: &str,
        ids: &[String],
    ) -> StrataResult<Vec<String>> {
        validate_resource_type(resource_type)?;
        let table = self.naming.resource_table(resource_type);

        if ids.len() > self.config.read_batch_size {
            let stored: HashSet<String> = self.identifiers(resource_type)?.into_iter().collect();
            return Ok(unique(ids)
                .into_iter()
                .filter(|id| stored.contains(*id))
                .map(str::to_string)
                .collect());
        }

        let mut existing = Vec::new();
        for id in unique(ids) {
            if !self.scan(&table, &id_prefix(id))?.is_empty() {
                existing.push(id.to_string());
            }
        }
        Ok(existing)
    }

    fn resource_owners(&self, resource_type: &str) -> StrataResult<Vec<ResourceOwner>> {
        validate_resource_type(resource_type)?;
        Ok(self
            .resource_rows(resource_type, "")?
            .iter()
            .map(ResourceOwner::from)
            .collect())
    }

    fn delete_resources(
        &self,
        resource_type: &str,
        owners: &[ResourceOwner],
    ) -> StrataResult<usize> {
        validate_resource_type(resource_type)?;
        if owners.is_empty() {
            return Ok(0);
        }

        let table = self.naming.resource_table(resource_type);
        let keys: Vec<String> = owners
            .iter()
            .map(|owner| resource_key(&owner.id, &owner.agent))
            .collect();
        let present = match self.engine.get_many(&table, &keys) {
            Ok(values) => values,
            Err(e) if e.is_missing_table() => return Ok(0),
            Err(e) => return Err(e),
        };

        let ops: Vec<TableOp> = keys
            .into_iter()
            .zip(present)
            .filter(|(_, value)| value.is_some())
            .map(|(key, _)| TableOp::delete(&table, key))
            .collect();
        let deleted = ops.len();
        self.write(ops)?;
        Ok(deleted)
    }

    fn relationships(&self, resource_type: &str) -> StrataResult<Vec<RelationshipRecord>> {
        validate_resource_type(resource_type)?;
        self.relationship_rows(resource_type, "")
    }

    fn delete_relationships(
        &self,
        resource_type: &str,
        records: &[RelationshipRecord],
    ) -> StrataResult<usize> {
        validate_resource_type(resource_type)?;
        let ops: Vec<TableOp> = records
            .iter()
            .flat_map(|record| self.edge_deletes(resource_type, record))
            .collect();
        self.write(ops)?;
        Ok(records.len())
    }

    fn clean_on_demand(&self, max_age: Duration) -> StrataResult<usize> {
        let age = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_millis().saturating_sub(age);

        let mut evicted = 0;
        for resource_type in self.on_demand_types()? {
            let expired: Vec<String> = self
                .resource_owners(&resource_type)?
                .into_iter()
                .filter(|owner| owner.last_updated <= cutoff)
                .map(|owner| owner.id)
                .collect();

            if !expired.is_empty() {
                tracing::debug!(
                    resource_type = %resource_type,
                    count = expired.len(),
                    "Expiring on-demand rows"
                );
                evicted += self.evict_all(&resource_type, &expired)?;
            }
        }
        Ok(evicted)
    }
}
