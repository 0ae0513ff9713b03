//! In-memory graph engine.

use super::{BackendKind, GraphBackend, WriteBatch};
use crate::entity::{
    is_reserved_property, user_properties, NodeStorage, Operand, Properties, PropertyValue,
    RelationshipStorage, HASH_PROPERTY, SNAPSHOT_PROPERTY,
};
use crate::error::{CoreError, CoreResult};
use crate::hash::content_hash;
use crate::types::Timestamp;
use std::collections::BTreeMap;
use tracing::debug;

type RecordId = u64;

#[derive(Debug, Clone)]
struct StoredRelationship {
    label: String,
    properties: Properties,
    start: RecordId,
    end: RecordId,
}

#[derive(Debug, Clone, Default)]
struct GraphStore {
    next_id: RecordId,
    nodes: BTreeMap<RecordId, NodeStorage>,
    relationships: BTreeMap<RecordId, StoredRelationship>,
}

impl GraphStore {
    fn allocate(&mut self) -> RecordId {
        self.next_id += 1;
        self.next_id
    }

    fn matching_nodes(&self, pattern: &NodeStorage) -> Vec<RecordId> {
        self.nodes
            .iter()
            .filter(|(_, node)| pattern.matches(node))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Rebuilds a relationship value with its endpoints as currently stored.
    fn materialize(&self, rel: &StoredRelationship) -> Option<RelationshipStorage> {
        let start = self.nodes.get(&rel.start)?;
        let end = self.nodes.get(&rel.end)?;
        Some(RelationshipStorage::with_properties(
            rel.label.clone(),
            rel.properties.clone(),
            start.clone(),
            end.clone(),
        ))
    }

    fn matching_relationships(&self, pattern: &RelationshipStorage) -> Vec<RecordId> {
        self.relationships
            .iter()
            .filter(|(_, rel)| {
                self.materialize(rel)
                    .is_some_and(|candidate| pattern.matches(&candidate))
            })
            .map(|(id, _)| *id)
            .collect()
    }

    fn create_node(&mut self, value: &NodeStorage, timestamp: Timestamp) {
        let id = self.allocate();
        let properties = stamp(value.label(), user_properties(value.properties()), timestamp);
        self.nodes
            .insert(id, NodeStorage::with_properties(value.label(), properties));
    }

    fn create_relationship(
        &mut self,
        value: &RelationshipStorage,
        timestamp: Timestamp,
    ) -> CoreResult<()> {
        let starts = self.matching_nodes(value.start());
        let ends = self.matching_nodes(value.end());
        if starts.is_empty() || ends.is_empty() {
            return Err(CoreError::backend_failure(format!(
                "no endpoints match relationship {value}"
            )));
        }
        let properties = stamp(value.label(), user_properties(value.properties()), timestamp);
        for start in &starts {
            for end in &ends {
                let id = self.allocate();
                self.relationships.insert(
                    id,
                    StoredRelationship {
                        label: value.label().to_string(),
                        properties: properties.clone(),
                        start: *start,
                        end: *end,
                    },
                );
            }
        }
        Ok(())
    }

    fn update_node(
        &mut self,
        identifier: &NodeStorage,
        value: &NodeStorage,
        timestamp: Timestamp,
    ) -> CoreResult<()> {
        let ids = self.matching_nodes(identifier);
        if ids.is_empty() {
            return Err(CoreError::backend_failure(format!(
                "no node matches update target {identifier}"
            )));
        }
        for id in ids {
            if let Some(node) = self.nodes.get_mut(&id) {
                let label = retag(node.label(), value.label());
                let merged = merge_properties(
                    node.properties(),
                    identifier.properties(),
                    value.properties(),
                );
                let properties = stamp(&label, merged, timestamp);
                *node = NodeStorage::with_properties(label, properties);
            }
        }
        Ok(())
    }

    fn update_relationship(
        &mut self,
        identifier: &RelationshipStorage,
        value: &RelationshipStorage,
        timestamp: Timestamp,
    ) -> CoreResult<()> {
        let ids = self.matching_relationships(identifier);
        if ids.is_empty() {
            return Err(CoreError::backend_failure(format!(
                "no relationship matches update target {identifier}"
            )));
        }
        for id in ids {
            if let Some(rel) = self.relationships.get_mut(&id) {
                let label = retag(&rel.label, value.label());
                let merged =
                    merge_properties(&rel.properties, identifier.properties(), value.properties());
                rel.properties = stamp(&label, merged, timestamp);
                rel.label = label;
            }
        }
        Ok(())
    }

    fn delete_relationship(&mut self, identifier: &RelationshipStorage) {
        for id in self.matching_relationships(identifier) {
            self.relationships.remove(&id);
        }
    }

    fn delete_node(&mut self, identifier: &NodeStorage) {
        for id in self.matching_nodes(identifier) {
            self.nodes.remove(&id);
            self.relationships
                .retain(|_, rel| rel.start != id && rel.end != id);
        }
    }
}

/// Keeps the stored label when the new value leaves it empty.
fn retag(old: &str, new: &str) -> String {
    if new.is_empty() {
        old.to_string()
    } else {
        new.to_string()
    }
}

/// Applies the difference between an update's `old` and `new` property maps
/// to a `stored` record.
///
/// Keys only in `new` are set, keys only in `old` are removed, differing
/// values are overwritten and equal values are left alone. Stored keys that
/// neither map names are kept. Reserved properties are dropped; the caller
/// restamps them.
pub(crate) fn merge_properties(
    stored: &Properties,
    old: &Properties,
    new: &Properties,
) -> Properties {
    let mut merged = user_properties(stored);
    merged.retain(|key, _| !old.contains_key(key) || new.contains_key(key));
    for (key, value) in new {
        if is_reserved_property(key) {
            continue;
        }
        if merged.get(key) != Some(value) {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Adds the `hash` and `snapShotId` properties to user properties.
fn stamp(label: &str, mut properties: Properties, timestamp: Timestamp) -> Properties {
    let hash = content_hash(label, &properties);
    properties.insert(HASH_PROPERTY.to_string(), PropertyValue::Text(hash));
    properties.insert(
        SNAPSHOT_PROPERTY.to_string(),
        PropertyValue::Integer(timestamp.as_i64()),
    );
    properties
}

fn visible_at(properties: &Properties, snapshot: Timestamp) -> bool {
    match properties.get(SNAPSHOT_PROPERTY) {
        Some(PropertyValue::Integer(ts)) => *ts <= snapshot.as_i64(),
        _ => true,
    }
}

fn expected_hash<F: FnOnce() -> String>(stored: Option<&str>, recompute: F) -> String {
    stored.map_or_else(recompute, str::to_string)
}

/// A graph engine that keeps every record in memory.
///
/// Write batches are applied to a staging copy of the store which replaces
/// the live store only once the whole batch has succeeded.
///
/// # Example
///
/// ```rust
/// use bag_core::{GraphBackend, InMemoryGraph, NodeStorage, Operand, Timestamp, TransactionState, WriteBatch};
///
/// let mut graph = InMemoryGraph::new("example");
/// graph.start().unwrap();
///
/// let mut txn = TransactionState::new(Timestamp::new(1));
/// txn.create(NodeStorage::new("Person").with_property("name", "Alice").into()).unwrap();
/// graph.execute(&WriteBatch::from_transaction(&txn)).unwrap();
///
/// let found = graph.read(&Operand::Node(NodeStorage::new("Person")), Timestamp::new(1)).unwrap();
/// assert_eq!(found.len(), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryGraph {
    instance: String,
    running: bool,
    store: GraphStore,
}

impl InMemoryGraph {
    /// Creates a terminated, empty graph for `instance`.
    #[must_use]
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            running: false,
            store: GraphStore::default(),
        }
    }

    /// Returns the instance name.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Number of stored nodes.
    pub fn node_count(&self) -> usize {
        self.store.nodes.len()
    }

    /// Number of stored relationships.
    pub fn relationship_count(&self) -> usize {
        self.store.relationships.len()
    }

    fn ensure_running(&self) -> CoreResult<()> {
        if self.running {
            Ok(())
        } else {
            Err(CoreError::backend_failure(format!(
                "backend {} is not running",
                self.instance
            )))
        }
    }

    fn verify_node(&self, key: &NodeStorage, expected: &NodeStorage) -> bool {
        let want = expected_hash(expected.stored_hash(), || expected.content_hash());
        let pattern = key.without_meta();
        self.store
            .nodes
            .values()
            .filter(|node| pattern.matches(node))
            .any(|node| node.content_hash() == want)
    }

    fn verify_relationship(&self, key: &RelationshipStorage, expected: &RelationshipStorage) -> bool {
        let want = expected_hash(expected.stored_hash(), || expected.content_hash());
        let pattern = key.without_meta();
        self.store
            .relationships
            .values()
            .filter_map(|rel| self.store.materialize(rel))
            .filter(|rel| pattern.matches(rel))
            .any(|rel| rel.content_hash() == want)
    }
}

impl GraphBackend for InMemoryGraph {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn start(&mut self) -> CoreResult<()> {
        if self.running {
            debug!(instance = %self.instance, "backend already running");
            return Ok(());
        }
        self.running = true;
        debug!(instance = %self.instance, "backend started");
        Ok(())
    }

    fn terminate(&mut self) -> CoreResult<()> {
        if self.running {
            self.running = false;
            debug!(instance = %self.instance, "backend terminated");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn read(&self, identifier: &Operand, snapshot: Timestamp) -> CoreResult<Vec<Operand>> {
        self.ensure_running()?;
        let results = match identifier {
            Operand::Node(pattern) => self
                .store
                .nodes
                .values()
                .filter(|node| pattern.matches(node) && visible_at(node.properties(), snapshot))
                .cloned()
                .map(Operand::Node)
                .collect(),
            Operand::Relationship(pattern) => self
                .store
                .relationships
                .values()
                .filter(|rel| visible_at(&rel.properties, snapshot))
                .filter_map(|rel| self.store.materialize(rel))
                .filter(|rel| pattern.matches(rel))
                .map(|rel| {
                    // Endpoints are returned as plain identifiers.
                    let start = rel.start().without_meta();
                    let end = rel.end().without_meta();
                    Operand::Relationship(RelationshipStorage::with_properties(
                        rel.label(),
                        rel.properties().clone(),
                        start,
                        end,
                    ))
                })
                .collect(),
        };
        Ok(results)
    }

    fn execute(&mut self, batch: &WriteBatch<'_>) -> CoreResult<()> {
        self.ensure_running()?;
        let ts = batch.timestamp;
        let mut staging = self.store.clone();

        for node in batch.creates_node {
            staging.create_node(node, ts);
        }
        for rel in batch.creates_relationship {
            staging.create_relationship(rel, ts)?;
        }
        for (identifier, value) in batch.updates_node {
            staging.update_node(identifier, value, ts)?;
        }
        for (identifier, value) in batch.updates_relationship {
            staging.update_relationship(identifier, value, ts)?;
        }
        for rel in batch.deletes_relationship {
            staging.delete_relationship(rel);
        }
        for node in batch.deletes_node {
            staging.delete_node(node);
        }

        self.store = staging;
        debug!(
            instance = %self.instance,
            timestamp = %ts,
            nodes = self.store.nodes.len(),
            relationships = self.store.relationships.len(),
            "batch applied"
        );
        Ok(())
    }

    fn verify_read_set(
        &self,
        nodes: &BTreeMap<NodeStorage, NodeStorage>,
        relationships: &BTreeMap<RelationshipStorage, RelationshipStorage>,
    ) -> CoreResult<bool> {
        self.ensure_running()?;
        for (key, expected) in nodes {
            if !self.verify_node(key, expected) {
                debug!(instance = %self.instance, node = %key, "read set mismatch");
                return Ok(false);
            }
        }
        for (key, expected) in relationships {
            if !self.verify_relationship(key, expected) {
                debug!(instance = %self.instance, relationship = %key, "read set mismatch");
                return Ok(false);
            }
        }
        Ok(true)
    }
}
