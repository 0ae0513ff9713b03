//! Transaction state.

use crate::entity::{EntityKind, NodeStorage, Operand, RelationshipStorage};
use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

/// The four buffered sets of one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindSets<T: Ord> {
    reads: BTreeMap<T, T>,
    updates: BTreeMap<T, T>,
    deletes: BTreeSet<T>,
    creates: Vec<T>,
}

impl<T: Ord> Default for KindSets<T> {
    fn default() -> Self {
        Self {
            reads: BTreeMap::new(),
            updates: BTreeMap::new(),
            deletes: BTreeSet::new(),
            creates: Vec::new(),
        }
    }
}

impl<T: Ord + Clone + Display> KindSets<T> {
    /// Builds sets from decoded parts, checking that no deleted identifier
    /// is also updated or created.
    pub fn from_parts(
        reads: BTreeMap<T, T>,
        updates: BTreeMap<T, T>,
        deletes: BTreeSet<T>,
        creates: Vec<T>,
    ) -> CoreResult<Self> {
        if let Some(conflict) = deletes
            .iter()
            .find(|id| updates.contains_key(*id) || creates.contains(*id))
        {
            return Err(CoreError::invalid_operation(format!(
                "{conflict} is both deleted and written"
            )));
        }
        Ok(Self {
            reads,
            updates,
            deletes,
            creates,
        })
    }

    /// Observed values, keyed by identifier.
    pub fn reads(&self) -> &BTreeMap<T, T> {
        &self.reads
    }

    /// Pending updates, keyed by identifier.
    pub fn updates(&self) -> &BTreeMap<T, T> {
        &self.updates
    }

    /// Pending deletes.
    pub fn deletes(&self) -> &BTreeSet<T> {
        &self.deletes
    }

    /// Pending creates in application order.
    pub fn creates(&self) -> &[T] {
        &self.creates
    }

    /// Returns true if any update, delete or create is pending.
    pub fn has_writes(&self) -> bool {
        !(self.updates.is_empty() && self.deletes.is_empty() && self.creates.is_empty())
    }

    /// Returns true if all four sets are empty.
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && !self.has_writes()
    }

    /// Number of buffered writes.
    pub fn write_count(&self) -> usize {
        self.updates.len() + self.deletes.len() + self.creates.len()
    }

    fn create(&mut self, value: T) -> CoreResult<()> {
        if self.deletes.contains(&value) {
            return Err(CoreError::invalid_operation(format!(
                "cannot create {value}: it is deleted in this transaction"
            )));
        }
        self.creates.push(value);
        Ok(())
    }

    fn update(&mut self, identifier: T, value: T) -> CoreResult<()> {
        if self.deletes.contains(&identifier) {
            return Err(CoreError::invalid_operation(format!(
                "cannot update {identifier}: it is deleted in this transaction"
            )));
        }
        self.updates.insert(identifier, value);
        Ok(())
    }

    fn delete(&mut self, identifier: T) {
        self.updates.remove(&identifier);
        self.creates.retain(|created| created != &identifier);
        self.deletes.insert(identifier);
    }

    fn record_read(&mut self, observed: T) {
        self.reads.insert(observed.clone(), observed);
    }
}

/// Buffered state of one open transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionState {
    timestamp: Timestamp,
    nodes: KindSets<NodeStorage>,
    relationships: KindSets<RelationshipStorage>,
}

impl TransactionState {
    /// Creates an empty transaction reading as of `timestamp`.
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            nodes: KindSets::default(),
            relationships: KindSets::default(),
        }
    }

    /// Reassembles a transaction from its decoded sets.
    pub fn from_parts(
        timestamp: Timestamp,
        nodes: KindSets<NodeStorage>,
        relationships: KindSets<RelationshipStorage>,
    ) -> Self {
        Self {
            timestamp,
            nodes,
            relationships,
        }
    }

    /// Returns the snapshot/version marker of this transaction.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Node sets.
    pub fn nodes(&self) -> &KindSets<NodeStorage> {
        &self.nodes
    }

    /// Relationship sets.
    pub fn relationships(&self) -> &KindSets<RelationshipStorage> {
        &self.relationships
    }

    /// Buffers creation of `value`.
    pub fn create(&mut self, value: Operand) -> CoreResult<()> {
        match value {
            Operand::Node(node) => self.nodes.create(node),
            Operand::Relationship(rel) => self.relationships.create(rel),
        }
    }

    /// Buffers replacing `identifier` with `value`. Both must be of the same
    /// kind.
    pub fn update(&mut self, identifier: Operand, value: Operand) -> CoreResult<()> {
        match (identifier, value) {
            (Operand::Node(id), Operand::Node(value)) => self.nodes.update(id, value),
            (Operand::Relationship(id), Operand::Relationship(value)) => {
                self.relationships.update(id, value)
            }
            (identifier, value) => Err(CoreError::KindMismatch {
                identifier: identifier.kind(),
                value: value.kind(),
            }),
        }
    }

    /// Buffers deletion of `identifier`, discarding pending writes to it.
    pub fn delete(&mut self, identifier: Operand) {
        match identifier {
            Operand::Node(node) => self.nodes.delete(node),
            Operand::Relationship(rel) => self.relationships.delete(rel),
        }
    }

    /// Records a value returned by a read as evidence for validation.
    pub fn record_read(&mut self, observed: Operand) {
        match observed {
            Operand::Node(node) => self.nodes.record_read(node),
            Operand::Relationship(rel) => self.relationships.record_read(rel),
        }
    }

    /// Returns true if nothing but reads is buffered.
    pub fn is_read_only(&self) -> bool {
        !self.nodes.has_writes() && !self.relationships.has_writes()
    }

    /// Returns true if all eight sets are empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }

    /// Number of buffered writes of the given kind.
    pub fn write_count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Node => self.nodes.write_count(),
            EntityKind::Relationship => self.relationships.write_count(),
        }
    }

    /// Number of recorded reads across both kinds.
    pub fn read_count(&self) -> usize {
        self.nodes.reads.len() + self.relationships.reads.len()
    }

    /// Clears every set and moves the transaction to `timestamp`.
    pub fn reset(&mut self, timestamp: Timestamp) {
        *self = Self::new(timestamp);
    }
}
