//! Graph backend contract.
//!
//! A replica owns exactly one backend instance and drives it through
//! [`GraphBackend`]. The contract is narrow:
//! snapshot reads, all-or-nothing write batches and read-set verification
//! by content hash.

mod memory;

pub use memory::InMemoryGraph;

use crate::entity::{NodeStorage, Operand, RelationshipStorage};
use crate::error::{CoreError, CoreResult};
use crate::transaction::TransactionState;
use crate::types::Timestamp;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The write sets of one transaction, handed to [`GraphBackend::execute`].
#[derive(Debug, Clone, Copy)]
pub struct WriteBatch<'a> {
    /// Timestamp stamped on every record the batch writes.
    pub timestamp: Timestamp,
    /// Nodes to create, in order.
    pub creates_node: &'a [NodeStorage],
    /// Relationships to create, in order.
    pub creates_relationship: &'a [RelationshipStorage],
    /// Node updates, identifier to new value.
    pub updates_node: &'a BTreeMap<NodeStorage, NodeStorage>,
    /// Relationship updates, identifier to new value.
    pub updates_relationship: &'a BTreeMap<RelationshipStorage, RelationshipStorage>,
    /// Nodes to delete.
    pub deletes_node: &'a BTreeSet<NodeStorage>,
    /// Relationships to delete.
    pub deletes_relationship: &'a BTreeSet<RelationshipStorage>,
}

impl<'a> WriteBatch<'a> {
    /// Borrows the write sets of a transaction.
    pub fn from_transaction(txn: &'a TransactionState) -> Self {
        Self {
            timestamp: txn.timestamp(),
            creates_node: txn.nodes().creates(),
            creates_relationship: txn.relationships().creates(),
            updates_node: txn.nodes().updates(),
            updates_relationship: txn.relationships().updates(),
            deletes_node: txn.nodes().deletes(),
            deletes_relationship: txn.relationships().deletes(),
        }
    }

    /// Returns true if the batch writes nothing.
    pub fn is_empty(&self) -> bool {
        self.creates_node.is_empty()
            && self.creates_relationship.is_empty()
            && self.updates_node.is_empty()
            && self.updates_relationship.is_empty()
            && self.deletes_node.is_empty()
            && self.deletes_relationship.is_empty()
    }
}

/// A graph storage engine as seen by a replica.
///
/// # Invariants
///
/// - `start` and `terminate` are idempotent
/// - `read` never returns a record stamped after the requested snapshot
/// - `execute` applies the whole batch or nothing: creates, then updates,
///   then deletes
/// - `verify_read_set` reports whether every recorded read is still current
/// - Operations on a terminated backend fail with
///   [`CoreError::BackendFailure`]
pub trait GraphBackend: Send + Sync {
    /// Which engine this is.
    fn kind(&self) -> BackendKind;

    /// Opens the engine. Calling it on a running backend does nothing.
    fn start(&mut self) -> CoreResult<()>;

    /// Closes the engine. Calling it on a terminated backend does nothing.
    fn terminate(&mut self) -> CoreResult<()>;

    /// Returns true between `start` and `terminate`.
    fn is_running(&self) -> bool;

    /// Returns every stored entity matching `identifier`'s shape whose
    /// snapshot is at or before `snapshot`. Results carry their `hash` and
    /// `snapShotId` properties.
    fn read(&self, identifier: &Operand, snapshot: Timestamp) -> CoreResult<Vec<Operand>>;

    /// Applies a write batch atomically.
    fn execute(&mut self, batch: &WriteBatch<'_>) -> CoreResult<()>;

    /// Checks every `(key, expected)` pair against the current state.
    fn verify_read_set(
        &self,
        nodes: &BTreeMap<NodeStorage, NodeStorage>,
        relationships: &BTreeMap<RelationshipStorage, RelationshipStorage>,
    ) -> CoreResult<bool>;
}

/// Available backend engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// The built-in in-memory graph.
    Memory,
}

impl BackendKind {
    /// Maps a configuration string to a backend. Unknown names map to
    /// `None`; there is no default.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" | "in-memory" => Some(BackendKind::Memory),
            _ => None,
        }
    }

    /// Canonical configuration name.
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
        }
    }

    /// Creates a fresh, not yet started backend of this kind.
    pub fn open(self, instance: &str) -> Box<dyn GraphBackend> {
        match self {
            BackendKind::Memory => Box::new(InMemoryGraph::new(instance)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opens and starts the backend named `name`.
///
/// # Errors
///
/// Returns [`CoreError::UnknownBackend`] for unrecognized names, or the
/// backend's own error if it fails to start.
pub fn open_backend(name: &str, instance: &str) -> CoreResult<Box<dyn GraphBackend>> {
    let kind = BackendKind::from_name(name).ok_or_else(|| CoreError::UnknownBackend {
        name: name.to_string(),
    })?;
    let mut backend = kind.open(instance);
    backend.start()?;
    Ok(backend)
}
