//! Entity fixtures and graph helpers.
//!
//! The fixture graph has three people and two relationships:
//! `alice -KNOWS-> bob -LIKES-> carol`.

use bag_core::{
    GraphBackend, InMemoryGraph, NodeStorage, RelationshipStorage, Timestamp, TransactionState,
    WriteBatch,
};
use std::path::PathBuf;
use tempfile::TempDir;

/// A `Person` node with the given name.
pub fn person(name: &str) -> NodeStorage {
    NodeStorage::new("Person").with_property("name", name)
}

/// `Person {name: 'Alice'}`.
pub fn alice() -> NodeStorage {
    person("Alice")
}

/// `Person {name: 'Bob'}`.
pub fn bob() -> NodeStorage {
    person("Bob")
}

/// `Person {name: 'Carol'}`.
pub fn carol() -> NodeStorage {
    person("Carol")
}

/// `alice -KNOWS-> bob`.
pub fn knows() -> RelationshipStorage {
    RelationshipStorage::new("KNOWS", alice(), bob())
}

/// `bob -LIKES-> carol`.
pub fn likes() -> RelationshipStorage {
    RelationshipStorage::new("LIKES", bob(), carol())
}

/// A started, empty in-memory graph.
pub fn empty_graph(instance: &str) -> InMemoryGraph {
    let mut graph = InMemoryGraph::new(instance);
    graph.start().expect("in-memory graph always starts");
    graph
}

/// A transaction creating the fixture graph at `timestamp`.
pub fn fixture_transaction(timestamp: Timestamp) -> TransactionState {
    let mut txn = TransactionState::new(timestamp);
    for node in [alice(), bob(), carol()] {
        txn.create(node.into()).expect("fresh transaction");
    }
    for rel in [knows(), likes()] {
        txn.create(rel.into()).expect("fresh transaction");
    }
    txn
}

/// A started in-memory graph holding the fixture graph, written at
/// timestamp 1.
pub fn seeded_graph(instance: &str) -> InMemoryGraph {
    let mut graph = empty_graph(instance);
    let txn = fixture_transaction(Timestamp::new(1));
    graph
        .execute(&WriteBatch::from_transaction(&txn))
        .expect("fixture graph applies");
    graph
}

/// A temporary directory for persisted replica state, removed on drop.
pub struct TempStateDir {
    dir: TempDir,
}

impl TempStateDir {
    /// Creates a new temporary directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Path of a file named `name` inside the directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

impl Default for TempStateDir {
    fn default() -> Self {
        Self::new()
    }
}
