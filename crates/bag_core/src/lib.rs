//! # BAG Core
//!
//! Entity model, transaction state and the graph backend contract shared by
//! BAG clients and replicas.
//!
//! This crate provides:
//! - Node and relationship values usable as identifiers and map keys
//! - Content hashing (SHA-256 over canonical CBOR)
//! - Per-transaction read/update/delete/create sets
//! - The [`GraphBackend`] contract and an in-memory engine
//!
//! ## Key Invariants
//!
//! - Entity equality and ordering cover label, properties and endpoints
//! - An identifier is never both deleted and written in one transaction
//! - Backends apply write batches all-or-nothing
//! - Reads never observe writes stamped after their snapshot

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod entity;
mod error;
mod hash;
mod transaction;
mod types;

pub use backend::{open_backend, BackendKind, GraphBackend, InMemoryGraph, WriteBatch};
pub use entity::{
    is_reserved_property, EntityKind, NodeStorage, Operand, Properties, PropertyValue,
    RelationshipStorage, HASH_PROPERTY, SNAPSHOT_PROPERTY,
};
pub use error::{CoreError, CoreResult};
pub use hash::content_hash;
pub use transaction::{KindSets, TransactionState};
pub use types::Timestamp;
