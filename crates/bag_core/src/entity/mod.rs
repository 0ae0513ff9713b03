//! Graph entity model.
//!
//! Entities are plain values: a node is a label plus a property map, a
//! relationship additionally owns its two endpoint nodes. Equality, hashing
//! and ordering cover every field, so an entity doubles as the identifier
//! that selects matching records in a backend.

mod codec;
mod node;
mod relationship;

pub(crate) use codec::properties_to_value;
pub use node::NodeStorage;
pub use relationship::RelationshipStorage;

use crate::types::Timestamp;
use std::collections::BTreeMap;
use std::fmt;

/// Property holding the content hash of a stored record.
pub const HASH_PROPERTY: &str = "hash";

/// Property holding the timestamp of the transaction that wrote a record.
pub const SNAPSHOT_PROPERTY: &str = "snapShotId";

/// Returns true for properties maintained by the backend rather than users.
pub fn is_reserved_property(key: &str) -> bool {
    key == HASH_PROPERTY || key == SNAPSHOT_PROPERTY
}

/// A primitive property value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyValue {
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// UTF-8 string.
    Text(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Integer(n) => write!(f, "{n}"),
            PropertyValue::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Integer(n)
    }
}

impl From<i32> for PropertyValue {
    fn from(n: i32) -> Self {
        PropertyValue::Integer(i64::from(n))
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

/// Ordered property map. Ordering makes equality, hashing and encoding
/// independent of insertion order.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Returns true if every property of `pattern` is present with the same
/// value in `candidate`.
pub(crate) fn properties_subset(pattern: &Properties, candidate: &Properties) -> bool {
    pattern
        .iter()
        .all(|(key, value)| candidate.get(key) == Some(value))
}

/// Copies `properties` without the reserved backend properties.
pub(crate) fn user_properties(properties: &Properties) -> Properties {
    properties
        .iter()
        .filter(|(key, _)| !is_reserved_property(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Reads the snapshot property, if present.
pub(crate) fn snapshot_of(properties: &Properties) -> Option<Timestamp> {
    match properties.get(SNAPSHOT_PROPERTY) {
        Some(PropertyValue::Integer(ts)) => Some(Timestamp::new(*ts)),
        _ => None,
    }
}

/// The two kinds of entity a transaction can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A graph node.
    Node,
    /// A graph relationship.
    Relationship,
}

impl EntityKind {
    /// Wire code of this kind.
    pub fn code(self) -> i64 {
        match self {
            EntityKind::Node => 1,
            EntityKind::Relationship => 2,
        }
    }

    /// Parse a wire code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(EntityKind::Node),
            2 => Some(EntityKind::Relationship),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Node => f.write_str("node"),
            EntityKind::Relationship => f.write_str("relationship"),
        }
    }
}

/// An identifier or value of either entity kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operand {
    /// A node.
    Node(NodeStorage),
    /// A relationship.
    Relationship(RelationshipStorage),
}

impl Operand {
    /// Returns the kind of this operand.
    pub fn kind(&self) -> EntityKind {
        match self {
            Operand::Node(_) => EntityKind::Node,
            Operand::Relationship(_) => EntityKind::Relationship,
        }
    }

    /// Returns the label.
    pub fn label(&self) -> &str {
        match self {
            Operand::Node(node) => node.label(),
            Operand::Relationship(rel) => rel.label(),
        }
    }

    /// Returns the full property map, reserved properties included.
    pub fn properties(&self) -> &Properties {
        match self {
            Operand::Node(node) => node.properties(),
            Operand::Relationship(rel) => rel.properties(),
        }
    }

    /// Returns the content hash over label and user properties.
    pub fn content_hash(&self) -> String {
        match self {
            Operand::Node(node) => node.content_hash(),
            Operand::Relationship(rel) => rel.content_hash(),
        }
    }

    /// Returns the node, if this is one.
    pub fn as_node(&self) -> Option<&NodeStorage> {
        match self {
            Operand::Node(node) => Some(node),
            Operand::Relationship(_) => None,
        }
    }

    /// Returns the relationship, if this is one.
    pub fn as_relationship(&self) -> Option<&RelationshipStorage> {
        match self {
            Operand::Relationship(rel) => Some(rel),
            Operand::Node(_) => None,
        }
    }
}

impl From<NodeStorage> for Operand {
    fn from(node: NodeStorage) -> Self {
        Operand::Node(node)
    }
}

impl From<RelationshipStorage> for Operand {
    fn from(rel: RelationshipStorage) -> Self {
        Operand::Relationship(rel)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Node(node) => node.fmt(f),
            Operand::Relationship(rel) => rel.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_properties() {
        assert!(is_reserved_property("hash"));
        assert!(is_reserved_property("snapShotId"));
        assert!(!is_reserved_property("name"));
    }

    #[test]
    fn kind_codes() {
        for kind in [EntityKind::Node, EntityKind::Relationship] {
            assert_eq!(EntityKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(EntityKind::from_code(0), None);
    }

    #[test]
    fn operand_dispatch() {
        let alice = NodeStorage::new("Person").with_property("name", "Alice");
        let operand = Operand::from(alice.clone());
        assert_eq!(operand.kind(), EntityKind::Node);
        assert_eq!(operand.label(), "Person");
        assert_eq!(operand.as_node(), Some(&alice));
        assert!(operand.as_relationship().is_none());
        assert_eq!(operand.content_hash(), alice.content_hash());
    }

    #[test]
    fn property_subset() {
        let mut pattern = Properties::new();
        pattern.insert("a".into(), 1.into());
        let mut candidate = pattern.clone();
        candidate.insert("b".into(), "x".into());

        assert!(properties_subset(&pattern, &candidate));
        assert!(!properties_subset(&candidate, &pattern));
        assert!(properties_subset(&Properties::new(), &candidate));
    }
}
