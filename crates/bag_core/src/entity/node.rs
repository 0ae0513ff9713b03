//! Node values.

use super::{properties_subset, snapshot_of, user_properties, Properties, PropertyValue, HASH_PROPERTY};
use crate::hash::content_hash;
use crate::types::Timestamp;
use std::fmt;

/// A graph node: one type label and an ordered property map.
///
/// Used both as a transaction operand and as a map key. Two nodes are equal
/// iff label and the full property map are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeStorage {
    label: String,
    properties: Properties,
}

impl NodeStorage {
    /// Creates a node with no properties.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            properties: Properties::new(),
        }
    }

    /// Creates a node with the given properties.
    pub fn with_properties(label: impl Into<String>, properties: Properties) -> Self {
        Self {
            label: label.into(),
            properties,
        }
    }

    /// Returns a copy with `key` set to `value`.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns the label. An empty label matches any label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns all properties, reserved ones included.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Returns one property.
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Returns the hash recorded by the backend when this value was read.
    pub fn stored_hash(&self) -> Option<&str> {
        match self.properties.get(HASH_PROPERTY) {
            Some(PropertyValue::Text(hash)) => Some(hash),
            _ => None,
        }
    }

    /// Returns the timestamp of the transaction that wrote this value.
    pub fn snapshot(&self) -> Option<Timestamp> {
        snapshot_of(&self.properties)
    }

    /// Returns a copy without the backend's reserved properties.
    #[must_use]
    pub fn without_meta(&self) -> Self {
        Self {
            label: self.label.clone(),
            properties: user_properties(&self.properties),
        }
    }

    /// Content hash over label and user properties.
    pub fn content_hash(&self) -> String {
        content_hash(&self.label, &self.properties)
    }

    /// Returns true if `candidate` has this node's shape: same label (or
    /// this label is empty) and a superset of this node's properties.
    pub fn matches(&self, candidate: &NodeStorage) -> bool {
        (self.label.is_empty() || self.label == candidate.label)
            && properties_subset(&self.properties, &candidate.properties)
    }
}

impl fmt::Display for NodeStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(:{} {{", self.label)?;
        for (i, (key, value)) in self.properties.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        f.write_str("})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn alice() -> NodeStorage {
        NodeStorage::new("Person")
            .with_property("name", "Alice")
            .with_property("age", 30)
    }

    #[test]
    fn equality_covers_label_and_properties() {
        assert_eq!(alice(), alice());
        assert_ne!(alice(), alice().with_property("age", 31));

        let relabelled = NodeStorage::with_properties("Robot", alice().properties().clone());
        assert_ne!(alice(), relabelled);
    }

    #[test]
    fn insertion_order_is_irrelevant() {
        let a = NodeStorage::new("Person")
            .with_property("x", 1)
            .with_property("y", 2);
        let b = NodeStorage::new("Person")
            .with_property("y", 2)
            .with_property("x", 1);
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn shape_matching() {
        let pattern = NodeStorage::new("Person").with_property("name", "Alice");
        assert!(pattern.matches(&alice()));
        assert!(NodeStorage::new("").matches(&alice()));
        assert!(!NodeStorage::new("Robot").matches(&alice()));
        assert!(!alice().matches(&pattern));
    }

    #[test]
    fn meta_properties() {
        let stored = alice()
            .with_property(HASH_PROPERTY, "abc")
            .with_property(super::super::SNAPSHOT_PROPERTY, 7);

        assert_eq!(stored.stored_hash(), Some("abc"));
        assert_eq!(stored.snapshot(), Some(Timestamp::new(7)));
        assert_eq!(stored.without_meta(), alice());
        assert_eq!(stored.content_hash(), alice().content_hash());
    }

    #[test]
    fn display() {
        let node = NodeStorage::new("Person").with_property("name", "Alice");
        assert_eq!(node.to_string(), "(:Person {name: 'Alice'})");
    }
}
