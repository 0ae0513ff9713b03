//! Relationship values.

use super::{properties_subset, snapshot_of, user_properties, NodeStorage, Properties, PropertyValue, HASH_PROPERTY};
use crate::hash::content_hash;
use crate::types::Timestamp;
use std::fmt;

/// A directed relationship: a type label, a property map and its two
/// endpoints. Equality and hashing include the endpoints.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationshipStorage {
    label: String,
    properties: Properties,
    start: NodeStorage,
    end: NodeStorage,
}

impl RelationshipStorage {
    /// Creates a relationship with no properties.
    pub fn new(label: impl Into<String>, start: NodeStorage, end: NodeStorage) -> Self {
        Self {
            label: label.into(),
            properties: Properties::new(),
            start,
            end,
        }
    }

    /// Creates a relationship with the given properties.
    pub fn with_properties(
        label: impl Into<String>,
        properties: Properties,
        start: NodeStorage,
        end: NodeStorage,
    ) -> Self {
        Self {
            label: label.into(),
            properties,
            start,
            end,
        }
    }

    /// Returns a copy with `key` set to `value`.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns the relationship type. An empty label matches any type.
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

    /// Returns the start node.
    pub fn start(&self) -> &NodeStorage {
        &self.start
    }

    /// Returns the end node.
    pub fn end(&self) -> &NodeStorage {
        &self.end
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

    /// Returns a copy without reserved properties, endpoints included.
    #[must_use]
    pub fn without_meta(&self) -> Self {
        Self {
            label: self.label.clone(),
            properties: user_properties(&self.properties),
            start: self.start.without_meta(),
            end: self.end.without_meta(),
        }
    }

    /// Content hash over label and user properties.
    pub fn content_hash(&self) -> String {
        content_hash(&self.label, &self.properties)
    }

    /// Returns true if `candidate` has this relationship's shape, endpoints
    /// included.
    pub fn matches(&self, candidate: &RelationshipStorage) -> bool {
        (self.label.is_empty() || self.label == candidate.label)
            && properties_subset(&self.properties, &candidate.properties)
            && self.start.matches(&candidate.start)
            && self.end.matches(&candidate.end)
    }
}

impl fmt::Display for RelationshipStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-[:{} {{", self.start, self.label)?;
        for (i, (key, value)) in self.properties.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        write!(f, "}}]->{}", self.end)
    }
}
