//! CBOR representation of entities.
//!
//! A node is `{"label": text, "properties": {name: value}}`; a relationship
//! adds `"start"` and `"end"` node maps.

use super::{NodeStorage, Operand, Properties, PropertyValue, RelationshipStorage};
use bag_codec::{CodecError, CodecResult, Decode, Encode, Value};

const LABEL: &str = "label";
const PROPERTIES: &str = "properties";
const START: &str = "start";
const END: &str = "end";

impl Encode for PropertyValue {
    fn to_value(&self) -> Value {
        match self {
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Integer(n) => Value::Integer(*n),
            PropertyValue::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl Decode for PropertyValue {
    fn from_value(value: &Value) -> CodecResult<Self> {
        match value {
            Value::Bool(b) => Ok(PropertyValue::Bool(*b)),
            Value::Integer(n) => Ok(PropertyValue::Integer(*n)),
            Value::Text(s) => Ok(PropertyValue::Text(s.clone())),
            _ => Err(CodecError::invalid_structure(
                "property values must be bool, integer or text",
            )),
        }
    }
}

pub(crate) fn properties_to_value(properties: &Properties) -> Value {
    Value::map(
        properties
            .iter()
            .map(|(key, value)| (Value::text(key.as_str()), value.to_value()))
            .collect(),
    )
}

fn properties_from_value(value: &Value) -> CodecResult<Properties> {
    let mut properties = Properties::new();
    for (key, value) in value.expect_map()? {
        let key = key.expect_text()?;
        properties.insert(key.to_string(), PropertyValue::from_value(value)?);
    }
    Ok(properties)
}

impl Encode for NodeStorage {
    fn to_value(&self) -> Value {
        Value::map(vec![
            (Value::text(LABEL), Value::text(self.label())),
            (Value::text(PROPERTIES), properties_to_value(self.properties())),
        ])
    }
}

impl Decode for NodeStorage {
    fn from_value(value: &Value) -> CodecResult<Self> {
        if value.get(START).is_some() || value.get(END).is_some() {
            return Err(CodecError::invalid_structure(
                "expected a node, found a relationship",
            ));
        }
        let label = value.field(LABEL)?.expect_text()?;
        let properties = properties_from_value(value.field(PROPERTIES)?)?;
        Ok(NodeStorage::with_properties(label, properties))
    }
}

impl Encode for RelationshipStorage {
    fn to_value(&self) -> Value {
        Value::map(vec![
            (Value::text(LABEL), Value::text(self.label())),
            (Value::text(PROPERTIES), properties_to_value(self.properties())),
            (Value::text(START), self.start().to_value()),
            (Value::text(END), self.end().to_value()),
        ])
    }
}

impl Decode for RelationshipStorage {
    fn from_value(value: &Value) -> CodecResult<Self> {
        let label = value.field(LABEL)?.expect_text()?;
        let properties = properties_from_value(value.field(PROPERTIES)?)?;
        let start = NodeStorage::from_value(value.field(START)?)?;
        let end = NodeStorage::from_value(value.field(END)?)?;
        Ok(RelationshipStorage::with_properties(
            label, properties, start, end,
        ))
    }
}

impl Encode for Operand {
    fn to_value(&self) -> Value {
        match self {
            Operand::Node(node) => node.to_value(),
            Operand::Relationship(rel) => rel.to_value(),
        }
    }
}

impl Decode for Operand {
    fn from_value(value: &Value) -> CodecResult<Self> {
        if value.get(START).is_some() {
            RelationshipStorage::from_value(value).map(Operand::Relationship)
        } else {
            NodeStorage::from_value(value).map(Operand::Node)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> NodeStorage {
        NodeStorage::new("Person")
            .with_property("name", "Alice")
            .with_property("age", 30)
            .with_property("active", true)
    }

    #[test]
    fn node_encoding_is_independent_of_insertion_order() {
        let a = NodeStorage::new("N").with_property("b", 1).with_property("a", 2);
        let b = NodeStorage::new("N").with_property("a", 2).with_property("b", 1);
        assert_eq!(a.encode(), b.encode());
    }

    #[test]
    fn node_decodes_back() {
        let bytes = alice().encode();
        assert_eq!(NodeStorage::decode(&bytes).unwrap(), alice());
    }

    #[test]
    fn relationship_decodes_back_through_operand() {
        let rel = RelationshipStorage::new("KNOWS", alice(), NodeStorage::new("Person"))
            .with_property("since", 2020);
        let operand = Operand::decode(&rel.encode()).unwrap();
        assert_eq!(operand, Operand::Relationship(rel));
    }

    #[test]
    fn relationship_is_not_a_node() {
        let rel = RelationshipStorage::new("KNOWS", alice(), alice());
        assert!(NodeStorage::decode(&rel.encode()).is_err());
    }

    #[test]
    fn rejects_non_scalar_property() {
        let value = Value::map(vec![
            (Value::text(LABEL), Value::text("N")),
            (
                Value::text(PROPERTIES),
                Value::map(vec![(Value::text("x"), Value::Null)]),
            ),
        ]);
        assert!(NodeStorage::from_value(&value).is_err());
    }

    #[test]
    fn rejects_missing_label() {
        let value = Value::map(vec![(Value::text(PROPERTIES), Value::map(vec![]))]);
        assert!(matches!(
            NodeStorage::from_value(&value),
            Err(CodecError::InvalidStructure { .. })
        ));
    }
}
