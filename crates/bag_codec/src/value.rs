//! CBOR data items.

use crate::error::{CodecError, CodecResult};

/// One CBOR data item.
///
/// Only the items BAG frames need are representable: there are no floats,
/// byte strings or tags, so every `Value` has exactly one canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `null`.
    Null,
    /// `true` / `false`.
    Bool(bool),
    /// Major types 0 and 1, full i64 range.
    Integer(i64),
    /// UTF-8 text string.
    Text(String),
    /// Array, order preserved.
    Array(Vec<Value>),
    /// Map entries. The encoder sorts them, so the order here never reaches
    /// the bytes.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// A map from entries.
    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Map(entries)
    }

    /// A text string.
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Name of the item kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// The integer, if this is one.
    pub fn as_integer(&self) -> Option<i64> {
        if let Value::Integer(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    /// The elements, if this is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        if let Value::Array(items) = self {
            Some(items)
        } else {
            None
        }
    }

    /// The entries, if this is a map.
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        if let Value::Map(entries) = self {
            Some(entries)
        } else {
            None
        }
    }

    /// Entry under text key `key` of a map. `None` for non-maps.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?.iter().find_map(|(k, v)| match k {
            Value::Text(k) if k == key => Some(v),
            _ => None,
        })
    }

    /// Like [`get`](Self::get), but a missing entry is a structural error.
    pub fn field(&self, key: &str) -> CodecResult<&Value> {
        self.get(key)
            .ok_or_else(|| CodecError::invalid_structure(format!("missing field `{key}`")))
    }

    /// The bool, or a structural error.
    pub fn expect_bool(&self) -> CodecResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(other.mismatch("bool")),
        }
    }

    /// The integer, or a structural error.
    pub fn expect_integer(&self) -> CodecResult<i64> {
        self.as_integer().ok_or_else(|| self.mismatch("integer"))
    }

    /// The text, or a structural error.
    pub fn expect_text(&self) -> CodecResult<&str> {
        match self {
            Value::Text(s) => Ok(s),
            other => Err(other.mismatch("text")),
        }
    }

    /// The array elements, or a structural error.
    pub fn expect_array(&self) -> CodecResult<&[Value]> {
        self.as_array().ok_or_else(|| self.mismatch("array"))
    }

    /// The map entries, or a structural error.
    pub fn expect_map(&self) -> CodecResult<&[(Value, Value)]> {
        self.as_map().ok_or_else(|| self.mismatch("map"))
    }

    fn mismatch(&self, expected: &str) -> CodecError {
        CodecError::invalid_structure(format!("expected {expected}, found {}", self.kind_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Value {
        Value::map(vec![
            (Value::text("label"), Value::text("Person")),
            (Value::Integer(1), Value::text("not a text key")),
            (Value::text("age"), Value::Integer(30)),
        ])
    }

    #[test]
    fn field_lookup() {
        let map = person();
        assert_eq!(map.field("label").unwrap().expect_text().unwrap(), "Person");
        assert_eq!(map.get("age"), Some(&Value::Integer(30)));
        assert!(map.get("1").is_none());
        assert!(Value::Null.get("label").is_none());
        assert!(matches!(
            map.field("missing"),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn shape_errors_name_both_kinds() {
        assert_eq!(Value::Integer(7).expect_integer().unwrap(), 7);
        let err = Value::Integer(7).expect_text().unwrap_err();
        assert!(err.to_string().contains("expected text, found integer"));
        assert!(Value::text("x").expect_bool().is_err());
        assert!(Value::Null.expect_array().is_err());
        assert!(Value::Array(vec![]).expect_map().is_err());
        assert!(Value::Bool(false).expect_bool().is_ok());
    }
}
