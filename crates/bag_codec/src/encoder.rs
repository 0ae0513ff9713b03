//! Canonical CBOR encoder.

use crate::value::Value;
use std::cmp::Ordering;

/// Encode a value to canonical CBOR bytes.
///
/// Integers and lengths use the shortest head, lengths are always definite,
/// and map entries are ordered by their encoded key (shorter first, then
/// bytewise). Equal values therefore always produce equal bytes, which is
/// what lets replicas hash and compare frames.
pub fn to_canonical_cbor(value: &Value) -> Vec<u8> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value);
    encoder.into_bytes()
}

/// Ordering of two encoded map keys in canonical form.
pub(crate) fn cmp_encoded_keys(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// A canonical CBOR encoder writing into an owned buffer.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append the encoding of `value`.
    pub fn encode(&mut self, value: &Value) {
        match value {
            // null and booleans are simple values 22, 20 and 21
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(false) => self.buffer.push(0xf4),
            Value::Bool(true) => self.buffer.push(0xf5),
            Value::Integer(n) => self.encode_integer(*n),
            Value::Text(s) => {
                self.write_head(3, s.len() as u64);
                self.buffer.extend_from_slice(s.as_bytes());
            }
            Value::Array(items) => {
                self.write_head(4, items.len() as u64);
                for item in items {
                    self.encode(item);
                }
            }
            Value::Map(pairs) => self.encode_map(pairs),
        }
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.write_head(0, n as u64);
        } else {
            // major type 1 carries -1 - n, which is non-negative for every negative i64
            self.write_head(1, (-1 - n) as u64);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_head(&mut self, major_type: u8, argument: u64) {
        let mt = major_type << 5;
        if argument < 24 {
            self.buffer.push(mt | argument as u8);
        } else if argument <= u64::from(u8::MAX) {
            self.buffer.push(mt | 24);
            self.buffer.push(argument as u8);
        } else if argument <= u64::from(u16::MAX) {
            self.buffer.push(mt | 25);
            self.buffer
                .extend_from_slice(&(argument as u16).to_be_bytes());
        } else if argument <= u64::from(u32::MAX) {
            self.buffer.push(mt | 26);
            self.buffer
                .extend_from_slice(&(argument as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&argument.to_be_bytes());
        }
    }

    fn encode_map(&mut self, pairs: &[(Value, Value)]) {
        let mut entries: Vec<(Vec<u8>, &Value)> = pairs
            .iter()
            .map(|(key, value)| (to_canonical_cbor(key), value))
            .collect();
        entries.sort_by(|a, b| cmp_encoded_keys(&a.0, &b.0));

        self.write_head(5, entries.len() as u64);
        for (key, value) in entries {
            self.buffer.extend_from_slice(&key);
            self.encode(value);
        }
    }
}
