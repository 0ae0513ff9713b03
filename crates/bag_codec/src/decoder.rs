//! Canonical CBOR decoder.
//!
//! Frames arrive from untrusted peers, so the decoder accepts exactly the
//! canonical form produced by [`crate::to_canonical_cbor`] and nothing else:
//! a replica must never interpret two different byte strings as the same
//! request.

use crate::encoder::cmp_encoded_keys;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::cmp::Ordering;

/// Maximum element count accepted for arrays and maps.
const MAX_CONTAINER_ELEMENTS: u64 = 1024 * 1024;

/// Maximum accepted text length in bytes.
const MAX_TEXT_LENGTH: u64 = 16 * 1024 * 1024;

/// Maximum nesting depth of arrays and maps.
const MAX_DEPTH: usize = 64;

/// Decode exactly one value from `bytes`.
///
/// # Errors
///
/// Fails on truncated input, trailing bytes, non-canonical encodings and
/// items the codec does not carry (floats, byte strings, tags).
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: decoder.remaining().len(),
        });
    }
    Ok(value)
}

/// A canonical CBOR decoder over a borrowed buffer.
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> CanonicalDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get the unread bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial = self.read_byte()?;
        let major_type = initial >> 5;
        let info = initial & 0x1f;

        match major_type {
            0 => {
                let n = self.read_argument(info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                let n = self.read_argument(info)?;
                let n = i64::try_from(n).map_err(|_| CodecError::IntegerOverflow)?;
                Ok(Value::Integer(-1 - n))
            }
            2 => Err(CodecError::unsupported("byte string")),
            3 => self.decode_text(info),
            4 => self.decode_array(info),
            5 => self.decode_map(info),
            6 => Err(CodecError::unsupported("tag")),
            _ => self.decode_simple(info),
        }
    }

    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    fn read_argument(&mut self, info: u8) -> CodecResult<u64> {
        let (value, minimum) = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => (u64::from(self.read_byte()?), 24),
            25 => {
                let b = self.read_slice(2)?;
                (u64::from(u16::from_be_bytes([b[0], b[1]])), 0x100)
            }
            26 => {
                let b = self.read_slice(4)?;
                (
                    u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
                    0x1_0000,
                )
            }
            27 => {
                let b = self.read_slice(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                (u64::from_be_bytes(raw), 0x1_0000_0000)
            }
            31 => return Err(CodecError::IndefiniteLengthForbidden),
            _ => return Err(CodecError::non_canonical("reserved additional info")),
        };
        if value < minimum {
            return Err(CodecError::non_canonical(
                "argument could be encoded in fewer bytes",
            ));
        }
        Ok(value)
    }

    fn read_length(&mut self, info: u8, max_allowed: u64) -> CodecResult<usize> {
        let claimed = self.read_argument(info)?;
        if claimed > max_allowed {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed,
            });
        }
        usize::try_from(claimed).map_err(|_| CodecError::IntegerOverflow)
    }

    fn decode_text(&mut self, info: u8) -> CodecResult<Value> {
        let len = self.read_length(info, MAX_TEXT_LENGTH)?;
        let bytes = self.read_slice(len)?;
        let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(Value::Text(text.to_string()))
    }

    fn enter(&mut self) -> CodecResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CodecError::SizeLimitExceeded {
                claimed: self.depth as u64,
                max_allowed: MAX_DEPTH as u64,
            });
        }
        Ok(())
    }

    fn decode_array(&mut self, info: u8) -> CodecResult<Value> {
        let len = self.read_length(info, MAX_CONTAINER_ELEMENTS)?;
        self.enter()?;
        // every element takes at least one byte
        let mut items = Vec::with_capacity(len.min(self.remaining().len()));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        self.depth -= 1;
        Ok(Value::Array(items))
    }

    fn decode_map(&mut self, info: u8) -> CodecResult<Value> {
        let len = self.read_length(info, MAX_CONTAINER_ELEMENTS)?;
        self.enter()?;
        let mut pairs = Vec::with_capacity(len.min(self.remaining().len() / 2));
        let mut previous_key: Option<&'a [u8]> = None;
        for _ in 0..len {
            let key_start = self.pos;
            let key = self.decode()?;
            let encoded_key = &self.data[key_start..self.pos];
            if let Some(previous) = previous_key {
                if cmp_encoded_keys(previous, encoded_key) != Ordering::Less {
                    return Err(CodecError::non_canonical(
                        "map keys out of order or duplicated",
                    ));
                }
            }
            previous_key = Some(encoded_key);
            let value = self.decode()?;
            pairs.push((key, value));
        }
        self.depth -= 1;
        Ok(Value::Map(pairs))
    }

    fn decode_simple(&mut self, info: u8) -> CodecResult<Value> {
        match info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            25..=27 => Err(CodecError::unsupported("float")),
            31 => Err(CodecError::IndefiniteLengthForbidden),
            _ => Err(CodecError::unsupported(format!("simple value {info}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::to_canonical_cbor;

    #[test]
    fn decodes_nested_frame() {
        let value = Value::Array(vec![
            Value::Integer(3),
            Value::Integer(-42),
            Value::map(vec![(Value::text("label"), Value::text("Person"))]),
            Value::Array(vec![Value::Null, Value::Bool(true)]),
        ]);
        let bytes = to_canonical_cbor(&value);
        assert_eq!(from_cbor(&bytes).unwrap(), value);
    }

    #[test]
    fn rejects_trailing_bytes() {
        let result = from_cbor(&[0x01, 0x02]);
        assert_eq!(result, Err(CodecError::TrailingBytes { remaining: 1 }));
    }

    #[test]
    fn rejects_truncated_input() {
        assert_eq!(from_cbor(&[0x63, b'a']), Err(CodecError::UnexpectedEof));
        assert_eq!(from_cbor(&[0x82, 0x01]), Err(CodecError::UnexpectedEof));
        assert_eq!(from_cbor(&[]), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn rejects_non_shortest_heads() {
        // 5 encoded with a one-byte argument
        assert!(matches!(
            from_cbor(&[0x18, 0x05]),
            Err(CodecError::NonCanonical { .. })
        ));
        // 255 encoded with a two-byte argument
        assert!(matches!(
            from_cbor(&[0x19, 0x00, 0xff]),
            Err(CodecError::NonCanonical { .. })
        ));
    }

    #[test]
    fn rejects_unsorted_or_duplicate_map_keys() {
        // {"b": 1, "a": 2}
        let unsorted = [0xa2, 0x61, b'b', 0x01, 0x61, b'a', 0x02];
        assert!(matches!(
            from_cbor(&unsorted),
            Err(CodecError::NonCanonical { .. })
        ));

        // {"a": 1, "a": 2}
        let duplicated = [0xa2, 0x61, b'a', 0x01, 0x61, b'a', 0x02];
        assert!(matches!(
            from_cbor(&duplicated),
            Err(CodecError::NonCanonical { .. })
        ));
    }

    #[test]
    fn rejects_unsupported_items() {
        assert!(matches!(
            from_cbor(&[0x41, 0x00]),
            Err(CodecError::UnsupportedItem { .. })
        ));
        assert!(matches!(
            from_cbor(&[0xf9, 0x3c, 0x00]),
            Err(CodecError::UnsupportedItem { .. })
        ));
        assert_eq!(
            from_cbor(&[0x9f, 0xff]),
            Err(CodecError::IndefiniteLengthForbidden)
        );
    }

    #[test]
    fn rejects_integer_overflow() {
        let mut bytes = vec![0x1b];
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        assert_eq!(from_cbor(&bytes), Err(CodecError::IntegerOverflow));
    }

    #[test]
    fn rejects_oversized_lengths_before_allocating() {
        // array claiming 2^32 elements
        let bytes = [0x9b, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            from_cbor(&bytes),
            Err(CodecError::SizeLimitExceeded { .. })
        ));
    }

    #[test]
    fn rejects_deep_nesting() {
        let bytes = vec![0x81; MAX_DEPTH + 1];
        assert!(matches!(
            from_cbor(&bytes),
            Err(CodecError::SizeLimitExceeded { .. })
        ));
    }
}
