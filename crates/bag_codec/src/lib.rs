//! # BAG Codec
//!
//! Canonical CBOR encoding/decoding for BAG.
//!
//! Every request a replica receives through the agreement layer is a
//! canonical CBOR frame, and every content hash is computed over canonical
//! CBOR. Canonical form guarantees:
//! - Identical values produce identical bytes on every replica
//! - Decoding rejects any byte string that is not the canonical encoding
//!
//! ## Canonical CBOR Rules
//!
//! - Map entries are sorted by encoded key (length-first, then bytewise)
//! - Integers and lengths use the shortest head
//! - No indefinite-length items
//! - No floats, byte strings or tags
//!
//! ## Usage
//!
//! ```
//! use bag_codec::{to_canonical_cbor, from_cbor, Value};
//!
//! let value = Value::map(vec![(Value::text("label"), Value::text("Person"))]);
//! let bytes = to_canonical_cbor(&value);
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Types with a canonical CBOR representation.
pub trait Encode {
    /// Convert to a CBOR value.
    fn to_value(&self) -> Value;

    /// Encode to canonical CBOR bytes.
    fn encode(&self) -> Vec<u8> {
        to_canonical_cbor(&self.to_value())
    }
}

/// Types that can be rebuilt from a CBOR value.
pub trait Decode: Sized {
    /// Rebuild from a decoded CBOR value.
    fn from_value(value: &Value) -> CodecResult<Self>;

    /// Decode from canonical CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        Self::from_value(&from_cbor(bytes)?)
    }
}

impl Encode for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl Decode for Value {
    fn from_value(value: &Value) -> CodecResult<Self> {
        Ok(value.clone())
    }
}
