//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended before a complete item was read.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Bytes remain after the top-level item.
    #[error("{remaining} trailing bytes after top-level item")]
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },

    /// Indefinite-length items are not canonical.
    #[error("indefinite-length items are forbidden")]
    IndefiniteLengthForbidden,

    /// A CBOR construct this codec does not carry (floats, byte strings, tags).
    #[error("unsupported CBOR item: {item}")]
    UnsupportedItem {
        /// Short description of the rejected item.
        item: String,
    },

    /// The encoding is valid CBOR but not in canonical form.
    #[error("non-canonical encoding: {message}")]
    NonCanonical {
        /// What rule was violated.
        message: String,
    },

    /// Text string is not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// A length prefix exceeds the configured limit.
    #[error("length {claimed} exceeds limit of {max_allowed}")]
    SizeLimitExceeded {
        /// Length claimed by the input.
        claimed: u64,
        /// Largest length accepted.
        max_allowed: u64,
    },

    /// Unsigned integer does not fit in an `i64`.
    #[error("integer overflow")]
    IntegerOverflow,

    /// The value decoded but does not have the expected shape.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create a non-canonical error.
    pub fn non_canonical(message: impl Into<String>) -> Self {
        Self::NonCanonical {
            message: message.into(),
        }
    }

    /// Create an unsupported item error.
    pub fn unsupported(item: impl Into<String>) -> Self {
        Self::UnsupportedItem { item: item.into() }
    }
}
