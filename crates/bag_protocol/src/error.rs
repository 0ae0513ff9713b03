//! Error types for the wire protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while framing requests or talking to a replica
/// group.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame bytes are not valid canonical CBOR or have the wrong shape.
    #[error("codec error: {0}")]
    Codec(#[from] bag_codec::CodecError),

    /// Decoded sets violate a transaction invariant.
    #[error("invalid transaction: {0}")]
    Transaction(#[from] bag_core::CoreError),

    /// Unknown message tag.
    #[error("unknown message tag {0}")]
    UnknownTag(i64),

    /// A read frame carries an identifier of the wrong kind for its tag.
    #[error("{tag} frame carries a {found} identifier")]
    TagKindMismatch {
        /// Tag of the frame.
        tag: crate::RequestTag,
        /// Kind of the identifier found.
        found: bag_core::EntityKind,
    },

    /// The agreement layer could not deliver the request.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the request can be retried.
        retryable: bool,
    },

    /// The transport has been closed.
    #[error("not connected to a replica group")]
    NotConnected,
}

impl ProtocolError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if sending the same frame again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                retryable: true,
                ..
            } | Self::NotConnected
        )
    }

    /// Returns true if the frame itself was malformed.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(
            self,
            Self::Codec(_) | Self::Transaction(_) | Self::UnknownTag(_) | Self::TagKindMismatch { .. }
        )
    }
}
