//! Error types for the client.

use bag_core::{CoreError, EntityKind};
use bag_protocol::ProtocolError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while buffering or committing a transaction.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request could not be sent or its reply could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The transaction refused a write.
    #[error("write rejected: {0}")]
    Rejected(#[from] CoreError),

    /// A read reply describes entities of another kind than requested.
    #[error("read of a {expected} returned {found} results")]
    UnexpectedReplyKind {
        /// Kind that was read.
        expected: EntityKind,
        /// Kind of the reply.
        found: EntityKind,
    },
}

impl ClientError {
    /// Returns true if the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Protocol(err) => err.is_retryable(),
            Self::Rejected(_) | Self::UnexpectedReplyKind { .. } => false,
        }
    }

    /// Returns true if the error was raised locally, before anything was
    /// sent to the replica group.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let err = ClientError::from(ProtocolError::transport_retryable("timeout"));
        assert!(err.is_retryable());
        assert!(!err.is_local());

        let err = ClientError::from(CoreError::KindMismatch {
            identifier: EntityKind::Node,
            value: EntityKind::Relationship,
        });
        assert!(!err.is_retryable());
        assert!(err.is_local());
    }
}
