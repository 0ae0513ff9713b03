//! Error types for BAG core.

use crate::entity::EntityKind;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in BAG core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] bag_codec::CodecError),

    /// An operation mixed node and relationship operands.
    #[error("kind mismatch: cannot write a {value} value to a {identifier} identifier")]
    KindMismatch {
        /// Kind of the identifier.
        identifier: EntityKind,
        /// Kind of the value.
        value: EntityKind,
    },

    /// The storage engine rejected or failed a request.
    #[error("backend failure: {message}")]
    BackendFailure {
        /// Description of the failure.
        message: String,
    },

    /// The configured backend name is not known.
    #[error("unknown backend: {name}")]
    UnknownBackend {
        /// Name that was requested.
        name: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Create a backend failure error.
    pub fn backend_failure(message: impl Into<String>) -> Self {
        Self::BackendFailure {
            message: message.into(),
        }
    }

    /// Create an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if the error originates in the storage engine.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::BackendFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_mismatch_display() {
        let err = CoreError::KindMismatch {
            identifier: EntityKind::Node,
            value: EntityKind::Relationship,
        };
        assert_eq!(
            err.to_string(),
            "kind mismatch: cannot write a relationship value to a node identifier"
        );
    }

    #[test]
    fn classification() {
        assert!(CoreError::backend_failure("disk full").is_backend_failure());
        assert!(!CoreError::invalid_operation("closed").is_backend_failure());
    }
}
