//! Error types for replicas.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while running a replica.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Startup arguments or persisted membership are unusable.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// The storage backend failed outside of a transaction.
    #[error("backend error: {0}")]
    Backend(#[from] bag_core::CoreError),

    /// Frame or transport error.
    #[error("protocol error: {0}")]
    Protocol(#[from] bag_protocol::ProtocolError),

    /// A locally committed transaction could not be handed to the global
    /// tier. The local commit stands.
    #[error("forwarding to the global cluster failed: {message}")]
    Forwarding {
        /// Description of the failure.
        message: String,
    },

    /// The operation needs a state the replica is not in.
    #[error("invalid replica state: {message}")]
    InvalidState {
        /// Description of the problem.
        message: String,
    },

    /// Membership record could not be (de)serialized.
    #[error("membership record error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a forwarding error.
    pub fn forwarding(message: impl Into<String>) -> Self {
        Self::Forwarding {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Returns true if the replica must not start with this error.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ServerError::Configuration { .. }
                | ServerError::Backend(bag_core::CoreError::UnknownBackend { .. })
                | ServerError::Serialization(_)
        )
    }

    /// Returns true if repeating the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServerError::Protocol(err) => err.is_retryable(),
            ServerError::Forwarding { .. } | ServerError::Io(_) => true,
            _ => false,
        }
    }
}
