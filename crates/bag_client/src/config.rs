//! Configuration for the client.

use bag_core::Timestamp;

/// Configuration for a [`crate::BagClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Identifier of this client within the replica group.
    pub client_id: u32,
    /// Send read-only transactions through ordering too, so their reads are
    /// validated by the replicas.
    pub secure_mode: bool,
    /// Clock value to start from; the first transaction uses the next one.
    pub initial_timestamp: Timestamp,
}

impl ClientConfig {
    /// Creates a configuration for `client_id`.
    pub fn new(client_id: u32) -> Self {
        Self {
            client_id,
            secure_mode: false,
            initial_timestamp: Timestamp::ZERO,
        }
    }

    /// Sets secure mode.
    pub fn with_secure_mode(mut self, secure_mode: bool) -> Self {
        self.secure_mode = secure_mode;
        self
    }

    /// Sets the initial clock value.
    pub fn with_initial_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.initial_timestamp = timestamp;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let config = ClientConfig::new(7)
            .with_secure_mode(true)
            .with_initial_timestamp(Timestamp::new(10));
        assert_eq!(config.client_id, 7);
        assert!(config.secure_mode);
        assert_eq!(config.initial_timestamp, Timestamp::new(10));
        assert!(!ClientConfig::default().secure_mode);
    }
}
