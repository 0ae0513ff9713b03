//! Consensus transport abstraction.

use crate::error::{ProtocolError, ProtocolResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// How a frame is delivered to a replica group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// Delivered to every replica in one agreed total order.
    Ordered,
    /// Delivered to each replica independently.
    Unordered,
}

/// Access to a Byzantine agreement primitive.
///
/// Both calls block until the group produced the reply the agreement layer
/// settled on for this frame.
pub trait ConsensusTransport: Send + Sync {
    /// Broadcasts `frame` through the ordering protocol and waits for the
    /// decided reply.
    fn broadcast_ordered(&self, frame: &[u8]) -> ProtocolResult<Vec<u8>>;

    /// Broadcasts `frame` without ordering and waits for a reply.
    fn broadcast_unordered(&self, frame: &[u8]) -> ProtocolResult<Vec<u8>>;
}

/// A mock transport for testing.
///
/// Replies with canned bytes and records every frame it was given.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    ordered_reply: Mutex<Option<Vec<u8>>>,
    unordered_reply: Mutex<Option<Vec<u8>>>,
    sent: Mutex<Vec<(Delivery, Vec<u8>)>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a connected mock with no replies set.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ordered_reply: Mutex::new(None),
            unordered_reply: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Sets the reply to ordered broadcasts.
    pub fn set_ordered_reply(&self, reply: Vec<u8>) {
        *self.ordered_reply.lock() = Some(reply);
    }

    /// Sets the reply to unordered broadcasts.
    pub fn set_unordered_reply(&self, reply: Vec<u8>) {
        *self.unordered_reply.lock() = Some(reply);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Frames sent through [`ConsensusTransport::broadcast_ordered`].
    pub fn sent_ordered(&self) -> Vec<Vec<u8>> {
        self.sent_with(Delivery::Ordered)
    }

    /// Frames sent through [`ConsensusTransport::broadcast_unordered`].
    pub fn sent_unordered(&self) -> Vec<Vec<u8>> {
        self.sent_with(Delivery::Unordered)
    }

    fn sent_with(&self, delivery: Delivery) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .iter()
            .filter(|(d, _)| *d == delivery)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    fn send(
        &self,
        delivery: Delivery,
        frame: &[u8],
        reply: &Mutex<Option<Vec<u8>>>,
    ) -> ProtocolResult<Vec<u8>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ProtocolError::NotConnected);
        }
        self.sent.lock().push((delivery, frame.to_vec()));
        reply
            .lock()
            .clone()
            .ok_or_else(|| ProtocolError::transport_fatal("no mock reply set"))
    }
}

impl ConsensusTransport for MockTransport {
    fn broadcast_ordered(&self, frame: &[u8]) -> ProtocolResult<Vec<u8>> {
        self.send(Delivery::Ordered, frame, &self.ordered_reply)
    }

    fn broadcast_unordered(&self, frame: &[u8]) -> ProtocolResult<Vec<u8>> {
        self.send(Delivery::Unordered, frame, &self.unordered_reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_records_frames() {
        let transport = MockTransport::new();
        transport.set_ordered_reply(vec![1]);
        transport.set_unordered_reply(vec![2]);

        assert_eq!(transport.broadcast_ordered(b"a").unwrap(), vec![1]);
        assert_eq!(transport.broadcast_unordered(b"b").unwrap(), vec![2]);
        assert_eq!(transport.sent_ordered(), vec![b"a".to_vec()]);
        assert_eq!(transport.sent_unordered(), vec![b"b".to_vec()]);
    }

    #[test]
    fn mock_without_reply_fails() {
        let transport = MockTransport::new();
        let err = transport.broadcast_ordered(b"a").unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn disconnected_mock_sends_nothing() {
        let transport = MockTransport::new();
        transport.set_ordered_reply(vec![1]);
        transport.set_connected(false);

        assert!(matches!(
            transport.broadcast_ordered(b"a"),
            Err(ProtocolError::NotConnected)
        ));
        assert!(transport.sent_ordered().is_empty());
    }
}
