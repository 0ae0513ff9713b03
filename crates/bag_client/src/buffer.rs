//! Per-transaction write buffer.

use crate::error::ClientResult;
use bag_core::{Operand, Timestamp, TransactionState};
use tracing::{debug, warn};

/// Accumulates one transaction's reads and writes until commit.
#[derive(Debug, Clone)]
pub struct TransactionBuffer {
    state: TransactionState,
}

impl TransactionBuffer {
    /// Creates an empty buffer for a transaction at `timestamp`.
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            state: TransactionState::new(timestamp),
        }
    }

    /// Buffers a write.
    ///
    /// - no identifier and no value: nothing happens
    /// - no identifier: `value` is created
    /// - no value: `identifier` is deleted, discarding pending writes to it
    /// - both: `identifier` is updated to `value`; kinds must agree
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Rejected`] for cross-kind updates and
    /// for writes to an identifier deleted earlier in the transaction. A
    /// rejected write leaves the buffer unchanged.
    pub fn write(&mut self, identifier: Option<Operand>, value: Option<Operand>) -> ClientResult<()> {
        let result = match (identifier, value) {
            (None, None) => {
                debug!(timestamp = %self.state.timestamp(), "write without identifier or value ignored");
                return Ok(());
            }
            (None, Some(value)) => {
                debug!(value = %value, "buffer create");
                self.state.create(value)
            }
            (Some(identifier), None) => {
                debug!(identifier = %identifier, "buffer delete");
                self.state.delete(identifier);
                Ok(())
            }
            (Some(identifier), Some(value)) => {
                debug!(identifier = %identifier, value = %value, "buffer update");
                self.state.update(identifier, value)
            }
        };
        if let Err(err) = &result {
            warn!(timestamp = %self.state.timestamp(), error = %err, "write rejected");
        }
        Ok(result?)
    }

    /// Folds entities returned by a read into the read set.
    pub fn record_reads(&mut self, observed: impl IntoIterator<Item = Operand>) {
        for entity in observed {
            self.state.record_read(entity);
        }
    }

    /// Returns true if no update, delete or create is buffered.
    pub fn is_read_only(&self) -> bool {
        self.state.is_read_only()
    }

    /// Returns true if nothing at all is buffered.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Timestamp of the buffered transaction.
    pub fn timestamp(&self) -> Timestamp {
        self.state.timestamp()
    }

    /// The buffered transaction.
    pub fn state(&self) -> &TransactionState {
        &self.state
    }

    /// Hands out the buffered transaction and starts a new, empty one at
    /// `next`.
    pub fn take(&mut self, next: Timestamp) -> TransactionState {
        std::mem::replace(&mut self.state, TransactionState::new(next))
    }
}
