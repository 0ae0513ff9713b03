//! The BAG client.

use crate::buffer::TransactionBuffer;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use bag_core::{Operand, Timestamp, TransactionState};
use bag_protocol::{CommitResponse, ConsensusTransport, ReadResponse, Request, Verdict};
use tracing::{debug, info, warn};

/// Counters describing a client's activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Transactions that committed.
    pub commits: u64,
    /// Transactions that aborted.
    pub aborts: u64,
    /// Commits settled locally without ordering.
    pub local_commits: u64,
    /// Read requests sent.
    pub reads: u64,
}

/// A client that buffers one transaction at a time and commits it through a
/// replica group.
///
/// The client keeps a logical clock. Each transaction reads at `clock + 1`,
/// and every reply moves the clock up to the replica's highest committed
/// timestamp.
pub struct BagClient<T: ConsensusTransport> {
    config: ClientConfig,
    transport: T,
    clock: Timestamp,
    buffer: TransactionBuffer,
    stats: ClientStats,
}

impl<T: ConsensusTransport> BagClient<T> {
    /// Creates a client talking through `transport`.
    pub fn new(config: ClientConfig, transport: T) -> Self {
        let clock = config.initial_timestamp;
        Self {
            buffer: TransactionBuffer::new(clock.next()),
            config,
            transport,
            clock,
            stats: ClientStats::default(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Enables or disables secure mode.
    pub fn set_secure_mode(&mut self, secure_mode: bool) {
        self.config.secure_mode = secure_mode;
    }

    /// Timestamp of the open transaction.
    pub fn timestamp(&self) -> Timestamp {
        self.buffer.timestamp()
    }

    /// Highest timestamp this client has learned of.
    pub fn clock(&self) -> Timestamp {
        self.clock
    }

    /// The open transaction's buffered state.
    pub fn pending(&self) -> &TransactionState {
        self.buffer.state()
    }

    /// Returns the activity counters.
    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    /// Buffers a write. See [`TransactionBuffer::write`].
    pub fn write(&mut self, identifier: Option<Operand>, value: Option<Operand>) -> ClientResult<()> {
        self.buffer.write(identifier, value)
    }

    /// Buffers creation of `value`.
    pub fn create(&mut self, value: impl Into<Operand>) -> ClientResult<()> {
        self.write(None, Some(value.into()))
    }

    /// Buffers replacing `identifier` with `value`.
    pub fn update(&mut self, identifier: impl Into<Operand>, value: impl Into<Operand>) -> ClientResult<()> {
        self.write(Some(identifier.into()), Some(value.into()))
    }

    /// Buffers deletion of `identifier`.
    pub fn delete(&mut self, identifier: impl Into<Operand>) -> ClientResult<()> {
        self.write(Some(identifier.into()), None)
    }

    /// Reads `identifier` from the replica group as of the open
    /// transaction's timestamp.
    ///
    /// The read is not buffered; it is sent immediately and every returned
    /// entity is recorded in the read set for validation at commit.
    pub fn read(&mut self, identifier: impl Into<Operand>) -> ClientResult<Vec<Operand>> {
        let identifier = identifier.into();
        let kind = identifier.kind();
        let frame = Request::read(identifier, self.buffer.timestamp()).encode();

        self.stats.reads += 1;
        let reply = self.transport.broadcast_unordered(&frame)?;
        let response = ReadResponse::decode(&reply)?;
        if response.kind != kind {
            return Err(ClientError::UnexpectedReplyKind {
                expected: kind,
                found: response.kind,
            });
        }
        self.observe(response.timestamp);

        debug!(
            client = self.config.client_id,
            timestamp = %self.buffer.timestamp(),
            results = response.results.len(),
            "read resolved"
        );
        self.buffer.record_reads(response.results.iter().cloned());
        Ok(response.results)
    }

    /// Commits the open transaction and starts the next one.
    ///
    /// A transaction with nothing but reads commits without contacting the
    /// replicas unless secure mode is on. Otherwise the whole transaction
    /// is sent as one ordered request and the agreed verdict is returned.
    /// The transaction is consumed either way; it is never resent.
    pub fn commit(&mut self) -> ClientResult<Verdict> {
        if self.buffer.is_read_only() && !self.config.secure_mode {
            let txn = self.buffer.take(self.clock.next());
            self.stats.local_commits += 1;
            self.stats.commits += 1;
            info!(
                client = self.config.client_id,
                timestamp = %txn.timestamp(),
                "read-only transaction committed locally"
            );
            return Ok(Verdict::Commit);
        }

        let txn = self.buffer.take(self.clock.next());
        let frame = Request::Commit(txn.clone()).encode();
        let response = match self
            .transport
            .broadcast_ordered(&frame)
            .map_err(ClientError::from)
            .and_then(|reply| CommitResponse::decode(&reply).map_err(ClientError::from))
        {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    client = self.config.client_id,
                    timestamp = %txn.timestamp(),
                    error = %err,
                    "commit failed"
                );
                return Err(err);
            }
        };

        self.observe(response.timestamp);
        self.observe(txn.timestamp());
        self.buffer = TransactionBuffer::new(self.clock.next());

        match response.verdict {
            Verdict::Commit => self.stats.commits += 1,
            Verdict::Abort => self.stats.aborts += 1,
        }
        info!(
            client = self.config.client_id,
            timestamp = %txn.timestamp(),
            verdict = %response.verdict,
            "transaction settled"
        );
        Ok(response.verdict)
    }

    /// Advances the clock. The open transaction keeps its timestamp unless
    /// it is still empty.
    fn observe(&mut self, timestamp: Timestamp) {
        if timestamp > self.clock {
            self.clock = timestamp;
            if self.buffer.is_empty() {
                self.buffer = TransactionBuffer::new(self.clock.next());
            }
        }
    }
}
