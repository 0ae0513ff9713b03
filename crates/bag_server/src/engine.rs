//! Replica commit engine.
//!
//! Every replica runs the same deterministic state machine on the frames its
//! agreement layer delivers:
//!
//! ```text
//! Idle -> Validating -> Applying -> Settled(Commit)
//!              |            |
//!              +------------+-----> Settled(Abort)
//! ```
//!
//! Ordered commits are serialized on the backend write lock, so two commits
//! never interleave against one backend. Reads share the read lock and never
//! change replica state.

use bag_core::{CoreResult, EntityKind, GraphBackend, Operand, Timestamp, TransactionState, WriteBatch};
use bag_protocol::{
    peek_tag, CommitResponse, Delivery, ReadResponse, Request, RequestTag, Verdict,
};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use tracing::{debug, info, warn};

/// Where the engine is in processing a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No commit has been processed yet.
    Idle,
    /// Checking the read set against the backend.
    Validating,
    /// Applying the write sets.
    Applying,
    /// The last commit settled with this verdict.
    Settled(Verdict),
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => f.write_str("idle"),
            EngineState::Validating => f.write_str("validating"),
            EngineState::Applying => f.write_str("applying"),
            EngineState::Settled(verdict) => write!(f, "settled({verdict})"),
        }
    }
}

/// Why a transaction aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A value in the read set is no longer current.
    ValidationConflict,
    /// The backend rejected or failed the batch.
    BackendFailure(String),
    /// A commit arrived without ordering.
    UnorderedCommit,
    /// The frame could not be decoded.
    MalformedFrame(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::ValidationConflict => f.write_str("read set no longer current"),
            AbortReason::BackendFailure(message) => write!(f, "backend failure: {message}"),
            AbortReason::UnorderedCommit => f.write_str("commit delivered without ordering"),
            AbortReason::MalformedFrame(message) => write!(f, "malformed frame: {message}"),
        }
    }
}

/// Result of processing one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// The verdict.
    pub verdict: Verdict,
    /// Set when the verdict is [`Verdict::Abort`].
    pub reason: Option<AbortReason>,
}

impl CommitOutcome {
    fn commit() -> Self {
        Self {
            verdict: Verdict::Commit,
            reason: None,
        }
    }

    fn abort(reason: AbortReason) -> Self {
        Self {
            verdict: Verdict::Abort,
            reason: Some(reason),
        }
    }
}

/// Reply to a delivered frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Encoded reply for the agreement layer.
    pub reply: Vec<u8>,
    /// Verdict, for frames that were commits.
    pub verdict: Option<Verdict>,
}

/// Counters describing an engine's activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Transactions committed.
    pub commits: u64,
    /// Transactions aborted, for any reason.
    pub aborts: u64,
    /// Aborts caused by read-set validation.
    pub validation_conflicts: u64,
    /// Aborts caused by the backend.
    pub backend_failures: u64,
    /// Frames that could not be decoded.
    pub malformed_frames: u64,
    /// Read requests answered.
    pub reads_served: u64,
    /// Highest timestamp of a committed transaction.
    pub highest_committed: Timestamp,
}

/// Validates and applies agreed transactions against one backend.
pub struct ReplicaCommitEngine {
    backend: RwLock<Box<dyn GraphBackend>>,
    state: Mutex<EngineState>,
    stats: Mutex<EngineStats>,
}

impl ReplicaCommitEngine {
    /// Creates an engine over a started backend.
    pub fn new(backend: Box<dyn GraphBackend>) -> Self {
        Self {
            backend: RwLock::new(backend),
            state: Mutex::new(EngineState::Idle),
            stats: Mutex::new(EngineStats::default()),
        }
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Activity counters.
    pub fn stats(&self) -> EngineStats {
        *self.stats.lock()
    }

    /// Highest timestamp of a committed transaction.
    pub fn highest_committed(&self) -> Timestamp {
        self.stats.lock().highest_committed
    }

    /// Returns true if the backend is running.
    pub fn backend_running(&self) -> bool {
        self.backend.read().is_running()
    }

    /// Replaces the backend, starting the new one and terminating the old.
    pub fn set_backend(&self, mut backend: Box<dyn GraphBackend>) -> CoreResult<()> {
        backend.start()?;
        let mut old = std::mem::replace(&mut *self.backend.write(), backend);
        if let Err(err) = old.terminate() {
            warn!(error = %err, "failed to terminate replaced backend");
        }
        info!(kind = %self.backend.read().kind(), "backend replaced");
        Ok(())
    }

    /// Terminates the backend. Later commits abort and reads return nothing.
    pub fn shutdown(&self) -> CoreResult<()> {
        self.backend.write().terminate()
    }

    /// Handles one delivered frame and produces the reply.
    ///
    /// Never fails: undecodable frames get an abort verdict, or an empty
    /// read reply if their tag says they were reads.
    pub fn execute(&self, frame: &[u8], delivery: Delivery) -> Execution {
        match Request::decode(frame) {
            Ok(Request::Commit(txn)) => {
                let outcome = match delivery {
                    Delivery::Ordered => self.commit(&txn),
                    Delivery::Unordered => {
                        warn!(timestamp = %txn.timestamp(), "commit delivered without ordering rejected");
                        self.settle(&txn, CommitOutcome::abort(AbortReason::UnorderedCommit))
                    }
                };
                self.commit_reply(outcome.verdict)
            }
            Ok(Request::Read {
                timestamp,
                identifier,
            }) => Execution {
                reply: self.read(&identifier, timestamp).encode(),
                verdict: None,
            },
            Err(err) => {
                warn!(error = %err, ?delivery, "undecodable frame");
                self.stats.lock().malformed_frames += 1;
                match peek_tag(frame) {
                    Some(RequestTag::NodeRead) => self.empty_read(EntityKind::Node),
                    Some(RequestTag::RelationshipRead) => self.empty_read(EntityKind::Relationship),
                    Some(RequestTag::Commit) | None => {
                        self.record_abort(&AbortReason::MalformedFrame(err.to_string()));
                        self.commit_reply(Verdict::Abort)
                    }
                }
            }
        }
    }

    /// Validates the read set and applies the write sets of `txn`.
    ///
    /// A transaction with all eight sets empty commits without touching the
    /// backend.
    pub fn commit(&self, txn: &TransactionState) -> CommitOutcome {
        if txn.is_empty() {
            debug!(timestamp = %txn.timestamp(), "empty transaction");
            return self.settle(txn, CommitOutcome::commit());
        }

        let mut backend = self.backend.write();
        self.set_state(EngineState::Validating);
        let reads = (txn.nodes().reads(), txn.relationships().reads());
        match backend.verify_read_set(reads.0, reads.1) {
            Ok(true) => {}
            Ok(false) => {
                return self.settle(txn, CommitOutcome::abort(AbortReason::ValidationConflict))
            }
            Err(err) => {
                return self.settle(
                    txn,
                    CommitOutcome::abort(AbortReason::BackendFailure(err.to_string())),
                )
            }
        }

        self.set_state(EngineState::Applying);
        let batch = WriteBatch::from_transaction(txn);
        if !batch.is_empty() {
            if let Err(err) = backend.execute(&batch) {
                return self.settle(
                    txn,
                    CommitOutcome::abort(AbortReason::BackendFailure(err.to_string())),
                );
            }
        }
        self.settle(txn, CommitOutcome::commit())
    }

    /// Resolves `identifier` as of `timestamp`. Backend errors yield an
    /// empty result.
    pub fn read(&self, identifier: &Operand, timestamp: Timestamp) -> ReadResponse {
        let results = match self.backend.read().read(identifier, timestamp) {
            Ok(results) => results,
            Err(err) => {
                warn!(identifier = %identifier, error = %err, "read failed");
                Vec::new()
            }
        };
        let highest = {
            let mut stats = self.stats.lock();
            stats.reads_served += 1;
            stats.highest_committed
        };
        debug!(identifier = %identifier, %timestamp, results = results.len(), "read served");
        ReadResponse::new(identifier.kind(), results, highest)
    }

    fn empty_read(&self, kind: EntityKind) -> Execution {
        Execution {
            reply: ReadResponse::empty(kind, self.highest_committed()).encode(),
            verdict: None,
        }
    }

    fn commit_reply(&self, verdict: Verdict) -> Execution {
        Execution {
            reply: CommitResponse::new(verdict, self.highest_committed()).encode(),
            verdict: Some(verdict),
        }
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock() = state;
    }

    fn record_abort(&self, reason: &AbortReason) {
        let mut stats = self.stats.lock();
        stats.aborts += 1;
        match reason {
            AbortReason::ValidationConflict => stats.validation_conflicts += 1,
            AbortReason::BackendFailure(_) => stats.backend_failures += 1,
            AbortReason::UnorderedCommit | AbortReason::MalformedFrame(_) => {}
        }
    }

    fn settle(&self, txn: &TransactionState, outcome: CommitOutcome) -> CommitOutcome {
        match &outcome.reason {
            None => {
                let mut stats = self.stats.lock();
                stats.commits += 1;
                stats.highest_committed = stats.highest_committed.max(txn.timestamp());
            }
            Some(reason) => {
                self.record_abort(reason);
                info!(timestamp = %txn.timestamp(), %reason, "transaction aborted");
            }
        }
        self.set_state(EngineState::Settled(outcome.verdict));
        debug!(timestamp = %txn.timestamp(), verdict = %outcome.verdict, "transaction settled");
        outcome
    }
}

impl fmt::Debug for ReplicaCommitEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicaCommitEngine")
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bag_core::{InMemoryGraph, NodeStorage};
    use bag_testkit::fixtures::{self, alice, bob, knows};

    fn engine() -> ReplicaCommitEngine {
        ReplicaCommitEngine::new(Box::new(fixtures::seeded_graph("engine")))
    }

    fn read_nodes(engine: &ReplicaCommitEngine, pattern: NodeStorage, ts: i64) -> Vec<Operand> {
        engine.read(&pattern.into(), Timestamp::new(ts)).results
    }

    fn observed(engine: &ReplicaCommitEngine, node: NodeStorage) -> Operand {
        read_nodes(engine, node, 1).remove(0)
    }

    #[test]
    fn empty_transaction_commits_without_backend() {
        let mut graph = InMemoryGraph::new("stopped");
        graph.terminate().unwrap();
        let engine = ReplicaCommitEngine::new(Box::new(graph));

        let outcome = engine.commit(&TransactionState::new(Timestamp::new(3)));
        assert_eq!(outcome.verdict, Verdict::Commit);
        assert_eq!(engine.state(), EngineState::Settled(Verdict::Commit));
    }

    #[test]
    fn new_engine_is_idle() {
        assert_eq!(engine().state(), EngineState::Idle);
    }

    #[test]
    fn valid_transaction_commits() {
        let engine = engine();
        let mut txn = TransactionState::new(Timestamp::new(2));
        txn.record_read(observed(&engine, alice()));
        txn.update(alice().into(), alice().with_property("age", 30).into())
            .unwrap();

        assert_eq!(engine.commit(&txn), CommitOutcome::commit());
        assert_eq!(read_nodes(&engine, alice().with_property("age", 30), 2).len(), 1);
        assert_eq!(engine.highest_committed(), Timestamp::new(2));
        assert_eq!(engine.stats().commits, 1);
    }

    #[test]
    fn stale_read_aborts_without_side_effects() {
        let engine = engine();
        let stale = observed(&engine, alice());

        let mut first = TransactionState::new(Timestamp::new(2));
        first
            .update(alice().into(), alice().with_property("age", 30).into())
            .unwrap();
        assert_eq!(engine.commit(&first).verdict, Verdict::Commit);

        let mut second = TransactionState::new(Timestamp::new(2));
        second.record_read(stale);
        second.create(NodeStorage::new("Audit").into()).unwrap();
        second.delete(bob().into());

        let outcome = engine.commit(&second);
        assert_eq!(outcome.reason, Some(AbortReason::ValidationConflict));
        assert!(read_nodes(&engine, NodeStorage::new("Audit"), 9).is_empty());
        assert_eq!(read_nodes(&engine, bob(), 9).len(), 1);
        assert_eq!(engine.stats().validation_conflicts, 1);
    }

    #[test]
    fn stale_relationship_read_aborts() {
        let engine = engine();
        let stale = engine.read(&knows().into(), Timestamp::new(1)).results.remove(0);

        let mut first = TransactionState::new(Timestamp::new(2));
        first
            .update(knows().into(), knows().with_property("since", 2021).into())
            .unwrap();
        assert_eq!(engine.commit(&first).verdict, Verdict::Commit);

        let mut second = TransactionState::new(Timestamp::new(3));
        second.record_read(stale);
        second.delete(knows().into());

        let outcome = engine.commit(&second);
        assert_eq!(outcome.reason, Some(AbortReason::ValidationConflict));
        let remaining = engine.read(&knows().into(), Timestamp::new(9)).results;
        assert_eq!(remaining.len(), 1);
        assert_eq!(engine.highest_committed(), Timestamp::new(2));
    }

    #[test]
    fn backend_failure_aborts() {
        let engine = engine();
        let mut txn = TransactionState::new(Timestamp::new(2));
        txn.update(
            NodeStorage::new("Ghost").into(),
            NodeStorage::new("Ghost").with_property("x", 1).into(),
        )
        .unwrap();

        let outcome = engine.commit(&txn);
        assert!(matches!(outcome.reason, Some(AbortReason::BackendFailure(_))));
        assert_eq!(engine.stats().backend_failures, 1);
        assert_eq!(engine.highest_committed(), Timestamp::ZERO);
    }

    #[test]
    fn terminated_backend_aborts_commits() {
        let engine = engine();
        engine.shutdown().unwrap();
        assert!(!engine.backend_running());

        let mut txn = TransactionState::new(Timestamp::new(2));
        txn.create(alice().into()).unwrap();
        assert_eq!(engine.commit(&txn).verdict, Verdict::Abort);
        assert!(read_nodes(&engine, alice(), 2).is_empty());
    }

    #[test]
    fn snapshot_reads() {
        let engine = engine();
        let mut txn = TransactionState::new(Timestamp::new(5));
        txn.create(fixtures::person("Dave").into()).unwrap();
        engine.commit(&txn);

        assert!(read_nodes(&engine, fixtures::person("Dave"), 4).is_empty());
        assert_eq!(read_nodes(&engine, fixtures::person("Dave"), 5).len(), 1);
    }

    #[test]
    fn execute_dispatches_frames() {
        let engine = engine();
        let mut txn = TransactionState::new(Timestamp::new(2));
        txn.create(fixtures::person("Erin").into()).unwrap();
        let frame = Request::Commit(txn).encode();

        let execution = engine.execute(&frame, Delivery::Ordered);
        assert_eq!(execution.verdict, Some(Verdict::Commit));
        let reply = CommitResponse::decode(&execution.reply).unwrap();
        assert_eq!(reply, CommitResponse::new(Verdict::Commit, Timestamp::new(2)));

        let read = Request::read(knows().into(), Timestamp::new(2)).encode();
        let execution = engine.execute(&read, Delivery::Unordered);
        assert_eq!(execution.verdict, None);
        let reply = ReadResponse::decode(&execution.reply).unwrap();
        assert_eq!(reply.kind, EntityKind::Relationship);
        assert_eq!(reply.results.len(), 1);
    }

    #[test]
    fn unordered_commit_is_rejected() {
        let engine = engine();
        let mut txn = TransactionState::new(Timestamp::new(2));
        txn.create(fixtures::person("Frank").into()).unwrap();

        let execution = engine.execute(&Request::Commit(txn).encode(), Delivery::Unordered);
        assert_eq!(execution.verdict, Some(Verdict::Abort));
        assert!(read_nodes(&engine, fixtures::person("Frank"), 9).is_empty());
    }

    #[test]
    fn malformed_frames_get_safe_replies() {
        let engine = engine();

        let execution = engine.execute(&[0xff, 0x00], Delivery::Ordered);
        assert_eq!(execution.verdict, Some(Verdict::Abort));

        // [1, 5]: node read tag, missing identifier
        let execution = engine.execute(&[0x82, 0x01, 0x05], Delivery::Unordered);
        assert_eq!(execution.verdict, None);
        let reply = ReadResponse::decode(&execution.reply).unwrap();
        assert_eq!(reply.kind, EntityKind::Node);
        assert!(reply.results.is_empty());
        assert_eq!(engine.stats().malformed_frames, 2);
    }

    #[test]
    fn same_frame_same_verdict_on_every_replica() {
        let replicas = [engine(), engine()];
        let stale = observed(&replicas[0], alice());
        for replica in &replicas {
            let mut txn = TransactionState::new(Timestamp::new(2));
            txn.update(alice().into(), alice().with_property("age", 1).into())
                .unwrap();
            replica.commit(&txn);
        }

        let mut txn = TransactionState::new(Timestamp::new(3));
        txn.record_read(stale);
        txn.create(fixtures::person("Gina").into()).unwrap();
        let frame = Request::Commit(txn).encode();

        let verdicts: Vec<_> = replicas
            .iter()
            .map(|replica| replica.execute(&frame, Delivery::Ordered).verdict)
            .collect();
        assert_eq!(verdicts, vec![Some(Verdict::Abort), Some(Verdict::Abort)]);
    }

    #[test]
    fn set_backend_swaps_in_started_backend() {
        let engine = engine();
        engine
            .set_backend(Box::new(InMemoryGraph::new("fresh")))
            .unwrap();
        assert!(engine.backend_running());
        assert!(read_nodes(&engine, alice(), 9).is_empty());
    }
}
