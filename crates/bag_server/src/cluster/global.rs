//! Bridge from a local cluster's primary into the global cluster.

use super::{ConsensusFabric, GroupSession, ReplicaExecutor, Tier, GLOBAL_GROUP_ID};
use crate::engine::ReplicaCommitEngine;
use crate::error::{ServerError, ServerResult};
use bag_protocol::{CommitResponse, ConsensusTransport, Delivery, Verdict};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

type FrameDigest = [u8; 32];

fn digest(frame: &[u8]) -> FrameDigest {
    Sha256::digest(frame).into()
}

/// Where frames forwarded by other clusters are applied.
enum Inbound {
    /// Global-only replica: straight into the engine.
    Engine,
    /// Primary: re-broadcast through its local group.
    LocalGroup {
        cluster_id: u32,
        group: Arc<dyn ConsensusTransport>,
    },
}

struct GlobalExecutor {
    member_id: u32,
    engine: Arc<ReplicaCommitEngine>,
    inbound: Inbound,
    /// Frames this process forwarded and already applied locally, with the
    /// reply the local group produced.
    forwarded: Mutex<HashMap<FrameDigest, Vec<u8>>>,
    /// Foreign frames currently being re-broadcast into the local group.
    relaying: Mutex<HashSet<FrameDigest>>,
}

impl GlobalExecutor {
    fn relay(
        &self,
        key: FrameDigest,
        cluster_id: u32,
        group: &dyn ConsensusTransport,
        frame: &[u8],
    ) -> Vec<u8> {
        self.relaying.lock().insert(key);
        let result = group.broadcast_ordered(frame);
        self.relaying.lock().remove(&key);
        match result {
            Ok(reply) => {
                debug!(member = self.member_id, cluster = cluster_id, "foreign frame relayed");
                reply
            }
            Err(err) => {
                warn!(
                    member = self.member_id,
                    cluster = cluster_id,
                    error = %err,
                    "foreign frame could not be relayed to local cluster"
                );
                CommitResponse::new(Verdict::Abort, self.engine.highest_committed()).encode()
            }
        }
    }
}

impl ReplicaExecutor for GlobalExecutor {
    fn execute_ordered(&self, frame: &[u8]) -> Vec<u8> {
        let key = digest(frame);
        if let Some(reply) = self.forwarded.lock().remove(&key) {
            debug!(member = self.member_id, "own forwarded frame delivered");
            return reply;
        }
        match &self.inbound {
            Inbound::Engine => {
                let execution = self.engine.execute(frame, Delivery::Ordered);
                debug!(member = self.member_id, verdict = ?execution.verdict, "foreign frame applied");
                execution.reply
            }
            Inbound::LocalGroup { cluster_id, group } => {
                self.relay(key, *cluster_id, group.as_ref(), frame)
            }
        }
    }

    fn execute_unordered(&self, frame: &[u8]) -> Vec<u8> {
        self.engine.execute(frame, Delivery::Unordered).reply
    }
}

/// Member of the global cluster, held only while this process is its local
/// cluster's primary.
pub struct GlobalClusterReplica {
    member_id: u32,
    session: Box<dyn GroupSession>,
    executor: Arc<GlobalExecutor>,
    terminated: AtomicBool,
}

impl GlobalClusterReplica {
    /// Joins the global group as `member_id`.
    ///
    /// Frames forwarded by other clusters are re-broadcast into local group
    /// `local_cluster`, or applied to `engine` directly for a global-only
    /// replica.
    pub fn start(
        fabric: &dyn ConsensusFabric,
        member_id: u32,
        engine: Arc<ReplicaCommitEngine>,
        local_cluster: Option<u32>,
    ) -> ServerResult<Self> {
        let inbound = match local_cluster {
            Some(cluster_id) => Inbound::LocalGroup {
                cluster_id,
                group: fabric.client(Tier::Local, cluster_id),
            },
            None => Inbound::Engine,
        };
        let executor = Arc::new(GlobalExecutor {
            member_id,
            engine,
            inbound,
            forwarded: Mutex::new(HashMap::new()),
            relaying: Mutex::new(HashSet::new()),
        });
        let session = fabric.join(
            Tier::Global,
            GLOBAL_GROUP_ID,
            member_id,
            Arc::clone(&executor) as Arc<dyn ReplicaExecutor>,
        )?;
        info!(member = member_id, "joined global cluster");
        Ok(Self {
            member_id,
            session,
            executor,
            terminated: AtomicBool::new(false),
        })
    }

    /// Global member id.
    pub fn member_id(&self) -> u32 {
        self.member_id
    }

    /// Returns true once [`terminate`](Self::terminate) was called.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Number of forwarded frames not yet delivered back by the global
    /// group.
    pub fn pending_forwards(&self) -> usize {
        self.executor.forwarded.lock().len()
    }

    /// Submits a locally committed frame to the global group.
    ///
    /// `local_reply` is what this process answers when the global group
    /// delivers the frame back. A frame this replica is relaying from the
    /// global group is not sent back; `local_reply` is returned as is. There
    /// is no rollback: a failure here leaves the local commit in place.
    pub fn forward(&self, frame: &[u8], local_reply: &[u8]) -> ServerResult<Vec<u8>> {
        if self.is_terminated() {
            return Err(ServerError::invalid_state(format!(
                "global replica {} is terminated",
                self.member_id
            )));
        }
        let key = digest(frame);
        if self.executor.relaying.lock().contains(&key) {
            debug!(member = self.member_id, "relayed frame not forwarded again");
            return Ok(local_reply.to_vec());
        }
        self.executor
            .forwarded
            .lock()
            .insert(key, local_reply.to_vec());
        match self.session.broadcast_ordered(frame) {
            Ok(reply) => {
                debug!(member = self.member_id, bytes = frame.len(), "frame forwarded");
                Ok(reply)
            }
            Err(err) => {
                self.executor.forwarded.lock().remove(&key);
                Err(ServerError::forwarding(err.to_string()))
            }
        }
    }

    /// Leaves the global group. Calling it again is a no-op.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.session.leave();
        info!(member = self.member_id, "left global cluster");
    }
}

impl Drop for GlobalClusterReplica {
    fn drop(&mut self) {
        if !self.is_terminated() {
            warn!(member = self.member_id, "global replica dropped without terminate");
            self.terminate();
        }
    }
}

impl std::fmt::Debug for GlobalClusterReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalClusterReplica")
            .field("member_id", &self.member_id)
            .field("terminated", &self.is_terminated())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::LoopbackFabric;
    use bag_core::{Timestamp, TransactionState};
    use bag_protocol::{CommitResponse, ConsensusTransport, Request, Verdict};
    use bag_testkit::fixtures::{self, alice};

    fn engine(instance: &str) -> Arc<ReplicaCommitEngine> {
        Arc::new(ReplicaCommitEngine::new(Box::new(fixtures::empty_graph(
            instance,
        ))))
    }

    fn create_alice(ts: i64) -> Vec<u8> {
        let mut txn = TransactionState::new(Timestamp::new(ts));
        txn.create(alice().into()).unwrap();
        Request::Commit(txn).encode()
    }

    fn alice_count(engine: &ReplicaCommitEngine) -> usize {
        engine
            .read(&alice().into(), Timestamp::new(i64::MAX))
            .results
            .len()
    }

    #[test]
    fn forwarded_frames_are_not_reapplied_locally() {
        let fabric = LoopbackFabric::new();
        let mine = engine("mine");
        let theirs = engine("theirs");
        let a = GlobalClusterReplica::start(&fabric, 1, Arc::clone(&mine), None).unwrap();
        let _b = GlobalClusterReplica::start(&fabric, 2, Arc::clone(&theirs), None).unwrap();

        let frame = create_alice(1);
        let local = mine.execute(&frame, Delivery::Ordered);
        let reply = a.forward(&frame, &local.reply).unwrap();

        assert_eq!(
            CommitResponse::decode(&reply).unwrap().verdict,
            Verdict::Commit
        );
        assert_eq!(alice_count(&mine), 1);
        assert_eq!(alice_count(&theirs), 1);
        assert_eq!(a.pending_forwards(), 0);
    }

    #[test]
    fn failed_forward_is_reported_and_forgotten() {
        let fabric = LoopbackFabric::new();
        let a = GlobalClusterReplica::start(&fabric, 1, engine("a"), None).unwrap();
        let _b = GlobalClusterReplica::start(&fabric, 2, engine("b"), None).unwrap();

        // Member 2 aborts because it never saw the transaction the read set
        // refers to, so the two replies split.
        let mut txn = TransactionState::new(Timestamp::new(2));
        let observed = alice().with_property("hash", "00");
        txn.record_read(observed.into());
        txn.create(fixtures::bob().into()).unwrap();
        let frame = Request::Commit(txn).encode();
        let local = CommitResponse::new(Verdict::Commit, Timestamp::new(2)).encode();

        let err = a.forward(&frame, &local).unwrap_err();
        assert!(matches!(err, ServerError::Forwarding { .. }));
        assert_eq!(a.pending_forwards(), 0);
    }

    #[test]
    fn terminate_leaves_group() {
        let fabric = LoopbackFabric::new();
        let a = GlobalClusterReplica::start(&fabric, 4, engine("a"), None).unwrap();
        assert_eq!(fabric.members(Tier::Global, GLOBAL_GROUP_ID), vec![4]);

        a.terminate();
        a.terminate();
        assert!(a.is_terminated());
        assert!(fabric.members(Tier::Global, GLOBAL_GROUP_ID).is_empty());
        assert!(matches!(
            a.forward(&create_alice(1), &[]),
            Err(ServerError::InvalidState { .. })
        ));
    }

    #[test]
    fn drop_leaves_group() {
        let fabric = LoopbackFabric::new();
        drop(GlobalClusterReplica::start(&fabric, 5, engine("a"), None).unwrap());
        assert!(fabric.members(Tier::Global, GLOBAL_GROUP_ID).is_empty());
    }

    #[test]
    fn unordered_reads_use_engine() {
        let fabric = LoopbackFabric::new();
        let mine = engine("mine");
        mine.execute(&create_alice(1), Delivery::Ordered);
        let _a = GlobalClusterReplica::start(&fabric, 1, mine, None).unwrap();

        let read = Request::read(alice().into(), Timestamp::new(1)).encode();
        let reply = fabric
            .transport(Tier::Global, GLOBAL_GROUP_ID)
            .broadcast_unordered(&read)
            .unwrap();
        let reply = bag_protocol::ReadResponse::decode(&reply).unwrap();
        assert_eq!(reply.results.len(), 1);
    }
}
