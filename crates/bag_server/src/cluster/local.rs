//! Member of a local cluster.

use super::{ConsensusFabric, GroupSession, ReplicaExecutor, ReplicaRole, Tier};
use crate::engine::ReplicaCommitEngine;
use crate::error::ServerResult;
use bag_protocol::{Delivery, Verdict};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct LocalExecutor {
    cluster_id: u32,
    engine: Arc<ReplicaCommitEngine>,
    role: Arc<RwLock<ReplicaRole>>,
}

impl LocalExecutor {
    fn forward(&self, frame: &[u8], reply: &[u8]) {
        // Clone the handle out so a promotion or demotion is not blocked on
        // the global broadcast.
        let Some(global) = self.role.read().global().cloned() else {
            return;
        };
        match global.forward(frame, reply) {
            Ok(_) => debug!(cluster = self.cluster_id, "commit forwarded to global cluster"),
            Err(err) => warn!(
                cluster = self.cluster_id,
                error = %err,
                "forwarding failure, local commit stands"
            ),
        }
    }
}

impl ReplicaExecutor for LocalExecutor {
    fn execute_ordered(&self, frame: &[u8]) -> Vec<u8> {
        let execution = self.engine.execute(frame, Delivery::Ordered);
        if execution.verdict == Some(Verdict::Commit) {
            self.forward(frame, &execution.reply);
        }
        execution.reply
    }

    fn execute_unordered(&self, frame: &[u8]) -> Vec<u8> {
        self.engine.execute(frame, Delivery::Unordered).reply
    }
}

/// Member of a local cluster's replica group.
///
/// Applies every agreed frame through the engine. While the shared role is
/// [`ReplicaRole::Primary`], committed frames are also forwarded verbatim to
/// the global cluster.
pub struct LocalClusterReplica {
    cluster_id: u32,
    member_id: u32,
    session: Box<dyn GroupSession>,
}

impl LocalClusterReplica {
    /// Joins local group `cluster_id` as `member_id`.
    pub fn start(
        fabric: &dyn ConsensusFabric,
        cluster_id: u32,
        member_id: u32,
        engine: Arc<ReplicaCommitEngine>,
        role: Arc<RwLock<ReplicaRole>>,
    ) -> ServerResult<Self> {
        let executor: Arc<dyn ReplicaExecutor> = Arc::new(LocalExecutor {
            cluster_id,
            engine,
            role,
        });
        let session = fabric.join(Tier::Local, cluster_id, member_id, executor)?;
        info!(cluster = cluster_id, member = member_id, "joined local cluster");
        Ok(Self {
            cluster_id,
            member_id,
            session,
        })
    }

    /// Local cluster id.
    pub fn cluster_id(&self) -> u32 {
        self.cluster_id
    }

    /// Member id within the local group.
    pub fn member_id(&self) -> u32 {
        self.member_id
    }

    /// Leaves the local group.
    pub fn terminate(&self) {
        self.session.leave();
        info!(cluster = self.cluster_id, member = self.member_id, "left local cluster");
    }
}

impl std::fmt::Debug for LocalClusterReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalClusterReplica")
            .field("cluster_id", &self.cluster_id)
            .field("member_id", &self.member_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{GlobalClusterReplica, LoopbackFabric, GLOBAL_GROUP_ID};
    use bag_core::{Timestamp, TransactionState};
    use bag_protocol::{CommitResponse, ConsensusTransport, Request};
    use bag_testkit::fixtures::{self, alice};

    fn engine(instance: &str) -> Arc<ReplicaCommitEngine> {
        Arc::new(ReplicaCommitEngine::new(Box::new(fixtures::empty_graph(
            instance,
        ))))
    }

    fn create(ts: i64, node: bag_core::NodeStorage) -> Vec<u8> {
        let mut txn = TransactionState::new(Timestamp::new(ts));
        txn.create(node.into()).unwrap();
        Request::Commit(txn).encode()
    }

    fn count(engine: &ReplicaCommitEngine, node: bag_core::NodeStorage) -> usize {
        engine
            .read(&node.into(), Timestamp::new(i64::MAX))
            .results
            .len()
    }

    #[test]
    fn followers_apply_without_forwarding() {
        let fabric = LoopbackFabric::new();
        let engines: Vec<_> = (0..3).map(|i| engine(&format!("f{i}"))).collect();
        let _replicas: Vec<_> = engines
            .iter()
            .enumerate()
            .map(|(i, engine)| {
                LocalClusterReplica::start(
                    &fabric,
                    1,
                    i as u32,
                    Arc::clone(engine),
                    Arc::new(RwLock::new(ReplicaRole::Follower)),
                )
                .unwrap()
            })
            .collect();

        let reply = fabric
            .transport(Tier::Local, 1)
            .broadcast_ordered(&create(1, alice()))
            .unwrap();
        assert_eq!(
            CommitResponse::decode(&reply).unwrap().verdict,
            Verdict::Commit
        );
        for engine in &engines {
            assert_eq!(count(engine, alice()), 1);
        }
        assert!(fabric.members(Tier::Global, GLOBAL_GROUP_ID).is_empty());
    }

    #[test]
    fn primary_forwards_committed_frames() {
        let fabric = LoopbackFabric::new();
        let local = engine("local");
        let remote = engine("remote");
        let global = Arc::new(GlobalClusterReplica::start(&fabric, 1, Arc::clone(&local), Some(1)).unwrap());
        let _remote = GlobalClusterReplica::start(&fabric, 2, Arc::clone(&remote), None).unwrap();
        let role = Arc::new(RwLock::new(ReplicaRole::Primary {
            global: Arc::clone(&global),
        }));
        let _replica = LocalClusterReplica::start(&fabric, 1, 1, Arc::clone(&local), role).unwrap();

        fabric
            .transport(Tier::Local, 1)
            .broadcast_ordered(&create(1, alice()))
            .unwrap();

        assert_eq!(count(&local, alice()), 1);
        assert_eq!(count(&remote, alice()), 1);
        assert_eq!(global.pending_forwards(), 0);
    }

    #[test]
    fn foreign_frames_reach_every_local_member() {
        let fabric = LoopbackFabric::new();
        let primary = engine("primary");
        let follower = engine("follower");
        let remote = engine("remote");
        let global =
            Arc::new(GlobalClusterReplica::start(&fabric, 1, Arc::clone(&primary), Some(1)).unwrap());
        let role = Arc::new(RwLock::new(ReplicaRole::Primary {
            global: Arc::clone(&global),
        }));
        let _a = LocalClusterReplica::start(&fabric, 1, 1, Arc::clone(&primary), role).unwrap();
        let _b = LocalClusterReplica::start(
            &fabric,
            1,
            2,
            Arc::clone(&follower),
            Arc::new(RwLock::new(ReplicaRole::Follower)),
        )
        .unwrap();
        let origin = GlobalClusterReplica::start(&fabric, 9, Arc::clone(&remote), None).unwrap();

        let frame = create(4, alice());
        let local_reply = remote.execute(&frame, Delivery::Ordered).reply;
        origin.forward(&frame, &local_reply).unwrap();

        assert_eq!(count(&primary, alice()), 1);
        assert_eq!(count(&follower, alice()), 1);
        assert_eq!(primary.highest_committed(), follower.highest_committed());
        assert_eq!(remote.stats().commits, 1);
        assert_eq!(global.pending_forwards(), 0);
        assert_eq!(origin.pending_forwards(), 0);
    }

    #[test]
    fn aborted_frames_are_not_forwarded() {
        let fabric = LoopbackFabric::new();
        let local = engine("local");
        let remote = engine("remote");
        let global = Arc::new(GlobalClusterReplica::start(&fabric, 1, Arc::clone(&local), Some(1)).unwrap());
        let _remote = GlobalClusterReplica::start(&fabric, 2, Arc::clone(&remote), None).unwrap();
        let role = Arc::new(RwLock::new(ReplicaRole::Primary { global }));
        let _replica = LocalClusterReplica::start(&fabric, 1, 1, local, role).unwrap();

        let mut txn = TransactionState::new(Timestamp::new(1));
        txn.update(alice().into(), alice().with_property("age", 1).into())
            .unwrap();
        let reply = fabric
            .transport(Tier::Local, 1)
            .broadcast_ordered(&Request::Commit(txn).encode())
            .unwrap();

        assert_eq!(CommitResponse::decode(&reply).unwrap().verdict, Verdict::Abort);
        assert_eq!(remote.stats().aborts, 0);
        assert_eq!(remote.stats().commits, 0);
    }

    #[test]
    fn forwarding_failure_keeps_local_commit() {
        let fabric = LoopbackFabric::new();
        let local = engine("local");
        let global = Arc::new(GlobalClusterReplica::start(&fabric, 1, Arc::clone(&local), Some(1)).unwrap());
        global.terminate();
        let role = Arc::new(RwLock::new(ReplicaRole::Primary { global }));
        let _replica = LocalClusterReplica::start(&fabric, 1, 1, Arc::clone(&local), role).unwrap();

        let reply = fabric
            .transport(Tier::Local, 1)
            .broadcast_ordered(&create(1, fixtures::bob()))
            .unwrap();
        assert_eq!(
            CommitResponse::decode(&reply).unwrap().verdict,
            Verdict::Commit
        );
        assert_eq!(count(&local, fixtures::bob()), 1);
    }

    #[test]
    fn terminate_leaves_local_group() {
        let fabric = LoopbackFabric::new();
        let replica = LocalClusterReplica::start(
            &fabric,
            3,
            8,
            engine("x"),
            Arc::new(RwLock::new(ReplicaRole::Follower)),
        )
        .unwrap();
        assert_eq!(replica.cluster_id(), 3);
        assert_eq!(replica.member_id(), 8);
        replica.terminate();
        assert!(fabric.members(Tier::Local, 3).is_empty());
    }
}
