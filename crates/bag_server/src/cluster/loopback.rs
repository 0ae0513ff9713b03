//! In-process consensus fabric.
//!
//! Runs whole replica groups inside one process. Ordered frames are
//! delivered to every member in member id order, so all members see the
//! same total order. The reply returned to the caller is the one a strict
//! majority of members produced.
//!
//! Ordered deliveries of all groups share one reentrant lock. A member may
//! broadcast into another group from inside a delivery (forwarding to the
//! global cluster, relaying back into a local one) on the same thread, and
//! no two threads can hold group locks in opposite orders.

use super::{ConsensusFabric, GroupSession, ReplicaExecutor, Tier};
use crate::error::ServerResult;
use bag_protocol::{ConsensusTransport, Delivery, ProtocolError, ProtocolResult};
use parking_lot::{ReentrantMutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

type GroupKey = (Tier, u32);

#[derive(Default)]
struct Group {
    members: RwLock<BTreeMap<u32, Arc<dyn ReplicaExecutor>>>,
}

impl Group {
    fn members(&self) -> Vec<Arc<dyn ReplicaExecutor>> {
        self.members.read().values().cloned().collect()
    }

    /// Ordered frames must be delivered under the fabric's order lock.
    fn deliver(&self, key: GroupKey, frame: &[u8], delivery: Delivery) -> ProtocolResult<Vec<u8>> {
        let replies: Vec<Vec<u8>> = match delivery {
            Delivery::Ordered => self
                .members()
                .iter()
                .map(|member| member.execute_ordered(frame))
                .collect(),
            Delivery::Unordered => self
                .members()
                .iter()
                .map(|member| member.execute_unordered(frame))
                .collect(),
        };
        if replies.is_empty() {
            return Err(ProtocolError::transport_retryable(format!(
                "{} group {} has no members",
                key.0, key.1
            )));
        }
        debug!(tier = %key.0, group = key.1, ?delivery, replies = replies.len(), "frame delivered");
        majority(replies).ok_or_else(|| {
            warn!(tier = %key.0, group = key.1, ?delivery, "replicas disagree");
            ProtocolError::transport_fatal("no reply reached a majority")
        })
    }
}

fn majority(replies: Vec<Vec<u8>>) -> Option<Vec<u8>> {
    let total = replies.len();
    let mut votes: HashMap<Vec<u8>, usize> = HashMap::new();
    for reply in replies {
        *votes.entry(reply).or_default() += 1;
    }
    votes
        .into_iter()
        .find(|(_, count)| count * 2 > total)
        .map(|(reply, _)| reply)
}

#[derive(Default)]
struct FabricInner {
    order: ReentrantMutex<()>,
    groups: RwLock<HashMap<GroupKey, Arc<Group>>>,
}

/// Deterministic consensus fabric for running clusters in one process.
#[derive(Clone, Default)]
pub struct LoopbackFabric {
    inner: Arc<FabricInner>,
}

impl LoopbackFabric {
    /// Creates a fabric with no groups.
    pub fn new() -> Self {
        Self::default()
    }

    /// A client-side transport submitting frames to a group.
    pub fn transport(&self, tier: Tier, group_id: u32) -> LoopbackTransport {
        LoopbackTransport {
            fabric: self.clone(),
            key: (tier, group_id),
        }
    }

    /// Ids of the current members of a group, ascending.
    pub fn members(&self, tier: Tier, group_id: u32) -> Vec<u32> {
        self.group(&(tier, group_id))
            .map(|group| group.members.read().keys().copied().collect())
            .unwrap_or_default()
    }

    fn group(&self, key: &GroupKey) -> Option<Arc<Group>> {
        self.inner.groups.read().get(key).cloned()
    }

    fn deliver(&self, key: GroupKey, frame: &[u8], delivery: Delivery) -> ProtocolResult<Vec<u8>> {
        match self.group(&key) {
            Some(group) if delivery == Delivery::Ordered => {
                let _order = self.inner.order.lock();
                group.deliver(key, frame, delivery)
            }
            Some(group) => group.deliver(key, frame, delivery),
            None => Err(ProtocolError::transport_retryable(format!(
                "{} group {} does not exist",
                key.0, key.1
            ))),
        }
    }
}

impl ConsensusFabric for LoopbackFabric {
    fn join(
        &self,
        tier: Tier,
        group_id: u32,
        member_id: u32,
        executor: Arc<dyn ReplicaExecutor>,
    ) -> ServerResult<Box<dyn GroupSession>> {
        let key = (tier, group_id);
        // Joining waits for in-flight ordered deliveries.
        let _order = self.inner.order.lock();
        let group = Arc::clone(self.inner.groups.write().entry(key).or_default());
        group.members.write().insert(member_id, executor);
        debug!(%tier, group = group_id, member = member_id, "member joined");
        Ok(Box::new(LoopbackSession {
            transport: self.transport(tier, group_id),
            member_id,
            left: AtomicBool::new(false),
        }))
    }

    fn client(&self, tier: Tier, group_id: u32) -> Arc<dyn ConsensusTransport> {
        Arc::new(self.transport(tier, group_id))
    }
}

impl std::fmt::Debug for LoopbackFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let groups: Vec<GroupKey> = self.inner.groups.read().keys().copied().collect();
        f.debug_struct("LoopbackFabric").field("groups", &groups).finish()
    }
}

/// Client-side access to one loopback group.
#[derive(Clone, Debug)]
pub struct LoopbackTransport {
    fabric: LoopbackFabric,
    key: GroupKey,
}

impl ConsensusTransport for LoopbackTransport {
    fn broadcast_ordered(&self, frame: &[u8]) -> ProtocolResult<Vec<u8>> {
        self.fabric.deliver(self.key, frame, Delivery::Ordered)
    }

    fn broadcast_unordered(&self, frame: &[u8]) -> ProtocolResult<Vec<u8>> {
        self.fabric.deliver(self.key, frame, Delivery::Unordered)
    }
}

/// Membership of one replica in a loopback group.
#[derive(Debug)]
pub struct LoopbackSession {
    transport: LoopbackTransport,
    member_id: u32,
    left: AtomicBool,
}

impl LoopbackSession {
    /// The member id this session joined with.
    pub fn member_id(&self) -> u32 {
        self.member_id
    }
}

impl ConsensusTransport for LoopbackSession {
    fn broadcast_ordered(&self, frame: &[u8]) -> ProtocolResult<Vec<u8>> {
        if self.left.load(Ordering::SeqCst) {
            return Err(ProtocolError::NotConnected);
        }
        self.transport.broadcast_ordered(frame)
    }

    fn broadcast_unordered(&self, frame: &[u8]) -> ProtocolResult<Vec<u8>> {
        if self.left.load(Ordering::SeqCst) {
            return Err(ProtocolError::NotConnected);
        }
        self.transport.broadcast_unordered(frame)
    }
}

impl GroupSession for LoopbackSession {
    fn leave(&self) {
        if self.left.swap(true, Ordering::SeqCst) {
            return;
        }
        let (tier, group_id) = self.transport.key;
        let fabric = &self.transport.fabric;
        if let Some(group) = fabric.group(&self.transport.key) {
            let _order = fabric.inner.order.lock();
            group.members.write().remove(&self.member_id);
        }
        debug!(%tier, group = group_id, member = self.member_id, "member left");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    struct Echo {
        reply: Vec<u8>,
        ordered: AtomicUsize,
        log: Arc<Mutex<Vec<u32>>>,
        id: u32,
    }

    impl Echo {
        fn new(id: u32, reply: &[u8], log: &Arc<Mutex<Vec<u32>>>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_vec(),
                ordered: AtomicUsize::new(0),
                log: Arc::clone(log),
                id,
            })
        }
    }

    impl ReplicaExecutor for Echo {
        fn execute_ordered(&self, _frame: &[u8]) -> Vec<u8> {
            self.ordered.fetch_add(1, Ordering::SeqCst);
            self.log.lock().push(self.id);
            self.reply.clone()
        }

        fn execute_unordered(&self, frame: &[u8]) -> Vec<u8> {
            let mut reply = self.reply.clone();
            reply.extend_from_slice(frame);
            reply
        }
    }

    #[test]
    fn ordered_delivery_reaches_members_in_id_order() {
        let fabric = LoopbackFabric::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut sessions = Vec::new();
        for id in [3, 1, 2] {
            sessions.push(fabric.join(Tier::Local, 7, id, Echo::new(id, b"ok", &log)).unwrap());
        }

        let reply = fabric.transport(Tier::Local, 7).broadcast_ordered(b"x").unwrap();
        assert_eq!(reply, b"ok");
        assert_eq!(*log.lock(), vec![1, 2, 3]);
        assert_eq!(fabric.members(Tier::Local, 7), vec![1, 2, 3]);
    }

    /// Passes every ordered frame on to another group.
    struct Relay {
        target: Arc<dyn ConsensusTransport>,
    }

    impl ReplicaExecutor for Relay {
        fn execute_ordered(&self, frame: &[u8]) -> Vec<u8> {
            self.target.broadcast_ordered(frame).unwrap_or_default()
        }

        fn execute_unordered(&self, _frame: &[u8]) -> Vec<u8> {
            Vec::new()
        }
    }

    #[test]
    fn members_may_broadcast_into_other_groups() {
        let fabric = LoopbackFabric::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _inner = fabric.join(Tier::Local, 2, 9, Echo::new(9, b"inner", &log)).unwrap();
        let relay = Arc::new(Relay {
            target: fabric.client(Tier::Local, 2),
        });
        let _outer = fabric.join(Tier::Global, 0, 1, relay).unwrap();

        let reply = fabric.transport(Tier::Global, 0).broadcast_ordered(b"x").unwrap();
        assert_eq!(reply, b"inner");
        assert_eq!(*log.lock(), vec![9]);
    }

    #[test]
    fn majority_reply_wins() {
        let fabric = LoopbackFabric::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = fabric.join(Tier::Local, 1, 1, Echo::new(1, b"good", &log)).unwrap();
        let _b = fabric.join(Tier::Local, 1, 2, Echo::new(2, b"good", &log)).unwrap();
        let _c = fabric.join(Tier::Local, 1, 3, Echo::new(3, b"evil", &log)).unwrap();

        let reply = fabric.transport(Tier::Local, 1).broadcast_ordered(b"").unwrap();
        assert_eq!(reply, b"good");
    }

    #[test]
    fn split_replies_fail() {
        let fabric = LoopbackFabric::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = fabric.join(Tier::Local, 1, 1, Echo::new(1, b"a", &log)).unwrap();
        let _b = fabric.join(Tier::Local, 1, 2, Echo::new(2, b"b", &log)).unwrap();

        let err = fabric
            .transport(Tier::Local, 1)
            .broadcast_ordered(b"")
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn unordered_delivery() {
        let fabric = LoopbackFabric::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let echo = Echo::new(1, b"r:", &log);
        let _session = fabric.join(Tier::Global, 0, 1, echo.clone()).unwrap();

        let reply = fabric
            .transport(Tier::Global, 0)
            .broadcast_unordered(b"q")
            .unwrap();
        assert_eq!(reply, b"r:q");
        assert_eq!(echo.ordered.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_or_empty_group_is_retryable() {
        let fabric = LoopbackFabric::new();
        let err = fabric
            .transport(Tier::Local, 9)
            .broadcast_ordered(b"")
            .unwrap_err();
        assert!(err.is_retryable());

        let log = Arc::new(Mutex::new(Vec::new()));
        let session = fabric.join(Tier::Local, 9, 1, Echo::new(1, b"", &log)).unwrap();
        session.leave();
        session.leave();
        assert!(fabric.members(Tier::Local, 9).is_empty());
        assert!(fabric
            .transport(Tier::Local, 9)
            .broadcast_ordered(b"")
            .unwrap_err()
            .is_retryable());
        assert!(matches!(
            session.broadcast_ordered(b""),
            Err(ProtocolError::NotConnected)
        ));
    }

    #[test]
    fn tiers_are_separate_groups() {
        let fabric = LoopbackFabric::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _local = fabric.join(Tier::Local, 0, 1, Echo::new(1, b"", &log)).unwrap();
        assert!(fabric.members(Tier::Global, 0).is_empty());
        assert_eq!(fabric.members(Tier::Local, 0), vec![1]);
    }
}
