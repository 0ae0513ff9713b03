//! Two-tier cluster hierarchy.
//!
//! Every process is a member of its local cluster's replica group. While it
//! is its cluster's primary it is also a member of the global group, which
//! holds one primary per local cluster:
//!
//! ```text
//!            global group (0)
//!        +---------+---------+
//!        |                   |
//!   primary A            primary B
//!   local group 1        local group 2
//!   A, A', A''           B, B', B''
//! ```
//!
//! Transactions agreed in a local group are forwarded, byte for byte, into
//! the global group by the primary only. When the global group delivers a
//! transaction forwarded by another cluster, each primary re-broadcasts it
//! into its own local group so every local member applies it in the same
//! order.

mod global;
mod local;
mod loopback;

pub use global::GlobalClusterReplica;
pub use local::LocalClusterReplica;
pub use loopback::{LoopbackFabric, LoopbackSession, LoopbackTransport};

use crate::error::ServerResult;
use bag_protocol::ConsensusTransport;
use std::fmt;
use std::sync::Arc;

/// Group identifier of the global cluster.
pub const GLOBAL_GROUP_ID: u32 = 0;

/// Tier of a replica group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// A local cluster.
    Local,
    /// The global cluster of primaries.
    Global,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Local => f.write_str("local"),
            Tier::Global => f.write_str("global"),
        }
    }
}

/// Receives the frames a replica group delivers to one member.
pub trait ReplicaExecutor: Send + Sync {
    /// Handles a frame delivered in agreed order and returns the reply.
    fn execute_ordered(&self, frame: &[u8]) -> Vec<u8>;

    /// Handles a frame delivered without ordering and returns the reply.
    fn execute_unordered(&self, frame: &[u8]) -> Vec<u8>;
}

/// Membership of one replica in one group.
///
/// Broadcasting through a session submits frames to the group the member
/// belongs to.
pub trait GroupSession: ConsensusTransport {
    /// Leaves the group. Leaving twice is a no-op.
    fn leave(&self);
}

/// Access to the agreement layer that forms replica groups.
pub trait ConsensusFabric: Send + Sync {
    /// Joins `member_id` to group `group_id` of `tier`, delivering frames to
    /// `executor`.
    fn join(
        &self,
        tier: Tier,
        group_id: u32,
        member_id: u32,
        executor: Arc<dyn ReplicaExecutor>,
    ) -> ServerResult<Box<dyn GroupSession>>;

    /// A transport submitting frames to group `group_id` of `tier` as a
    /// client, without joining it.
    fn client(&self, tier: Tier, group_id: u32) -> Arc<dyn ConsensusTransport>;
}

/// Role of a process in its local cluster.
#[derive(Clone, Default)]
pub enum ReplicaRole {
    /// Applies local verdicts, forwards nothing.
    #[default]
    Follower,
    /// Holds the live bridge into the global cluster.
    Primary {
        /// The global replica.
        global: Arc<GlobalClusterReplica>,
    },
}

impl ReplicaRole {
    /// Returns true if this is the primary role.
    pub fn is_primary(&self) -> bool {
        matches!(self, ReplicaRole::Primary { .. })
    }

    /// The global replica, if primary.
    pub fn global(&self) -> Option<&Arc<GlobalClusterReplica>> {
        match self {
            ReplicaRole::Follower => None,
            ReplicaRole::Primary { global } => Some(global),
        }
    }
}

impl fmt::Debug for ReplicaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaRole::Follower => f.write_str("Follower"),
            ReplicaRole::Primary { global } => f
                .debug_struct("Primary")
                .field("member_id", &global.member_id())
                .finish(),
        }
    }
}
