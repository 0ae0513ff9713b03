//! # BAG Server
//!
//! Replica side of BAG, a Byzantine-replicated graph database.
//!
//! This crate provides:
//! - [`ReplicaCommitEngine`]: validates read sets and applies write sets of
//!   agreed transactions against a [`bag_core::GraphBackend`]
//! - The two-tier cluster hierarchy: [`LocalClusterReplica`],
//!   [`GlobalClusterReplica`] and the per-process [`ServerWrapper`]
//! - [`ConsensusFabric`], the seam to the agreement layer, and
//!   [`LoopbackFabric`], an in-process implementation
//! - [`ServerConfig`] and the persisted [`MembershipRecord`]
//!
//! # Example
//!
//! ```
//! use bag_server::{LoopbackFabric, ServerConfig, ServerWrapper};
//! use std::sync::Arc;
//!
//! let fabric = Arc::new(LoopbackFabric::new());
//! let config = ServerConfig::new(1, "memory", 1).with_primary(true);
//! let replica = ServerWrapper::start(config, fabric).unwrap();
//! assert!(replica.is_primary());
//! replica.terminate();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod cluster;
mod config;
mod engine;
mod error;
mod wrapper;

pub use cluster::{
    ConsensusFabric, GlobalClusterReplica, GroupSession, LocalClusterReplica, LoopbackFabric,
    LoopbackSession, LoopbackTransport, ReplicaExecutor, ReplicaRole, Tier, GLOBAL_GROUP_ID,
};
pub use config::{MembershipRecord, ServerConfig, GLOBAL_ONLY, INVALID_ARGUMENTS};
pub use engine::{
    AbortReason, CommitOutcome, EngineState, EngineStats, Execution, ReplicaCommitEngine,
};
pub use error::{ServerError, ServerResult};
pub use wrapper::ServerWrapper;
