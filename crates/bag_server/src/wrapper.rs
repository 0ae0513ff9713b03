//! Per-process replica host.
//!
//! A [`ServerWrapper`] owns the backend, the commit engine and the
//! process's memberships: the local cluster always, the global cluster
//! only while primary. The role is swapped as one value on promotion and
//! demotion so forwarding decisions always see a consistent handle.

use crate::cluster::{ConsensusFabric, GlobalClusterReplica, LocalClusterReplica, ReplicaRole};
use crate::config::{MembershipRecord, ServerConfig};
use crate::engine::ReplicaCommitEngine;
use crate::error::{ServerError, ServerResult};
use bag_core::open_backend;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Hosts one replica process.
pub struct ServerWrapper {
    config: ServerConfig,
    fabric: Arc<dyn ConsensusFabric>,
    engine: Arc<ReplicaCommitEngine>,
    role: Arc<RwLock<ReplicaRole>>,
    transition: Mutex<()>,
    local: Mutex<Option<LocalClusterReplica>>,
    known_leader: AtomicU32,
    terminated: AtomicBool,
}

impl ServerWrapper {
    /// Opens the configured backend and joins the replica groups.
    ///
    /// The local group is joined unconditionally (unless the replica is
    /// global-only); the global group only if `config.is_primary`.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error for an unknown backend name or an
    /// inconsistent configuration, and with the fabric's error if a group
    /// cannot be joined.
    pub fn start(config: ServerConfig, fabric: Arc<dyn ConsensusFabric>) -> ServerResult<Self> {
        config.validate()?;
        let kind = config.backend_kind()?;
        let backend = open_backend(kind.name(), &backend_instance(&config))?;
        let engine = Arc::new(ReplicaCommitEngine::new(backend));
        let role = Arc::new(RwLock::new(ReplicaRole::Follower));

        let local = match config.local_cluster_id {
            Some(cluster_id) => Some(LocalClusterReplica::start(
                fabric.as_ref(),
                cluster_id,
                config.global_server_id,
                Arc::clone(&engine),
                Arc::clone(&role),
            )?),
            None => None,
        };

        let known_leader = if config.is_primary {
            config.global_server_id
        } else {
            config.initial_leader_id
        };
        let wrapper = Self {
            known_leader: AtomicU32::new(known_leader),
            config,
            fabric,
            engine,
            role,
            transition: Mutex::new(()),
            local: Mutex::new(local),
            terminated: AtomicBool::new(false),
        };
        if wrapper.config.is_primary {
            wrapper.promote_to_primary()?;
        }
        info!(
            id = wrapper.config.global_server_id,
            backend = %kind,
            local_cluster = ?wrapper.config.local_cluster_id,
            primary = wrapper.is_primary(),
            "replica started"
        );
        Ok(wrapper)
    }

    /// Restarts a replica from a persisted membership record.
    pub fn recover(
        path: impl AsRef<Path>,
        fabric: Arc<dyn ConsensusFabric>,
        logging: bool,
    ) -> ServerResult<Self> {
        let path = path.as_ref();
        let record = MembershipRecord::load(path)?;
        info!(path = %path.display(), id = record.global_server_id, primary = record.is_primary, "recovering replica");
        Self::start(record.to_config(logging), fabric)
    }

    /// Persists the current membership so [`recover`](Self::recover) can
    /// re-derive the role.
    pub fn persist(&self, path: impl AsRef<Path>) -> ServerResult<()> {
        self.membership().save(path)
    }

    /// Current membership.
    pub fn membership(&self) -> MembershipRecord {
        MembershipRecord {
            is_primary: self.is_primary(),
            initial_leader_id: self.known_leader(),
            ..MembershipRecord::from(&self.config)
        }
    }

    /// Joins the global cluster. Does nothing if already primary.
    pub fn promote_to_primary(&self) -> ServerResult<()> {
        self.ensure_running()?;
        // The role lock is not held while joining: deliveries in flight read
        // the role.
        let _transition = self.transition.lock();
        if self.is_primary() {
            return Ok(());
        }
        info!(id = self.config.global_server_id, "Turn on global cluster");
        let global = GlobalClusterReplica::start(
            self.fabric.as_ref(),
            self.config.global_server_id,
            Arc::clone(&self.engine),
            self.config.local_cluster_id,
        )?;
        *self.role.write() = ReplicaRole::Primary {
            global: Arc::new(global),
        };
        self.known_leader
            .store(self.config.global_server_id, Ordering::SeqCst);
        Ok(())
    }

    /// Leaves the global cluster and stays a local member.
    ///
    /// # Errors
    ///
    /// A global-only replica cannot be demoted.
    pub fn demote(&self) -> ServerResult<()> {
        self.ensure_running()?;
        if self.config.local_cluster_id.is_none() {
            return Err(ServerError::invalid_state(
                "a global-only replica cannot leave the global cluster",
            ));
        }
        self.terminate_global();
        Ok(())
    }

    /// Drops the global replica handle, if any.
    pub fn terminate_global(&self) {
        let _transition = self.transition.lock();
        let previous = std::mem::take(&mut *self.role.write());
        if let ReplicaRole::Primary { global } = previous {
            global.terminate();
            info!(id = self.config.global_server_id, "Turn off global cluster");
        }
    }

    /// Records a leader announcement, promoting or demoting as needed.
    pub fn observe_leader(&self, leader_id: u32) -> ServerResult<()> {
        self.ensure_running()?;
        let previous = self.known_leader.swap(leader_id, Ordering::SeqCst);
        if previous != leader_id {
            info!(id = self.config.global_server_id, leader = leader_id, "new leader observed");
        }
        if self.config.local_cluster_id.is_none() {
            return Ok(());
        }
        if leader_id == self.config.global_server_id {
            self.promote_to_primary()
        } else if self.is_primary() {
            self.demote()
        } else {
            Ok(())
        }
    }

    /// Leaves and re-joins the local cluster.
    pub fn restart_local(&self) -> ServerResult<()> {
        self.ensure_running()?;
        let cluster_id = self.config.local_cluster_id.ok_or_else(|| {
            ServerError::invalid_state("a global-only replica has no local cluster")
        })?;
        let mut local = self.local.lock();
        if let Some(replica) = local.take() {
            replica.terminate();
        }
        *local = Some(LocalClusterReplica::start(
            self.fabric.as_ref(),
            cluster_id,
            self.config.global_server_id,
            Arc::clone(&self.engine),
            Arc::clone(&self.role),
        )?);
        info!(id = self.config.global_server_id, cluster = cluster_id, "local replica restarted");
        Ok(())
    }

    /// Replaces the backend with a freshly opened one, e.g. after it shut
    /// down unexpectedly.
    pub fn set_backend(&self) -> ServerResult<()> {
        self.ensure_running()?;
        let kind = self.config.backend_kind()?;
        self.engine
            .set_backend(kind.open(&backend_instance(&self.config)))?;
        Ok(())
    }

    /// Leaves all groups and stops the backend. Calling it again is a
    /// no-op.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.terminate_global();
        if let Some(local) = self.local.lock().take() {
            local.terminate();
        }
        if let Err(err) = self.engine.shutdown() {
            warn!(error = %err, "backend did not shut down cleanly");
        }
        info!(id = self.config.global_server_id, "replica terminated");
    }

    /// Startup configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The commit engine.
    pub fn engine(&self) -> &Arc<ReplicaCommitEngine> {
        &self.engine
    }

    /// Snapshot of the current role.
    pub fn role(&self) -> ReplicaRole {
        self.role.read().clone()
    }

    /// Returns true while holding the global replica.
    pub fn is_primary(&self) -> bool {
        self.role.read().is_primary()
    }

    /// Most recently observed leader.
    pub fn known_leader(&self) -> u32 {
        self.known_leader.load(Ordering::SeqCst)
    }

    /// Returns true while the process is a local cluster member.
    pub fn is_local_member(&self) -> bool {
        self.local.lock().is_some()
    }

    /// Returns true after [`terminate`](Self::terminate).
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> ServerResult<()> {
        if self.is_terminated() {
            return Err(ServerError::invalid_state(format!(
                "replica {} is terminated",
                self.config.global_server_id
            )));
        }
        Ok(())
    }
}

impl Drop for ServerWrapper {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for ServerWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerWrapper")
            .field("config", &self.config)
            .field("role", &self.role())
            .field("known_leader", &self.known_leader())
            .field("terminated", &self.is_terminated())
            .finish_non_exhaustive()
    }
}

fn backend_instance(config: &ServerConfig) -> String {
    format!("{}-{}", config.instance, config.global_server_id)
}
