//! Replica configuration and persisted membership.

use crate::error::{ServerError, ServerResult};
use bag_core::BackendKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Diagnostic printed when startup arguments cannot be used.
pub const INVALID_ARGUMENTS: &str = "Invalid program arguments, terminating server";

/// Local cluster id meaning "this replica only acts in the global cluster".
pub const GLOBAL_ONLY: i64 = -1;

/// Configuration of one replica process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Id of the replica in the global cluster; also its member id in the
    /// local cluster.
    pub global_server_id: u32,
    /// Backend name, e.g. `memory`.
    pub instance: String,
    /// Local cluster this replica belongs to, `None` for global-only.
    pub local_cluster_id: Option<u32>,
    /// Replica announced as leader at startup.
    pub initial_leader_id: u32,
    /// Whether the replica starts as its cluster's primary.
    pub is_primary: bool,
    /// Whether the process emits logs.
    pub logging: bool,
}

impl ServerConfig {
    /// Creates a follower configuration for `local_cluster_id`.
    pub fn new(global_server_id: u32, instance: impl Into<String>, local_cluster_id: u32) -> Self {
        Self {
            global_server_id,
            instance: instance.into(),
            local_cluster_id: Some(local_cluster_id),
            initial_leader_id: global_server_id,
            is_primary: false,
            logging: true,
        }
    }

    /// Sets the initial leader.
    pub fn with_initial_leader(mut self, leader_id: u32) -> Self {
        self.initial_leader_id = leader_id;
        self
    }

    /// Sets whether the replica starts as primary.
    pub fn with_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        self
    }

    /// Sets whether the process logs.
    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    /// Makes the replica global-only.
    pub fn global_only(mut self) -> Self {
        self.local_cluster_id = None;
        self
    }

    /// Parses positional arguments:
    /// `<global-id> <instance> <local-cluster-id> <leader-id> [primary] [logging]`.
    ///
    /// `primary` and `logging` are true only when spelled `true` (any
    /// case); logging defaults to on. A local cluster id of `-1` makes the
    /// replica global-only.
    ///
    /// # Errors
    ///
    /// Returns a configuration error carrying [`INVALID_ARGUMENTS`] when
    /// fewer than four arguments are given or a numeric argument does not
    /// parse.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> ServerResult<Self> {
        if args.len() < 4 {
            return Err(ServerError::configuration(INVALID_ARGUMENTS));
        }
        let global_server_id = parse_id(args[0].as_ref())?;
        let instance = args[1].as_ref().to_string();
        let local_cluster_id = parse_local_cluster(args[2].as_ref())?;
        let initial_leader_id = parse_id(args[3].as_ref())?;
        let is_primary = args.get(4).is_some_and(|s| parse_flag(s.as_ref()));
        let logging = args.get(5).map_or(true, |s| parse_flag(s.as_ref()));

        Ok(Self {
            global_server_id,
            instance,
            local_cluster_id,
            initial_leader_id,
            is_primary,
            logging,
        })
    }

    /// Resolves the backend named by `instance`.
    pub fn backend_kind(&self) -> ServerResult<BackendKind> {
        BackendKind::from_name(&self.instance).ok_or_else(|| {
            ServerError::configuration(format!("unknown backend `{}`", self.instance))
        })
    }

    /// Checks that the configuration describes a replica that can run.
    pub fn validate(&self) -> ServerResult<()> {
        self.backend_kind()?;
        if self.local_cluster_id.is_none() && !self.is_primary {
            return Err(ServerError::configuration(
                "a global-only replica must start as primary",
            ));
        }
        Ok(())
    }
}

fn parse_id(arg: &str) -> ServerResult<u32> {
    arg.trim()
        .parse()
        .map_err(|_| ServerError::configuration(INVALID_ARGUMENTS))
}

fn parse_local_cluster(arg: &str) -> ServerResult<Option<u32>> {
    let id: i64 = arg
        .trim()
        .parse()
        .map_err(|_| ServerError::configuration(INVALID_ARGUMENTS))?;
    if id == GLOBAL_ONLY {
        return Ok(None);
    }
    u32::try_from(id)
        .map(Some)
        .map_err(|_| ServerError::configuration(INVALID_ARGUMENTS))
}

fn parse_flag(arg: &str) -> bool {
    arg.trim().eq_ignore_ascii_case("true")
}

/// What a replica needs to re-derive its role after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    /// Id in the global cluster.
    pub global_server_id: u32,
    /// Backend name.
    pub instance: String,
    /// Whether the replica was primary when the record was written.
    pub is_primary: bool,
    /// Local cluster, `None` for global-only replicas.
    pub local_cluster_id: Option<u32>,
    /// Last known leader.
    pub initial_leader_id: u32,
}

impl MembershipRecord {
    /// Reads a record from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Writes the record as JSON, replacing the file.
    pub fn save(&self, path: impl AsRef<Path>) -> ServerResult<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Configuration to restart from this record.
    pub fn to_config(&self, logging: bool) -> ServerConfig {
        ServerConfig {
            global_server_id: self.global_server_id,
            instance: self.instance.clone(),
            local_cluster_id: self.local_cluster_id,
            initial_leader_id: self.initial_leader_id,
            is_primary: self.is_primary,
            logging,
        }
    }
}

impl From<&ServerConfig> for MembershipRecord {
    fn from(config: &ServerConfig) -> Self {
        Self {
            global_server_id: config.global_server_id,
            instance: config.instance.clone(),
            is_primary: config.is_primary,
            local_cluster_id: config.local_cluster_id,
            initial_leader_id: config.initial_leader_id,
        }
    }
}
