//! Control loop of a running replica.

use bag_server::{ServerResult, ServerWrapper};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// A parsed control line.
#[derive(Debug, PartialEq, Eq)]
pub enum Control {
    /// A leader announcement.
    Leader(u32),
    /// Print the membership record.
    Status,
    /// Terminate the replica.
    Stop,
}

impl Control {
    /// Parses one line of control input. Anything unrecognized stops the
    /// replica.
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("leader"), Some(id), None) => id.parse().map_or(Control::Stop, Control::Leader),
            (Some("status"), None, None) => Control::Status,
            _ => Control::Stop,
        }
    }
}

/// Runs `replica` until a stop line, end of input or Ctrl-C, then persists
/// its membership to `state` (if given) and terminates it.
pub async fn run(
    replica: &ServerWrapper,
    state: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    persist(replica, state)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        match line.as_deref().map(Control::parse) {
            Some(Control::Leader(id)) => {
                if let Err(err) = replica.observe_leader(id) {
                    warn!(error = %err, leader = id, "leader announcement failed");
                }
                persist(replica, state)?;
            }
            Some(Control::Status) => {
                println!("{}", serde_json::to_string_pretty(&replica.membership())?);
            }
            Some(Control::Stop) | None => break,
        }
    }

    persist(replica, state)?;
    replica.terminate();
    info!("Server terminated");
    Ok(())
}

fn persist(replica: &ServerWrapper, state: Option<&Path>) -> ServerResult<()> {
    match state {
        Some(path) => replica.persist(path),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bag_server::{LoopbackFabric, MembershipRecord, ServerConfig};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn parse_control_lines() {
        assert_eq!(Control::parse("leader 3"), Control::Leader(3));
        assert_eq!(Control::parse("  status "), Control::Status);
        assert_eq!(Control::parse("leader x"), Control::Stop);
        assert_eq!(Control::parse("leader 1 2"), Control::Stop);
        assert_eq!(Control::parse(""), Control::Stop);
        assert_eq!(Control::parse("quit"), Control::Stop);
    }

    #[test]
    fn persist_writes_membership() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replica.json");
        let replica = ServerWrapper::start(
            ServerConfig::new(4, "memory", 2).with_initial_leader(1),
            Arc::new(LoopbackFabric::new()),
        )
        .unwrap();

        persist(&replica, Some(&path)).unwrap();
        persist(&replica, None).unwrap();
        let record = MembershipRecord::load(&path).unwrap();
        assert_eq!(record.global_server_id, 4);
        assert_eq!(record.local_cluster_id, Some(2));
        assert!(!record.is_primary);
    }
}
