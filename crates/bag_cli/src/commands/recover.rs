//! Recover command implementation.

use super::control;
use bag_server::{LoopbackFabric, ServerWrapper};
use std::path::Path;
use std::sync::Arc;

/// Restarts a replica from the membership record at `state`.
pub async fn run(
    state: &Path,
    logging: bool,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    crate::init_logging(verbose, logging);
    if !state.exists() {
        return Err(format!("No membership record found at {}", state.display()).into());
    }
    let replica = ServerWrapper::recover(state, Arc::new(LoopbackFabric::new()), logging)?;
    control::run(&replica, Some(state)).await
}
