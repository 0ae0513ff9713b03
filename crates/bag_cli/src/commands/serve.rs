//! Serve command implementation.

use super::control;
use bag_server::{LoopbackFabric, ServerConfig, ServerWrapper, INVALID_ARGUMENTS};
use std::path::Path;
use std::sync::Arc;

/// Starts a replica from positional arguments and runs it until told to
/// stop.
pub async fn run(
    args: &[String],
    state: Option<&Path>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match ServerConfig::from_args(args) {
        Ok(config) => config,
        Err(_) => {
            eprintln!("{INVALID_ARGUMENTS}");
            return Err(INVALID_ARGUMENTS.into());
        }
    };
    crate::init_logging(verbose, config.logging);

    let replica = ServerWrapper::start(config, Arc::new(LoopbackFabric::new()))?;
    control::run(&replica, state).await
}
