//! BAG CLI
//!
//! Hosts a BAG replica process.
//!
//! # Commands
//!
//! - `serve` - Start a replica from positional arguments
//! - `recover` - Restart a replica from its persisted membership record
//! - `version` - Show version information
//!
//! A running replica reads control lines from stdin: `leader <id>` announces
//! a new leader, `status` prints the membership record as JSON, and any other
//! line, end of input or Ctrl-C terminates it.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// BAG replica host.
#[derive(Parser)]
#[command(name = "bag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a replica
    Serve {
        /// File the membership record is written to on start and exit
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// <global-id> <instance> <local-cluster-id> <leader-id> [primary] [logging]
        #[arg(num_args = 0.., allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Restart a replica from a membership record
    Recover {
        /// Membership record written by `serve --state`
        #[arg(short, long)]
        state: PathBuf,

        /// Disable logging
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show version information
    Version,
}

pub(crate) fn init_logging(verbose: bool, enabled: bool) {
    let filter = if !enabled {
        EnvFilter::new("off")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { state, args } => {
            commands::serve::run(&args, state.as_deref(), cli.verbose).await?;
        }
        Commands::Recover { state, quiet } => {
            commands::recover::run(&state, !quiet, cli.verbose).await?;
        }
        Commands::Version => {
            println!("BAG CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("backends: {}", bag_core::BackendKind::Memory);
        }
    }

    Ok(())
}
