//! Command-line interface (spec.md §6).
//!
//! `convert` is the one operation spec.md names explicitly. `run` is an
//! ambient addition — the process needs some way to actually start the
//! bridge, which spec.md's CLI section doesn't spell out since it's
//! scoped to "operations that modify runtime behaviour"; `run` modifies
//! nothing the config/rules files don't already declare, so it's
//! consistent with that boundary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bridgecore", about = "Platform-agnostic chat bridge router", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reads a config file and writes it in the format implied by the
    /// destination extension. Exit code 0 on success, 1 on any error.
    Convert {
        src: PathBuf,
        dst: PathBuf,
    },
    /// Loads config + rules and runs the bridge until interrupted.
    Run {
        /// Overrides BRIDGE_DATA_PATH for this invocation.
        #[arg(long, env = "BRIDGE_DATA_PATH")]
        data_path: Option<PathBuf>,
    },
}
