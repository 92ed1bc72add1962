//! CLI argument definitions using clap
//!
//! Commands:
//! - tkv serve [--config <path>] [--memory]
//! - tkv bootstrap [--config <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tkv - A key-value HTTP service backed by Tarantool
#[derive(Parser, Debug)]
#[command(name = "tkv")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect, provision the space and serve the HTTP API until signalled
    Serve {
        /// Path to configuration file
        #[arg(long, env = "CONFIG_PATH")]
        config: Option<PathBuf>,

        /// Use the in-process engine instead of connecting to Tarantool
        #[arg(long)]
        memory: bool,
    },

    /// Provision the space, print its id and exit
    Bootstrap {
        /// Path to configuration file
        #[arg(long, env = "CONFIG_PATH")]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
