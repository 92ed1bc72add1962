//! CLI module for tkv
//!
//! Provides command-line interface for:
//! - serve: Run the HTTP service through its full lifecycle
//! - bootstrap: One-shot schema provisioning

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{bootstrap, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_response, write_response_to};
