//! tkv CLI entry point
//!
//! Parses arguments and dispatches through `cli::run`; prints any error to
//! stderr and exits with status 1.

use tkv::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
