//! Startup and serving errors
//!
//! Anything here ends the process with a non-zero exit.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::schema::BootstrapError;

/// Result type for lifecycle operations
pub type StartupResult<T> = Result<T, StartupError>;

/// Fatal lifecycle errors
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to connect to engine: {0}")]
    Connect(#[source] EngineError),

    #[error("failed to bootstrap schema: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("http server failed: {0}")]
    Serve(#[source] io::Error),
}
