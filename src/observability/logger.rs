//! Log subscriber setup
//!
//! The environment picks the format and the default level:
//!
//! | env     | format | level |
//! |---------|--------|-------|
//! | `local` | text   | debug |
//! | `dev`   | JSON   | debug |
//! | `prod`  | JSON   | info  |
//!
//! `RUST_LOG` replaces the default level filter when set.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::EnvFilter;

use crate::config::Env;

/// Output encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Format and default filter for one environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    pub level: &'static str,
}

impl LogSettings {
    pub fn for_env(env: Env) -> Self {
        match env {
            Env::Local => Self {
                format: LogFormat::Text,
                level: "debug",
            },
            Env::Dev => Self {
                format: LogFormat::Json,
                level: "debug",
            },
            Env::Prod => Self {
                format: LogFormat::Json,
                level: "info",
            },
        }
    }
}

/// Install the global subscriber for `env`.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(env: Env) -> Result<(), TryInitError> {
    let settings = LogSettings::for_env(env);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.level));

    let registry = tracing_subscriber::registry().with(filter);

    match settings.format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
    }
}
