//! CLI-specific error types
//!
//! Every CLI error is fatal: `main` prints it and exits with status 1.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::lifecycle::StartupError;

/// Stable machine-readable codes, one per failure class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    ConfigError,
    /// stdout or runtime setup
    IoError,
    /// Engine connection or schema bootstrap failed
    BootFailed,
    /// Listener could not be bound or the server failed
    ServeFailed,
}

impl CliErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigError => "TKV_CLI_CONFIG_ERROR",
            Self::IoError => "TKV_CLI_IO_ERROR",
            Self::BootFailed => "TKV_CLI_BOOT_FAILED",
            Self::ServeFailed => "TKV_CLI_SERVE_FAILED",
        }
    }
}

/// A fatal CLI failure, rendered as `CODE: message`
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("failed to encode output: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<StartupError> for CliError {
    fn from(e: StartupError) -> Self {
        match e {
            StartupError::Config(e) => e.into(),
            e @ (StartupError::Connect(_) | StartupError::Bootstrap(_)) => {
                Self::new(CliErrorCode::BootFailed, e.to_string())
            }
            e @ (StartupError::Bind { .. } | StartupError::Serve(_)) => {
                Self::new(CliErrorCode::ServeFailed, e.to_string())
            }
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
