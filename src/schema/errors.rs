//! Bootstrap error types
//!
//! Every bootstrap error is fatal at startup.

use std::fmt;

use thiserror::Error;

use crate::engine::EngineError;

/// Result type for bootstrap operations
pub type BootstrapResult<T> = Result<T, BootstrapError>;

/// Provisioning step that was running when a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStep {
    CreateSpace,
    Format,
    CreateIndex,
    ResolveId,
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapStep::CreateSpace => "create space",
            BootstrapStep::Format => "format space",
            BootstrapStep::CreateIndex => "create index",
            BootstrapStep::ResolveId => "resolve space id",
        };
        write!(f, "{}", name)
    }
}

/// Schema bootstrap errors
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Space name cannot be used as a Lua identifier
    #[error("invalid space name '{0}': expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidSpaceName(String),

    /// The engine rejected a provisioning statement
    #[error("failed to {step}: {source}")]
    Step {
        step: BootstrapStep,
        #[source]
        source: EngineError,
    },

    /// The id lookup did not return a numeric space id
    #[error("space '{0}' has no numeric id")]
    MissingSpaceId(String),
}
