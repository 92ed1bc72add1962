//! Store error taxonomy
//!
//! `NotFound` and `AlreadyExists` are expected outcomes callers branch on.
//! `Unavailable` wraps any engine failure together with the operation that
//! hit it; the engine error is for logs only.

use thiserror::Error;

use crate::engine::EngineError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record under the requested key
    #[error("key not found")]
    NotFound,

    /// Create against an existing key
    #[error("duplicated key")]
    AlreadyExists,

    /// Transport, protocol, timeout or unexpected engine failure
    #[error("{op}: {source}")]
    Unavailable {
        op: &'static str,
        source: EngineError,
    },
}

impl StoreError {
    pub(crate) fn unavailable(op: &'static str) -> impl FnOnce(EngineError) -> Self {
        move |source| Self::Unavailable { op, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists)
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
