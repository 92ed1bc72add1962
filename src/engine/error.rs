//! # Engine Errors
//!
//! Error types for the engine client. Transport failures and engine-side
//! failures are kept apart so callers can branch on the engine error code.

use std::io;
use std::time::Duration;

use thiserror::Error;

use super::protocol::ER_TUPLE_FOUND;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine client errors
#[derive(Debug, Error)]
pub enum EngineError {
    // ==================
    // Connection Errors
    // ==================
    /// TCP connect failed
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Connect, greeting or authentication did not finish in time
    #[error("connecting to {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    /// Connection is closed or closing; no new requests are accepted
    #[error("connection closed")]
    Closed,

    /// Close deadline elapsed before in-flight requests finished
    #[error("connection closed with {0} requests still in flight")]
    Abandoned(usize),

    /// Socket I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ==================
    // Protocol Errors
    // ==================
    /// Malformed greeting, frame or response body
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Request did not receive a response in time
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    // ==================
    // Engine Errors
    // ==================
    /// The engine executed the request and reported a failure
    #[error("engine error {code}: {message}")]
    Server { code: u32, message: String },
}

impl EngineError {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Engine error code, if the engine itself rejected the request
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Insert hit an existing primary key
    pub fn is_duplicate_key(&self) -> bool {
        self.code() == Some(ER_TUPLE_FOUND)
    }

    /// Whether the failure happened on the wire rather than inside the engine
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::Server { .. })
    }
}

impl From<rmpv::decode::Error> for EngineError {
    fn from(e: rmpv::decode::Error) -> Self {
        Self::Protocol(format!("malformed msgpack: {}", e))
    }
}

impl From<rmpv::encode::Error> for EngineError {
    fn from(e: rmpv::encode::Error) -> Self {
        Self::Protocol(format!("failed to encode msgpack: {}", e))
    }
}
