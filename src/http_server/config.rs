//! HTTP Server Configuration
//!
//! Listen address plus the per-request and shutdown deadlines.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// Address to bind to (default: "localhost:8080")
    #[serde(default = "default_address")]
    pub address: String,

    /// Upper bound on a single request, engine call included (default: 5s)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Grace period for draining in-flight requests on shutdown (default: 10s)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            timeout_secs: default_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl HttpServerConfig {
    /// Create a new config bound to `address`
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
