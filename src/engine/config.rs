//! Engine connection configuration

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Engine host (required)
    #[serde(default)]
    pub host: String,

    /// Engine port (required)
    #[serde(default)]
    pub port: u16,

    /// User to authenticate as (required)
    #[serde(default)]
    pub username: String,

    /// Password; empty for the guest user
    #[serde(default)]
    pub password: String,

    /// Space holding the key-value tuples (default: "key_value")
    #[serde(default = "default_space")]
    pub space: String,

    /// Bound on connect + greeting + auth (default: 1000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Bound on a single request round-trip (default: 1000ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_space() -> String {
    "key_value".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    1000
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            username: String::new(),
            password: String::new(),
            space: default_space(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl DbConfig {
    /// `host:port` of the engine
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// Hand-written so the password never reaches a log line.
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("space", &self.space)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}
