//! Service configuration
//!
//! Loaded from a JSON file, then overridden by environment variables:
//!
//! | Variable              | Field                 |
//! |-----------------------|-----------------------|
//! | `ENV`                 | `env`                 |
//! | `HTTP_SERVER_ADDRESS` | `http_server.address` |
//! | `DB_HOST`             | `db.host`             |
//! | `DB_PORT`             | `db.port`             |
//! | `DB_USERNAME`         | `db.username`         |
//! | `DB_PASSWORD`         | `db.password`         |
//!
//! Every failure here is fatal at startup.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::DbConfig;
use crate::http_server::HttpServerConfig;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("CONFIG_PATH is not set")]
    MissingPath,

    #[error("config file does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown environment {0}")]
    UnknownEnv(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidVar { name: &'static str, value: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

/// Upper bound for the HTTP request and shutdown deadlines
pub const MAX_HTTP_TIMEOUT_SECS: u64 = 60 * 60;

/// Upper bound for the engine connect and request deadlines
pub const MAX_DB_TIMEOUT_MS: u64 = 10 * 60 * 1000;

fn check_range(field: &'static str, value: u64, max: u64) -> ConfigResult<()> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min: 1,
            max,
        })
    }
}

// ==================
// Environment
// ==================

/// Deployment environment; selects the log format and level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Env {
    #[default]
    Local,
    Dev,
    Prod,
}

impl Env {
    pub fn as_str(&self) -> &'static str {
        match self {
            Env::Local => "local",
            Env::Dev => "dev",
            Env::Prod => "prod",
        }
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Env {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Env::Local),
            "dev" => Ok(Env::Dev),
            "prod" => Ok(Env::Prod),
            other => Err(ConfigError::UnknownEnv(other.to_string())),
        }
    }
}

impl TryFrom<String> for Env {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Env> for String {
    fn from(env: Env) -> Self {
        env.as_str().to_string()
    }
}

// ==================
// Config
// ==================

/// Top-level configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub env: Env,

    #[serde(default)]
    pub http_server: HttpServerConfig,

    #[serde(default)]
    pub db: DbConfig,
}

impl Config {
    /// Load `path`, apply process environment overrides, validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Like [`Config::load`] with overrides taken from `lookup`.
    pub fn load_with<F>(path: &Path, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: Config =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.apply_overrides(lookup)?;
        config.validate()?;

        Ok(config)
    }

    /// Resolve the path from the CLI flag (which already falls back to
    /// `CONFIG_PATH`) and load it.
    pub fn load_from(path: Option<&Path>) -> ConfigResult<Self> {
        let path = path.ok_or(ConfigError::MissingPath)?;
        Self::load(path)
    }

    /// Apply overrides from `lookup`; unset and empty variables are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(env) = var("ENV") {
            self.env = env.parse()?;
        }
        if let Some(address) = var("HTTP_SERVER_ADDRESS") {
            self.http_server.address = address;
        }
        if let Some(host) = var("DB_HOST") {
            self.db.host = host;
        }
        if let Some(port) = var("DB_PORT") {
            self.db.port = port.parse().map_err(|_| ConfigError::InvalidVar {
                name: "DB_PORT",
                value: port,
            })?;
        }
        if let Some(username) = var("DB_USERNAME") {
            self.db.username = username;
        }
        if let Some(password) = var("DB_PASSWORD") {
            self.db.password = password;
        }

        Ok(())
    }

    /// Checks what every run needs; engine connection fields are left to
    /// [`Config::require_db`]. Deadlines must be non-zero and bounded.
    pub fn validate(&self) -> ConfigResult<()> {
        let http = &self.http_server;
        if http.address.is_empty() {
            return Err(ConfigError::MissingField("http_server.address"));
        }
        check_range("http_server.timeout_secs", http.timeout_secs, MAX_HTTP_TIMEOUT_SECS)?;
        check_range(
            "http_server.shutdown_timeout_secs",
            http.shutdown_timeout_secs,
            MAX_HTTP_TIMEOUT_SECS,
        )?;
        check_range("db.connect_timeout_ms", self.db.connect_timeout_ms, MAX_DB_TIMEOUT_MS)?;
        check_range("db.request_timeout_ms", self.db.request_timeout_ms, MAX_DB_TIMEOUT_MS)?;
        Ok(())
    }

    /// Engine settings, checked for the fields a real connection needs.
    ///
    /// Kept out of [`Config::validate`] so the in-memory engine can run
    /// without a `db` section.
    pub fn require_db(&self) -> ConfigResult<&DbConfig> {
        if self.db.host.is_empty() {
            return Err(ConfigError::MissingField("db.host"));
        }
        if self.db.port == 0 {
            return Err(ConfigError::MissingField("db.port"));
        }
        if self.db.username.is_empty() {
            return Err(ConfigError::MissingField("db.username"));
        }
        Ok(&self.db)
    }
}
