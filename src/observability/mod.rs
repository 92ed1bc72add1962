//! Observability subsystem
//!
//! Structured logging through `tracing`. Handlers and the lifecycle emit
//! events with `op` fields; this module only installs the subscriber.

mod logger;

pub use logger::{init_logging, LogFormat, LogSettings};
