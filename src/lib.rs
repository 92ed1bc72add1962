//! tkv - a key-value HTTP service backed by Tarantool
//!
//! Layers, leaves first:
//!
//! - [`engine`]: binary-protocol client and the in-memory engine
//! - [`schema`]: idempotent space provisioning
//! - [`storage`]: the store adapter and its error taxonomy
//! - [`http_server`]: the request pipeline
//! - [`lifecycle`]: startup order and graceful shutdown

pub mod cli;
pub mod config;
pub mod engine;
pub mod http_server;
pub mod lifecycle;
pub mod observability;
pub mod schema;
pub mod storage;
