//! # Engine Module
//!
//! Typed access to the remote tuple store.
//!
//! The [`Engine`] trait is the seam the store adapter depends on: four point
//! operations on a key-value space plus a bounded close. [`Client`] speaks the
//! Tarantool binary protocol over one multiplexed connection; [`MemoryEngine`]
//! keeps the same semantics in process.
//!
//! Schema management goes through the narrower [`Evaluator`] trait so the
//! bootstrapper never sees data operations.

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod memory;
pub mod protocol;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use rmpv::Value;
use tokio::time::Instant;

pub use client::Client;
pub use config::DbConfig;
pub use error::{EngineError, EngineResult};
pub use memory::MemoryEngine;

/// A stored key-value tuple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: String,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A resolved space: the name it was declared with and the id requests use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Space {
    pub id: u32,
    pub name: String,
}

/// Point operations on a key-value space
///
/// Every call is cancel-safe: dropping the returned future abandons the
/// request without leaking its response slot.
pub trait Engine: Send + Sync + 'static {
    /// Equality lookup on the primary index; at most one record
    fn select<'a>(&'a self, space: &'a Space, key: &'a str)
        -> BoxFuture<'a, EngineResult<Vec<Record>>>;

    /// Fails with engine code `ER_TUPLE_FOUND` if the key exists
    fn insert<'a>(
        &'a self,
        space: &'a Space,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, EngineResult<()>>;

    /// Returns the updated record, or `None` if the key was absent
    fn update<'a>(
        &'a self,
        space: &'a Space,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, EngineResult<Option<Record>>>;

    /// Returns the removed record, or `None` if the key was absent
    fn delete<'a>(&'a self, space: &'a Space, key: &'a str)
        -> BoxFuture<'a, EngineResult<Option<Record>>>;

    /// Stops accepting calls and waits for in-flight ones until `deadline`.
    fn close(&self, deadline: Instant) -> BoxFuture<'_, EngineResult<()>>;
}

impl<E: Engine> Engine for Arc<E> {
    fn select<'a>(&'a self, space: &'a Space, key: &'a str)
        -> BoxFuture<'a, EngineResult<Vec<Record>>> {
        (**self).select(space, key)
    }

    fn insert<'a>(
        &'a self,
        space: &'a Space,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, EngineResult<()>> {
        (**self).insert(space, key, value)
    }

    fn update<'a>(
        &'a self,
        space: &'a Space,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, EngineResult<Option<Record>>> {
        (**self).update(space, key, value)
    }

    fn delete<'a>(&'a self, space: &'a Space, key: &'a str)
        -> BoxFuture<'a, EngineResult<Option<Record>>> {
        (**self).delete(space, key)
    }

    fn close(&self, deadline: Instant) -> BoxFuture<'_, EngineResult<()>> {
        (**self).close(deadline)
    }
}

/// Evaluates administrative expressions on the engine
pub trait Evaluator: Send + Sync {
    fn eval<'a>(&'a self, expr: &'a str) -> BoxFuture<'a, EngineResult<Vec<Value>>>;
}
