//! Key-value store adapter
//!
//! [`Store`] is the domain-facing contract over an [`Engine`]: it owns one
//! engine handle for the whole process and turns engine outcomes into
//! [`StoreError`]s. Concurrent callers share it; no per-key locking is added
//! on top of the engine's primary-index guarantee, and nothing is retried.
//!
//! Handlers depend on the narrow capability traits ([`ValueGetter`],
//! [`ValueSetter`], [`ValueUpdater`], [`KeyRemover`]) rather than on `Store`
//! itself. Cancellation flows through future drop: when the caller's future
//! is dropped the engine call is abandoned with it.

mod errors;

use futures_util::future::BoxFuture;
use tokio::time::Instant;
use tracing::debug;

use crate::engine::{Engine, Space};

pub use errors::{StoreError, StoreResult};

// ==================
// Capabilities
// ==================

/// Reads a value by key
pub trait ValueGetter: Send + Sync + 'static {
    fn get_value<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<String>>;
}

/// Creates a new key
pub trait ValueSetter: Send + Sync + 'static {
    fn set_value<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, StoreResult<()>>;
}

/// Replaces the value of an existing key
pub trait ValueUpdater: Send + Sync + 'static {
    fn update_value<'a>(&'a self, key: &'a str, value: &'a str)
        -> BoxFuture<'a, StoreResult<()>>;
}

/// Removes an existing key
pub trait KeyRemover: Send + Sync + 'static {
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<()>>;
}

/// Everything the HTTP surface needs
pub trait KeyValueStore: ValueGetter + ValueSetter + ValueUpdater + KeyRemover {}

impl<T> KeyValueStore for T where T: ValueGetter + ValueSetter + ValueUpdater + KeyRemover {}

// ==================
// Store
// ==================

/// Store adapter over a single engine handle
pub struct Store<E> {
    engine: E,
    space: Space,
}

impl<E: Engine> Store<E> {
    /// Wraps an engine whose space has already been bootstrapped.
    pub fn new(engine: E, space: Space) -> Self {
        Self { engine, space }
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub async fn get(&self, key: &str) -> StoreResult<String> {
        const OP: &str = "storage.get";

        let records = self
            .engine
            .select(&self.space, key)
            .await
            .map_err(StoreError::unavailable(OP))?;

        records
            .into_iter()
            .next()
            .map(|record| record.value)
            .ok_or(StoreError::NotFound)
    }

    pub async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        const OP: &str = "storage.set";

        match self.engine.insert(&self.space, key, value).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_duplicate_key() => {
                debug!(op = OP, key, "insert rejected: key exists");
                Err(StoreError::AlreadyExists)
            }
            Err(err) => Err(StoreError::Unavailable { op: OP, source: err }),
        }
    }

    /// Updates the value; `NotFound` if the engine reports no affected tuple.
    pub async fn update(&self, key: &str, value: &str) -> StoreResult<()> {
        const OP: &str = "storage.update";

        self.engine
            .update(&self.space, key, value)
            .await
            .map_err(StoreError::unavailable(OP))?
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    /// Deletes the key; `NotFound` if the engine reports no affected tuple.
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        const OP: &str = "storage.delete";

        self.engine
            .delete(&self.space, key)
            .await
            .map_err(StoreError::unavailable(OP))?
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    /// Closes the engine handle, waiting for in-flight calls until `deadline`.
    pub async fn close(&self, deadline: Instant) -> StoreResult<()> {
        const OP: &str = "storage.close";

        self.engine
            .close(deadline)
            .await
            .map_err(StoreError::unavailable(OP))
    }
}

impl<E: Engine> ValueGetter for Store<E> {
    fn get_value<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<String>> {
        Box::pin(self.get(key))
    }
}

impl<E: Engine> ValueSetter for Store<E> {
    fn set_value<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(self.set(key, value))
    }
}

impl<E: Engine> ValueUpdater for Store<E> {
    fn update_value<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(self.update(key, value))
    }
}

impl<E: Engine> KeyRemover for Store<E> {
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(Store::delete(self, key))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::{EngineError, EngineResult, MemoryEngine, Record};

    fn space() -> Space {
        Space {
            id: 512,
            name: "key_value".to_string(),
        }
    }

    fn store() -> Store<MemoryEngine> {
        Store::new(MemoryEngine::new(), space())
    }

    /// Engine whose every call fails on the wire.
    struct BrokenEngine;

    impl Engine for BrokenEngine {
        fn select<'a>(&'a self, _: &'a Space, _: &'a str) -> BoxFuture<'a, EngineResult<Vec<Record>>> {
            Box::pin(async { Err(EngineError::Timeout(Duration::from_secs(1))) })
        }

        fn insert<'a>(&'a self, _: &'a Space, _: &'a str, _: &'a str) -> BoxFuture<'a, EngineResult<()>> {
            Box::pin(async { Err(EngineError::Closed) })
        }

        fn update<'a>(
            &'a self,
            _: &'a Space,
            _: &'a str,
            _: &'a str,
        ) -> BoxFuture<'a, EngineResult<Option<Record>>> {
            Box::pin(async {
                Err(EngineError::Server {
                    code: 36,
                    message: "Space '512' does not exist".to_string(),
                })
            })
        }

        fn delete<'a>(&'a self, _: &'a Space, _: &'a str) -> BoxFuture<'a, EngineResult<Option<Record>>> {
            Box::pin(async { Err(EngineError::protocol("garbage")) })
        }

        fn close(&self, _: Instant) -> BoxFuture<'_, EngineResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = store();
        store.set("alpha1", "one").await.unwrap();
        assert_eq!(store.get("alpha1").await.unwrap(), "one");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let err = store().get("never-set").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_second_set_is_already_exists_and_keeps_first_value() {
        let store = store();
        store.set("k", "first").await.unwrap();

        let err = store.set("k", "second").await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(store.get("k").await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let err = store().update("ghost", "v").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let err = store().delete("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_engine_failures_are_unavailable_with_op() {
        let store = Store::new(BrokenEngine, space());

        let err = store.get("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { op: "storage.get", .. }));

        let err = store.set("k", "v").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { op: "storage.set", .. }));

        // an engine error other than duplicate key is still unavailable
        let err = store.update("k", "v").await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(err.to_string().starts_with("storage.update: "));

        let err = store.delete("k").await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_capabilities_delegate_to_store() {
        let store = store();
        store.set_value("k", "v1").await.unwrap();
        store.update_value("k", "v2").await.unwrap();
        assert_eq!(store.get_value("k").await.unwrap(), "v2");
        KeyRemover::delete(&store, "k").await.unwrap();
        assert!(store.get_value("k").await.unwrap_err().is_not_found());
    }
}
