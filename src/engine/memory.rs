//! In-process engine
//!
//! Mirrors the remote engine's contract: the primary key is unique and a
//! duplicate insert fails with `ER_TUPLE_FOUND`; update and delete of an
//! absent key succeed with no affected tuple.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

use super::error::{EngineError, EngineResult};
use super::protocol::ER_TUPLE_FOUND;
use super::{Engine, Record, Space};

/// In-memory engine
#[derive(Debug, Default)]
pub struct MemoryEngine {
    spaces: RwLock<HashMap<u32, HashMap<String, String>>>,
    latency: Option<Duration>,
    closed: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
}

struct CallGuard<'a>(&'a MemoryEngine);

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency` before it touches the data.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of records stored in `space`
    pub fn len(&self, space: &Space) -> usize {
        self.spaces
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&space.id)
            .map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, space: &Space) -> bool {
        self.len(space) == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn enter(&self) -> EngineResult<CallGuard<'_>> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = CallGuard(self);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(guard)
    }

    fn with_space<T>(&self, space: &Space, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> T {
        let mut spaces = self.spaces.write().unwrap_or_else(|e| e.into_inner());
        f(spaces.entry(space.id).or_default())
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Engine for MemoryEngine {
    fn select<'a>(
        &'a self,
        space: &'a Space,
        key: &'a str,
    ) -> BoxFuture<'a, EngineResult<Vec<Record>>> {
        Box::pin(async move {
            let _guard = self.enter().await?;
            let found = self.with_space(space, |records| records.get(key).cloned());
            Ok(found
                .map(|value| Record::new(key, value))
                .into_iter()
                .collect())
        })
    }

    fn insert<'a>(
        &'a self,
        space: &'a Space,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, EngineResult<()>> {
        Box::pin(async move {
            let _guard = self.enter().await?;
            self.with_space(space, |records| {
                if let Some(existing) = records.get(key) {
                    return Err(EngineError::Server {
                        code: ER_TUPLE_FOUND,
                        message: format!(
                            "Duplicate key exists in unique index \"primary\" in space \"{}\" \
                             with old tuple - [\"{}\", \"{}\"] and new tuple - [\"{}\", \"{}\"]",
                            space.name, key, existing, key, value
                        ),
                    });
                }
                records.insert(key.to_string(), value.to_string());
                Ok(())
            })
        })
    }

    fn update<'a>(
        &'a self,
        space: &'a Space,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, EngineResult<Option<Record>>> {
        Box::pin(async move {
            let _guard = self.enter().await?;
            Ok(self.with_space(space, |records| {
                records.get_mut(key).map(|slot| {
                    *slot = value.to_string();
                    Record::new(key, value)
                })
            }))
        })
    }

    fn delete<'a>(
        &'a self,
        space: &'a Space,
        key: &'a str,
    ) -> BoxFuture<'a, EngineResult<Option<Record>>> {
        Box::pin(async move {
            let _guard = self.enter().await?;
            Ok(self.with_space(space, |records| {
                records.remove(key).map(|value| Record::new(key, value))
            }))
        })
    }

    fn close(&self, deadline: Instant) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::Release);
            match timeout_at(deadline, self.wait_idle()).await {
                Ok(()) => Ok(()),
                Err(_) => Err(EngineError::Abandoned(self.in_flight.load(Ordering::Acquire))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> Space {
        Space {
            id: 512,
            name: "key_value".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_then_select() {
        let engine = MemoryEngine::new();
        let space = space();
        engine.insert(&space, "alpha1", "one").await.unwrap();

        let found = engine.select(&space, "alpha1").await.unwrap();
        assert_eq!(found, vec![Record::new("alpha1", "one")]);
        assert_eq!(engine.len(&space), 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_reports_engine_code() {
        let engine = MemoryEngine::new();
        let space = space();
        engine.insert(&space, "k", "first").await.unwrap();

        let err = engine.insert(&space, "k", "second").await.unwrap_err();
        assert!(err.is_duplicate_key());

        let found = engine.select(&space, "k").await.unwrap();
        assert_eq!(found[0].value, "first");
    }

    #[tokio::test]
    async fn test_update_and_delete_of_absent_key_affect_nothing() {
        let engine = MemoryEngine::new();
        let space = space();
        assert_eq!(engine.update(&space, "ghost", "v").await.unwrap(), None);
        assert_eq!(engine.delete(&space, "ghost").await.unwrap(), None);
        assert!(engine.is_empty(&space));
    }

    #[tokio::test]
    async fn test_closed_engine_rejects_calls() {
        let engine = MemoryEngine::new();
        let space = space();
        engine.close(Instant::now()).await.unwrap();

        assert!(engine.is_closed());
        assert!(matches!(
            engine.select(&space, "k").await,
            Err(EngineError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_call() {
        let engine = std::sync::Arc::new(MemoryEngine::new().with_latency(Duration::from_millis(50)));
        let space = space();

        let worker = {
            let engine = std::sync::Arc::clone(&engine);
            let space = space.clone();
            tokio::spawn(async move { engine.insert(&space, "k", "v").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        engine
            .close(Instant::now() + Duration::from_secs(1))
            .await
            .unwrap();
        worker.await.unwrap().unwrap();
        assert_eq!(engine.len(&space), 1);
    }
}
