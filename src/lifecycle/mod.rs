//! # Lifecycle Manager
//!
//! Startup order and graceful shutdown of the service:
//!
//! ```text
//! Connecting -> Bootstrapping -> Serving -> Draining -> Closed
//! ```
//!
//! A failure while connecting or bootstrapping is fatal and happens before
//! the listener accepts anything. Draining starts when the shutdown future
//! resolves: the listener stops accepting, in-flight requests get the grace
//! period, and only then is the engine connection closed, bounded by the
//! same deadline.

mod errors;
mod signal;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

use crate::config::MAX_HTTP_TIMEOUT_SECS;
use crate::engine::{Client, DbConfig, Engine, MemoryEngine, Space};
use crate::http_server::{HttpServer, HttpServerConfig};
use crate::schema::{bootstrap, SpaceSchema};
use crate::storage::Store;

pub use errors::{StartupError, StartupResult};
pub use signal::wait_for_shutdown_signal;

/// Space id handed to the in-memory engine; the first id a real engine
/// assigns to a user space.
pub const MEMORY_SPACE_ID: u32 = 512;

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Connecting,
    Bootstrapping,
    Serving,
    Draining,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Connecting => "connecting",
            Phase::Bootstrapping => "bootstrapping",
            Phase::Serving => "serving",
            Phase::Draining => "draining",
            Phase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Drives the service through its phases
///
/// Phases only move forward; observers can follow them through
/// [`Lifecycle::subscribe`].
pub struct Lifecycle {
    phase: watch::Sender<Phase>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(Phase::Connecting);
        Self { phase }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    fn enter(&self, next: Phase) {
        let entered = self.phase.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
        if entered {
            info!(phase = %next, "lifecycle phase");
        }
    }

    // ==================
    // Startup
    // ==================

    /// Connect to the engine and provision the space.
    pub async fn start(&self, db: &DbConfig) -> StartupResult<Store<Client>> {
        self.enter(Phase::Connecting);
        let client = Client::connect(db).await.map_err(StartupError::Connect)?;

        self.enter(Phase::Bootstrapping);
        let schema = SpaceSchema::key_value(&db.space)?;
        let space = bootstrap(&client, &schema).await?;

        Ok(Store::new(client, space))
    }

    /// In-process store; there is nothing to connect to or provision.
    pub fn start_in_memory(&self, space: &str) -> StartupResult<Store<MemoryEngine>> {
        self.enter(Phase::Connecting);
        self.enter(Phase::Bootstrapping);
        let schema = SpaceSchema::key_value(space)?;
        warn!(space = %schema.name, "using in-memory engine, data is not persisted");

        Ok(Store::new(
            MemoryEngine::new(),
            Space {
                id: MEMORY_SPACE_ID,
                name: schema.name,
            },
        ))
    }

    // ==================
    // Serving
    // ==================

    /// Serve `store` on `listener` until `shutdown` resolves, then drain.
    ///
    /// Requests in flight when draining starts get until
    /// `config.shutdown_timeout()`; whatever is still running after that is
    /// dropped. The store is closed last, against the same deadline.
    pub async fn serve<E, F>(
        &self,
        store: Arc<Store<E>>,
        config: &HttpServerConfig,
        listener: TcpListener,
        shutdown: F,
    ) -> StartupResult<()>
    where
        E: Engine,
        F: Future<Output = ()> + Send + 'static,
    {
        let grace = config.shutdown_timeout();
        let drain = Arc::new(Notify::new());
        let signal = {
            let drain = Arc::clone(&drain);
            async move {
                shutdown.await;
                drain.notify_one();
            }
        };

        let server = HttpServer::new(config.clone(), Arc::clone(&store));
        let serving = server.serve(listener, signal);
        tokio::pin!(serving);

        self.enter(Phase::Serving);

        let finished = tokio::select! {
            result = &mut serving => Some(result),
            _ = drain.notified() => None,
        };

        self.enter(Phase::Draining);
        let deadline = drain_deadline(Instant::now(), grace);
        let result = match finished {
            Some(result) => result,
            None => match timeout_at(deadline, &mut serving).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        grace_secs = grace.as_secs(),
                        "grace period elapsed, dropping open connections"
                    );
                    Ok(())
                }
            },
        };
        info!("http server stopped");

        if let Err(err) = store.close(deadline).await {
            error!(error = %err, "failed to close storage");
        }
        self.enter(Phase::Closed);

        result.map_err(StartupError::Serve)
    }
}

/// `now + grace`, capped at [`MAX_HTTP_TIMEOUT_SECS`] when the sum is not
/// representable.
fn drain_deadline(now: Instant, grace: Duration) -> Instant {
    now.checked_add(grace)
        .unwrap_or_else(|| now + Duration::from_secs(MAX_HTTP_TIMEOUT_SECS))
}

/// Bind the configured listen address.
pub async fn bind(config: &HttpServerConfig) -> StartupResult<TcpListener> {
    TcpListener::bind(&config.address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.address.clone(),
            source,
        })
}
