//! Tarantool client over one multiplexed connection
//!
//! Requests are tagged with a sync id and handed to a writer task; a reader
//! task routes each response back to the waiting caller by sync id. Callers
//! never block each other, and responses may arrive in any order.
//!
//! A caller that gives up (timeout or a dropped future) removes its slot, so
//! a late response is discarded instead of leaking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use rmpv::Value;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use super::auth::{is_guest, scramble, Greeting};
use super::codec::ClientCodec;
use super::config::DbConfig;
use super::error::{EngineError, EngineResult};
use super::protocol::{decode_affected, decode_record, Request, Response, GREETING_SIZE};
use super::{Engine, Evaluator, Record, Space};

// ==================
// Shared Connection State
// ==================

struct Shared {
    address: String,
    pending: Mutex<HashMap<u64, oneshot::Sender<Response>>>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Request>>>,
    closing: AtomicBool,
    idle: Notify,
    next_sync: AtomicU64,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Response>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Request>> {
        self.outgoing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn register(&self, sync: u64, waiter: oneshot::Sender<Response>) {
        self.pending().insert(sync, waiter);
    }

    fn in_flight(&self) -> usize {
        self.pending().len()
    }

    /// Hands a response to its waiter, if the waiter is still there.
    fn complete(&self, response: Response) {
        let waiter = self.pending().remove(&response.sync);
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(response);
            }
            None => debug!(sync = response.sync, "discarding response for abandoned request"),
        }
    }

    /// Removes a slot; wakes `wait_idle` once nothing is outstanding.
    fn forget(&self, sync: u64) {
        let remaining = {
            let mut pending = self.pending();
            pending.remove(&sync);
            pending.len()
        };
        if remaining == 0 {
            self.idle.notify_waiters();
        }
    }

    /// Stops the connection: no new requests, every waiter fails with `Closed`.
    fn shutdown(&self) {
        self.closing.store(true, Ordering::Release);
        self.outgoing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let abandoned: Vec<_> = self.pending().drain().collect();
        drop(abandoned);
        self.idle.notify_waiters();
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Removes the caller's slot however the call ends.
struct Slot<'a> {
    shared: &'a Shared,
    sync: u64,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.shared.forget(self.sync);
    }
}

// ==================
// I/O Tasks
// ==================

async fn read_loop(mut frames: FramedRead<OwnedReadHalf, ClientCodec>, shared: Arc<Shared>) {
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(response) => shared.complete(response),
            Err(err) => {
                warn!(address = %shared.address, error = %err, "engine connection failed");
                break;
            }
        }
    }

    if !shared.closing.load(Ordering::Acquire) {
        warn!(address = %shared.address, "engine connection lost");
    }
    shared.shutdown();
}

async fn write_loop(
    mut sink: FramedWrite<OwnedWriteHalf, ClientCodec>,
    mut requests: mpsc::UnboundedReceiver<Request>,
    shared: Arc<Shared>,
) {
    while let Some(request) = requests.recv().await {
        if let Err(err) = sink.send(request).await {
            warn!(address = %shared.address, error = %err, "failed to write engine request");
            shared.shutdown();
            break;
        }
    }
    let _ = sink.close().await;
}

// ==================
// Client
// ==================

/// Tarantool engine client
pub struct Client {
    shared: Arc<Shared>,
    request_timeout: Duration,
    tasks: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl Client {
    /// Connects, reads the greeting and authenticates, all within the
    /// configured connect timeout.
    pub async fn connect(config: &DbConfig) -> EngineResult<Self> {
        let address = config.address();
        let connect_timeout = config.connect_timeout();
        let deadline = Instant::now() + connect_timeout;
        let timed_out = || EngineError::ConnectTimeout {
            address: address.clone(),
            timeout: connect_timeout,
        };

        let mut stream = timeout_at(deadline, TcpStream::connect(&address))
            .await
            .map_err(|_| timed_out())?
            .map_err(|source| EngineError::Connect {
                address: address.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;

        let mut raw = [0u8; GREETING_SIZE];
        timeout_at(deadline, stream.read_exact(&mut raw))
            .await
            .map_err(|_| timed_out())??;
        let greeting = Greeting::parse(&raw)?;
        debug!(address = %address, version = %greeting.version, "engine greeting received");

        let client = Self::start(stream, address.clone(), config.request_timeout());

        if !is_guest(&config.username, &config.password) {
            let request = Request::auth(
                &config.username,
                &scramble(&greeting.salt, &config.password),
            );
            match timeout_at(deadline, client.call(request)).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => return Err(err),
                Err(_) => return Err(timed_out()),
            }
        }

        info!(address = %address, user = %config.username, "connected to engine");
        Ok(client)
    }

    fn start(stream: TcpStream, address: String, request_timeout: Duration) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            address,
            pending: Mutex::new(HashMap::new()),
            outgoing: Mutex::new(Some(tx)),
            closing: AtomicBool::new(false),
            idle: Notify::new(),
            next_sync: AtomicU64::new(1),
        });

        let reader = tokio::spawn(read_loop(
            FramedRead::new(read_half, ClientCodec::new()),
            Arc::clone(&shared),
        ));
        let writer = tokio::spawn(write_loop(
            FramedWrite::new(write_half, ClientCodec::new()),
            rx,
            Arc::clone(&shared),
        ));

        Self {
            shared,
            request_timeout,
            tasks: Mutex::new(Some((reader, writer))),
        }
    }

    /// Number of requests awaiting a response
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight()
    }

    /// Whether the connection still accepts requests
    pub fn is_open(&self) -> bool {
        !self.shared.closing.load(Ordering::Acquire)
    }

    async fn call(&self, request: Request) -> EngineResult<Vec<Value>> {
        if !self.is_open() {
            return Err(EngineError::Closed);
        }
        let sender = self.shared.sender().ok_or(EngineError::Closed)?;

        let kind = request.kind;
        let sync = self.shared.next_sync.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.register(sync, tx);
        let _slot = Slot {
            shared: &self.shared,
            sync,
        };

        sender
            .send(request.with_sync(sync))
            .map_err(|_| EngineError::Closed)?;

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response.into_data(),
            Ok(Err(_)) => Err(EngineError::Closed),
            Err(_) => {
                warn!(op = kind.name(), sync, "engine request timed out");
                Err(EngineError::Timeout(self.request_timeout))
            }
        }
    }

    /// Stops accepting requests, waits for in-flight ones until `deadline`,
    /// then tears the connection down.
    pub async fn close_graceful(&self, deadline: Instant) -> EngineResult<()> {
        self.shared.closing.store(true, Ordering::Release);

        let drained = timeout_at(deadline, self.shared.wait_idle()).await.is_ok();
        let abandoned = self.shared.in_flight();
        self.shared.shutdown();

        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some((reader, writer)) = tasks {
            let writer_abort = writer.abort_handle();
            if timeout_at(deadline, writer).await.is_err() {
                writer_abort.abort();
            }
            reader.abort();
        }

        if drained {
            info!(address = %self.shared.address, "engine connection closed");
            Ok(())
        } else {
            warn!(
                address = %self.shared.address,
                abandoned,
                "engine close deadline elapsed with requests in flight"
            );
            Err(EngineError::Abandoned(abandoned))
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let tasks = self
            .tasks
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some((reader, writer)) = tasks {
            reader.abort();
            writer.abort();
        }
    }
}

impl Engine for Client {
    fn select<'a>(
        &'a self,
        space: &'a Space,
        key: &'a str,
    ) -> BoxFuture<'a, EngineResult<Vec<Record>>> {
        Box::pin(async move {
            let data = self.call(Request::select(space.id, key, 1)).await?;
            data.into_iter().map(decode_record).collect()
        })
    }

    fn insert<'a>(
        &'a self,
        space: &'a Space,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, EngineResult<()>> {
        Box::pin(async move {
            self.call(Request::insert(space.id, key, value)).await?;
            Ok(())
        })
    }

    fn update<'a>(
        &'a self,
        space: &'a Space,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, EngineResult<Option<Record>>> {
        Box::pin(async move {
            let data = self.call(Request::update_value(space.id, key, value)).await?;
            decode_affected(data)
        })
    }

    fn delete<'a>(
        &'a self,
        space: &'a Space,
        key: &'a str,
    ) -> BoxFuture<'a, EngineResult<Option<Record>>> {
        Box::pin(async move {
            let data = self.call(Request::delete(space.id, key)).await?;
            decode_affected(data)
        })
    }

    fn close(&self, deadline: Instant) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(self.close_graceful(deadline))
    }
}

impl Evaluator for Client {
    fn eval<'a>(&'a self, expr: &'a str) -> BoxFuture<'a, EngineResult<Vec<Value>>> {
        Box::pin(self.call(Request::eval(expr)))
    }
}
