//! Engine Client Tests
//!
//! Drives the Tarantool client against a scripted iproto server on a
//! loopback listener:
//! - greeting, authentication and connect deadlines
//! - data operations through the store adapter
//! - out-of-order responses on one connection
//! - request timeouts, cancellation and graceful close

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use rmpv::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::Framed;

use tkv::engine::auth::scramble;
use tkv::engine::codec::ServerCodec;
use tkv::engine::protocol::{
    key, Request, RequestType, Response, ER_TUPLE_FOUND, GREETING_SIZE, IPROTO_TYPE_ERROR,
};
use tkv::engine::{Client, DbConfig, Engine, EngineError, Evaluator, Space};
use tkv::schema::{bootstrap, SpaceSchema};
use tkv::storage::{Store, StoreError};

// =============================================================================
// Scripted Engine
// =============================================================================

const SALT: [u8; 32] = [7u8; 32];
const USER: &str = "app";
const PASSWORD: &str = "secret";
const SPACE_ID: u32 = 512;

/// Keys starting with this prefix are answered after a delay.
const SLOW_PREFIX: &str = "slow";
/// Keys starting with this prefix are never answered.
const HANG_PREFIX: &str = "hang";
const SLOW_DELAY: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, PartialEq)]
enum Greeting {
    Tarantool,
    Garbage,
    Silent,
}

fn greeting_bytes(version: &str) -> Vec<u8> {
    let half = GREETING_SIZE / 2;
    let mut raw = format!("{:<width$}\n", version, width = half - 1).into_bytes();
    raw.extend(format!("{:<width$}\n", STANDARD.encode(SALT), width = half - 1).into_bytes());
    raw
}

fn field(request: &Request, wanted: u8) -> Option<&Value> {
    request.body.iter().find(|(k, _)| *k == wanted).map(|(_, v)| v)
}

fn first_str(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => items
            .first()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn ok(sync: u64, data: Vec<Value>) -> Response {
    Response {
        status: 0,
        sync,
        body: vec![(Value::from(key::DATA), Value::Array(data))],
    }
}

fn fail(sync: u64, code: u32, message: &str) -> Response {
    Response {
        status: IPROTO_TYPE_ERROR | code,
        sync,
        body: vec![(Value::from(key::ERROR_24), Value::from(message))],
    }
}

fn tuple(k: &str, v: &str) -> Value {
    Value::Array(vec![Value::from(k), Value::from(v)])
}

type Data = Arc<Mutex<HashMap<String, String>>>;

fn handle(request: &Request, data: &Data) -> Response {
    let sync = request.sync;
    let mut data = data.lock().unwrap();

    match request.kind {
        RequestType::Auth => {
            let user = field(request, key::USER_NAME).and_then(Value::as_str);
            let proof = match field(request, key::TUPLE) {
                Some(Value::Array(items)) => items.get(1).cloned(),
                _ => None,
            };
            let expected = Value::from(scramble(&SALT, PASSWORD).as_slice());
            if user == Some(USER) && proof == Some(expected) {
                ok(sync, Vec::new())
            } else {
                fail(sync, 47, "Incorrect password supplied for user 'app'")
            }
        }
        RequestType::Eval => {
            let expr = field(request, key::EXPR).and_then(Value::as_str).unwrap_or_default();
            if expr.starts_with("return") {
                ok(sync, vec![Value::from(SPACE_ID)])
            } else {
                ok(sync, Vec::new())
            }
        }
        RequestType::Select => {
            let k = first_str(field(request, key::KEY));
            let found = data.get(&k).map(|v| tuple(&k, v));
            ok(sync, found.into_iter().collect())
        }
        RequestType::Insert => {
            let (k, v) = match field(request, key::TUPLE) {
                Some(Value::Array(items)) => (
                    items[0].as_str().unwrap_or_default().to_string(),
                    items[1].as_str().unwrap_or_default().to_string(),
                ),
                _ => return fail(sync, 0, "bad tuple"),
            };
            if data.contains_key(&k) {
                return fail(
                    sync,
                    ER_TUPLE_FOUND,
                    "Duplicate key exists in unique index \"primary\" in space \"key_value\"",
                );
            }
            data.insert(k.clone(), v.clone());
            ok(sync, vec![tuple(&k, &v)])
        }
        RequestType::Update => {
            let k = first_str(field(request, key::KEY));
            let v = match field(request, key::TUPLE) {
                Some(Value::Array(ops)) => match ops.first() {
                    Some(Value::Array(op)) => op[2].as_str().unwrap_or_default().to_string(),
                    _ => String::new(),
                },
                _ => String::new(),
            };
            match data.get_mut(&k) {
                Some(slot) => {
                    *slot = v.clone();
                    ok(sync, vec![tuple(&k, &v)])
                }
                None => ok(sync, Vec::new()),
            }
        }
        RequestType::Delete => {
            let k = first_str(field(request, key::KEY));
            let removed = data.remove(&k).map(|v| tuple(&k, &v));
            ok(sync, removed.into_iter().collect())
        }
    }
}

fn request_key(request: &Request) -> String {
    match request.kind {
        RequestType::Select | RequestType::Update | RequestType::Delete => {
            first_str(field(request, key::KEY))
        }
        _ => String::new(),
    }
}

async fn serve_connection(mut stream: TcpStream, greeting: Greeting, data: Data) {
    match greeting {
        Greeting::Tarantool => {
            let raw = greeting_bytes("Tarantool 2.11.1 (Binary) 0d9c6f6e-1a2b-4c3d");
            stream.write_all(&raw).await.unwrap();
        }
        Greeting::Garbage => {
            stream.write_all(&[b'x'; GREETING_SIZE]).await.unwrap();
        }
        Greeting::Silent => {
            tokio::time::sleep(Duration::from_secs(10)).await;
            return;
        }
    }

    let (mut sink, mut requests) = Framed::new(stream, ServerCodec::new()).split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();

    let writer = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            if sink.send(response).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(request)) = requests.next().await {
        let key = request_key(&request);
        if key.starts_with(HANG_PREFIX) {
            continue;
        }
        let response = handle(&request, &data);
        let tx = tx.clone();
        if key.starts_with(SLOW_PREFIX) {
            tokio::spawn(async move {
                tokio::time::sleep(SLOW_DELAY).await;
                let _ = tx.send(response);
            });
        } else {
            let _ = tx.send(response);
        }
    }

    drop(tx);
    let _ = writer.await;
}

async fn spawn_engine(greeting: Greeting) -> (SocketAddr, Data) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let data: Data = Arc::new(Mutex::new(HashMap::new()));

    let shared = Arc::clone(&data);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_connection(stream, greeting, Arc::clone(&shared)));
        }
    });

    (addr, data)
}

fn config(addr: SocketAddr) -> DbConfig {
    DbConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        username: USER.to_string(),
        password: PASSWORD.to_string(),
        connect_timeout_ms: 500,
        request_timeout_ms: 1000,
        ..Default::default()
    }
}

fn space() -> Space {
    Space {
        id: SPACE_ID,
        name: "key_value".to_string(),
    }
}

async fn connect() -> (Arc<Client>, Data) {
    let (addr, data) = spawn_engine(Greeting::Tarantool).await;
    let client = Client::connect(&config(addr)).await.unwrap();
    (Arc::new(client), data)
}

// =============================================================================
// Connect
// =============================================================================

#[tokio::test]
async fn test_connect_authenticates() {
    let (addr, _) = spawn_engine(Greeting::Tarantool).await;
    let client = Client::connect(&config(addr)).await.unwrap();
    assert!(client.is_open());
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let (addr, _) = spawn_engine(Greeting::Tarantool).await;
    let mut config = config(addr);
    config.password = "wrong".to_string();

    let err = Client::connect(&config).await.err().unwrap();
    assert_eq!(err.code(), Some(47));
}

#[tokio::test]
async fn test_unexpected_greeting_is_protocol_error() {
    let (addr, _) = spawn_engine(Greeting::Garbage).await;
    let err = Client::connect(&config(addr)).await.err().unwrap();
    assert!(matches!(err, EngineError::Protocol(_)));
}

#[tokio::test]
async fn test_missing_greeting_hits_connect_timeout() {
    let (addr, _) = spawn_engine(Greeting::Silent).await;
    let mut config = config(addr);
    config.connect_timeout_ms = 100;

    let started = Instant::now();
    let err = Client::connect(&config).await.err().unwrap();
    assert!(matches!(err, EngineError::ConnectTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}

// =============================================================================
// Data Operations
// =============================================================================

#[tokio::test]
async fn test_bootstrap_resolves_space_id() {
    let (client, _) = connect().await;
    let schema = SpaceSchema::key_value("key_value").unwrap();

    let space = bootstrap(client.as_ref(), &schema).await.unwrap();
    assert_eq!(space, space_with_id(SPACE_ID));

    let raw = client.eval("return box.space.key_value.id").await.unwrap();
    assert_eq!(raw, vec![Value::from(SPACE_ID)]);
}

fn space_with_id(id: u32) -> Space {
    Space {
        id,
        name: "key_value".to_string(),
    }
}

#[tokio::test]
async fn test_store_over_client() {
    let (client, data) = connect().await;
    let store = Store::new(client, space());

    store.set("alpha1", "one").await.unwrap();
    assert_eq!(store.get("alpha1").await.unwrap(), "one");

    let err = store.set("alpha1", "again").await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists));
    assert_eq!(data.lock().unwrap()["alpha1"], "one");

    store.update("alpha1", "two").await.unwrap();
    assert_eq!(store.get("alpha1").await.unwrap(), "two");

    store.delete("alpha1").await.unwrap();
    assert!(matches!(store.get("alpha1").await, Err(StoreError::NotFound)));
    assert!(matches!(store.update("alpha1", "x").await, Err(StoreError::NotFound)));
    assert!(matches!(store.delete("alpha1").await, Err(StoreError::NotFound)));
}

#[tokio::test]
async fn test_duplicate_insert_carries_engine_code() {
    let (client, _) = connect().await;
    client.insert(&space(), "k", "v").await.unwrap();

    let err = client.insert(&space(), "k", "v").await.unwrap_err();
    assert!(err.is_duplicate_key());
    assert_eq!(err.code(), Some(ER_TUPLE_FOUND));
}

// =============================================================================
// Multiplexing
// =============================================================================

#[tokio::test]
async fn test_responses_are_routed_by_sync_id() {
    let (client, data) = connect().await;
    {
        let mut data = data.lock().unwrap();
        data.insert("slowkey".to_string(), "slow value".to_string());
        data.insert("fast".to_string(), "fast value".to_string());
    }

    let slow = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            let records = client.select(&space(), "slowkey").await.unwrap();
            (records, Instant::now())
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    let fast = client.select(&space(), "fast").await.unwrap();
    let fast_done = Instant::now();
    assert!(started.elapsed() < SLOW_DELAY);
    assert_eq!(fast[0].value, "fast value");

    let (slow, slow_done) = slow.await.unwrap();
    assert_eq!(slow[0].value, "slow value");
    assert!(fast_done < slow_done);
}

#[tokio::test]
async fn test_many_concurrent_calls_share_one_connection() {
    let (client, _) = connect().await;

    let calls = (0..50).map(|i| {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            let key = format!("key{}", i);
            client.insert(&space(), &key, &i.to_string()).await.unwrap();
            client.select(&space(), &key).await.unwrap()
        })
    });

    for (i, call) in calls.enumerate() {
        let records = call.await.unwrap();
        assert_eq!(records[0].value, i.to_string());
    }
    assert_eq!(client.in_flight(), 0);
}

// =============================================================================
// Deadlines and Cancellation
// =============================================================================

#[tokio::test]
async fn test_request_timeout() {
    let (addr, _) = spawn_engine(Greeting::Tarantool).await;
    let mut config = config(addr);
    config.request_timeout_ms = 100;
    let client = Client::connect(&config).await.unwrap();

    let err = client.select(&space(), "hang").await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout(_)));
    assert_eq!(client.in_flight(), 0);

    // the connection stays usable
    assert!(client.select(&space(), "other").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelled_call_releases_its_slot() {
    let (client, _) = connect().await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        client.select(&space(), "hang-forever"),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(client.in_flight(), 0);
}

// =============================================================================
// Graceful Close
// =============================================================================

#[tokio::test]
async fn test_close_waits_for_in_flight_call() {
    let (client, data) = connect().await;
    data.lock()
        .unwrap()
        .insert("slowkey".to_string(), "v".to_string());

    let pending = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.select(&space(), "slowkey").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.in_flight(), 1);

    client
        .close(Instant::now() + Duration::from_secs(2))
        .await
        .unwrap();

    let records = pending.await.unwrap().unwrap();
    assert_eq!(records[0].value, "v");

    assert!(!client.is_open());
    assert!(matches!(
        client.select(&space(), "slowkey").await,
        Err(EngineError::Closed)
    ));
}

#[tokio::test]
async fn test_close_deadline_abandons_stuck_call() {
    let (client, _) = connect().await;

    let stuck = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.select(&space(), "hang").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = client
        .close(Instant::now() + Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Abandoned(1)));

    assert!(matches!(stuck.await.unwrap(), Err(EngineError::Closed)));
}
