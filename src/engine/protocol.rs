//! Tarantool binary protocol (iproto) vocabulary
//!
//! Request/response codes, map keys, and the typed request and response
//! structures the codec moves over the wire.

use rmpv::Value;

use super::error::{EngineError, EngineResult};
use super::Record;

/// Size of the server greeting sent on connect
pub const GREETING_SIZE: usize = 128;

/// Length of the salt prefix used by chap-sha1
pub const SCRAMBLE_SIZE: usize = 20;

/// Engine error code: duplicate key exists in unique index
pub const ER_TUPLE_FOUND: u32 = 3;

/// Response status bit marking an error response
pub const IPROTO_TYPE_ERROR: u32 = 0x8000;

/// Header keys
pub mod header {
    pub const REQUEST_TYPE: u8 = 0x00;
    pub const SYNC: u8 = 0x01;
}

/// Body keys
pub mod key {
    pub const SPACE_ID: u8 = 0x10;
    pub const INDEX_ID: u8 = 0x11;
    pub const LIMIT: u8 = 0x12;
    pub const OFFSET: u8 = 0x13;
    pub const ITERATOR: u8 = 0x14;
    pub const KEY: u8 = 0x20;
    pub const TUPLE: u8 = 0x21;
    pub const USER_NAME: u8 = 0x23;
    pub const EXPR: u8 = 0x27;
    pub const DATA: u8 = 0x30;
    pub const ERROR_24: u8 = 0x31;
}

/// Request types understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Select = 1,
    Insert = 2,
    Update = 4,
    Delete = 5,
    Auth = 7,
    Eval = 8,
}

impl RequestType {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Auth => "auth",
            Self::Eval => "eval",
        }
    }
}

/// Index iterator: equality match
pub const ITER_EQ: u32 = 0;

/// Primary index id
pub const PRIMARY_INDEX: u32 = 0;

/// Field number of the value in a key-value tuple (0-based over iproto)
pub const VALUE_FIELD: u32 = 1;

/// An outgoing request frame
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub kind: RequestType,
    pub sync: u64,
    pub body: Vec<(u8, Value)>,
}

impl Request {
    pub fn new(kind: RequestType, body: Vec<(u8, Value)>) -> Self {
        Self { kind, sync: 0, body }
    }

    pub fn with_sync(mut self, sync: u64) -> Self {
        self.sync = sync;
        self
    }

    pub fn select(space_id: u32, key: &str, limit: u32) -> Self {
        Self::new(
            RequestType::Select,
            vec![
                (key::SPACE_ID, Value::from(space_id)),
                (key::INDEX_ID, Value::from(PRIMARY_INDEX)),
                (key::LIMIT, Value::from(limit)),
                (key::OFFSET, Value::from(0u32)),
                (key::ITERATOR, Value::from(ITER_EQ)),
                (key::KEY, Value::Array(vec![Value::from(key)])),
            ],
        )
    }

    pub fn insert(space_id: u32, record_key: &str, value: &str) -> Self {
        Self::new(
            RequestType::Insert,
            vec![
                (key::SPACE_ID, Value::from(space_id)),
                (
                    key::TUPLE,
                    Value::Array(vec![Value::from(record_key), Value::from(value)]),
                ),
            ],
        )
    }

    /// Assigns `value` to the value field of the tuple under `record_key`.
    pub fn update_value(space_id: u32, record_key: &str, value: &str) -> Self {
        let assign = Value::Array(vec![
            Value::from("="),
            Value::from(VALUE_FIELD),
            Value::from(value),
        ]);
        Self::new(
            RequestType::Update,
            vec![
                (key::SPACE_ID, Value::from(space_id)),
                (key::INDEX_ID, Value::from(PRIMARY_INDEX)),
                (key::KEY, Value::Array(vec![Value::from(record_key)])),
                (key::TUPLE, Value::Array(vec![assign])),
            ],
        )
    }

    pub fn delete(space_id: u32, record_key: &str) -> Self {
        Self::new(
            RequestType::Delete,
            vec![
                (key::SPACE_ID, Value::from(space_id)),
                (key::INDEX_ID, Value::from(PRIMARY_INDEX)),
                (key::KEY, Value::Array(vec![Value::from(record_key)])),
            ],
        )
    }

    pub fn eval(expr: &str) -> Self {
        Self::new(
            RequestType::Eval,
            vec![
                (key::EXPR, Value::from(expr)),
                (key::TUPLE, Value::Array(Vec::new())),
            ],
        )
    }

    pub fn auth(user: &str, scramble: &[u8]) -> Self {
        Self::new(
            RequestType::Auth,
            vec![
                (key::USER_NAME, Value::from(user)),
                (
                    key::TUPLE,
                    Value::Array(vec![Value::from("chap-sha1"), Value::from(scramble)]),
                ),
            ],
        )
    }
}

/// An incoming response frame
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u32,
    pub sync: u64,
    pub body: Vec<(Value, Value)>,
}

impl Response {
    pub fn is_error(&self) -> bool {
        self.status & IPROTO_TYPE_ERROR != 0
    }

    fn field(&self, wanted: u8) -> Option<&Value> {
        self.body
            .iter()
            .find(|(k, _)| k.as_u64() == Some(u64::from(wanted)))
            .map(|(_, v)| v)
    }

    /// Converts the response into the `DATA` array, or the engine error it carries.
    pub fn into_data(self) -> EngineResult<Vec<Value>> {
        if self.is_error() {
            let message = self
                .field(key::ERROR_24)
                .and_then(Value::as_str)
                .unwrap_or("unknown engine error")
                .to_string();
            return Err(EngineError::Server {
                code: self.status & !IPROTO_TYPE_ERROR,
                message,
            });
        }

        let position = self
            .body
            .iter()
            .position(|(k, _)| k.as_u64() == Some(u64::from(key::DATA)));
        match position {
            None => Ok(Vec::new()),
            Some(i) => match self.body.into_iter().nth(i) {
                Some((_, Value::Array(items))) => Ok(items),
                Some((_, other)) => Err(EngineError::protocol(format!(
                    "response data is not an array: {}",
                    other
                ))),
                None => Ok(Vec::new()),
            },
        }
    }
}

/// Decodes a `[key, value, ...]` tuple into a record.
pub fn decode_record(tuple: Value) -> EngineResult<Record> {
    let fields = match tuple {
        Value::Array(fields) => fields,
        other => {
            return Err(EngineError::protocol(format!(
                "tuple is not an array: {}",
                other
            )))
        }
    };

    let mut fields = fields.into_iter();
    let key = string_field(fields.next(), "key")?;
    let value = string_field(fields.next(), "value")?;
    Ok(Record { key, value })
}

fn string_field(field: Option<Value>, name: &str) -> EngineResult<String> {
    match field {
        Some(Value::String(s)) => s
            .into_str()
            .ok_or_else(|| EngineError::protocol(format!("tuple field '{}' is not UTF-8", name))),
        Some(other) => Err(EngineError::protocol(format!(
            "tuple field '{}' is not a string: {}",
            name, other
        ))),
        None => Err(EngineError::protocol(format!("tuple field '{}' is missing", name))),
    }
}

/// Decodes an UPDATE/DELETE result: the affected tuple, or none if the key was absent.
pub fn decode_affected(data: Vec<Value>) -> EngineResult<Option<Record>> {
    data.into_iter().next().map(decode_record).transpose()
}
