//! Tokio codec for the iproto wire format
//!
//! Every packet is framed as `[msgpack uint length][header map][body map]`.
//! The client side encodes [`Request`]s and decodes [`Response`]s; the server
//! side does the reverse and backs the scripted engines used in tests.

use bytes::{Buf, BufMut, BytesMut};
use rmpv::Value;
use tokio_util::codec::{Decoder, Encoder};

use super::error::{EngineError, EngineResult};
use super::protocol::{header, Request, RequestType, Response};

/// Default upper bound on a single frame
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Reads the msgpack-encoded length prefix.
///
/// Returns the prefix width and the payload length, or `None` if more bytes
/// are needed.
fn read_length(src: &[u8]) -> EngineResult<Option<(usize, usize)>> {
    let Some(&marker) = src.first() else {
        return Ok(None);
    };

    let width = match marker {
        0x00..=0x7f => return Ok(Some((1, marker as usize))),
        0xcc => 1,
        0xcd => 2,
        0xce => 4,
        0xcf => 8,
        other => {
            return Err(EngineError::protocol(format!(
                "invalid length marker 0x{:02x}",
                other
            )))
        }
    };

    if src.len() < 1 + width {
        return Ok(None);
    }

    let mut len: u64 = 0;
    for byte in &src[1..1 + width] {
        len = (len << 8) | u64::from(*byte);
    }
    let len = usize::try_from(len)
        .map_err(|_| EngineError::protocol(format!("frame length {} overflows", len)))?;
    Ok(Some((1 + width, len)))
}

/// Splits one complete frame off `src` and decodes its header and body.
fn decode_frame(src: &mut BytesMut, max_frame_len: usize) -> EngineResult<Option<(Value, Value)>> {
    let Some((prefix, len)) = read_length(src)? else {
        return Ok(None);
    };

    if len > max_frame_len {
        return Err(EngineError::protocol(format!(
            "frame of {} bytes exceeds limit of {}",
            len, max_frame_len
        )));
    }

    if src.len() < prefix + len {
        src.reserve(prefix + len - src.len());
        return Ok(None);
    }

    src.advance(prefix);
    let frame = src.split_to(len);
    let mut cursor: &[u8] = &frame;

    let head = rmpv::decode::read_value(&mut cursor)?;
    let body = if cursor.is_empty() {
        Value::Map(Vec::new())
    } else {
        rmpv::decode::read_value(&mut cursor)?
    };

    Ok(Some((head, body)))
}

fn encode_frame(head: &Value, body: &Value, dst: &mut BytesMut) -> EngineResult<()> {
    let mut payload = Vec::with_capacity(64);
    rmpv::encode::write_value(&mut payload, head)?;
    rmpv::encode::write_value(&mut payload, body)?;

    let len = u32::try_from(payload.len()).map_err(|_| {
        EngineError::protocol(format!("frame of {} bytes is too large", payload.len()))
    })?;

    dst.reserve(5 + payload.len());
    dst.put_u8(0xce);
    dst.put_u32(len);
    dst.extend_from_slice(&payload);
    Ok(())
}

fn header_field(head: &[(Value, Value)], wanted: u8) -> Option<u64> {
    head.iter()
        .find(|(k, _)| k.as_u64() == Some(u64::from(wanted)))
        .and_then(|(_, v)| v.as_u64())
}

fn into_map(value: Value, what: &str) -> EngineResult<Vec<(Value, Value)>> {
    match value {
        Value::Map(entries) => Ok(entries),
        Value::Nil => Ok(Vec::new()),
        other => Err(EngineError::protocol(format!(
            "{} is not a map: {}",
            what, other
        ))),
    }
}

fn parse_header(head: Value) -> EngineResult<(u32, u64)> {
    let head = into_map(head, "header")?;
    let code = header_field(&head, header::REQUEST_TYPE)
        .ok_or_else(|| EngineError::protocol("header is missing the request type"))?;
    let sync = header_field(&head, header::SYNC).unwrap_or(0);
    let code = u32::try_from(code)
        .map_err(|_| EngineError::protocol(format!("request type {} out of range", code)))?;
    Ok((code, sync))
}

// ==================
// Client Side
// ==================

/// Codec used by the engine client: writes requests, reads responses
#[derive(Debug, Clone)]
pub struct ClientCodec {
    max_frame_len: usize,
}

impl ClientCodec {
    pub fn new() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }
}

impl Default for ClientCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ClientCodec {
    type Item = Response;
    type Error = EngineError;

    fn decode(&mut self, src: &mut BytesMut) -> EngineResult<Option<Response>> {
        let Some((head, body)) = decode_frame(src, self.max_frame_len)? else {
            return Ok(None);
        };

        let (status, sync) = parse_header(head)?;
        Ok(Some(Response {
            status,
            sync,
            body: into_map(body, "response body")?,
        }))
    }
}

impl Encoder<Request> for ClientCodec {
    type Error = EngineError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> EngineResult<()> {
        let head = Value::Map(vec![
            (Value::from(header::REQUEST_TYPE), Value::from(item.kind.code())),
            (Value::from(header::SYNC), Value::from(item.sync)),
        ]);
        let body = Value::Map(
            item.body
                .into_iter()
                .map(|(k, v)| (Value::from(k), v))
                .collect(),
        );
        encode_frame(&head, &body, dst)
    }
}

// ==================
// Server Side
// ==================

/// Codec for the engine side of a connection: reads requests, writes responses
#[derive(Debug, Clone, Default)]
pub struct ServerCodec {
    inner: ClientCodec,
}

impl ServerCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for ServerCodec {
    type Item = Request;
    type Error = EngineError;

    fn decode(&mut self, src: &mut BytesMut) -> EngineResult<Option<Request>> {
        let Some((head, body)) = decode_frame(src, self.inner.max_frame_len)? else {
            return Ok(None);
        };

        let (code, sync) = parse_header(head)?;
        let kind = RequestType::try_from(code)?;
        let body = into_map(body, "request body")?
            .into_iter()
            .map(|(k, v)| {
                k.as_u64()
                    .and_then(|k| u8::try_from(k).ok())
                    .map(|k| (k, v))
                    .ok_or_else(|| EngineError::protocol("request body key is not a small integer"))
            })
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(Some(Request { kind, sync, body }))
    }
}

impl Encoder<Response> for ServerCodec {
    type Error = EngineError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> EngineResult<()> {
        let head = Value::Map(vec![
            (Value::from(header::REQUEST_TYPE), Value::from(item.status)),
            (Value::from(header::SYNC), Value::from(item.sync)),
        ]);
        encode_frame(&head, &Value::Map(item.body), dst)
    }
}

impl TryFrom<u32> for RequestType {
    type Error = EngineError;

    fn try_from(code: u32) -> EngineResult<Self> {
        match code {
            1 => Ok(Self::Select),
            2 => Ok(Self::Insert),
            4 => Ok(Self::Update),
            5 => Ok(Self::Delete),
            7 => Ok(Self::Auth),
            8 => Ok(Self::Eval),
            other => Err(EngineError::protocol(format!(
                "unsupported request type {}",
                other
            ))),
        }
    }
}
