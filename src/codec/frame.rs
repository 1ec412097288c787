//! Frame layout and resumable decoding
//!
//! Wire format (integers big-endian):
//! ```text
//! Frame:
//!   [4 bytes: body length (u32 BE)]
//!   [body]
//!
//! Request body:
//!   [1 byte: 0x01]
//!   [8 bytes: correlation id (u64 BE)]
//!   [1 byte: command length (u8)]
//!   [command bytes (UTF-8)]
//!   [MessagePack: (args, options)]
//!
//! Response body:
//!   [1 byte: 0x02]
//!   [8 bytes: correlation id (u64 BE)]
//!   [1 byte: success flag (0 or 1)]
//!   [MessagePack: result value or RemoteFault]
//!
//! Event body:
//!   [1 byte: 0x03]
//!   [1 byte: key length (u8)]
//!   [key bytes (UTF-8)]
//!   [raw payload bytes]
//! ```

use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::value::Value;
use crate::error::{Error, Result};

/// Largest frame body accepted in either direction
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const KIND_REQUEST: u8 = 0x01;
const KIND_RESPONSE: u8 = 0x02;
const KIND_EVENT: u8 = 0x03;

/// Error reported by the plotting process for one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFault {
    pub code: i32,
    pub message: String,
}

impl RemoteFault {
    pub const UNKNOWN_COMMAND: i32 = 1;
    pub const INVALID_ARGUMENT: i32 = 2;
    pub const UNKNOWN_OBJECT: i32 = 3;
    pub const IO: i32 = 4;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<RemoteFault> for Error {
    fn from(fault: RemoteFault) -> Self {
        Error::Remote {
            code: fault.code,
            message: fault.message,
        }
    }
}

/// A command to run in the plotting process, before it gets an id
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    command: String,
    args: Vec<Value>,
    options: Vec<(String, Value)>,
}

impl Invocation {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            options: Vec::new(),
        }
    }

    /// Append a positional argument
    pub fn arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several positional arguments
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Attach the options of a typed options struct
    pub fn options(mut self, options: &impl CommandOptions) -> Self {
        self.options.extend(
            options
                .to_options()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value)),
        );
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn arguments(&self) -> &[Value] {
        &self.args
    }

    pub fn option_pairs(&self) -> &[(String, Value)] {
        &self.options
    }
}

/// An enumerated set of named options for one command
///
/// Implemented by the typed option structs; there is no way to attach an
/// option by arbitrary name.
pub trait CommandOptions {
    fn to_options(&self) -> Vec<(&'static str, Value)>;
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request {
        id: u64,
        command: String,
        args: Vec<Value>,
        options: Vec<(String, Value)>,
    },
    Response {
        id: u64,
        outcome: std::result::Result<Value, RemoteFault>,
    },
    Event {
        key: String,
        payload: Vec<u8>,
    },
}

#[derive(Serialize)]
struct RequestParamsRef<'a> {
    args: &'a [Value],
    options: &'a [(String, Value)],
}

#[derive(Deserialize)]
struct RequestParams {
    args: Vec<Value>,
    options: Vec<(String, Value)>,
}

/// Encode a request frame, length prefix included
pub fn encode_request(id: u64, invocation: &Invocation) -> Result<Vec<u8>> {
    let name = invocation.command.as_bytes();
    if name.is_empty() || name.len() > 255 {
        return Err(Error::Protocol(format!(
            "command name must be 1-255 bytes, got {}",
            name.len()
        )));
    }

    let params = rmp_serde::to_vec(&RequestParamsRef {
        args: &invocation.args,
        options: &invocation.options,
    })?;

    let mut body = Vec::with_capacity(1 + 8 + 1 + name.len() + params.len());
    body.push(KIND_REQUEST);
    body.extend_from_slice(&id.to_be_bytes());
    body.push(name.len() as u8);
    body.extend_from_slice(name);
    body.extend_from_slice(&params);

    with_length_prefix(body)
}

/// Encode a response frame, length prefix included
pub fn encode_response(
    id: u64,
    outcome: &std::result::Result<Value, RemoteFault>,
) -> Result<Vec<u8>> {
    let (flag, payload) = match outcome {
        Ok(value) => (1u8, rmp_serde::to_vec(value)?),
        Err(fault) => (0u8, rmp_serde::to_vec(fault)?),
    };

    let mut body = Vec::with_capacity(1 + 8 + 1 + payload.len());
    body.push(KIND_RESPONSE);
    body.extend_from_slice(&id.to_be_bytes());
    body.push(flag);
    body.extend_from_slice(&payload);

    with_length_prefix(body)
}

/// Encode an event frame, length prefix included
pub fn encode_event(key: &str, payload: &[u8]) -> Result<Vec<u8>> {
    let key = key.as_bytes();
    if key.is_empty() || key.len() > 255 {
        return Err(Error::Protocol(format!(
            "event key must be 1-255 bytes, got {}",
            key.len()
        )));
    }

    let mut body = Vec::with_capacity(1 + 1 + key.len() + payload.len());
    body.push(KIND_EVENT);
    body.push(key.len() as u8);
    body.extend_from_slice(key);
    body.extend_from_slice(payload);

    with_length_prefix(body)
}

fn with_length_prefix(body: Vec<u8>) -> Result<Vec<u8>> {
    if body.len() > MAX_FRAME_LEN {
        return Err(Error::Protocol(format!(
            "frame of {} bytes exceeds the {MAX_FRAME_LEN} byte limit",
            body.len()
        )));
    }
    let mut buf = Vec::with_capacity(4 + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Decode one frame body (the bytes after the length prefix)
pub fn decode_body(mut data: &[u8]) -> Result<Frame> {
    if data.is_empty() {
        return Err(Error::Protocol("empty frame".to_string()));
    }

    match data.get_u8() {
        KIND_REQUEST => {
            let id = read_u64(&mut data, "request")?;
            let command = read_short_str(&mut data, "command")?;
            let params: RequestParams = rmp_serde::from_slice(data)?;
            Ok(Frame::Request {
                id,
                command,
                args: params.args,
                options: params.options,
            })
        }
        KIND_RESPONSE => {
            let id = read_u64(&mut data, "response")?;
            if data.is_empty() {
                return Err(Error::Protocol("truncated response status".to_string()));
            }
            let outcome = match data.get_u8() {
                1 => Ok(rmp_serde::from_slice::<Value>(data)?),
                0 => Err(rmp_serde::from_slice::<RemoteFault>(data)?),
                other => {
                    return Err(Error::Protocol(format!("invalid response status {other}")));
                }
            };
            Ok(Frame::Response { id, outcome })
        }
        KIND_EVENT => {
            let key = read_short_str(&mut data, "event key")?;
            Ok(Frame::Event {
                key,
                payload: data.to_vec(),
            })
        }
        other => Err(Error::Protocol(format!("unknown frame kind 0x{other:02x}"))),
    }
}

fn read_u64(data: &mut &[u8], what: &str) -> Result<u64> {
    if data.len() < 8 {
        return Err(Error::Protocol(format!("truncated {what} id")));
    }
    Ok(data.get_u64())
}

fn read_short_str(data: &mut &[u8], what: &str) -> Result<String> {
    if data.is_empty() {
        return Err(Error::Protocol(format!("truncated {what}")));
    }
    let len = data.get_u8() as usize;
    if data.len() < len {
        return Err(Error::Protocol(format!("truncated {what}")));
    }
    let s = std::str::from_utf8(&data[..len])
        .map_err(|e| Error::Protocol(format!("invalid {what} UTF-8: {e}")))?
        .to_string();
    data.advance(len);
    Ok(s)
}

/// Accumulates stream bytes and yields complete frames
///
/// A partial trailing frame stays buffered until the rest arrives. An invalid
/// length prefix leaves the stream without a frame boundary, so the decoder
/// drops its buffer and refuses every later frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    desynchronized: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream
    pub fn feed(&mut self, bytes: &[u8]) {
        if !self.desynchronized {
            self.buf.extend_from_slice(bytes);
        }
    }

    /// `true` once an invalid length prefix was seen
    pub fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    /// Number of buffered bytes not yet returned as a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete frame, if one is buffered
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.desynchronized {
            return Err(Error::Protocol("stream lost frame synchronization".into()));
        }
        if self.buf.len() < 4 {
            return Ok(None);
        }

        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        let len = len as usize;
        if len == 0 || len > MAX_FRAME_LEN {
            self.buf.clear();
            self.desynchronized = true;
            return Err(Error::Protocol(format!("invalid frame length {len}")));
        }
        if self.buf.len() < 4 + len {
            // Reserve up front so a large vector doesn't regrow the buffer per read
            self.buf.reserve(4 + len - self.buf.len());
            return Ok(None);
        }

        let mut frame = self.buf.split_to(4 + len);
        frame.advance(4);
        decode_body(&frame).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Frame {
        let mut decoder = FrameDecoder::new();
        decoder.feed(bytes);
        decoder.next_frame().unwrap().unwrap()
    }

    #[test]
    fn test_request_roundtrip() {
        let invocation = Invocation::new("new_curve").arg("V1").arg("V2");
        let bytes = encode_request(7, &invocation).unwrap();

        match decode_all(&bytes) {
            Frame::Request {
                id,
                command,
                args,
                options,
            } => {
                assert_eq!(id, 7);
                assert_eq!(command, "new_curve");
                assert_eq!(args, vec![Value::from("V1"), Value::from("V2")]);
                assert!(options.is_empty());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_response_error_roundtrip() {
        let fault = RemoteFault::new(RemoteFault::INVALID_ARGUMENT, "bad field 'Column 9'");
        let bytes = encode_response(3, &Err(fault.clone())).unwrap();

        assert_eq!(
            decode_all(&bytes),
            Frame::Response {
                id: 3,
                outcome: Err(fault)
            }
        );
    }

    #[test]
    fn test_event_carries_raw_payload() {
        let bytes = encode_event("L1", b"valueSet:x^2").unwrap();
        assert_eq!(
            decode_all(&bytes),
            Frame::Event {
                key: "L1".to_string(),
                payload: b"valueSet:x^2".to_vec()
            }
        );
    }

    #[test]
    fn test_split_at_every_boundary() {
        let invocation = Invocation::new("vector.load")
            .arg("V1")
            .arg(vec![0.25f64, -1.0, 3.5]);
        let bytes = encode_request(42, &invocation).unwrap();
        let whole = decode_all(&bytes);

        for split in 0..=bytes.len() {
            let mut decoder = FrameDecoder::new();
            decoder.feed(&bytes[..split]);
            let early = decoder.next_frame().unwrap();
            if split < bytes.len() {
                assert!(early.is_none(), "frame decoded early at split {split}");
                decoder.feed(&bytes[split..]);
                assert_eq!(decoder.next_frame().unwrap().unwrap(), whole);
            } else {
                assert_eq!(early.unwrap(), whole);
            }
            assert_eq!(decoder.buffered(), 0);
        }
    }

    #[test]
    fn test_back_to_back_frames_leave_tail() {
        let first = encode_response(1, &Ok(Value::Int(1))).unwrap();
        let second = encode_response(2, &Ok(Value::Int(2))).unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.feed(&first);
        decoder.feed(&second[..5]);

        assert!(matches!(decoder.next_frame().unwrap(), Some(Frame::Response { id: 1, .. })));
        assert!(decoder.next_frame().unwrap().is_none());
        assert_eq!(decoder.buffered(), 5);

        decoder.feed(&second[5..]);
        assert!(matches!(decoder.next_frame().unwrap(), Some(Frame::Response { id: 2, .. })));
    }

    #[test]
    fn test_rejects_zero_length() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[0, 0, 0, 0]);
        assert!(matches!(decoder.next_frame(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_bad_length_stops_decoding() {
        let valid = encode_response(9, &Ok(Value::from(1))).unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[0, 0, 0, 0]);
        decoder.feed(&valid);

        assert!(matches!(decoder.next_frame(), Err(Error::Protocol(_))));
        assert!(decoder.is_desynchronized());
        assert_eq!(decoder.buffered(), 0);

        // Bytes after the bad prefix never surface as a frame
        decoder.feed(&valid);
        assert!(matches!(decoder.next_frame(), Err(Error::Protocol(_))));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_rejects_unknown_kind() {
        assert!(matches!(decode_body(&[0x7f]), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_command_name_too_long() {
        let invocation = Invocation::new("x".repeat(256));
        assert!(matches!(encode_request(1, &invocation), Err(Error::Protocol(_))));
    }
}
