use bytes::{Buf, BufMut, Bytes, BytesMut};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ServiceError;

/// Upper bound on one encoded frame.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const PRELUDE_LEN: usize = 8;

const TYPE_TRUE: u8 = 0;
const TYPE_FALSE: u8 = 1;
const TYPE_BYTE: u8 = 2;
const TYPE_SHORT: u8 = 3;
const TYPE_INTEGER: u8 = 4;
const TYPE_LONG: u8 = 5;
const TYPE_BYTES: u8 = 6;
const TYPE_STRING: u8 = 7;
const TYPE_TIMESTAMP: u8 = 8;
const TYPE_UUID: u8 = 9;

/// Typed event message header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Integer(i32),
    Long(i64),
    Bytes(Bytes),
    String(String),
    /// Millisecond precision on the wire.
    Timestamp(OffsetDateTime),
    Uuid(Uuid),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// One message of an event stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventMessage {
    pub headers: Vec<(String, HeaderValue)>,
    pub payload: Bytes,
}

impl EventMessage {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            headers: Vec::new(),
            payload: payload.into(),
        }
    }

    /// Sets `name`, replacing an existing header of the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header(name).and_then(HeaderValue::as_str)
    }
}

fn frame_error(message: impl Into<String>) -> ServiceError {
    ServiceError::event_stream(message)
}

/// Binary framing: `total_len:u32`, `headers_len:u32`, headers, payload.
///
/// `total_len` counts the whole frame including the two length fields. Each
/// header is a `u8` name length, the name, a `u8` type tag, and the value;
/// strings and byte arrays carry a `u16` length prefix.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventFramer;

impl EventFramer {
    /// # Errors
    ///
    /// Fails when a header does not fit the wire limits.
    pub fn encode(&self, message: &EventMessage) -> Result<Bytes, ServiceError> {
        let mut headers = BytesMut::new();
        for (name, value) in &message.headers {
            let name_len = u8::try_from(name.len())
                .map_err(|_| frame_error(format!("header name '{name}' is too long")))?;
            headers.put_u8(name_len);
            headers.put_slice(name.as_bytes());
            encode_value(&mut headers, name, value)?;
        }

        let total = PRELUDE_LEN + headers.len() + message.payload.len();
        if total > MAX_FRAME_LEN {
            return Err(frame_error(format!(
                "event frame of {total} bytes exceeds {MAX_FRAME_LEN}"
            )));
        }

        let mut frame = BytesMut::with_capacity(total);
        frame.put_u32(total as u32);
        frame.put_u32(headers.len() as u32);
        frame.put_slice(&headers);
        frame.put_slice(&message.payload);
        Ok(frame.freeze())
    }

    /// Splits one complete frame off the front of `buffer`.
    ///
    /// Returns `Ok(None)` when `buffer` does not hold a full frame yet.
    ///
    /// # Errors
    ///
    /// Fails on a malformed frame; the stream cannot recover from that.
    pub fn decode(&self, buffer: &mut BytesMut) -> Result<Option<EventMessage>, ServiceError> {
        if buffer.len() < PRELUDE_LEN {
            return Ok(None);
        }
        let total = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        let headers_len = u32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]) as usize;
        if total > MAX_FRAME_LEN || total < PRELUDE_LEN + headers_len {
            return Err(frame_error(format!(
                "invalid event frame lengths (total {total}, headers {headers_len})"
            )));
        }
        if buffer.len() < total {
            return Ok(None);
        }

        let mut frame = buffer.split_to(total).freeze();
        frame.advance(PRELUDE_LEN);
        let mut header_bytes = frame.split_to(headers_len);

        let mut message = EventMessage::new(frame);
        while header_bytes.has_remaining() {
            let name_len = usize::from(header_bytes.get_u8());
            let name = take_string(&mut header_bytes, name_len)?;
            let value = decode_value(&mut header_bytes, &name)?;
            message.headers.push((name, value));
        }
        Ok(Some(message))
    }
}

fn encode_value(out: &mut BytesMut, name: &str, value: &HeaderValue) -> Result<(), ServiceError> {
    match value {
        HeaderValue::Boolean(true) => out.put_u8(TYPE_TRUE),
        HeaderValue::Boolean(false) => out.put_u8(TYPE_FALSE),
        HeaderValue::Byte(value) => {
            out.put_u8(TYPE_BYTE);
            out.put_i8(*value);
        }
        HeaderValue::Short(value) => {
            out.put_u8(TYPE_SHORT);
            out.put_i16(*value);
        }
        HeaderValue::Integer(value) => {
            out.put_u8(TYPE_INTEGER);
            out.put_i32(*value);
        }
        HeaderValue::Long(value) => {
            out.put_u8(TYPE_LONG);
            out.put_i64(*value);
        }
        HeaderValue::Bytes(value) => {
            out.put_u8(TYPE_BYTES);
            put_sized(out, name, value)?;
        }
        HeaderValue::String(value) => {
            out.put_u8(TYPE_STRING);
            put_sized(out, name, value.as_bytes())?;
        }
        HeaderValue::Timestamp(value) => {
            out.put_u8(TYPE_TIMESTAMP);
            let millis = value.unix_timestamp_nanos() / 1_000_000;
            let millis = i64::try_from(millis)
                .map_err(|_| frame_error(format!("timestamp header '{name}' is out of range")))?;
            out.put_i64(millis);
        }
        HeaderValue::Uuid(value) => {
            out.put_u8(TYPE_UUID);
            out.put_slice(value.as_bytes());
        }
    }
    Ok(())
}

fn put_sized(out: &mut BytesMut, name: &str, value: &[u8]) -> Result<(), ServiceError> {
    let len = u16::try_from(value.len())
        .map_err(|_| frame_error(format!("header '{name}' value is too long")))?;
    out.put_u16(len);
    out.put_slice(value);
    Ok(())
}

fn ensure(buf: &Bytes, needed: usize, name: &str) -> Result<(), ServiceError> {
    if buf.remaining() < needed {
        return Err(frame_error(format!("truncated event header '{name}'")));
    }
    Ok(())
}

fn take_string(buf: &mut Bytes, len: usize) -> Result<String, ServiceError> {
    ensure(buf, len, "name")?;
    String::from_utf8(buf.split_to(len).to_vec())
        .map_err(|_| frame_error("event header is not valid UTF-8"))
}

fn decode_value(buf: &mut Bytes, name: &str) -> Result<HeaderValue, ServiceError> {
    ensure(buf, 1, name)?;
    let value = match buf.get_u8() {
        TYPE_TRUE => HeaderValue::Boolean(true),
        TYPE_FALSE => HeaderValue::Boolean(false),
        TYPE_BYTE => {
            ensure(buf, 1, name)?;
            HeaderValue::Byte(buf.get_i8())
        }
        TYPE_SHORT => {
            ensure(buf, 2, name)?;
            HeaderValue::Short(buf.get_i16())
        }
        TYPE_INTEGER => {
            ensure(buf, 4, name)?;
            HeaderValue::Integer(buf.get_i32())
        }
        TYPE_LONG => {
            ensure(buf, 8, name)?;
            HeaderValue::Long(buf.get_i64())
        }
        TYPE_BYTES => {
            ensure(buf, 2, name)?;
            let len = usize::from(buf.get_u16());
            ensure(buf, len, name)?;
            HeaderValue::Bytes(buf.split_to(len))
        }
        TYPE_STRING => {
            ensure(buf, 2, name)?;
            let len = usize::from(buf.get_u16());
            HeaderValue::String(take_string(buf, len)?)
        }
        TYPE_TIMESTAMP => {
            ensure(buf, 8, name)?;
            let millis = i128::from(buf.get_i64());
            let value = OffsetDateTime::from_unix_timestamp_nanos(millis * 1_000_000)
                .map_err(|_| frame_error(format!("timestamp header '{name}' is out of range")))?;
            HeaderValue::Timestamp(value)
        }
        TYPE_UUID => {
            ensure(buf, 16, name)?;
            let mut bytes = [0_u8; 16];
            buf.copy_to_slice(&mut bytes);
            HeaderValue::Uuid(Uuid::from_bytes(bytes))
        }
        other => {
            return Err(frame_error(format!(
                "unknown type {other} for event header '{name}'"
            )))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_split_across_reads_decode_once_complete() {
        let message = EventMessage::new("payload")
            .with_header(":event-type", "Tick")
            .with_header("count", HeaderValue::Integer(3))
            .with_header("flag", HeaderValue::Boolean(false));
        let frame = EventFramer.encode(&message).expect("encode");

        let mut buffer = BytesMut::from(&frame[..5]);
        assert_eq!(EventFramer.decode(&mut buffer).expect("partial"), None);

        buffer.extend_from_slice(&frame[5..]);
        let decoded = EventFramer.decode(&mut buffer).expect("decode");
        assert_eq!(decoded, Some(message));
        assert!(buffer.is_empty());
    }

    #[test]
    fn timestamps_keep_millisecond_precision() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("valid");
        let message = EventMessage::default().with_header("at", HeaderValue::Timestamp(at));
        let mut buffer = BytesMut::from(&EventFramer.encode(&message).expect("encode")[..]);

        let decoded = EventFramer.decode(&mut buffer).expect("decode").expect("frame");
        assert_eq!(decoded.header("at"), Some(&HeaderValue::Timestamp(at)));
    }

    #[test]
    fn unknown_header_type_is_an_error() {
        let mut buffer = BytesMut::new();
        buffer.put_u32(12);
        buffer.put_u32(4);
        buffer.put_slice(&[1, b'x', 42, 0]);
        assert!(EventFramer.decode(&mut buffer).is_err());
    }
}
