//! Mapping between event union values and [`EventMessage`]s.
//!
//! The variant name becomes `:event-type`. Members marked `eventHeader` are
//! message headers, the `eventPayload` member (if any) is the raw payload,
//! and every other member is encoded as one codec document in the payload.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use time::OffsetDateTime;

use super::message::{EventMessage, HeaderValue};
use crate::codec::Codec;
use crate::deserializers::DeserializeableShape;
use crate::document::{Document, DocumentDeserializer};
use crate::error::{SerializationError, ServiceError};
use crate::protocol::TypeRegistry;
use crate::schema::{Schema, ShapeType};
use crate::serializers::{
    InterceptingSerializer, MapSerializer, MemberFilter, SerializeResult, SerializeableStruct,
    SerializerRouter, ShapeSerializer,
};

pub const MESSAGE_TYPE: &str = ":message-type";
pub const EVENT_TYPE: &str = ":event-type";
pub const EXCEPTION_TYPE: &str = ":exception-type";
pub const CONTENT_TYPE: &str = ":content-type";
pub const ERROR_CODE: &str = ":error-code";
pub const ERROR_MESSAGE: &str = ":error-message";

fn is_body_member(member: &Schema) -> bool {
    !member.traits().is_event_header() && !member.traits().is_event_payload()
}

/// Turns event union values into messages.
#[derive(Debug, Clone)]
pub struct EventSerializer {
    codec: Arc<dyn Codec>,
}

impl EventSerializer {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }

    /// # Errors
    ///
    /// Fails when the union has no structure variant set or a member cannot
    /// be written as a header.
    pub fn serialize(
        &self,
        event: &dyn SerializeableStruct,
    ) -> Result<EventMessage, SerializationError> {
        let mut writer = VariantWriter {
            codec: self.codec.as_ref(),
            message: None,
        };
        event.serialize_members(&mut writer)?;
        writer
            .message
            .ok_or_else(|| SerializationError::missing_member(event.schema().id(), "event variant"))
    }
}

struct VariantWriter<'c> {
    codec: &'c dyn Codec,
    message: Option<EventMessage>,
}

impl VariantWriter<'_> {
    fn encode(
        &self,
        variant: &Schema,
        event: &dyn SerializeableStruct,
    ) -> Result<EventMessage, SerializationError> {
        let event_type = variant
            .member_name()
            .ok_or_else(|| SerializationError::unsupported(variant.id(), "an event variant"))?;

        let mut bound = InterceptingSerializer::new(EventRouter {
            headers: HeaderWriter::default(),
            payload: PayloadWriter {
                codec: self.codec,
                payload: None,
            },
            body: crate::serializers::DiscardSerializer,
        });
        event.serialize_members(&mut bound)?;
        let EventRouter { headers, payload, .. } = bound.into_router();

        let (content_type, body) = match payload.payload {
            Some(found) => found,
            None => {
                let filtered = MemberFilter::new(event, is_body_member);
                (
                    self.codec.media_type().to_owned(),
                    Bytes::from(self.codec.serialize(&filtered)?),
                )
            }
        };

        let mut message = EventMessage::new(body)
            .with_header(MESSAGE_TYPE, "event")
            .with_header(EVENT_TYPE, event_type)
            .with_header(CONTENT_TYPE, content_type);
        for (name, value) in headers.headers {
            message.set_header(name, value);
        }
        Ok(message)
    }

    fn not_a_variant(schema: &Schema) -> SerializationError {
        SerializationError::unsupported(schema.id(), "an event; event variants must be structures")
    }
}

impl ShapeSerializer for VariantWriter<'_> {
    fn write_struct(
        &mut self,
        schema: &Schema,
        value: &dyn SerializeableStruct,
    ) -> SerializeResult {
        self.message = Some(self.encode(schema, value)?);
        Ok(())
    }

    fn write_list(
        &mut self,
        schema: &Schema,
        _: usize,
        _: &mut dyn FnMut(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult {
        Err(Self::not_a_variant(schema))
    }

    fn write_map(
        &mut self,
        schema: &Schema,
        _: usize,
        _: &mut dyn FnMut(&mut dyn MapSerializer) -> SerializeResult,
    ) -> SerializeResult {
        Err(Self::not_a_variant(schema))
    }

    fn write_null(&mut self, _: &Schema) -> SerializeResult {
        Ok(())
    }

    fn write_boolean(&mut self, schema: &Schema, _: bool) -> SerializeResult {
        Err(Self::not_a_variant(schema))
    }

    fn write_integer(&mut self, schema: &Schema, _: i32) -> SerializeResult {
        Err(Self::not_a_variant(schema))
    }

    fn write_long(&mut self, schema: &Schema, _: i64) -> SerializeResult {
        Err(Self::not_a_variant(schema))
    }

    fn write_double(&mut self, schema: &Schema, _: f64) -> SerializeResult {
        Err(Self::not_a_variant(schema))
    }

    fn write_string(&mut self, schema: &Schema, _: &str) -> SerializeResult {
        Err(Self::not_a_variant(schema))
    }

    fn write_blob(&mut self, schema: &Schema, _: &[u8]) -> SerializeResult {
        Err(Self::not_a_variant(schema))
    }

    fn write_timestamp(&mut self, schema: &Schema, _: OffsetDateTime) -> SerializeResult {
        Err(Self::not_a_variant(schema))
    }

    fn write_document(&mut self, schema: &Schema, _: &Document) -> SerializeResult {
        Err(Self::not_a_variant(schema))
    }
}

struct EventRouter<'c> {
    headers: HeaderWriter,
    payload: PayloadWriter<'c>,
    body: crate::serializers::DiscardSerializer,
}

impl SerializerRouter for EventRouter<'_> {
    fn before(&mut self, schema: &Schema) -> &mut dyn ShapeSerializer {
        if schema.traits().is_event_header() {
            &mut self.headers
        } else if schema.traits().is_event_payload() {
            &mut self.payload
        } else {
            &mut self.body
        }
    }
}

#[derive(Default)]
struct HeaderWriter {
    headers: Vec<(String, HeaderValue)>,
}

impl HeaderWriter {
    fn push(&mut self, schema: &Schema, value: HeaderValue) -> SerializeResult {
        let name = schema
            .member_name()
            .ok_or_else(|| SerializationError::unsupported(schema.id(), "an event header"))?;
        self.headers.push((name.to_owned(), value));
        Ok(())
    }

    fn unsupported(schema: &Schema) -> SerializationError {
        SerializationError::unsupported(schema.id(), "an event header")
    }
}

impl ShapeSerializer for HeaderWriter {
    fn write_struct(&mut self, schema: &Schema, _: &dyn SerializeableStruct) -> SerializeResult {
        Err(Self::unsupported(schema))
    }

    fn write_list(
        &mut self,
        schema: &Schema,
        _: usize,
        _: &mut dyn FnMut(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult {
        Err(Self::unsupported(schema))
    }

    fn write_map(
        &mut self,
        schema: &Schema,
        _: usize,
        _: &mut dyn FnMut(&mut dyn MapSerializer) -> SerializeResult,
    ) -> SerializeResult {
        Err(Self::unsupported(schema))
    }

    fn write_null(&mut self, _: &Schema) -> SerializeResult {
        Ok(())
    }

    fn write_boolean(&mut self, schema: &Schema, value: bool) -> SerializeResult {
        self.push(schema, HeaderValue::Boolean(value))
    }

    fn write_byte(&mut self, schema: &Schema, value: i8) -> SerializeResult {
        self.push(schema, HeaderValue::Byte(value))
    }

    fn write_short(&mut self, schema: &Schema, value: i16) -> SerializeResult {
        self.push(schema, HeaderValue::Short(value))
    }

    fn write_integer(&mut self, schema: &Schema, value: i32) -> SerializeResult {
        self.push(schema, HeaderValue::Integer(value))
    }

    fn write_long(&mut self, schema: &Schema, value: i64) -> SerializeResult {
        self.push(schema, HeaderValue::Long(value))
    }

    fn write_double(&mut self, schema: &Schema, _: f64) -> SerializeResult {
        Err(Self::unsupported(schema))
    }

    fn write_string(&mut self, schema: &Schema, value: &str) -> SerializeResult {
        self.push(schema, HeaderValue::String(value.to_owned()))
    }

    fn write_blob(&mut self, schema: &Schema, value: &[u8]) -> SerializeResult {
        self.push(schema, HeaderValue::Bytes(Bytes::copy_from_slice(value)))
    }

    fn write_timestamp(&mut self, schema: &Schema, value: OffsetDateTime) -> SerializeResult {
        self.push(schema, HeaderValue::Timestamp(value))
    }

    fn write_document(&mut self, schema: &Schema, _: &Document) -> SerializeResult {
        Err(Self::unsupported(schema))
    }
}

struct PayloadWriter<'c> {
    codec: &'c dyn Codec,
    /// Content type and bytes.
    payload: Option<(String, Bytes)>,
}

impl PayloadWriter<'_> {
    fn unsupported(schema: &Schema) -> SerializationError {
        SerializationError::unsupported(schema.id(), "an event payload")
    }

    fn encoded(
        &mut self,
        write: impl FnOnce(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult {
        let mut sink = Vec::new();
        {
            let mut serializer = self.codec.create_serializer(&mut sink);
            write(serializer.as_mut())?;
            serializer.flush()?;
        }
        self.payload = Some((self.codec.media_type().to_owned(), Bytes::from(sink)));
        Ok(())
    }
}

impl ShapeSerializer for PayloadWriter<'_> {
    fn write_struct(
        &mut self,
        schema: &Schema,
        value: &dyn SerializeableStruct,
    ) -> SerializeResult {
        self.encoded(|serializer| serializer.write_struct(schema, value))
    }

    fn write_list(
        &mut self,
        schema: &Schema,
        _: usize,
        _: &mut dyn FnMut(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult {
        Err(Self::unsupported(schema))
    }

    fn write_map(
        &mut self,
        schema: &Schema,
        _: usize,
        _: &mut dyn FnMut(&mut dyn MapSerializer) -> SerializeResult,
    ) -> SerializeResult {
        Err(Self::unsupported(schema))
    }

    fn write_null(&mut self, _: &Schema) -> SerializeResult {
        Ok(())
    }

    fn write_boolean(&mut self, schema: &Schema, _: bool) -> SerializeResult {
        Err(Self::unsupported(schema))
    }

    fn write_integer(&mut self, schema: &Schema, _: i32) -> SerializeResult {
        Err(Self::unsupported(schema))
    }

    fn write_long(&mut self, schema: &Schema, _: i64) -> SerializeResult {
        Err(Self::unsupported(schema))
    }

    fn write_double(&mut self, schema: &Schema, _: f64) -> SerializeResult {
        Err(Self::unsupported(schema))
    }

    fn write_string(&mut self, _: &Schema, value: &str) -> SerializeResult {
        self.payload = Some((
            String::from("text/plain"),
            Bytes::copy_from_slice(value.as_bytes()),
        ));
        Ok(())
    }

    fn write_blob(&mut self, _: &Schema, value: &[u8]) -> SerializeResult {
        self.payload = Some((
            String::from("application/octet-stream"),
            Bytes::copy_from_slice(value),
        ));
        Ok(())
    }

    fn write_timestamp(&mut self, schema: &Schema, _: OffsetDateTime) -> SerializeResult {
        Err(Self::unsupported(schema))
    }

    fn write_document(&mut self, schema: &Schema, value: &Document) -> SerializeResult {
        self.encoded(|serializer| serializer.write_document(schema, value))
    }
}

fn header_document(value: &HeaderValue) -> Document {
    match value {
        HeaderValue::Boolean(value) => Document::Boolean(*value),
        HeaderValue::Byte(value) => Document::Integer(i64::from(*value)),
        HeaderValue::Short(value) => Document::Integer(i64::from(*value)),
        HeaderValue::Integer(value) => Document::Integer(i64::from(*value)),
        HeaderValue::Long(value) => Document::Integer(*value),
        HeaderValue::Bytes(value) => Document::Blob(value.clone()),
        HeaderValue::String(value) => Document::String(value.clone()),
        HeaderValue::Timestamp(value) => Document::Timestamp(*value),
        HeaderValue::Uuid(value) => Document::String(value.to_string()),
    }
}

/// Turns messages back into event union values.
#[derive(Debug, Clone)]
pub struct EventDeserializer {
    codec: Arc<dyn Codec>,
    errors: TypeRegistry,
}

impl EventDeserializer {
    pub fn new(codec: Arc<dyn Codec>, errors: TypeRegistry) -> Self {
        Self { codec, errors }
    }

    /// Decodes one message of the union described by `schema`.
    ///
    /// # Errors
    ///
    /// Exception messages become the modeled error they name (or an event
    /// stream error); unknown event types and undecodable payloads are
    /// event stream errors. All of them end the stream.
    pub fn deserialize<E: DeserializeableShape>(
        &self,
        schema: &Schema,
        message: &EventMessage,
    ) -> Result<E, ServiceError> {
        match message.header_str(MESSAGE_TYPE).unwrap_or("event") {
            "event" => {}
            "exception" => return Err(self.exception(message)),
            "error" => {
                return Err(ServiceError::event_stream(format!(
                    "{}: {}",
                    message.header_str(ERROR_CODE).unwrap_or("UnknownError"),
                    message.header_str(ERROR_MESSAGE).unwrap_or("")
                )))
            }
            other => {
                return Err(ServiceError::event_stream(format!(
                    "unknown event stream message type '{other}'"
                )))
            }
        }

        let event_type = message
            .header_str(EVENT_TYPE)
            .ok_or_else(|| ServiceError::event_stream("event message has no :event-type"))?;
        let variant = schema.member(event_type).ok_or_else(|| {
            ServiceError::event_stream(format!(
                "unknown event type '{event_type}' for '{}'",
                schema.id()
            ))
        })?;

        let document = self.variant_document(&variant, message)?;
        let mut union = BTreeMap::new();
        union.insert(event_type.to_owned(), document);
        let union = Document::Map(union);
        Ok(E::deserialize(&mut DocumentDeserializer::new(&union))?)
    }

    fn variant_document(
        &self,
        variant: &Schema,
        message: &EventMessage,
    ) -> Result<Document, SerializationError> {
        let mut members = BTreeMap::new();
        let mut has_payload_member = false;

        for member in variant.members() {
            let Some(name) = member.member_name() else {
                continue;
            };
            if member.traits().is_event_header() {
                if let Some(value) = message.header(name) {
                    members.insert(name.to_owned(), header_document(value));
                }
            } else if member.traits().is_event_payload() {
                has_payload_member = true;
                members.insert(name.to_owned(), self.payload_document(&member, &message.payload)?);
            }
        }

        if !has_payload_member && !message.payload.is_empty() {
            let mut deserializer = self.codec.create_deserializer(&message.payload)?;
            if let Document::Map(body) = deserializer.read_document(variant)? {
                for (name, value) in body {
                    members.entry(name).or_insert(value);
                }
            }
        }
        Ok(Document::Map(members))
    }

    fn payload_document(
        &self,
        member: &Schema,
        payload: &Bytes,
    ) -> Result<Document, SerializationError> {
        match member.shape_type() {
            ShapeType::Blob => Ok(Document::Blob(payload.clone())),
            ShapeType::String => String::from_utf8(payload.to_vec())
                .map(Document::String)
                .map_err(|_| SerializationError::malformed("event payload is not valid UTF-8")),
            _ if payload.is_empty() => Ok(Document::Null),
            _ => self.codec.create_deserializer(payload)?.read_document(member),
        }
    }

    fn exception(&self, message: &EventMessage) -> ServiceError {
        let exception_type = message.header_str(EXCEPTION_TYPE).unwrap_or("UnknownError");
        let Some(entry) = self.errors.resolve(exception_type) else {
            return ServiceError::event_stream(format!(
                "stream ended with exception '{exception_type}'"
            ));
        };
        let decoded = self
            .codec
            .create_deserializer(&message.payload)
            .and_then(|mut deserializer| entry.deserialize(deserializer.as_mut()));
        match decoded {
            Ok(error) => ServiceError::Modeled(error),
            Err(error) => ServiceError::from(error),
        }
    }
}
