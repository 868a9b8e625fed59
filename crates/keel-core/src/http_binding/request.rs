use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use time::OffsetDateTime;

use super::{binding_of, Binding};
use crate::codec::Codec;
use crate::document::Document;
use crate::error::SerializationError;
use crate::http::{Body, Fields};
use crate::schema::{Schema, ShapeType, TimestampFormat};
use crate::serializers::{
    DiscardSerializer, MapSerializer, SerializeResult, SerializeableStruct, SerializerRouter,
    ShapeSerializer,
};
use crate::time_format::format_timestamp;

/// Renders scalar values, lists of scalars and string maps as text.
///
/// Used for every member that lands in the URI or in header fields.
pub(super) struct TextCollector {
    timestamp_format: TimestampFormat,
    values: Vec<String>,
    entries: Vec<(String, Vec<String>)>,
}

impl TextCollector {
    fn new() -> Self {
        Self {
            timestamp_format: TimestampFormat::DateTime,
            values: Vec::new(),
            entries: Vec::new(),
        }
    }

    fn take(&mut self) -> (Vec<String>, Vec<(String, Vec<String>)>) {
        (
            std::mem::take(&mut self.values),
            std::mem::take(&mut self.entries),
        )
    }
}

pub(super) fn float_text(value: f64) -> String {
    if value.is_nan() {
        String::from("NaN")
    } else if value.is_infinite() {
        String::from(if value > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        value.to_string()
    }
}

impl ShapeSerializer for TextCollector {
    fn write_struct(&mut self, schema: &Schema, _: &dyn SerializeableStruct) -> SerializeResult {
        Err(SerializationError::unsupported(schema.id(), "text"))
    }

    fn write_list(
        &mut self,
        _schema: &Schema,
        _size: usize,
        write_elements: &mut dyn FnMut(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult {
        write_elements(self)
    }

    fn write_map(
        &mut self,
        _schema: &Schema,
        _size: usize,
        write_entries: &mut dyn FnMut(&mut dyn MapSerializer) -> SerializeResult,
    ) -> SerializeResult {
        write_entries(self)
    }

    fn write_null(&mut self, _schema: &Schema) -> SerializeResult {
        Ok(())
    }

    fn write_boolean(&mut self, _schema: &Schema, value: bool) -> SerializeResult {
        self.values.push(value.to_string());
        Ok(())
    }

    fn write_integer(&mut self, _schema: &Schema, value: i32) -> SerializeResult {
        self.values.push(value.to_string());
        Ok(())
    }

    fn write_long(&mut self, _schema: &Schema, value: i64) -> SerializeResult {
        self.values.push(value.to_string());
        Ok(())
    }

    fn write_double(&mut self, _schema: &Schema, value: f64) -> SerializeResult {
        self.values.push(float_text(value));
        Ok(())
    }

    fn write_string(&mut self, _schema: &Schema, value: &str) -> SerializeResult {
        self.values.push(value.to_owned());
        Ok(())
    }

    fn write_blob(&mut self, _schema: &Schema, value: &[u8]) -> SerializeResult {
        self.values.push(STANDARD.encode(value));
        Ok(())
    }

    fn write_timestamp(&mut self, schema: &Schema, value: OffsetDateTime) -> SerializeResult {
        let format = schema
            .traits()
            .timestamp_format()
            .unwrap_or(self.timestamp_format);
        self.values.push(format_timestamp(value, format)?);
        Ok(())
    }

    fn write_document(&mut self, schema: &Schema, _: &Document) -> SerializeResult {
        Err(SerializationError::unsupported(schema.id(), "text"))
    }
}

impl MapSerializer for TextCollector {
    fn write_entry(
        &mut self,
        _key_schema: &Schema,
        key: &str,
        write_value: &mut dyn FnMut(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult {
        let outer = std::mem::take(&mut self.values);
        let result = write_value(self);
        let values = std::mem::replace(&mut self.values, outer);
        result?;
        self.entries.push((key.to_owned(), values));
        Ok(())
    }
}

/// Writes an `httpPayload` member as the whole request body.
pub(super) struct PayloadWriter<'c> {
    codec: &'c dyn Codec,
    pub(super) body: Option<(Body, String)>,
}

impl PayloadWriter<'_> {
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
        self.body = Some((Body::from(sink), self.codec.media_type().to_owned()));
        Ok(())
    }

    fn raw(&mut self, schema: &Schema, bytes: Vec<u8>, fallback: &str) {
        let media_type = schema.traits().media_type().unwrap_or(fallback).to_owned();
        self.body = Some((Body::from(bytes), media_type));
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
        _size: usize,
        _write_elements: &mut dyn FnMut(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult {
        Err(SerializationError::unsupported(schema.id(), "an http payload"))
    }

    fn write_map(
        &mut self,
        schema: &Schema,
        _size: usize,
        _write_entries: &mut dyn FnMut(&mut dyn MapSerializer) -> SerializeResult,
    ) -> SerializeResult {
        Err(SerializationError::unsupported(schema.id(), "an http payload"))
    }

    fn write_null(&mut self, _schema: &Schema) -> SerializeResult {
        Ok(())
    }

    fn write_boolean(&mut self, schema: &Schema, _: bool) -> SerializeResult {
        Err(SerializationError::unsupported(schema.id(), "an http payload"))
    }

    fn write_integer(&mut self, schema: &Schema, _: i32) -> SerializeResult {
        Err(SerializationError::unsupported(schema.id(), "an http payload"))
    }

    fn write_long(&mut self, schema: &Schema, _: i64) -> SerializeResult {
        Err(SerializationError::unsupported(schema.id(), "an http payload"))
    }

    fn write_double(&mut self, schema: &Schema, _: f64) -> SerializeResult {
        Err(SerializationError::unsupported(schema.id(), "an http payload"))
    }

    fn write_string(&mut self, schema: &Schema, value: &str) -> SerializeResult {
        self.raw(schema, value.as_bytes().to_vec(), "text/plain");
        Ok(())
    }

    fn write_blob(&mut self, schema: &Schema, value: &[u8]) -> SerializeResult {
        self.raw(schema, value.to_vec(), "application/octet-stream");
        Ok(())
    }

    fn write_timestamp(&mut self, schema: &Schema, _: OffsetDateTime) -> SerializeResult {
        Err(SerializationError::unsupported(schema.id(), "an http payload"))
    }

    fn write_document(&mut self, schema: &Schema, value: &Document) -> SerializeResult {
        self.encoded(|serializer| serializer.write_document(schema, value))
    }
}

/// Routes each input member to the part of the request its binding names.
pub(super) struct RequestRouter<'c> {
    binding: Binding,
    text: TextCollector,
    pub(super) payload: PayloadWriter<'c>,
    discard: DiscardSerializer,
    pub(super) labels: HashMap<String, String>,
    pub(super) query: Vec<(String, String)>,
    pub(super) query_params: Vec<(String, String)>,
    pub(super) headers: Fields,
}

impl<'c> RequestRouter<'c> {
    pub(super) fn new(codec: &'c dyn Codec) -> Self {
        Self {
            binding: Binding::Body,
            text: TextCollector::new(),
            payload: PayloadWriter { codec, body: None },
            discard: DiscardSerializer,
            labels: HashMap::new(),
            query: Vec::new(),
            query_params: Vec::new(),
            headers: Fields::new(),
        }
    }
}

impl SerializerRouter for RequestRouter<'_> {
    fn before(&mut self, schema: &Schema) -> &mut dyn ShapeSerializer {
        self.binding = binding_of(schema);
        match &self.binding {
            Binding::Label | Binding::Query(_) | Binding::QueryParams => {
                self.text.timestamp_format = TimestampFormat::DateTime;
                &mut self.text
            }
            Binding::Header(_) | Binding::PrefixHeaders(_) => {
                self.text.timestamp_format = TimestampFormat::HttpDate;
                &mut self.text
            }
            Binding::Payload => &mut self.payload,
            Binding::EventStream | Binding::ResponseCode | Binding::Body => &mut self.discard,
        }
    }

    fn after(&mut self, schema: &Schema) {
        let (values, entries) = self.text.take();
        match std::mem::replace(&mut self.binding, Binding::Body) {
            Binding::Label => {
                if let (Some(name), Some(value)) =
                    (schema.member_name(), values.into_iter().next())
                {
                    self.labels.insert(name.to_owned(), value);
                }
            }
            Binding::Query(name) => {
                self.query
                    .extend(values.into_iter().map(|value| (name.clone(), value)));
            }
            Binding::QueryParams => {
                for (key, values) in entries {
                    self.query_params
                        .extend(values.into_iter().map(|value| (key.clone(), value)));
                }
            }
            Binding::Header(name) => {
                let is_list = schema.shape_type() == ShapeType::List;
                for value in values {
                    let value = if is_list && value.contains(',') {
                        format!("\"{}\"", value.replace('"', "\\\""))
                    } else {
                        value
                    };
                    self.headers.append(name.clone(), value);
                }
            }
            Binding::PrefixHeaders(prefix) => {
                for (key, values) in entries {
                    for value in values {
                        self.headers.append(format!("{prefix}{key}"), value);
                    }
                }
            }
            Binding::Payload | Binding::EventStream | Binding::ResponseCode | Binding::Body => {}
        }
    }
}

/// Expands `{label}` and greedy `{label+}` segments of a URI pattern.
pub(super) fn expand_path(
    pattern: &str,
    labels: &HashMap<String, String>,
    shape: &Schema,
) -> Result<String, SerializationError> {
    let mut path = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(start) = rest.find('{') {
        path.push_str(&rest[..start]);
        let end = rest[start..]
            .find('}')
            .map(|offset| start + offset)
            .ok_or_else(|| {
                SerializationError::malformed(format!("unclosed label in '{pattern}'"))
            })?;
        let label = &rest[start + 1..end];
        let (name, greedy) = match label.strip_suffix('+') {
            Some(name) => (name, true),
            None => (label, false),
        };
        let value = labels
            .get(name)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| SerializationError::missing_member(shape.id(), name))?;
        if greedy {
            let segments: Vec<_> = value.split('/').map(urlencoding::encode).collect();
            path.push_str(&segments.join("/"));
        } else {
            path.push_str(&urlencoding::encode(value));
        }
        rest = &rest[end + 1..];
    }
    path.push_str(rest);
    Ok(path)
}
