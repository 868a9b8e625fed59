//! Untyped shape values.
//!
//! A [`Document`] can hold any shape. It is the value type of default traits
//! and of `document` members, and [`DocumentSerializer`] /
//! [`DocumentDeserializer`] convert typed shapes to and from it.

use std::collections::BTreeMap;

use bytes::Bytes;
use time::OffsetDateTime;

use crate::deserializers::{
    DeserializeableShape, ListConsumer, MapConsumer, ShapeDeserializer, StructConsumer,
};
use crate::error::SerializationError;
use crate::schema::Schema;
use crate::serializers::{
    MapSerializer, SerializeResult, SerializeableShape, SerializeableStruct, ShapeSerializer,
};

/// Untyped shape value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Document {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Blob(Bytes),
    Timestamp(OffsetDateTime),
    List(Vec<Document>),
    Map(BTreeMap<String, Document>),
}

impl Document {
    pub fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Blob(_) => "blob",
            Self::Timestamp(_) => "timestamp",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Document]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Document>> {
        match self {
            Self::Map(values) => Some(values),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Document> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Converts any serializeable shape into a document.
    pub fn from_shape(shape: &dyn SerializeableShape) -> Result<Self, SerializationError> {
        let mut serializer = DocumentSerializer::new();
        shape.serialize(&mut serializer)?;
        Ok(serializer.finish())
    }

    /// Reads a typed shape back out of this document.
    pub fn to_shape<T: DeserializeableShape>(&self) -> Result<T, SerializationError> {
        T::deserialize(&mut DocumentDeserializer::new(self))
    }
}

impl From<bool> for Document {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for Document {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for Document {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Document {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Document {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Document {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl SerializeableShape for Document {
    fn serialize(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        serializer.write_document(&crate::schema::prelude::DOCUMENT, self)
    }
}

impl DeserializeableShape for Document {
    fn deserialize(deserializer: &mut dyn ShapeDeserializer) -> Result<Self, SerializationError> {
        deserializer.read_document(&crate::schema::prelude::DOCUMENT)
    }
}

enum Slot {
    Value(Option<Document>),
    Struct(BTreeMap<String, Document>),
    List(Vec<Document>),
}

/// Serializer that builds a [`Document`] tree.
pub struct DocumentSerializer {
    slot: Slot,
}

impl Default for DocumentSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentSerializer {
    pub fn new() -> Self {
        Self {
            slot: Slot::Value(None),
        }
    }

    fn structure() -> Self {
        Self {
            slot: Slot::Struct(BTreeMap::new()),
        }
    }

    fn list(size: usize) -> Self {
        Self {
            slot: Slot::List(Vec::with_capacity(size)),
        }
    }

    /// Returns the written document, `Null` when nothing was written.
    pub fn finish(self) -> Document {
        match self.slot {
            Slot::Value(value) => value.unwrap_or_default(),
            Slot::Struct(members) => Document::Map(members),
            Slot::List(items) => Document::List(items),
        }
    }

    fn emit(&mut self, schema: &Schema, value: Document) -> SerializeResult {
        match &mut self.slot {
            Slot::Value(slot) => {
                *slot = Some(value);
                Ok(())
            }
            Slot::Struct(members) => {
                let name = schema.member_name().ok_or_else(|| {
                    SerializationError::unsupported(schema.id(), "a structure member")
                })?;
                members.insert(name.to_owned(), value);
                Ok(())
            }
            Slot::List(items) => {
                items.push(value);
                Ok(())
            }
        }
    }
}

struct DocumentMapSerializer {
    entries: BTreeMap<String, Document>,
}

impl MapSerializer for DocumentMapSerializer {
    fn write_entry(
        &mut self,
        _key_schema: &Schema,
        key: &str,
        write_value: &mut dyn FnMut(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult {
        let mut value = DocumentSerializer::new();
        write_value(&mut value)?;
        self.entries.insert(key.to_owned(), value.finish());
        Ok(())
    }
}

impl ShapeSerializer for DocumentSerializer {
    fn write_struct(
        &mut self,
        schema: &Schema,
        value: &dyn SerializeableStruct,
    ) -> SerializeResult {
        let mut members = DocumentSerializer::structure();
        value.serialize_members(&mut members)?;
        self.emit(schema, members.finish())
    }

    fn write_list(
        &mut self,
        schema: &Schema,
        size: usize,
        write_elements: &mut dyn FnMut(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult {
        let mut elements = DocumentSerializer::list(size);
        write_elements(&mut elements)?;
        self.emit(schema, elements.finish())
    }

    fn write_map(
        &mut self,
        schema: &Schema,
        _size: usize,
        write_entries: &mut dyn FnMut(&mut dyn MapSerializer) -> SerializeResult,
    ) -> SerializeResult {
        let mut entries = DocumentMapSerializer {
            entries: BTreeMap::new(),
        };
        write_entries(&mut entries)?;
        self.emit(schema, Document::Map(entries.entries))
    }

    fn write_null(&mut self, schema: &Schema) -> SerializeResult {
        self.emit(schema, Document::Null)
    }

    fn write_boolean(&mut self, schema: &Schema, value: bool) -> SerializeResult {
        self.emit(schema, Document::Boolean(value))
    }

    fn write_integer(&mut self, schema: &Schema, value: i32) -> SerializeResult {
        self.emit(schema, Document::Integer(i64::from(value)))
    }

    fn write_long(&mut self, schema: &Schema, value: i64) -> SerializeResult {
        self.emit(schema, Document::Integer(value))
    }

    fn write_double(&mut self, schema: &Schema, value: f64) -> SerializeResult {
        self.emit(schema, Document::Float(value))
    }

    fn write_string(&mut self, schema: &Schema, value: &str) -> SerializeResult {
        self.emit(schema, Document::String(value.to_owned()))
    }

    fn write_blob(&mut self, schema: &Schema, value: &[u8]) -> SerializeResult {
        self.emit(schema, Document::Blob(Bytes::copy_from_slice(value)))
    }

    fn write_timestamp(&mut self, schema: &Schema, value: OffsetDateTime) -> SerializeResult {
        self.emit(schema, Document::Timestamp(value))
    }

    fn write_document(&mut self, schema: &Schema, value: &Document) -> SerializeResult {
        self.emit(schema, value.clone())
    }
}

/// Deserializer reading typed shapes out of a borrowed [`Document`].
pub struct DocumentDeserializer<'a> {
    value: &'a Document,
}

impl<'a> DocumentDeserializer<'a> {
    pub fn new(value: &'a Document) -> Self {
        Self { value }
    }

    fn mismatch(&self, schema: &Schema, expected: &str) -> SerializationError {
        SerializationError::unexpected(schema.id(), expected, self.value.kind())
    }
}

impl ShapeDeserializer for DocumentDeserializer<'_> {
    fn read_struct(
        &mut self,
        schema: &Schema,
        consumer: &mut dyn StructConsumer,
    ) -> Result<(), SerializationError> {
        let members = match self.value {
            Document::Map(members) => members,
            Document::Null => return Ok(()),
            _ => return Err(self.mismatch(schema, "structure")),
        };
        for (name, value) in members {
            match schema.member(name) {
                Some(member) if value.is_null() && member.default_value().is_none() => {}
                Some(member) => consumer.accept(&member, &mut DocumentDeserializer::new(value))?,
                None => tracing::debug!(
                    shape = %schema.id(),
                    member = %name,
                    "skipping unknown member in document"
                ),
            }
        }
        Ok(())
    }

    fn read_list(
        &mut self,
        schema: &Schema,
        consumer: &mut dyn ListConsumer,
    ) -> Result<(), SerializationError> {
        let Document::List(items) = self.value else {
            return Err(self.mismatch(schema, "list"));
        };
        let element = schema
            .member("member")
            .ok_or_else(|| SerializationError::missing_member(schema.id(), "member"))?;
        for item in items {
            consumer.accept(&element, &mut DocumentDeserializer::new(item))?;
        }
        Ok(())
    }

    fn read_map(
        &mut self,
        schema: &Schema,
        consumer: &mut dyn MapConsumer,
    ) -> Result<(), SerializationError> {
        let Document::Map(entries) = self.value else {
            return Err(self.mismatch(schema, "map"));
        };
        let value_schema = schema
            .member("value")
            .ok_or_else(|| SerializationError::missing_member(schema.id(), "value"))?;
        for (key, value) in entries {
            consumer.accept(key, &value_schema, &mut DocumentDeserializer::new(value))?;
        }
        Ok(())
    }

    fn is_null(&mut self) -> bool {
        self.value.is_null()
    }

    fn read_null(&mut self) -> Result<(), SerializationError> {
        if self.value.is_null() {
            Ok(())
        } else {
            Err(SerializationError::unexpected("document", "null", self.value.kind()))
        }
    }

    fn read_boolean(&mut self, schema: &Schema) -> Result<bool, SerializationError> {
        self.value
            .as_bool()
            .ok_or_else(|| self.mismatch(schema, "boolean"))
    }

    fn read_integer(&mut self, schema: &Schema) -> Result<i32, SerializationError> {
        let value = self.read_long(schema)?;
        i32::try_from(value).map_err(|_| SerializationError::out_of_range(schema.id(), value))
    }

    fn read_long(&mut self, schema: &Schema) -> Result<i64, SerializationError> {
        self.value
            .as_i64()
            .ok_or_else(|| self.mismatch(schema, "integer"))
    }

    fn read_double(&mut self, schema: &Schema) -> Result<f64, SerializationError> {
        self.value
            .as_f64()
            .ok_or_else(|| self.mismatch(schema, "number"))
    }

    fn read_string(&mut self, schema: &Schema) -> Result<String, SerializationError> {
        self.value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| self.mismatch(schema, "string"))
    }

    fn read_blob(&mut self, schema: &Schema) -> Result<Bytes, SerializationError> {
        match self.value {
            Document::Blob(value) => Ok(value.clone()),
            _ => Err(self.mismatch(schema, "blob")),
        }
    }

    fn read_timestamp(&mut self, schema: &Schema) -> Result<OffsetDateTime, SerializationError> {
        match self.value {
            Document::Timestamp(value) => Ok(*value),
            Document::Integer(_) | Document::Float(_) => {
                crate::time_format::from_epoch_seconds(self.value.as_f64().unwrap_or_default())
            }
            Document::String(value) => {
                let format = schema
                    .traits()
                    .timestamp_format()
                    .unwrap_or(crate::TimestampFormat::DateTime);
                crate::time_format::parse_timestamp(value, format)
            }
            _ => Err(self.mismatch(schema, "timestamp")),
        }
    }

    fn read_document(&mut self, _schema: &Schema) -> Result<Document, SerializationError> {
        Ok(self.value.clone())
    }
}
