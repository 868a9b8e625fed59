//! Shape deserializer contract.
//!
//! The data source controls iteration order: a deserializer walks whatever
//! members or elements it finds and hands each one to a consumer together
//! with its schema. Shapes react through the member index rather than
//! asking for members in declaration order.

use std::collections::BTreeMap;

use bytes::Bytes;
use time::OffsetDateTime;

use crate::document::Document;
use crate::error::SerializationError;
use crate::schema::Schema;

pub type DeserializeResult<T> = Result<T, SerializationError>;

/// A value that can be built from a deserializer.
pub trait DeserializeableShape: Sized {
    fn deserialize(deserializer: &mut dyn ShapeDeserializer) -> DeserializeResult<Self>;
}

/// Receives each structure member found in the data.
pub trait StructConsumer {
    fn accept(
        &mut self,
        member: &Schema,
        deserializer: &mut dyn ShapeDeserializer,
    ) -> DeserializeResult<()>;
}

/// Receives each list element found in the data.
pub trait ListConsumer {
    fn accept(
        &mut self,
        element: &Schema,
        deserializer: &mut dyn ShapeDeserializer,
    ) -> DeserializeResult<()>;
}

/// Receives each map entry found in the data.
pub trait MapConsumer {
    fn accept(
        &mut self,
        key: &str,
        value: &Schema,
        deserializer: &mut dyn ShapeDeserializer,
    ) -> DeserializeResult<()>;
}

/// Visitor-style reader mirroring [`crate::ShapeSerializer`].
pub trait ShapeDeserializer {
    /// Feeds every known member to `consumer`; unknown members are logged and skipped.
    fn read_struct(&mut self, schema: &Schema, consumer: &mut dyn StructConsumer)
        -> DeserializeResult<()>;

    fn read_list(&mut self, schema: &Schema, consumer: &mut dyn ListConsumer)
        -> DeserializeResult<()>;

    fn read_map(&mut self, schema: &Schema, consumer: &mut dyn MapConsumer)
        -> DeserializeResult<()>;

    /// Whether the next value is an explicit null.
    fn is_null(&mut self) -> bool;

    fn read_null(&mut self) -> DeserializeResult<()>;

    fn read_boolean(&mut self, schema: &Schema) -> DeserializeResult<bool>;

    fn read_byte(&mut self, schema: &Schema) -> DeserializeResult<i8> {
        let value = self.read_integer(schema)?;
        i8::try_from(value).map_err(|_| SerializationError::out_of_range(schema.id(), value))
    }

    fn read_short(&mut self, schema: &Schema) -> DeserializeResult<i16> {
        let value = self.read_integer(schema)?;
        i16::try_from(value).map_err(|_| SerializationError::out_of_range(schema.id(), value))
    }

    fn read_integer(&mut self, schema: &Schema) -> DeserializeResult<i32>;

    fn read_long(&mut self, schema: &Schema) -> DeserializeResult<i64>;

    fn read_float(&mut self, schema: &Schema) -> DeserializeResult<f32> {
        self.read_double(schema).map(|value| value as f32)
    }

    fn read_double(&mut self, schema: &Schema) -> DeserializeResult<f64>;

    fn read_string(&mut self, schema: &Schema) -> DeserializeResult<String>;

    fn read_blob(&mut self, schema: &Schema) -> DeserializeResult<Bytes>;

    fn read_timestamp(&mut self, schema: &Schema) -> DeserializeResult<OffsetDateTime>;

    fn read_document(&mut self, schema: &Schema) -> DeserializeResult<Document>;
}

struct StructFn<'s, S, F> {
    state: &'s mut S,
    consume: F,
}

impl<S, F> StructConsumer for StructFn<'_, S, F>
where
    F: FnMut(&mut S, &Schema, &mut dyn ShapeDeserializer) -> DeserializeResult<()>,
{
    fn accept(
        &mut self,
        member: &Schema,
        deserializer: &mut dyn ShapeDeserializer,
    ) -> DeserializeResult<()> {
        (self.consume)(&mut *self.state, member, deserializer)
    }
}

/// Reads a structure into a caller-owned builder.
///
/// `consume` receives the builder, the member schema, and a deserializer
/// positioned at the member's value.
///
/// # Errors
///
/// Propagates deserializer and consumer failures.
pub fn read_struct_into<S>(
    deserializer: &mut dyn ShapeDeserializer,
    schema: &Schema,
    state: &mut S,
    consume: impl FnMut(&mut S, &Schema, &mut dyn ShapeDeserializer) -> DeserializeResult<()>,
) -> DeserializeResult<()> {
    deserializer.read_struct(schema, &mut StructFn { state, consume })
}

struct ListFn<T, F> {
    items: Vec<T>,
    read: F,
}

impl<T, F> ListConsumer for ListFn<T, F>
where
    F: FnMut(&Schema, &mut dyn ShapeDeserializer) -> DeserializeResult<T>,
{
    fn accept(
        &mut self,
        element: &Schema,
        deserializer: &mut dyn ShapeDeserializer,
    ) -> DeserializeResult<()> {
        let item = (self.read)(element, deserializer)?;
        self.items.push(item);
        Ok(())
    }
}

/// Reads every list element with `read`.
///
/// # Errors
///
/// Propagates deserializer and element failures.
pub fn read_list_of<T>(
    deserializer: &mut dyn ShapeDeserializer,
    schema: &Schema,
    read: impl FnMut(&Schema, &mut dyn ShapeDeserializer) -> DeserializeResult<T>,
) -> DeserializeResult<Vec<T>> {
    let mut consumer = ListFn {
        items: Vec::new(),
        read,
    };
    deserializer.read_list(schema, &mut consumer)?;
    Ok(consumer.items)
}

struct MapFn<T, F> {
    entries: BTreeMap<String, T>,
    read: F,
}

impl<T, F> MapConsumer for MapFn<T, F>
where
    F: FnMut(&Schema, &mut dyn ShapeDeserializer) -> DeserializeResult<T>,
{
    fn accept(
        &mut self,
        key: &str,
        value: &Schema,
        deserializer: &mut dyn ShapeDeserializer,
    ) -> DeserializeResult<()> {
        let item = (self.read)(value, deserializer)?;
        self.entries.insert(key.to_owned(), item);
        Ok(())
    }
}

/// Reads every map entry value with `read`.
///
/// # Errors
///
/// Propagates deserializer and value failures.
pub fn read_map_of<T>(
    deserializer: &mut dyn ShapeDeserializer,
    schema: &Schema,
    read: impl FnMut(&Schema, &mut dyn ShapeDeserializer) -> DeserializeResult<T>,
) -> DeserializeResult<BTreeMap<String, T>> {
    let mut consumer = MapFn {
        entries: BTreeMap::new(),
        read,
    };
    deserializer.read_map(schema, &mut consumer)?;
    Ok(consumer.entries)
}

/// Reads a nullable value, mapping an explicit null to `None`.
///
/// # Errors
///
/// Propagates failures of `read`.
pub fn read_nullable<T>(
    deserializer: &mut dyn ShapeDeserializer,
    read: impl FnOnce(&mut dyn ShapeDeserializer) -> DeserializeResult<T>,
) -> DeserializeResult<Option<T>> {
    if deserializer.is_null() {
        deserializer.read_null()?;
        return Ok(None);
    }
    read(deserializer).map(Some)
}
