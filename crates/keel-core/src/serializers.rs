//! Shape serializer contract.
//!
//! Generated shapes describe themselves to a [`ShapeSerializer`] one member
//! at a time; the serializer decides what bytes (or headers, or query
//! parameters) that becomes. Aggregates are written through scoped
//! callbacks so the serializer closes every nested scope itself.

use time::OffsetDateTime;

use crate::document::Document;
use crate::error::SerializationError;
use crate::schema::Schema;

pub type SerializeResult = Result<(), SerializationError>;

/// A value that can write itself into a serializer.
pub trait SerializeableShape {
    fn serialize(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult;
}

/// A structure or union that can also write its members individually.
pub trait SerializeableStruct: SerializeableShape {
    fn schema(&self) -> &Schema;

    /// Writes each present member with its member schema.
    fn serialize_members(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult;
}

/// Writes the entries of a map.
pub trait MapSerializer {
    /// Writes one entry; `write_value` is only invoked after the key was accepted.
    fn write_entry(
        &mut self,
        key_schema: &Schema,
        key: &str,
        write_value: &mut dyn FnMut(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult;
}

/// Visitor receiving one call per value.
pub trait ShapeSerializer {
    fn write_struct(&mut self, schema: &Schema, value: &dyn SerializeableStruct) -> SerializeResult;

    fn write_list(
        &mut self,
        schema: &Schema,
        size: usize,
        write_elements: &mut dyn FnMut(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult;

    fn write_map(
        &mut self,
        schema: &Schema,
        size: usize,
        write_entries: &mut dyn FnMut(&mut dyn MapSerializer) -> SerializeResult,
    ) -> SerializeResult;

    fn write_null(&mut self, schema: &Schema) -> SerializeResult;

    fn write_boolean(&mut self, schema: &Schema, value: bool) -> SerializeResult;

    fn write_byte(&mut self, schema: &Schema, value: i8) -> SerializeResult {
        self.write_integer(schema, i32::from(value))
    }

    fn write_short(&mut self, schema: &Schema, value: i16) -> SerializeResult {
        self.write_integer(schema, i32::from(value))
    }

    fn write_integer(&mut self, schema: &Schema, value: i32) -> SerializeResult;

    fn write_long(&mut self, schema: &Schema, value: i64) -> SerializeResult;

    fn write_float(&mut self, schema: &Schema, value: f32) -> SerializeResult {
        self.write_double(schema, f64::from(value))
    }

    fn write_double(&mut self, schema: &Schema, value: f64) -> SerializeResult;

    fn write_string(&mut self, schema: &Schema, value: &str) -> SerializeResult;

    fn write_blob(&mut self, schema: &Schema, value: &[u8]) -> SerializeResult;

    fn write_timestamp(&mut self, schema: &Schema, value: OffsetDateTime) -> SerializeResult;

    fn write_document(&mut self, schema: &Schema, value: &Document) -> SerializeResult;

    /// Pushes buffered output to the sink.
    fn flush(&mut self) -> SerializeResult {
        Ok(())
    }
}

/// Chooses the delegate serializer for each value.
pub trait SerializerRouter {
    /// Called before every write with the schema being written.
    fn before(&mut self, schema: &Schema) -> &mut dyn ShapeSerializer;

    /// Called after every write.
    fn after(&mut self, _schema: &Schema) {}
}

/// Serializer that dispatches every write to the delegate its router picks.
///
/// Protocols use this to send header-bound, query-bound and body-bound
/// members to different serializers from one pass over a shape.
pub struct InterceptingSerializer<R> {
    router: R,
}

impl<R: SerializerRouter> InterceptingSerializer<R> {
    pub fn new(router: R) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    pub fn into_router(self) -> R {
        self.router
    }

    fn route(
        &mut self,
        schema: &Schema,
        write: impl FnOnce(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult {
        let result = write(self.router.before(schema));
        self.router.after(schema);
        result
    }
}

impl<R: SerializerRouter> ShapeSerializer for InterceptingSerializer<R> {
    fn write_struct(
        &mut self,
        schema: &Schema,
        value: &dyn SerializeableStruct,
    ) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_struct(schema, value))
    }

    fn write_list(
        &mut self,
        schema: &Schema,
        size: usize,
        write_elements: &mut dyn FnMut(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_list(schema, size, write_elements))
    }

    fn write_map(
        &mut self,
        schema: &Schema,
        size: usize,
        write_entries: &mut dyn FnMut(&mut dyn MapSerializer) -> SerializeResult,
    ) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_map(schema, size, write_entries))
    }

    fn write_null(&mut self, schema: &Schema) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_null(schema))
    }

    fn write_boolean(&mut self, schema: &Schema, value: bool) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_boolean(schema, value))
    }

    fn write_byte(&mut self, schema: &Schema, value: i8) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_byte(schema, value))
    }

    fn write_short(&mut self, schema: &Schema, value: i16) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_short(schema, value))
    }

    fn write_integer(&mut self, schema: &Schema, value: i32) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_integer(schema, value))
    }

    fn write_long(&mut self, schema: &Schema, value: i64) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_long(schema, value))
    }

    fn write_float(&mut self, schema: &Schema, value: f32) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_float(schema, value))
    }

    fn write_double(&mut self, schema: &Schema, value: f64) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_double(schema, value))
    }

    fn write_string(&mut self, schema: &Schema, value: &str) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_string(schema, value))
    }

    fn write_blob(&mut self, schema: &Schema, value: &[u8]) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_blob(schema, value))
    }

    fn write_timestamp(&mut self, schema: &Schema, value: OffsetDateTime) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_timestamp(schema, value))
    }

    fn write_document(&mut self, schema: &Schema, value: &Document) -> SerializeResult {
        self.route(schema, |delegate| delegate.write_document(schema, value))
    }
}

/// Serializer that drops everything written to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSerializer;

impl ShapeSerializer for DiscardSerializer {
    fn write_struct(&mut self, _: &Schema, _: &dyn SerializeableStruct) -> SerializeResult {
        Ok(())
    }

    fn write_list(
        &mut self,
        _: &Schema,
        _: usize,
        _: &mut dyn FnMut(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult {
        Ok(())
    }

    fn write_map(
        &mut self,
        _: &Schema,
        _: usize,
        _: &mut dyn FnMut(&mut dyn MapSerializer) -> SerializeResult,
    ) -> SerializeResult {
        Ok(())
    }

    fn write_null(&mut self, _: &Schema) -> SerializeResult {
        Ok(())
    }

    fn write_boolean(&mut self, _: &Schema, _: bool) -> SerializeResult {
        Ok(())
    }

    fn write_integer(&mut self, _: &Schema, _: i32) -> SerializeResult {
        Ok(())
    }

    fn write_long(&mut self, _: &Schema, _: i64) -> SerializeResult {
        Ok(())
    }

    fn write_double(&mut self, _: &Schema, _: f64) -> SerializeResult {
        Ok(())
    }

    fn write_string(&mut self, _: &Schema, _: &str) -> SerializeResult {
        Ok(())
    }

    fn write_blob(&mut self, _: &Schema, _: &[u8]) -> SerializeResult {
        Ok(())
    }

    fn write_timestamp(&mut self, _: &Schema, _: OffsetDateTime) -> SerializeResult {
        Ok(())
    }

    fn write_document(&mut self, _: &Schema, _: &Document) -> SerializeResult {
        Ok(())
    }
}

struct FilterRouter<'s, F> {
    target: &'s mut dyn ShapeSerializer,
    discard: DiscardSerializer,
    keep: &'s F,
}

impl<F: Fn(&Schema) -> bool> SerializerRouter for FilterRouter<'_, F> {
    fn before(&mut self, schema: &Schema) -> &mut dyn ShapeSerializer {
        if (self.keep)(schema) {
            &mut *self.target
        } else {
            &mut self.discard
        }
    }
}

/// View of a structure that only writes the members `keep` accepts.
///
/// Protocols use it to encode the body-bound members of a structure whose
/// other members live in headers, the URI, or event headers.
pub struct MemberFilter<'a, F> {
    inner: &'a dyn SerializeableStruct,
    keep: F,
}

impl<'a, F: Fn(&Schema) -> bool> MemberFilter<'a, F> {
    pub fn new(inner: &'a dyn SerializeableStruct, keep: F) -> Self {
        Self { inner, keep }
    }
}

impl<F: Fn(&Schema) -> bool> SerializeableShape for MemberFilter<'_, F> {
    fn serialize(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        serializer.write_struct(self.inner.schema(), self)
    }
}

impl<F: Fn(&Schema) -> bool> SerializeableStruct for MemberFilter<'_, F> {
    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    fn serialize_members(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        let mut filtered = InterceptingSerializer::new(FilterRouter {
            target: serializer,
            discard: DiscardSerializer,
            keep: &self.keep,
        });
        self.inner.serialize_members(&mut filtered)
    }
}

/// Writes a list of values with the list's element schema.
///
/// # Errors
///
/// Propagates the first failure of `write_element`.
pub fn write_list_of<T>(
    serializer: &mut dyn ShapeSerializer,
    schema: &Schema,
    items: &[T],
    mut write_element: impl FnMut(&mut dyn ShapeSerializer, &Schema, &T) -> SerializeResult,
) -> SerializeResult {
    let element = schema
        .member("member")
        .ok_or_else(|| SerializationError::missing_member(schema.id(), "member"))?;
    serializer.write_list(schema, items.len(), &mut |elements| {
        for item in items {
            write_element(elements, &element, item)?;
        }
        Ok(())
    })
}

/// Writes string-keyed map entries with the map's key and value schemas.
///
/// # Errors
///
/// Propagates the first failure of `write_value`.
pub fn write_map_of<'a, T: 'a>(
    serializer: &mut dyn ShapeSerializer,
    schema: &Schema,
    entries: impl ExactSizeIterator<Item = (&'a String, &'a T)> + Clone,
    mut write_value: impl FnMut(&mut dyn ShapeSerializer, &Schema, &T) -> SerializeResult,
) -> SerializeResult {
    let key = schema
        .member("key")
        .ok_or_else(|| SerializationError::missing_member(schema.id(), "key"))?;
    let value = schema
        .member("value")
        .ok_or_else(|| SerializationError::missing_member(schema.id(), "value"))?;
    serializer.write_map(schema, entries.len(), &mut |map| {
        for (name, item) in entries.clone() {
            map.write_entry(&key, name, &mut |out| write_value(out, &value, item))?;
        }
        Ok(())
    })
}
