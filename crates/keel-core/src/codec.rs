//! Codec contract: format-wide configuration plus serializer factories.

use std::fmt::Debug;

use crate::deserializers::{DeserializeableShape, ShapeDeserializer};
use crate::error::SerializationError;
use crate::serializers::{SerializeableShape, ShapeSerializer};

/// Byte-level wire format.
///
/// A codec owns the settings shared by every shape written through it and
/// hands out serializers bound to a sink and deserializers bound to a source.
pub trait Codec: Debug + Send + Sync {
    /// Media type of the encoded documents, e.g. `application/json`.
    fn media_type(&self) -> &str;

    fn create_serializer<'a>(&'a self, sink: &'a mut Vec<u8>) -> Box<dyn ShapeSerializer + 'a>;

    /// # Errors
    ///
    /// Fails when `source` is not a well-formed document of this format.
    fn create_deserializer<'a>(
        &'a self,
        source: &'a [u8],
    ) -> Result<Box<dyn ShapeDeserializer + 'a>, SerializationError>;

    /// Encodes `shape` into a new buffer.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    fn serialize(&self, shape: &dyn SerializeableShape) -> Result<Vec<u8>, SerializationError> {
        let mut sink = Vec::new();
        {
            let mut serializer = self.create_serializer(&mut sink);
            shape.serialize(serializer.as_mut())?;
            serializer.flush()?;
        }
        Ok(sink)
    }

    /// Decodes a shape from `source`.
    ///
    /// # Errors
    ///
    /// Propagates deserializer failures.
    fn deserialize<T: DeserializeableShape>(&self, source: &[u8]) -> Result<T, SerializationError>
    where
        Self: Sized,
    {
        deserialize_with(self, source)
    }
}

/// [`Codec::deserialize`] for codec trait objects.
///
/// # Errors
///
/// Propagates deserializer failures.
pub fn deserialize_with<T: DeserializeableShape>(
    codec: &dyn Codec,
    source: &[u8],
) -> Result<T, SerializationError> {
    let mut deserializer = codec.create_deserializer(source)?;
    T::deserialize(deserializer.as_mut())
}
