//! JSON codec.

use keel_core::codec::Codec;
use keel_core::deserializers::ShapeDeserializer;
use keel_core::serializers::ShapeSerializer;
use keel_core::{SerializationError, TimestampFormat};

use crate::deserializer::JsonDeserializer;
use crate::serializer::JsonSerializer;

/// Format-wide JSON options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonSettings {
    /// Use `jsonName` instead of the member name when present.
    pub use_json_name: bool,
    /// Format of timestamps without a `timestampFormat` trait.
    pub default_timestamp_format: TimestampFormat,
}

impl Default for JsonSettings {
    fn default() -> Self {
        Self {
            use_json_name: true,
            default_timestamp_format: TimestampFormat::EpochSeconds,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    settings: JsonSettings,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: JsonSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &JsonSettings {
        &self.settings
    }
}

impl Codec for JsonCodec {
    fn media_type(&self) -> &str {
        "application/json"
    }

    fn create_serializer<'a>(&'a self, sink: &'a mut Vec<u8>) -> Box<dyn ShapeSerializer + 'a> {
        Box::new(JsonSerializer::new(sink, &self.settings))
    }

    fn create_deserializer<'a>(
        &'a self,
        source: &'a [u8],
    ) -> Result<Box<dyn ShapeDeserializer + 'a>, SerializationError> {
        Ok(Box::new(JsonDeserializer::from_slice(source, &self.settings)?))
    }
}
