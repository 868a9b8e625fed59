use std::borrow::Cow;
use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use keel_core::deserializers::{
    DeserializeResult, ListConsumer, MapConsumer, ShapeDeserializer, StructConsumer,
};
use keel_core::time_format::{from_epoch_seconds, parse_timestamp};
use keel_core::{Document, Schema, SerializationError};
use serde_json::Value;
use time::OffsetDateTime;

use crate::codec::JsonSettings;
use crate::value::value_to_document;

/// Discriminator some services add to error bodies; never a member.
const TYPE_KEY: &str = "__type";

/// JSON shape deserializer over a parsed `serde_json::Value`.
pub struct JsonDeserializer<'a> {
    value: Cow<'a, Value>,
    settings: &'a JsonSettings,
}

impl<'a> JsonDeserializer<'a> {
    /// Parses `source`; an empty slice reads as `null`.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::Malformed`] when `source` is not JSON.
    pub fn from_slice(
        source: &[u8],
        settings: &'a JsonSettings,
    ) -> Result<Self, SerializationError> {
        let value = if source.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(source)
                .map_err(|error| SerializationError::malformed(format!("invalid JSON: {error}")))?
        };
        Ok(Self {
            value: Cow::Owned(value),
            settings,
        })
    }

    pub fn from_value(value: &'a Value, settings: &'a JsonSettings) -> Self {
        Self {
            value: Cow::Borrowed(value),
            settings,
        }
    }

    fn mismatch(&self, schema: &Schema, expected: &str) -> SerializationError {
        SerializationError::unexpected(schema.id(), expected, kind(&self.value))
    }

    fn wire_name(&self, member: &Schema) -> Option<String> {
        if self.settings.use_json_name {
            if let Some(name) = member.traits().json_name() {
                return Some(name.to_owned());
            }
        }
        member.member_name().map(str::to_owned)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl ShapeDeserializer for JsonDeserializer<'_> {
    fn read_struct(
        &mut self,
        schema: &Schema,
        consumer: &mut dyn StructConsumer,
    ) -> DeserializeResult<()> {
        let entries = match self.value.as_ref() {
            Value::Object(entries) => entries,
            Value::Null => return Ok(()),
            _ => return Err(self.mismatch(schema, "object")),
        };
        let members: HashMap<String, Schema> = schema
            .members()
            .filter_map(|member| Some((self.wire_name(&member)?, member)))
            .collect();
        for (key, value) in entries {
            match members.get(key) {
                // Explicit null only reaches members whose absence means their default.
                Some(member) if value.is_null() && member.default_value().is_none() => {}
                Some(member) => {
                    let mut nested = JsonDeserializer::from_value(value, self.settings);
                    consumer.accept(member, &mut nested)?;
                }
                None if key == TYPE_KEY => {}
                None => {
                    tracing::debug!(shape = %schema.id(), key = %key, "skipping unknown JSON key");
                }
            }
        }
        Ok(())
    }

    fn read_list(
        &mut self,
        schema: &Schema,
        consumer: &mut dyn ListConsumer,
    ) -> DeserializeResult<()> {
        let Value::Array(items) = self.value.as_ref() else {
            return Err(self.mismatch(schema, "array"));
        };
        let element = schema
            .member("member")
            .ok_or_else(|| SerializationError::missing_member(schema.id(), "member"))?;
        let sparse = schema.traits().is_sparse();
        for item in items {
            if item.is_null() && !sparse {
                continue;
            }
            consumer.accept(&element, &mut JsonDeserializer::from_value(item, self.settings))?;
        }
        Ok(())
    }

    fn read_map(
        &mut self,
        schema: &Schema,
        consumer: &mut dyn MapConsumer,
    ) -> DeserializeResult<()> {
        let Value::Object(entries) = self.value.as_ref() else {
            return Err(self.mismatch(schema, "object"));
        };
        let value_schema = schema
            .member("value")
            .ok_or_else(|| SerializationError::missing_member(schema.id(), "value"))?;
        let sparse = schema.traits().is_sparse();
        for (key, value) in entries {
            if value.is_null() && !sparse {
                continue;
            }
            consumer.accept(
                key,
                &value_schema,
                &mut JsonDeserializer::from_value(value, self.settings),
            )?;
        }
        Ok(())
    }

    fn is_null(&mut self) -> bool {
        self.value.is_null()
    }

    fn read_null(&mut self) -> DeserializeResult<()> {
        if self.value.is_null() {
            Ok(())
        } else {
            Err(SerializationError::unexpected("json", "null", kind(&self.value)))
        }
    }

    fn read_boolean(&mut self, schema: &Schema) -> DeserializeResult<bool> {
        self.value
            .as_bool()
            .ok_or_else(|| self.mismatch(schema, "boolean"))
    }

    fn read_integer(&mut self, schema: &Schema) -> DeserializeResult<i32> {
        let value = self.read_long(schema)?;
        i32::try_from(value).map_err(|_| SerializationError::out_of_range(schema.id(), value))
    }

    fn read_long(&mut self, schema: &Schema) -> DeserializeResult<i64> {
        match self.value.as_ref() {
            Value::Number(number) => number
                .as_i64()
                .ok_or_else(|| SerializationError::out_of_range(schema.id(), number)),
            _ => Err(self.mismatch(schema, "integer")),
        }
    }

    fn read_double(&mut self, schema: &Schema) -> DeserializeResult<f64> {
        match self.value.as_ref() {
            Value::Number(number) => number
                .as_f64()
                .ok_or_else(|| SerializationError::out_of_range(schema.id(), number)),
            Value::String(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                _ => Err(self.mismatch(schema, "number")),
            },
            _ => Err(self.mismatch(schema, "number")),
        }
    }

    fn read_string(&mut self, schema: &Schema) -> DeserializeResult<String> {
        self.value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| self.mismatch(schema, "string"))
    }

    fn read_blob(&mut self, schema: &Schema) -> DeserializeResult<Bytes> {
        let text = self
            .value
            .as_str()
            .ok_or_else(|| self.mismatch(schema, "base64 string"))?;
        STANDARD
            .decode(text)
            .map(Bytes::from)
            .map_err(|error| {
                SerializationError::malformed(format!(
                    "invalid base64 for '{}': {error}",
                    schema.id()
                ))
            })
    }

    fn read_timestamp(&mut self, schema: &Schema) -> DeserializeResult<OffsetDateTime> {
        match self.value.as_ref() {
            Value::Number(number) => match number.as_f64() {
                Some(seconds) => from_epoch_seconds(seconds),
                None => Err(self.mismatch(schema, "timestamp")),
            },
            Value::String(text) => {
                let format = schema
                    .traits()
                    .timestamp_format()
                    .unwrap_or(self.settings.default_timestamp_format);
                parse_timestamp(text, format)
            }
            _ => Err(self.mismatch(schema, "timestamp")),
        }
    }

    fn read_document(&mut self, _schema: &Schema) -> DeserializeResult<Document> {
        Ok(value_to_document(&self.value))
    }
}
