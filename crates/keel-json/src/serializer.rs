use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use keel_core::serializers::{
    MapSerializer, SerializeResult, SerializeableStruct, ShapeSerializer,
};
use keel_core::time_format::{epoch_seconds, format_timestamp};
use keel_core::{Document, Schema, SerializationError, TimestampFormat};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::codec::JsonSettings;
use crate::value::{document_to_value, float_value};

/// Where the next written value goes.
enum Slot {
    Value(Option<Value>),
    Members(Map<String, Value>),
    Elements(Vec<Value>),
}

/// JSON shape serializer.
///
/// Values are assembled in memory and written to the sink on
/// [`flush`](ShapeSerializer::flush).
pub struct JsonSerializer<'a> {
    sink: Option<&'a mut Vec<u8>>,
    settings: &'a JsonSettings,
    slot: Slot,
}

impl<'a> JsonSerializer<'a> {
    pub fn new(sink: &'a mut Vec<u8>, settings: &'a JsonSettings) -> Self {
        Self {
            sink: Some(sink),
            settings,
            slot: Slot::Value(None),
        }
    }

    fn nested(settings: &'a JsonSettings, slot: Slot) -> Self {
        Self {
            sink: None,
            settings,
            slot,
        }
    }

    fn member_name<'s>(&self, schema: &'s Schema) -> Option<&'s str> {
        if self.settings.use_json_name {
            if let Some(name) = schema.traits().json_name() {
                return Some(name);
            }
        }
        schema.member_name()
    }

    fn put(&mut self, schema: &Schema, value: Value) -> SerializeResult {
        let member_name = self.member_name(schema).map(str::to_owned);
        match &mut self.slot {
            Slot::Value(slot) => *slot = Some(value),
            Slot::Elements(items) => items.push(value),
            Slot::Members(members) => {
                // A null only means something for members that would otherwise default.
                if value.is_null() && schema.default_value().is_none() {
                    return Ok(());
                }
                let name = member_name.ok_or_else(|| {
                    SerializationError::malformed(format!(
                        "'{}' is not a member and cannot be written inside a structure",
                        schema.id()
                    ))
                })?;
                members.insert(name, value);
            }
        }
        Ok(())
    }

    fn timestamp_value(
        &self,
        schema: &Schema,
        value: OffsetDateTime,
    ) -> Result<Value, SerializationError> {
        let format = schema
            .traits()
            .timestamp_format()
            .unwrap_or(self.settings.default_timestamp_format);
        match format {
            TimestampFormat::EpochSeconds if value.nanosecond() == 0 => {
                Ok(Value::from(value.unix_timestamp()))
            }
            TimestampFormat::EpochSeconds => Ok(float_value(epoch_seconds(value))),
            other => format_timestamp(value, other).map(Value::String),
        }
    }

    fn into_value(self) -> Option<Value> {
        match self.slot {
            Slot::Value(value) => value,
            Slot::Members(members) => Some(Value::Object(members)),
            Slot::Elements(items) => Some(Value::Array(items)),
        }
    }
}

struct JsonMapWriter<'a> {
    settings: &'a JsonSettings,
    entries: Map<String, Value>,
}

impl MapSerializer for JsonMapWriter<'_> {
    fn write_entry(
        &mut self,
        _key_schema: &Schema,
        key: &str,
        write_value: &mut dyn FnMut(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult {
        let mut value = JsonSerializer::nested(self.settings, Slot::Value(None));
        write_value(&mut value)?;
        self.entries
            .insert(key.to_owned(), value.into_value().unwrap_or(Value::Null));
        Ok(())
    }
}

impl ShapeSerializer for JsonSerializer<'_> {
    fn write_struct(
        &mut self,
        schema: &Schema,
        value: &dyn SerializeableStruct,
    ) -> SerializeResult {
        let mut members = JsonSerializer::nested(self.settings, Slot::Members(Map::new()));
        value.serialize_members(&mut members)?;
        let object = members.into_value().unwrap_or_default();
        self.put(schema, object)
    }

    fn write_list(
        &mut self,
        schema: &Schema,
        size: usize,
        write_elements: &mut dyn FnMut(&mut dyn ShapeSerializer) -> SerializeResult,
    ) -> SerializeResult {
        let mut elements =
            JsonSerializer::nested(self.settings, Slot::Elements(Vec::with_capacity(size)));
        write_elements(&mut elements)?;
        let array = elements.into_value().unwrap_or_default();
        self.put(schema, array)
    }

    fn write_map(
        &mut self,
        schema: &Schema,
        _size: usize,
        write_entries: &mut dyn FnMut(&mut dyn MapSerializer) -> SerializeResult,
    ) -> SerializeResult {
        let mut map = JsonMapWriter {
            settings: self.settings,
            entries: Map::new(),
        };
        write_entries(&mut map)?;
        self.put(schema, Value::Object(map.entries))
    }

    fn write_null(&mut self, schema: &Schema) -> SerializeResult {
        self.put(schema, Value::Null)
    }

    fn write_boolean(&mut self, schema: &Schema, value: bool) -> SerializeResult {
        self.put(schema, Value::Bool(value))
    }

    fn write_integer(&mut self, schema: &Schema, value: i32) -> SerializeResult {
        self.put(schema, Value::from(value))
    }

    fn write_long(&mut self, schema: &Schema, value: i64) -> SerializeResult {
        self.put(schema, Value::from(value))
    }

    fn write_float(&mut self, schema: &Schema, value: f32) -> SerializeResult {
        // Through the decimal text so 0.1f32 stays 0.1 rather than 0.10000000149.
        let widened = value.to_string().parse::<f64>().unwrap_or(f64::from(value));
        self.put(schema, float_value(widened))
    }

    fn write_double(&mut self, schema: &Schema, value: f64) -> SerializeResult {
        self.put(schema, float_value(value))
    }

    fn write_string(&mut self, schema: &Schema, value: &str) -> SerializeResult {
        self.put(schema, Value::String(value.to_owned()))
    }

    fn write_blob(&mut self, schema: &Schema, value: &[u8]) -> SerializeResult {
        self.put(schema, Value::String(STANDARD.encode(value)))
    }

    fn write_timestamp(&mut self, schema: &Schema, value: OffsetDateTime) -> SerializeResult {
        let value = self.timestamp_value(schema, value)?;
        self.put(schema, value)
    }

    fn write_document(&mut self, schema: &Schema, value: &Document) -> SerializeResult {
        self.put(schema, document_to_value(value))
    }

    fn flush(&mut self) -> SerializeResult {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        let Slot::Value(value) = &mut self.slot else {
            return Ok(());
        };
        if let Some(value) = value.take() {
            serde_json::to_writer(&mut **sink, &value)
                .map_err(|error| SerializationError::malformed(error.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use keel_core::schema::prelude;

    use super::*;

    fn written(write: impl FnOnce(&mut JsonSerializer<'_>) -> SerializeResult) -> String {
        let settings = JsonSettings::default();
        let mut sink = Vec::new();
        {
            let mut serializer = JsonSerializer::new(&mut sink, &settings);
            write(&mut serializer).expect("write");
            serializer.flush().expect("flush");
        }
        String::from_utf8(sink).expect("utf-8")
    }

    #[test]
    fn scalars_use_json_representations() {
        assert_eq!(written(|s| s.write_blob(&prelude::BLOB, b"keel")), "\"a2VlbA==\"");
        assert_eq!(written(|s| s.write_double(&prelude::DOUBLE, f64::NAN)), "\"NaN\"");
        assert_eq!(written(|s| s.write_float(&prelude::FLOAT, 0.1)), "0.1");
    }

    #[test]
    fn timestamps_default_to_epoch_seconds() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("valid");
        assert_eq!(
            written(|s| s.write_timestamp(&prelude::TIMESTAMP, at)),
            "1700000000"
        );
    }
}
