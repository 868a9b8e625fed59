//! Conversions between JSON values and documents.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use keel_core::time_format::epoch_seconds;
use keel_core::Document;
use serde_json::{Map, Number, Value};

/// JSON number for `value`, or the string name of a non-finite float.
pub fn float_value(value: f64) -> Value {
    match Number::from_f64(value) {
        Some(number) => Value::Number(number),
        None if value.is_nan() => Value::String(String::from("NaN")),
        None if value > 0.0 => Value::String(String::from("Infinity")),
        None => Value::String(String::from("-Infinity")),
    }
}

/// Documents carry no schema, so blobs become base64 strings and
/// timestamps epoch seconds.
pub fn document_to_value(document: &Document) -> Value {
    match document {
        Document::Null => Value::Null,
        Document::Boolean(value) => Value::Bool(*value),
        Document::Integer(value) => Value::from(*value),
        Document::Float(value) => float_value(*value),
        Document::String(value) => Value::String(value.clone()),
        Document::Blob(value) => Value::String(STANDARD.encode(value)),
        Document::Timestamp(value) => float_value(epoch_seconds(*value)),
        Document::List(items) => Value::Array(items.iter().map(document_to_value).collect()),
        Document::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), document_to_value(value)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

pub fn value_to_document(value: &Value) -> Document {
    match value {
        Value::Null => Document::Null,
        Value::Bool(value) => Document::Boolean(*value),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => Document::Integer(integer),
            None => Document::Float(number.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(value) => Document::String(value.clone()),
        Value::Array(items) => Document::List(items.iter().map(value_to_document).collect()),
        Value::Object(entries) => Document::Map(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), value_to_document(value)))
                .collect(),
        ),
    }
}
