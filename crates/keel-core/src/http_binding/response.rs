use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use time::OffsetDateTime;

use super::{binding_of, Binding};
use crate::codec::Codec;
use crate::deserializers::{
    DeserializeResult, ListConsumer, MapConsumer, ShapeDeserializer, StructConsumer,
};
use crate::document::{Document, DocumentDeserializer};
use crate::error::SerializationError;
use crate::http::HttpResponse;
use crate::schema::{Schema, ShapeType, TimestampFormat};
use crate::time_format::parse_timestamp;

/// Splits a list-valued header line on commas outside double quotes.
pub(super) fn split_header_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;
    for character in value.chars() {
        match character {
            _ if escaped => {
                current.push(character);
                escaped = false;
            }
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ',' if !quoted => items.push(std::mem::take(&mut current).trim().to_owned()),
            _ => current.push(character),
        }
    }
    let last = current.trim();
    if !last.is_empty() || !items.is_empty() {
        items.push(last.to_owned());
    }
    items
}

fn parse_number<T: std::str::FromStr>(schema: &Schema, value: &str) -> DeserializeResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SerializationError::unexpected(schema.id(), "number", format!("'{value}'")))
}

fn parse_float(schema: &Schema, value: &str) -> DeserializeResult<f64> {
    match value.trim() {
        "NaN" => Ok(f64::NAN),
        "Infinity" => Ok(f64::INFINITY),
        "-Infinity" => Ok(f64::NEG_INFINITY),
        other => parse_number(schema, other),
    }
}

/// Converts header text into the document the member's schema expects.
fn header_document(schema: &Schema, value: &str) -> DeserializeResult<Document> {
    let document = match schema.shape_type() {
        ShapeType::String | ShapeType::Enum => Document::String(value.to_owned()),
        ShapeType::Boolean => match value.trim() {
            "true" => Document::Boolean(true),
            "false" => Document::Boolean(false),
            other => {
                return Err(SerializationError::unexpected(
                    schema.id(),
                    "boolean",
                    format!("'{other}'"),
                ))
            }
        },
        ShapeType::Byte
        | ShapeType::Short
        | ShapeType::Integer
        | ShapeType::Long
        | ShapeType::IntEnum => Document::Integer(parse_number(schema, value)?),
        ShapeType::Float | ShapeType::Double => Document::Float(parse_float(schema, value)?),
        ShapeType::Blob => Document::Blob(Bytes::from(
            STANDARD
                .decode(value.trim())
                .map_err(|error| SerializationError::malformed(error.to_string()))?,
        )),
        ShapeType::Timestamp => {
            let format = schema
                .traits()
                .timestamp_format()
                .unwrap_or(TimestampFormat::HttpDate);
            Document::Timestamp(parse_timestamp(value, format)?)
        }
        _ => return Err(SerializationError::unsupported(schema.id(), "a header")),
    };
    Ok(document)
}

fn header_value(schema: &Schema, values: &[String]) -> DeserializeResult<Document> {
    if schema.shape_type() != ShapeType::List {
        return header_document(schema, &values.join(", "));
    }
    let element = schema
        .member("member")
        .ok_or_else(|| SerializationError::missing_member(schema.id(), "member"))?;
    let mut items = Vec::new();
    for value in values {
        // HTTP dates contain a comma of their own.
        let parts = if element.shape_type() == ShapeType::Timestamp
            && element.traits().timestamp_format().is_none()
        {
            split_http_dates(value)
        } else {
            split_header_list(value)
        };
        for part in parts {
            items.push(header_document(&element, &part)?);
        }
    }
    Ok(Document::List(items))
}

fn split_http_dates(value: &str) -> Vec<String> {
    let pieces: Vec<&str> = value.split(',').map(str::trim).collect();
    pieces
        .chunks(2)
        .map(|pair| pair.join(", "))
        .filter(|date| !date.is_empty())
        .collect()
}

/// Feeds only body-bound members through to the wrapped consumer.
struct BodyMembers<'c> {
    consumer: &'c mut dyn StructConsumer,
}

impl StructConsumer for BodyMembers<'_> {
    fn accept(
        &mut self,
        member: &Schema,
        deserializer: &mut dyn ShapeDeserializer,
    ) -> DeserializeResult<()> {
        if binding_of(member).in_response_body() {
            self.consumer.accept(member, deserializer)
        } else {
            // Skips the value while keeping the source positioned.
            deserializer.read_document(member).map(|_| ())
        }
    }
}

/// Reads an output or error structure from headers, status and body.
pub(super) struct ResponseDeserializer<'r> {
    codec: &'r dyn Codec,
    response: &'r HttpResponse,
    body: &'r [u8],
}

impl<'r> ResponseDeserializer<'r> {
    pub(super) fn new(codec: &'r dyn Codec, response: &'r HttpResponse, body: &'r [u8]) -> Self {
        Self {
            codec,
            response,
            body,
        }
    }

    fn read_payload(
        &self,
        member: &Schema,
        consumer: &mut dyn StructConsumer,
    ) -> DeserializeResult<()> {
        match member.shape_type() {
            ShapeType::Blob => {
                let value = Document::Blob(Bytes::copy_from_slice(self.body));
                consumer.accept(member, &mut DocumentDeserializer::new(&value))
            }
            ShapeType::String | ShapeType::Enum => {
                let text = std::str::from_utf8(self.body)
                    .map_err(|_| SerializationError::malformed("text payload is not UTF-8"))?;
                let value = Document::String(text.to_owned());
                consumer.accept(member, &mut DocumentDeserializer::new(&value))
            }
            _ if self.body.is_empty() => Ok(()),
            _ => {
                let mut deserializer = self.codec.create_deserializer(self.body)?;
                consumer.accept(member, deserializer.as_mut())
            }
        }
    }

    fn prefix_headers(&self, prefix: &str) -> Document {
        let prefix = prefix.to_ascii_lowercase();
        let entries: BTreeMap<String, Document> = self
            .response
            .fields
            .iter()
            .filter_map(|field| {
                let name = field.name().to_ascii_lowercase();
                let suffix = name.strip_prefix(&prefix)?;
                Some((suffix.to_owned(), Document::String(field.as_string())))
            })
            .collect();
        Document::Map(entries)
    }

    fn unsupported(&self, schema: &Schema) -> SerializationError {
        SerializationError::unsupported(schema.id(), "an HTTP response root")
    }
}

impl ShapeDeserializer for ResponseDeserializer<'_> {
    fn read_struct(
        &mut self,
        schema: &Schema,
        consumer: &mut dyn StructConsumer,
    ) -> DeserializeResult<()> {
        let mut has_body_members = false;
        for member in schema.members() {
            match binding_of(&member) {
                Binding::Header(name) => {
                    if let Some(field) = self.response.fields.get(&name) {
                        let value = header_value(&member, field.values())?;
                        consumer.accept(&member, &mut DocumentDeserializer::new(&value))?;
                    }
                }
                Binding::PrefixHeaders(prefix) => {
                    let value = self.prefix_headers(&prefix);
                    if value.as_map().is_some_and(|entries| !entries.is_empty()) {
                        consumer.accept(&member, &mut DocumentDeserializer::new(&value))?;
                    }
                }
                Binding::ResponseCode => {
                    let value = Document::Integer(i64::from(self.response.status));
                    consumer.accept(&member, &mut DocumentDeserializer::new(&value))?;
                }
                Binding::Payload => self.read_payload(&member, consumer)?,
                Binding::EventStream => {}
                binding => has_body_members |= binding.in_response_body(),
            }
        }

        if has_body_members && !self.body.is_empty() {
            let mut deserializer = self.codec.create_deserializer(self.body)?;
            deserializer.read_struct(schema, &mut BodyMembers { consumer })?;
        }
        Ok(())
    }

    fn read_list(&mut self, schema: &Schema, _: &mut dyn ListConsumer) -> DeserializeResult<()> {
        Err(self.unsupported(schema))
    }

    fn read_map(&mut self, schema: &Schema, _: &mut dyn MapConsumer) -> DeserializeResult<()> {
        Err(self.unsupported(schema))
    }

    fn is_null(&mut self) -> bool {
        false
    }

    fn read_null(&mut self) -> DeserializeResult<()> {
        Err(SerializationError::unexpected("response", "null", "structure"))
    }

    fn read_boolean(&mut self, schema: &Schema) -> DeserializeResult<bool> {
        Err(self.unsupported(schema))
    }

    fn read_integer(&mut self, schema: &Schema) -> DeserializeResult<i32> {
        Err(self.unsupported(schema))
    }

    fn read_long(&mut self, schema: &Schema) -> DeserializeResult<i64> {
        Err(self.unsupported(schema))
    }

    fn read_double(&mut self, schema: &Schema) -> DeserializeResult<f64> {
        Err(self.unsupported(schema))
    }

    fn read_string(&mut self, schema: &Schema) -> DeserializeResult<String> {
        Err(self.unsupported(schema))
    }

    fn read_blob(&mut self, schema: &Schema) -> DeserializeResult<Bytes> {
        Err(self.unsupported(schema))
    }

    fn read_timestamp(&mut self, schema: &Schema) -> DeserializeResult<OffsetDateTime> {
        Err(self.unsupported(schema))
    }

    fn read_document(&mut self, schema: &Schema) -> DeserializeResult<Document> {
        Err(self.unsupported(schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_headers_split_outside_quotes() {
        assert_eq!(
            split_header_list(r#"a, "b,c", "d\"e""#),
            vec!["a", "b,c", "d\"e"]
        );
        assert!(split_header_list("").is_empty());
    }

    #[test]
    fn http_date_lists_keep_their_inner_commas() {
        let dates =
            split_http_dates("Mon, 16 Dec 2019 23:48:18 GMT, Tue, 17 Dec 2019 23:48:18 GMT");
        assert_eq!(
            dates,
            vec!["Mon, 16 Dec 2019 23:48:18 GMT", "Tue, 17 Dec 2019 23:48:18 GMT"]
        );
    }
}
