//! # keel-json
//!
//! JSON codec and REST-JSON client protocol for keel clients.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`codec`] | [`JsonCodec`] and its [`JsonSettings`] |
//! | [`protocol`] | REST-JSON protocol built on the HTTP binding protocol |
//! | [`value`] | Conversions between `serde_json::Value` and [`keel_core::Document`] |
//!
//! ## Wire format
//!
//! - Structure members use their `jsonName` when the codec is configured to
//! - Blobs are base64 strings
//! - Timestamps default to epoch seconds; `timestampFormat` overrides it
//! - Non-finite floats are the strings `NaN`, `Infinity` and `-Infinity`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keel_core::{Client, ClientConfig, ReqwestTransport, Uri};
//! use keel_json::rest_json;
//!
//! let config = ClientConfig::new().with_endpoint_uri(Uri::parse("https://weather.example.com")?);
//! let client = Client::new(rest_json(), ReqwestTransport::new(), config);
//! let forecast = client.execute(input, &GET_FORECAST, &[]).await?;
//! ```

pub mod codec;
mod deserializer;
pub mod protocol;
mod serializer;
pub mod value;

pub use codec::{JsonCodec, JsonSettings};
pub use deserializer::JsonDeserializer;
pub use protocol::{rest_json, RestJsonClientProtocol, REST_JSON_PROTOCOL_ID};
pub use serializer::JsonSerializer;
