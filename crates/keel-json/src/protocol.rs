//! REST-JSON: HTTP bindings with JSON bodies.

use keel_core::{HttpBindingClientProtocol, ShapeId};

use crate::codec::JsonCodec;

pub const REST_JSON_PROTOCOL_ID: &str = "keel.protocols#restJson";

pub type RestJsonClientProtocol = HttpBindingClientProtocol<JsonCodec>;

/// REST-JSON protocol with default JSON settings.
pub fn rest_json() -> RestJsonClientProtocol {
    let id = ShapeId::parse(REST_JSON_PROTOCOL_ID)
        .unwrap_or_else(|_| ShapeId::new("keel.protocols", "restJson"));
    HttpBindingClientProtocol::new(id, JsonCodec::new())
}
