//! HTTP binding client protocol.
//!
//! Members are placed by their HTTP binding traits: labels expand the URI
//! pattern, query and header members become query parameters and fields, a
//! payload member is the whole body, and every other member is encoded into
//! the body with the protocol's codec.

mod request;
mod response;

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;

use self::request::{expand_path, RequestRouter};
use self::response::ResponseDeserializer;
use crate::codec::Codec;
use crate::deserializers::DeserializeableShape;
use crate::document::Document;
use crate::endpoint::Endpoint;
use crate::error::{Fault, SerializationError, ServiceError, TransportError, UnknownApiError};
use crate::http::{HttpRequest, HttpResponse, Uri};
use crate::properties::Properties;
use crate::protocol::{ApiOperation, ClientProtocol};
use crate::schema::{prelude, Schema, ShapeType};
use crate::serializers::{InterceptingSerializer, MemberFilter, SerializeableStruct};
use crate::shape_id::ShapeId;
use crate::BoxFuture;

/// Field naming the modeled error of a failure response.
pub const ERROR_TYPE_HEADER: &str = "x-error-type";

/// Content type of a request whose body is an event stream.
pub const EVENT_STREAM_MEDIA_TYPE: &str = "application/vnd.keel.eventstream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Binding {
    Label,
    Query(String),
    QueryParams,
    Header(String),
    PrefixHeaders(String),
    Payload,
    EventStream,
    ResponseCode,
    Body,
}

impl Binding {
    /// URI bindings have no meaning on responses; those members use the body.
    fn in_response_body(&self) -> bool {
        matches!(
            self,
            Self::Body | Self::Label | Self::Query(_) | Self::QueryParams
        )
    }
}

pub(crate) fn binding_of(member: &Schema) -> Binding {
    let traits = member.traits();
    if traits.is_http_label() {
        Binding::Label
    } else if let Some(name) = traits.http_query() {
        Binding::Query(name.to_owned())
    } else if traits.is_http_query_params() {
        Binding::QueryParams
    } else if let Some(name) = traits.http_header() {
        Binding::Header(name.to_owned())
    } else if let Some(prefix) = traits.http_prefix_headers() {
        Binding::PrefixHeaders(prefix.to_owned())
    } else if traits.is_http_response_code() {
        Binding::ResponseCode
    } else if traits.is_http_payload() {
        if member.shape_type() == ShapeType::Union && traits.is_streaming() {
            Binding::EventStream
        } else {
            Binding::Payload
        }
    } else {
        Binding::Body
    }
}

/// Drops the `:`-suffix and namespace prefix of a wire error code.
pub fn sanitize_error_code(raw: &str) -> &str {
    let code = raw.split(':').next().unwrap_or(raw);
    code.rsplit_once('#').map_or(code, |(_, name)| name).trim()
}

/// Client protocol binding operation members onto HTTP messages.
#[derive(Debug)]
pub struct HttpBindingClientProtocol<C> {
    id: ShapeId,
    codec: Arc<C>,
}

impl<C> Clone for HttpBindingClientProtocol<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            codec: Arc::clone(&self.codec),
        }
    }
}

impl<C: Codec + 'static> HttpBindingClientProtocol<C> {
    pub fn new(id: ShapeId, codec: C) -> Self {
        Self {
            id,
            codec: Arc::new(codec),
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    fn body_document(&self, body: &[u8]) -> Option<Document> {
        if body.is_empty() {
            return None;
        }
        let mut deserializer = self.codec.create_deserializer(body).ok()?;
        deserializer.read_document(&prelude::DOCUMENT).ok()
    }

    fn error<I, O>(
        &self,
        operation: &ApiOperation<I, O>,
        response: &HttpResponse,
        body: &[u8],
    ) -> ServiceError {
        let document = self.body_document(body);
        let field = |name: &str| {
            document
                .as_ref()
                .and_then(|document| document.get(name))
                .and_then(Document::as_str)
                .map(str::to_owned)
        };

        let discriminator = response
            .fields
            .first(ERROR_TYPE_HEADER)
            .map(str::to_owned)
            .or_else(|| field("__type"))
            .or_else(|| field("code"));
        tracing::debug!(
            operation = %operation.id(),
            status = response.status,
            discriminator = discriminator.as_deref().unwrap_or("<none>"),
            "service returned an error response"
        );

        if let Some(code) = &discriminator {
            let qualified = code.split(':').next().unwrap_or(code);
            let entry = operation
                .error_registry
                .resolve(qualified)
                .or_else(|| operation.error_registry.resolve(sanitize_error_code(code)));
            if let Some(entry) = entry {
                let mut deserializer =
                    ResponseDeserializer::new(self.codec.as_ref(), response, body);
                return match entry.deserialize(&mut deserializer) {
                    Ok(error) => ServiceError::Modeled(error),
                    Err(error) => error.into(),
                };
            }
        }

        let fault = if response.status >= 500 {
            Fault::Server
        } else {
            Fault::Client
        };
        let code = discriminator
            .as_deref()
            .map(sanitize_error_code)
            .map_or_else(|| format!("Http{}", response.status), str::to_owned);
        let message = field("message")
            .or_else(|| field("Message"))
            .unwrap_or_else(|| format!("HTTP status {}", response.status));
        let unknown = UnknownApiError::new(code, message, fault).with_status(response.status);
        match discriminator {
            Some(raw) => unknown.with_discriminator(raw).into(),
            None => unknown.into(),
        }
    }
}

impl<C: Codec + 'static> ClientProtocol for HttpBindingClientProtocol<C> {
    type Request = HttpRequest;
    type Response = HttpResponse;

    fn id(&self) -> &ShapeId {
        &self.id
    }

    fn payload_codec(&self) -> Arc<dyn Codec> {
        let codec: Arc<dyn Codec> = self.codec.clone();
        codec
    }

    fn serialize_request<I, O>(
        &self,
        operation: &ApiOperation<I, O>,
        input: &I,
        _context: &Properties,
    ) -> Result<HttpRequest, ServiceError>
    where
        I: SerializeableStruct,
    {
        let (method, pattern, _) = operation.schema.traits().http().ok_or_else(|| {
            SerializationError::malformed(format!(
                "operation '{}' has no http binding",
                operation.id()
            ))
        })?;
        let (path_pattern, literal_query) = match pattern.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (pattern, None),
        };

        let mut bindings = InterceptingSerializer::new(RequestRouter::new(self.codec.as_ref()));
        input.serialize_members(&mut bindings)?;
        let mut router = bindings.into_router();

        let path = expand_path(path_pattern, &router.labels, input.schema())?;
        let mut uri = Uri::new("https", "").with_path(path);
        if let Some(literal) = literal_query.filter(|query| !query.is_empty()) {
            uri.append_query(literal);
        }
        let explicit: HashSet<&str> = router.query.iter().map(|(key, _)| key.as_str()).collect();
        let params = router
            .query_params
            .iter()
            .filter(|(key, _)| !explicit.contains(key.as_str()));
        for (key, value) in router.query.iter().chain(params) {
            uri.append_query(&format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            ));
        }

        let mut request = HttpRequest::new(method, uri);
        request.fields = std::mem::take(&mut router.headers);

        let members: Vec<Binding> = input
            .schema()
            .members()
            .map(|member| binding_of(&member))
            .collect();
        if let Some((body, media_type)) = router.payload.body.take() {
            request.fields.set("content-type", media_type);
            request.body = body;
        } else if members.contains(&Binding::Body) && !members.contains(&Binding::Payload) {
            let body_members = MemberFilter::new(input, |member: &Schema| {
                binding_of(member) == Binding::Body
            });
            let body = self.codec.serialize(&body_members)?;
            request.fields.set("content-type", self.codec.media_type());
            request.body = body.into();
        }
        if operation.input_event_schema.is_some() {
            request.fields.set("content-type", EVENT_STREAM_MEDIA_TYPE);
        }
        Ok(request)
    }

    fn set_service_endpoint(&self, mut request: HttpRequest, endpoint: &Endpoint) -> HttpRequest {
        let base = &endpoint.uri;
        let path = Uri::join_path(&base.path, &request.destination.path);
        let query = match (&base.query, request.destination.query.take()) {
            (Some(base), Some(own)) => Some(format!("{base}&{own}")),
            (Some(base), None) => Some(base.clone()),
            (None, own) => own,
        };
        request.destination = Uri {
            path,
            query,
            ..base.clone()
        };
        request.fields.extend(&endpoint.headers);
        request
    }

    fn deserialize_response<'a, I, O>(
        &'a self,
        operation: &'a ApiOperation<I, O>,
        _request: &'a HttpRequest,
        response: &'a HttpResponse,
        _context: &'a Properties,
    ) -> BoxFuture<'a, Result<O, ServiceError>>
    where
        I: 'a,
        O: DeserializeableShape + Send + 'a,
    {
        Box::pin(async move {
            // An event stream body is handed to the receiver untouched.
            let body = if response.is_success() && operation.output_event_schema.is_some() {
                Bytes::new()
            } else {
                response.body.collect().await.map_err(|error| {
                    TransportError::new("failed to read response body").with_source(error)
                })?
            };

            if !response.is_success() {
                return Err(self.error(operation, response, &body));
            }
            let mut deserializer = ResponseDeserializer::new(self.codec.as_ref(), response, &body);
            Ok(O::deserialize(&mut deserializer)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_lose_namespace_and_suffix() {
        assert_eq!(sanitize_error_code("NotFound"), "NotFound");
        assert_eq!(sanitize_error_code("example.weather#NotFound"), "NotFound");
        assert_eq!(
            sanitize_error_code("example.weather#NotFound:http://internal.example.com/"),
            "NotFound"
        );
    }
}
