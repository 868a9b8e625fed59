//! Client protocol contract and the operation descriptors it consumes.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::Codec;
use crate::deserializers::{DeserializeableShape, ShapeDeserializer};
use crate::endpoint::Endpoint;
use crate::error::{ApiError, SerializationError, ServiceError};
use crate::http::{Body, BodyError};
use crate::properties::Properties;
use crate::schema::Schema;
use crate::serializers::SerializeableStruct;
use crate::shape_id::ShapeId;
use crate::BoxFuture;

/// Transport-level request produced by a protocol.
pub trait TransportRequest: Debug + Clone + Send + Sync + 'static {
    /// Seeks the body back to its start before a retried attempt.
    ///
    /// # Errors
    ///
    /// Fails when the body is a stream that was already consumed.
    fn rewind_body(&self) -> Result<(), BodyError>;

    fn set_body(&mut self, body: Body);
}

/// Transport-level response handed back to a protocol.
pub trait TransportResponse: Debug + Clone + Send + Sync + 'static {
    fn status_code(&self) -> Option<u16> {
        None
    }

    /// Server-requested minimum wait before retrying.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// Shared handle to the response body.
    fn body(&self) -> Body;
}

/// Deserializes a modeled error into a boxed [`ApiError`].
pub type ErrorDeserializer =
    fn(&mut dyn ShapeDeserializer) -> Result<Box<dyn ApiError>, SerializationError>;

/// A generated error structure.
pub trait ModeledError: ApiError + DeserializeableShape {
    fn error_schema() -> &'static Schema;
}

#[derive(Clone)]
pub struct ErrorEntry {
    schema: Schema,
    deserialize: ErrorDeserializer,
}

impl ErrorEntry {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// # Errors
    ///
    /// Propagates the error shape's deserialization failure.
    pub fn deserialize(
        &self,
        deserializer: &mut dyn ShapeDeserializer,
    ) -> Result<Box<dyn ApiError>, SerializationError> {
        (self.deserialize)(deserializer)
    }
}

fn deserialize_boxed<E: ModeledError>(
    deserializer: &mut dyn ShapeDeserializer,
) -> Result<Box<dyn ApiError>, SerializationError> {
    Ok(Box::new(E::deserialize(deserializer)?))
}

/// Immutable map from error shape id to error deserializer.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    entries: Arc<HashMap<ShapeId, ErrorEntry>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: ModeledError>(self) -> Self {
        let schema = E::error_schema().clone();
        let mut entries = Arc::unwrap_or_clone(self.entries);
        entries.insert(
            schema.id().clone(),
            ErrorEntry {
                schema,
                deserialize: deserialize_boxed::<E>,
            },
        );
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn get(&self, id: &ShapeId) -> Option<&ErrorEntry> {
        self.entries.get(id)
    }

    /// Looks up a wire discriminator: an absolute shape id or a bare shape name.
    pub fn resolve(&self, discriminator: &str) -> Option<&ErrorEntry> {
        if let Ok(id) = ShapeId::parse(discriminator) {
            if let Some(entry) = self.entries.get(&id) {
                return Some(entry);
            }
        }
        self.entries
            .values()
            .find(|entry| entry.schema.id().name() == discriminator)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Debug for TypeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Static description of one operation, produced by code generation.
pub struct ApiOperation<I, O> {
    pub schema: Schema,
    pub input_schema: Schema,
    pub output_schema: Schema,
    pub error_registry: TypeRegistry,
    /// Auth scheme ids in priority order.
    pub effective_auth_schemes: Vec<ShapeId>,
    pub input_event_schema: Option<Schema>,
    pub output_event_schema: Option<Schema>,
    marker: PhantomData<fn(I) -> O>,
}

impl<I, O> ApiOperation<I, O> {
    pub fn new(schema: Schema, input_schema: Schema, output_schema: Schema) -> Self {
        let effective_auth_schemes = schema
            .traits()
            .auth()
            .map(<[ShapeId]>::to_vec)
            .unwrap_or_default();
        Self {
            schema,
            input_schema,
            output_schema,
            error_registry: TypeRegistry::new(),
            effective_auth_schemes,
            input_event_schema: None,
            output_event_schema: None,
            marker: PhantomData,
        }
    }

    pub fn with_errors(mut self, registry: TypeRegistry) -> Self {
        self.error_registry = registry;
        self
    }

    pub fn with_auth_schemes(mut self, schemes: Vec<ShapeId>) -> Self {
        self.effective_auth_schemes = schemes;
        self
    }

    pub fn with_input_events(mut self, schema: Schema) -> Self {
        self.input_event_schema = Some(schema);
        self
    }

    pub fn with_output_events(mut self, schema: Schema) -> Self {
        self.output_event_schema = Some(schema);
        self
    }

    pub fn id(&self) -> &ShapeId {
        self.schema.id()
    }
}

impl<I, O> Clone for ApiOperation<I, O> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            input_schema: self.input_schema.clone(),
            output_schema: self.output_schema.clone(),
            error_registry: self.error_registry.clone(),
            effective_auth_schemes: self.effective_auth_schemes.clone(),
            input_event_schema: self.input_event_schema.clone(),
            output_event_schema: self.output_event_schema.clone(),
            marker: PhantomData,
        }
    }
}

impl<I, O> Debug for ApiOperation<I, O> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiOperation")
            .field("id", self.schema.id())
            .field("errors", &self.error_registry)
            .field("auth", &self.effective_auth_schemes)
            .finish()
    }
}

/// Turns typed operation inputs into transport requests and transport
/// responses into typed outputs or modeled errors.
pub trait ClientProtocol: Send + Sync + 'static {
    type Request: TransportRequest;
    type Response: TransportResponse;

    fn id(&self) -> &ShapeId;

    /// Codec used for payloads, including event stream messages.
    fn payload_codec(&self) -> Arc<dyn Codec>;

    /// # Errors
    ///
    /// Returns [`ServiceError::Serialization`] when the input cannot be encoded.
    fn serialize_request<I, O>(
        &self,
        operation: &ApiOperation<I, O>,
        input: &I,
        context: &Properties,
    ) -> Result<Self::Request, ServiceError>
    where
        I: SerializeableStruct;

    /// Applies the resolved endpoint to a serialized request.
    fn set_service_endpoint(&self, request: Self::Request, endpoint: &Endpoint) -> Self::Request;

    /// Produces the operation output, or the modeled error the response
    /// signals. Unrecognized errors become [`crate::UnknownApiError`].
    fn deserialize_response<'a, I, O>(
        &'a self,
        operation: &'a ApiOperation<I, O>,
        request: &'a Self::Request,
        response: &'a Self::Response,
        context: &'a Properties,
    ) -> BoxFuture<'a, Result<O, ServiceError>>
    where
        I: 'a,
        O: DeserializeableShape + Send + 'a;
}
