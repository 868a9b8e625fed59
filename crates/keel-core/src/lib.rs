//! # Keel Core
//!
//! Runtime for clients generated from Smithy-style service models.
//!
//! ## Overview
//!
//! Generated code describes shapes with [`Schema`]s and implements the
//! serializer contracts; this crate turns those shapes into requests and
//! responses and drives each call through a single pipeline:
//!
//! - **Schemas and traits** for every shape, including recursive ones
//! - **Serializer/deserializer contracts** that codecs implement once per format
//! - **Client protocols** mapping typed inputs onto transport requests
//! - **Identity and auth** resolution with pluggable signers
//! - **Retry strategies** with backoff, retry quotas and a circuit breaker
//! - **Interceptors** observing or replacing values at every pipeline step
//! - **Event streams** for operations that stream in either direction
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`auth`] | Identities, resolvers, signers and auth schemes |
//! | [`client`] | Client wrapper used by generated service clients |
//! | [`codec`] | Codec contract |
//! | [`config`] | Client configuration and plugins |
//! | [`deserializers`] | Shape deserializer contract |
//! | [`document`] | Untyped [`Document`] values |
//! | [`endpoint`] | Endpoint resolution |
//! | [`error`] | Error types shared by every layer |
//! | [`event_stream`] | Event stream publishers, receivers and framing |
//! | [`http`] | HTTP request, response, fields, URI and body |
//! | [`http_binding`] | HTTP binding client protocol |
//! | [`interceptor`] | Interceptor hooks and contexts |
//! | [`pipeline`] | Request execution pipeline |
//! | [`properties`] | Typed property bags |
//! | [`protocol`] | Client protocol contract and operation descriptions |
//! | [`retry`] | Retry strategies and error classification |
//! | [`schema`] | Schema and trait model |
//! | [`serializers`] | Shape serializer contract |
//! | [`shape_id`] | Shape identifiers |
//! | [`time_format`] | Timestamp wire formats |
//! | [`transport`] | Transport contract and reqwest transport |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Generated client│
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ RequestPipeline │────▶│  Interceptors    │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ ClientProtocol  │────▶│ Codec            │
//! │ (HTTP binding)  │     │ (e.g. JSON)      │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Retry / Auth    │────▶│ ClientTransport  │
//! └─────────────────┘     │ (reqwest)        │
//!                         └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Every operation returns [`ServiceError`]. Modeled service errors are
//! recovered with [`ServiceError::as_modeled`]:
//!
//! ```rust,ignore
//! match client.execute(input, &GET_FORECAST, &[]).await {
//!     Ok(output) => println!("{output:?}"),
//!     Err(error) => match error.as_modeled::<NotFound>() {
//!         Some(not_found) => eprintln!("missing: {}", not_found.message),
//!         None => eprintln!("call failed: {error}"),
//!     },
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod deserializers;
pub mod document;
pub mod endpoint;
pub mod error;
pub mod event_stream;
pub mod http;
pub mod http_binding;
pub mod interceptor;
pub mod pipeline;
pub mod properties;
pub mod protocol;
pub mod retry;
pub mod schema;
pub mod serializers;
pub mod shape_id;
pub mod time_format;
pub mod transport;

/// Boxed future returned by the object-safe async seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// Auth
pub use auth::{
    AuthOption, AuthParams, AuthScheme, AuthSchemeResolver, EventSigner, Identity,
    IdentityResolver, Signer, StaticAuthSchemeResolver,
};

// Client and pipeline
pub use client::Client;
pub use config::{ClientConfig, ConfigError, Plugin};
pub use pipeline::{ClientCall, RequestPipeline};

// Serialization
pub use codec::Codec;
pub use deserializers::{DeserializeableShape, ShapeDeserializer};
pub use document::Document;
pub use serializers::{SerializeableShape, SerializeableStruct, ShapeSerializer};

// Schema model
pub use schema::{Schema, SchemaBuilder, ShapeType, TimestampFormat, Trait, TraitMap};
pub use shape_id::{ShapeId, PRELUDE_NAMESPACE};

// Errors
pub use error::{
    ApiError, BoxError, ErrorRetryInfo, Fault, RetryError, RetryInfo, SerializationError,
    ServiceError, TransportError, UnknownApiError,
};

// Protocol and transport
pub use endpoint::{Endpoint, EndpointResolver, StaticEndpointResolver};
pub use http::{Body, HttpRequest, HttpResponse, Uri};
pub use http_binding::HttpBindingClientProtocol;
pub use interceptor::{Interceptor, InterceptorChain};
pub use properties::{Properties, PropertyKey};
pub use protocol::{ApiOperation, ClientProtocol, ModeledError, TypeRegistry};
pub use retry::{RetryStrategy, SimpleRetryStrategy, StandardRetryStrategy};
pub use transport::{ClientTransport, ReqwestTransport};
