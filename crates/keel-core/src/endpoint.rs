//! Endpoint resolution.

use crate::error::ServiceError;
use crate::http::{Fields, Uri};
use crate::properties::{Properties, PropertyKey};
use crate::schema::Schema;
use crate::BoxFuture;

/// Context property overriding the endpoint for a single call.
pub const ENDPOINT_URI: PropertyKey<Uri> = PropertyKey::new("keel.endpoint_uri");

/// Resolved destination of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub uri: Uri,
    /// Fields every request to this endpoint must carry.
    pub headers: Fields,
}

impl Endpoint {
    pub fn new(uri: Uri) -> Self {
        Self {
            uri,
            headers: Fields::new(),
        }
    }
}

/// Inputs to endpoint resolution.
#[derive(Debug, Clone, Copy)]
pub struct EndpointResolverParams<'a> {
    pub operation: &'a Schema,
    pub context: &'a Properties,
    /// Statically configured endpoint, if any.
    pub endpoint_uri: Option<&'a Uri>,
}

pub trait EndpointResolver: Send + Sync {
    fn resolve_endpoint<'a>(
        &'a self,
        params: EndpointResolverParams<'a>,
    ) -> BoxFuture<'a, Result<Endpoint, ServiceError>>;
}

/// Resolves to the configured endpoint, preferring a per-call override.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticEndpointResolver;

impl EndpointResolver for StaticEndpointResolver {
    fn resolve_endpoint<'a>(
        &'a self,
        params: EndpointResolverParams<'a>,
    ) -> BoxFuture<'a, Result<Endpoint, ServiceError>> {
        Box::pin(async move {
            params
                .context
                .get(&ENDPOINT_URI)
                .or(params.endpoint_uri)
                .cloned()
                .map(Endpoint::new)
                .ok_or_else(|| {
                    ServiceError::endpoint(format!(
                        "no endpoint configured for '{}'",
                        params.operation.id()
                    ))
                })
        })
    }
}
