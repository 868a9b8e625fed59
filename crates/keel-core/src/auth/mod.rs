//! Identity resolution, signing and auth scheme selection.
//!
//! An [`AuthSchemeResolver`] returns options in priority order; the pipeline
//! uses the first option whose scheme is configured on the client and sends
//! the request unsigned when none is.

mod http;
mod identity;

use std::collections::HashMap;
use std::sync::Arc;

pub use http::{ApiKeyAuthScheme, ApiKeyLocation, BearerAuthScheme, NoAuthScheme};
pub use identity::{
    AnonymousIdentity, ApiKeyIdentity, CachingIdentityResolver, EnvironmentApiKeyResolver,
    Identity, IdentityResolver, StaticIdentityResolver, TokenIdentity,
};

use crate::error::ServiceError;
use crate::event_stream::EventMessage;
use crate::properties::Properties;
use crate::schema::Schema;
use crate::shape_id::ShapeId;
use crate::BoxFuture;

/// Signs outgoing event stream messages after the initial request is signed.
pub trait EventSigner: Send + Sync {
    /// # Errors
    ///
    /// Fails when the message cannot be signed.
    fn sign_event(&self, message: EventMessage) -> Result<EventMessage, ServiceError>;
}

/// Applies an identity to a transport request.
pub trait Signer<Req>: Send + Sync {
    fn sign<'a>(
        &'a self,
        request: Req,
        identity: Arc<dyn Identity>,
        properties: &'a Properties,
    ) -> BoxFuture<'a, Result<Req, ServiceError>>;

    /// Signer for the messages of an event stream sent with this request.
    fn event_signer(
        &self,
        _identity: &Arc<dyn Identity>,
        _properties: &Properties,
    ) -> Option<Arc<dyn EventSigner>> {
        None
    }
}

/// One configured way of authenticating requests.
pub trait AuthScheme<Req>: Send + Sync {
    fn scheme_id(&self) -> &ShapeId;

    fn identity_resolver(&self) -> Arc<dyn IdentityResolver>;

    fn signer(&self) -> Arc<dyn Signer<Req>>;

    /// Identity properties derived from the call context.
    fn identity_properties(&self, _context: &Properties) -> Properties {
        Properties::new()
    }

    /// Signer properties derived from the call context.
    fn signer_properties(&self, _context: &Properties) -> Properties {
        Properties::new()
    }
}

/// A candidate scheme with property overrides.
#[derive(Debug, Clone)]
pub struct AuthOption {
    pub scheme_id: ShapeId,
    pub identity_properties: Properties,
    pub signer_properties: Properties,
}

impl AuthOption {
    pub fn new(scheme_id: ShapeId) -> Self {
        Self {
            scheme_id,
            identity_properties: Properties::new(),
            signer_properties: Properties::new(),
        }
    }
}

/// Inputs to auth scheme resolution.
#[derive(Debug, Clone, Copy)]
pub struct AuthParams<'a> {
    pub protocol_id: &'a ShapeId,
    pub operation: &'a Schema,
    /// The operation's effective auth schemes, in model priority order.
    pub auth_schemes: &'a [ShapeId],
    pub context: &'a Properties,
}

/// Orders the auth options for one operation invocation.
pub trait AuthSchemeResolver: Send + Sync {
    fn resolve_auth_scheme(&self, params: &AuthParams<'_>) -> Vec<AuthOption>;
}

/// Returns the operation's effective auth schemes in model order.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticAuthSchemeResolver;

impl AuthSchemeResolver for StaticAuthSchemeResolver {
    fn resolve_auth_scheme(&self, params: &AuthParams<'_>) -> Vec<AuthOption> {
        params
            .auth_schemes
            .iter()
            .cloned()
            .map(AuthOption::new)
            .collect()
    }
}

/// Configured auth schemes keyed by scheme id.
pub type AuthSchemeMap<Req> = HashMap<ShapeId, Arc<dyn AuthScheme<Req>>>;

/// First option whose scheme is configured, with its scheme.
pub fn select_auth_option<'a, Req>(
    options: &'a [AuthOption],
    schemes: &AuthSchemeMap<Req>,
) -> Option<(&'a AuthOption, Arc<dyn AuthScheme<Req>>)> {
    options.iter().find_map(|option| {
        schemes
            .get(&option.scheme_id)
            .map(|scheme| (option, Arc::clone(scheme)))
    })
}
