use std::any::Any;
use std::env;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::error::ServiceError;
use crate::properties::Properties;
use crate::BoxFuture;

/// Credentials presented by a signer.
pub trait Identity: Debug + Send + Sync + 'static {
    fn expiration(&self) -> Option<OffsetDateTime> {
        None
    }

    fn is_expired(&self) -> bool {
        self.expiration()
            .is_some_and(|expiration| expiration <= OffsetDateTime::now_utc())
    }

    fn as_any(&self) -> &dyn Any;
}

/// Identity of unsigned requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousIdentity;

impl Identity for AnonymousIdentity {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// API key credential.
#[derive(Clone)]
pub struct ApiKeyIdentity {
    api_key: String,
    expiration: Option<OffsetDateTime>,
}

impl ApiKeyIdentity {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            expiration: None,
        }
    }

    pub fn with_expiration(mut self, expiration: OffsetDateTime) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl Debug for ApiKeyIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyIdentity")
            .field("api_key", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl Identity for ApiKeyIdentity {
    fn expiration(&self) -> Option<OffsetDateTime> {
        self.expiration
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Bearer token credential.
#[derive(Clone)]
pub struct TokenIdentity {
    token: String,
    expiration: Option<OffsetDateTime>,
}

impl TokenIdentity {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expiration: None,
        }
    }

    pub fn with_expiration(mut self, expiration: OffsetDateTime) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Debug for TokenIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIdentity")
            .field("token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl Identity for TokenIdentity {
    fn expiration(&self) -> Option<OffsetDateTime> {
        self.expiration
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Produces identities for one auth scheme.
pub trait IdentityResolver: Send + Sync {
    fn get_identity<'a>(
        &'a self,
        properties: &'a Properties,
    ) -> BoxFuture<'a, Result<Arc<dyn Identity>, ServiceError>>;
}

/// Always returns the same identity.
#[derive(Debug, Clone)]
pub struct StaticIdentityResolver {
    identity: Arc<dyn Identity>,
}

impl StaticIdentityResolver {
    pub fn new(identity: impl Identity) -> Self {
        Self {
            identity: Arc::new(identity),
        }
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn get_identity<'a>(
        &'a self,
        _properties: &'a Properties,
    ) -> BoxFuture<'a, Result<Arc<dyn Identity>, ServiceError>> {
        Box::pin(async move { Ok(Arc::clone(&self.identity)) })
    }
}

/// Reads an API key from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvironmentApiKeyResolver {
    variable: String,
}

impl EnvironmentApiKeyResolver {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

impl IdentityResolver for EnvironmentApiKeyResolver {
    fn get_identity<'a>(
        &'a self,
        _properties: &'a Properties,
    ) -> BoxFuture<'a, Result<Arc<dyn Identity>, ServiceError>> {
        Box::pin(async move {
            let api_key = env::var(&self.variable).map_err(|error| ServiceError::Auth {
                message: format!("api key variable {} is not set", self.variable),
                source: Some(Box::new(error)),
            })?;
            Ok(Arc::new(ApiKeyIdentity::new(api_key)) as Arc<dyn Identity>)
        })
    }
}

/// Caches the inner resolver's identity until it expires.
pub struct CachingIdentityResolver {
    inner: Arc<dyn IdentityResolver>,
    cached: Mutex<Option<Arc<dyn Identity>>>,
}

impl CachingIdentityResolver {
    pub fn new(inner: Arc<dyn IdentityResolver>) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }
}

impl IdentityResolver for CachingIdentityResolver {
    fn get_identity<'a>(
        &'a self,
        properties: &'a Properties,
    ) -> BoxFuture<'a, Result<Arc<dyn Identity>, ServiceError>> {
        Box::pin(async move {
            let mut cached = self.cached.lock().await;
            if let Some(identity) = cached.as_ref().filter(|identity| !identity.is_expired()) {
                return Ok(Arc::clone(identity));
            }
            tracing::debug!("refreshing cached identity");
            let identity = self.inner.get_identity(properties).await?;
            *cached = Some(Arc::clone(&identity));
            Ok(identity)
        })
    }
}
