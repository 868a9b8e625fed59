use std::sync::{Arc, LazyLock};

use super::{
    AnonymousIdentity, ApiKeyIdentity, AuthScheme, Identity, IdentityResolver, Signer,
    StaticIdentityResolver, TokenIdentity,
};
use crate::error::ServiceError;
use crate::http::HttpRequest;
use crate::properties::Properties;
use crate::shape_id::ShapeId;
use crate::BoxFuture;

static API_KEY_AUTH: LazyLock<ShapeId> = LazyLock::new(|| ShapeId::prelude("httpApiKeyAuth"));
static BEARER_AUTH: LazyLock<ShapeId> = LazyLock::new(|| ShapeId::prelude("httpBearerAuth"));
static NO_AUTH: LazyLock<ShapeId> = LazyLock::new(|| ShapeId::prelude("noAuth"));

fn downcast_identity<'i, T: 'static>(
    identity: &'i Arc<dyn Identity>,
    expected: &str,
) -> Result<&'i T, ServiceError> {
    identity
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ServiceError::auth(format!("signer expected {expected}, got {identity:?}")))
}

/// Where an API key is placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeyLocation {
    Header,
    Query,
}

/// `smithy.api#httpApiKeyAuth`.
pub struct ApiKeyAuthScheme {
    resolver: Arc<dyn IdentityResolver>,
    signer: Arc<ApiKeySigner>,
}

impl ApiKeyAuthScheme {
    /// Key in header `name`, optionally prefixed by `scheme` (e.g. `Bearer`).
    pub fn header(
        resolver: Arc<dyn IdentityResolver>,
        name: impl Into<String>,
        scheme: Option<String>,
    ) -> Self {
        Self {
            resolver,
            signer: Arc::new(ApiKeySigner {
                name: name.into(),
                location: ApiKeyLocation::Header,
                scheme,
            }),
        }
    }

    /// Key in query parameter `name`.
    pub fn query(resolver: Arc<dyn IdentityResolver>, name: impl Into<String>) -> Self {
        Self {
            resolver,
            signer: Arc::new(ApiKeySigner {
                name: name.into(),
                location: ApiKeyLocation::Query,
                scheme: None,
            }),
        }
    }

    pub fn from_key(api_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self::header(
            Arc::new(StaticIdentityResolver::new(ApiKeyIdentity::new(api_key))),
            name,
            None,
        )
    }
}

impl AuthScheme<HttpRequest> for ApiKeyAuthScheme {
    fn scheme_id(&self) -> &ShapeId {
        &API_KEY_AUTH
    }

    fn identity_resolver(&self) -> Arc<dyn IdentityResolver> {
        Arc::clone(&self.resolver)
    }

    fn signer(&self) -> Arc<dyn Signer<HttpRequest>> {
        self.signer.clone()
    }
}

struct ApiKeySigner {
    name: String,
    location: ApiKeyLocation,
    scheme: Option<String>,
}

impl Signer<HttpRequest> for ApiKeySigner {
    fn sign<'a>(
        &'a self,
        mut request: HttpRequest,
        identity: Arc<dyn Identity>,
        _properties: &'a Properties,
    ) -> BoxFuture<'a, Result<HttpRequest, ServiceError>> {
        Box::pin(async move {
            let key = downcast_identity::<ApiKeyIdentity>(&identity, "an api key")?.api_key();
            match self.location {
                ApiKeyLocation::Header => {
                    let value = match &self.scheme {
                        Some(scheme) => format!("{scheme} {key}"),
                        None => key.to_owned(),
                    };
                    request.fields.set(self.name.clone(), value);
                }
                ApiKeyLocation::Query => {
                    request.destination.append_query(&format!(
                        "{}={}",
                        urlencoding::encode(&self.name),
                        urlencoding::encode(key)
                    ));
                }
            }
            Ok(request)
        })
    }
}

/// `smithy.api#httpBearerAuth`.
pub struct BearerAuthScheme {
    resolver: Arc<dyn IdentityResolver>,
}

impl BearerAuthScheme {
    pub fn new(resolver: Arc<dyn IdentityResolver>) -> Self {
        Self { resolver }
    }

    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(Arc::new(StaticIdentityResolver::new(TokenIdentity::new(
            token,
        ))))
    }
}

impl AuthScheme<HttpRequest> for BearerAuthScheme {
    fn scheme_id(&self) -> &ShapeId {
        &BEARER_AUTH
    }

    fn identity_resolver(&self) -> Arc<dyn IdentityResolver> {
        Arc::clone(&self.resolver)
    }

    fn signer(&self) -> Arc<dyn Signer<HttpRequest>> {
        Arc::new(BearerSigner)
    }
}

struct BearerSigner;

impl Signer<HttpRequest> for BearerSigner {
    fn sign<'a>(
        &'a self,
        mut request: HttpRequest,
        identity: Arc<dyn Identity>,
        _properties: &'a Properties,
    ) -> BoxFuture<'a, Result<HttpRequest, ServiceError>> {
        Box::pin(async move {
            let token = downcast_identity::<TokenIdentity>(&identity, "a bearer token")?.token();
            request
                .fields
                .set("authorization", format!("Bearer {token}"));
            Ok(request)
        })
    }
}

/// `smithy.api#noAuth`: anonymous identity, requests left untouched.
#[derive(Clone)]
pub struct NoAuthScheme {
    resolver: Arc<dyn IdentityResolver>,
}

impl NoAuthScheme {
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(StaticIdentityResolver::new(AnonymousIdentity)),
        }
    }
}

impl Default for NoAuthScheme {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req: Send + 'static> AuthScheme<Req> for NoAuthScheme {
    fn scheme_id(&self) -> &ShapeId {
        &NO_AUTH
    }

    fn identity_resolver(&self) -> Arc<dyn IdentityResolver> {
        Arc::clone(&self.resolver)
    }

    fn signer(&self) -> Arc<dyn Signer<Req>> {
        Arc::new(NoopSigner)
    }
}

struct NoopSigner;

impl<Req: Send + 'static> Signer<Req> for NoopSigner {
    fn sign<'a>(
        &'a self,
        request: Req,
        _identity: Arc<dyn Identity>,
        _properties: &'a Properties,
    ) -> BoxFuture<'a, Result<Req, ServiceError>> {
        Box::pin(async move { Ok(request) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Uri;

    fn request() -> HttpRequest {
        HttpRequest::new("GET", Uri::parse("https://api.example.test/items").expect("uri"))
    }

    async fn sign_with(scheme: &dyn AuthScheme<HttpRequest>) -> HttpRequest {
        let properties = Properties::new();
        let identity = scheme
            .identity_resolver()
            .get_identity(&properties)
            .await
            .expect("identity");
        scheme
            .signer()
            .sign(request(), identity, &properties)
            .await
            .expect("signed")
    }

    #[tokio::test]
    async fn bearer_auth_populates_authorization_header() {
        let signed = sign_with(&BearerAuthScheme::from_token("token-123")).await;
        assert_eq!(
            signed.fields.first("Authorization"),
            Some("Bearer token-123")
        );
    }

    #[tokio::test]
    async fn api_key_header_preserves_name_and_scheme() {
        let scheme = ApiKeyAuthScheme::header(
            Arc::new(StaticIdentityResolver::new(ApiKeyIdentity::new("demo"))),
            "X-Api-Key",
            Some(String::from("ApiKey")),
        );
        let signed = sign_with(&scheme).await;
        assert_eq!(signed.fields.first("x-api-key"), Some("ApiKey demo"));
    }

    #[tokio::test]
    async fn api_key_query_is_percent_encoded() {
        let scheme = ApiKeyAuthScheme::query(
            Arc::new(StaticIdentityResolver::new(ApiKeyIdentity::new("a b"))),
            "key",
        );
        let signed = sign_with(&scheme).await;
        assert_eq!(signed.destination.query.as_deref(), Some("key=a%20b"));
    }

    #[tokio::test]
    async fn signer_rejects_the_wrong_identity_kind() {
        let signer = BearerAuthScheme::from_token("unused").signer();
        let error = signer
            .sign(request(), Arc::new(AnonymousIdentity), &Properties::new())
            .await
            .expect_err("anonymous cannot sign bearer requests");
        assert!(matches!(error, ServiceError::Auth { .. }));
    }
}
