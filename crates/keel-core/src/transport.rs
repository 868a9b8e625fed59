//! Transport contract and the reqwest-backed HTTP transport.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;

use crate::error::{BoxError, TransportError};
use crate::http::{Body, Fields, HttpRequest, HttpResponse};
use crate::BoxFuture;

/// Sends one request and returns its response.
pub trait ClientTransport<Req, Resp>: Send + Sync + 'static {
    fn send<'a>(&'a self, request: Req) -> BoxFuture<'a, Result<Resp, TransportError>>;
}

/// Production HTTP transport using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Arc<reqwest::Client>,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("keel/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
            timeout: None,
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn map_send_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(format!("request timeout: {error}")).with_source(error)
    } else if error.is_connect() {
        TransportError::new(format!("connection failed: {error}")).with_source(error)
    } else {
        TransportError::new(format!("request failed: {error}")).with_source(error)
    }
}

impl ClientTransport<HttpRequest, HttpResponse> for ReqwestTransport {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|error| {
                TransportError::new(format!("invalid method '{}'", request.method))
                    .with_source(error)
            })?;
            let mut builder = self
                .client
                .request(method, request.destination.to_string());

            for field in request.fields.iter() {
                for value in field.values() {
                    builder = builder.header(field.name(), value);
                }
            }

            if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }

            builder = match &request.body {
                Body::Empty => builder,
                Body::Bytes(bytes) => builder.body(bytes.clone()),
                Body::Stream(_) => {
                    let stream = request.body.take_stream().map_err(|error| {
                        TransportError::new("request body was already consumed").with_source(error)
                    })?;
                    builder.body(reqwest::Body::wrap_stream(stream))
                }
            };

            let response = builder.send().await.map_err(map_send_error)?;

            let status = response.status();
            let mut fields = Fields::new();
            for (name, value) in response.headers() {
                match value.to_str() {
                    Ok(value) => fields.append(name.as_str(), value),
                    Err(_) => tracing::debug!(header = %name, "dropping non-text response header"),
                }
            }
            let body = Body::from_stream(
                response
                    .bytes_stream()
                    .map_err(|error| Box::new(error) as BoxError),
            );

            Ok(HttpResponse {
                status: status.as_u16(),
                fields,
                reason: status.canonical_reason().map(str::to_owned),
                body,
            })
        })
    }
}
