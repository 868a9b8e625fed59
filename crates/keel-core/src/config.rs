//! Client configuration and per-call plugins.

use std::env;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use thiserror::Error;

use crate::auth::{AuthScheme, AuthSchemeMap, AuthSchemeResolver, StaticAuthSchemeResolver};
use crate::endpoint::{EndpointResolver, StaticEndpointResolver};
use crate::http::{Uri, UriError};
use crate::interceptor::{Interceptor, InterceptorChain};
use crate::retry::{RetryMode, RetryStrategy, SimpleRetryStrategy};

pub const ENDPOINT_URL_VAR: &str = "KEEL_ENDPOINT_URL";
pub const MAX_ATTEMPTS_VAR: &str = "KEEL_MAX_ATTEMPTS";
pub const RETRY_MODE_VAR: &str = "KEEL_RETRY_MODE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{variable} is not a valid endpoint: {source}")]
    InvalidEndpoint {
        variable: &'static str,
        #[source]
        source: UriError,
    },
    #[error("{variable} must be a positive integer, got '{value}'")]
    InvalidMaxAttempts { variable: &'static str, value: String },
    #[error("{variable}: {message}")]
    InvalidRetryMode {
        variable: &'static str,
        message: String,
    },
}

/// Everything a client needs besides its protocol and transport.
///
/// Cloned for every call before plugins run, so per-call changes never leak
/// into sibling calls.
pub struct ClientConfig<Req, Resp> {
    pub interceptors: InterceptorChain<Req, Resp>,
    pub retry_strategy: Arc<dyn RetryStrategy>,
    pub auth_scheme_resolver: Arc<dyn AuthSchemeResolver>,
    pub auth_schemes: AuthSchemeMap<Req>,
    pub endpoint_resolver: Arc<dyn EndpointResolver>,
    /// Static endpoint used by [`StaticEndpointResolver`].
    pub endpoint_uri: Option<Uri>,
}

/// Per-call configuration override.
pub type Plugin<Req, Resp> = Arc<dyn Fn(&mut ClientConfig<Req, Resp>) + Send + Sync>;

impl<Req, Resp> Default for ClientConfig<Req, Resp> {
    fn default() -> Self {
        Self {
            interceptors: InterceptorChain::new(),
            retry_strategy: Arc::new(SimpleRetryStrategy::default()),
            auth_scheme_resolver: Arc::new(StaticAuthSchemeResolver),
            auth_schemes: AuthSchemeMap::new(),
            endpoint_resolver: Arc::new(StaticEndpointResolver),
            endpoint_uri: None,
        }
    }
}

impl<Req, Resp> Clone for ClientConfig<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            interceptors: self.interceptors.clone(),
            retry_strategy: Arc::clone(&self.retry_strategy),
            auth_scheme_resolver: Arc::clone(&self.auth_scheme_resolver),
            auth_schemes: self.auth_schemes.clone(),
            endpoint_resolver: Arc::clone(&self.endpoint_resolver),
            endpoint_uri: self.endpoint_uri.clone(),
        }
    }
}

impl<Req, Resp> Debug for ClientConfig<Req, Resp> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<String> = self.auth_schemes.keys().map(ToString::to_string).collect();
        schemes.sort();
        f.debug_struct("ClientConfig")
            .field("interceptors", &self.interceptors)
            .field("retry_strategy", &self.retry_strategy)
            .field("auth_schemes", &schemes)
            .field("endpoint_uri", &self.endpoint_uri.as_ref().map(ToString::to_string))
            .finish_non_exhaustive()
    }
}

impl<Req, Resp> ClientConfig<Req, Resp> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `KEEL_ENDPOINT_URL`, `KEEL_MAX_ATTEMPTS` and
    /// `KEEL_RETRY_MODE` (`simple` or `standard`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(value) = env::var(ENDPOINT_URL_VAR) {
            let uri = Uri::parse(&value).map_err(|source| ConfigError::InvalidEndpoint {
                variable: ENDPOINT_URL_VAR,
                source,
            })?;
            config.endpoint_uri = Some(uri);
        }

        let max_attempts = match env::var(MAX_ATTEMPTS_VAR) {
            Ok(value) => match value.trim().parse::<u32>() {
                Ok(attempts) if attempts > 0 => Some(attempts),
                _ => {
                    return Err(ConfigError::InvalidMaxAttempts {
                        variable: MAX_ATTEMPTS_VAR,
                        value,
                    })
                }
            },
            Err(_) => None,
        };

        let mode = match env::var(RETRY_MODE_VAR) {
            Ok(value) => value
                .parse::<RetryMode>()
                .map_err(|message| ConfigError::InvalidRetryMode {
                    variable: RETRY_MODE_VAR,
                    message,
                })?,
            Err(_) => RetryMode::default(),
        };
        config.retry_strategy = mode.strategy(max_attempts);

        Ok(config)
    }

    pub fn with_interceptor(mut self, interceptor: impl Interceptor<Req, Resp> + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn with_retry_strategy(mut self, strategy: impl RetryStrategy + 'static) -> Self {
        self.retry_strategy = Arc::new(strategy);
        self
    }

    pub fn with_auth_scheme_resolver(
        mut self,
        resolver: impl AuthSchemeResolver + 'static,
    ) -> Self {
        self.auth_scheme_resolver = Arc::new(resolver);
        self
    }

    /// Registers `scheme` under its own scheme id, replacing any previous one.
    pub fn with_auth_scheme(mut self, scheme: impl AuthScheme<Req> + 'static) -> Self {
        self.auth_schemes
            .insert(scheme.scheme_id().clone(), Arc::new(scheme));
        self
    }

    pub fn with_endpoint_resolver(mut self, resolver: impl EndpointResolver + 'static) -> Self {
        self.endpoint_resolver = Arc::new(resolver);
        self
    }

    pub fn with_endpoint_uri(mut self, uri: Uri) -> Self {
        self.endpoint_uri = Some(uri);
        self
    }

    /// Clone of this configuration with `plugins` applied in order.
    pub fn with_plugins(&self, plugins: &[Plugin<Req, Resp>]) -> Self {
        let mut config = self.clone();
        for plugin in plugins {
            plugin(&mut config);
        }
        config
    }
}
