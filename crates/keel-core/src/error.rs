//! Error taxonomy shared by every layer of the runtime.
//!
//! Every failure surfaced to a caller is a [`ServiceError`]. Lower layers
//! produce narrower errors ([`SerializationError`], [`TransportError`],
//! [`RetryError`]) that convert into it with `?`.

use std::any::Any;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed foreign error preserved as the cause of a wrapped failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which side of the call is responsible for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    Client,
    Server,
}

impl Fault {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure while turning shapes into bytes or bytes into shapes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SerializationError {
    #[error("expected {expected} for '{shape}' but found {found}")]
    UnexpectedType {
        shape: String,
        expected: String,
        found: String,
    },
    #[error("value {value} for '{shape}' is out of range")]
    OutOfRange { shape: String, value: String },
    #[error("required member '{member}' of '{shape}' is missing")]
    MissingMember { shape: String, member: String },
    #[error("malformed input: {0}")]
    Malformed(String),
    #[error("invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
    #[error("{0}")]
    Custom(String),
}

impl SerializationError {
    pub fn unexpected(
        shape: impl Display,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::UnexpectedType {
            shape: shape.to_string(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn out_of_range(shape: impl Display, value: impl Display) -> Self {
        Self::OutOfRange {
            shape: shape.to_string(),
            value: value.to_string(),
        }
    }

    pub fn missing_member(shape: impl Display, member: impl Into<String>) -> Self {
        Self::MissingMember {
            shape: shape.to_string(),
            member: member.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// A serializer was asked to write a kind of shape it cannot represent.
    pub fn unsupported(shape: impl Display, kind: &str) -> Self {
        Self::Custom(format!("'{shape}' cannot be written as {kind} here"))
    }
}

/// No response was obtained from the transport.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    source: Option<BoxError>,
    timeout: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            timeout: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            timeout: true,
            ..Self::new(message)
        }
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn is_timeout(&self) -> bool {
        self.timeout
    }
}

/// Retry-relevant facts about a failed attempt.
pub trait ErrorRetryInfo {
    /// `Some(false)` forbids retrying, `None` means unknown and is treated as unsafe.
    fn is_retry_safe(&self) -> Option<bool>;

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn is_throttling(&self) -> bool {
        false
    }

    fn is_timeout(&self) -> bool {
        false
    }
}

/// Plain value implementation of [`ErrorRetryInfo`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryInfo {
    pub retry_safe: Option<bool>,
    pub throttling: bool,
    pub timeout: bool,
    pub retry_after: Option<Duration>,
}

impl RetryInfo {
    pub const fn unsafe_to_retry() -> Self {
        Self {
            retry_safe: Some(false),
            throttling: false,
            timeout: false,
            retry_after: None,
        }
    }

    pub const fn transient() -> Self {
        Self {
            retry_safe: Some(true),
            throttling: false,
            timeout: false,
            retry_after: None,
        }
    }

    pub const fn throttling(retry_after: Option<Duration>) -> Self {
        Self {
            retry_safe: Some(true),
            throttling: true,
            timeout: false,
            retry_after,
        }
    }
}

impl ErrorRetryInfo for RetryInfo {
    fn is_retry_safe(&self) -> Option<bool> {
        self.retry_safe
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    fn is_throttling(&self) -> bool {
        self.throttling
    }

    fn is_timeout(&self) -> bool {
        self.timeout
    }
}

/// A modeled error shape deserialized from a service response.
///
/// Implementations are generated error structures; callers recover the
/// concrete type through [`ServiceError::as_modeled`].
pub trait ApiError: std::error::Error + Send + Sync + 'static {
    /// Wire discriminator of the error, usually the shape name.
    fn code(&self) -> &str;

    fn message(&self) -> &str;

    fn fault(&self) -> Fault;

    /// Retry facts declared by the model's `retryable` trait.
    fn retry_info(&self) -> RetryInfo {
        RetryInfo::default()
    }

    fn as_any(&self) -> &dyn Any;
}

/// Failure response whose discriminator matched no registered error shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown API error '{code}' ({fault} fault): {message}")]
pub struct UnknownApiError {
    pub code: String,
    pub message: String,
    pub fault: Fault,
    pub status: Option<u16>,
    /// Error type exactly as the service sent it, before sanitizing.
    pub discriminator: Option<String>,
}

impl UnknownApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, fault: Fault) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            fault,
            status: None,
            discriminator: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_discriminator(mut self, discriminator: impl Into<String>) -> Self {
        self.discriminator = Some(discriminator.into());
        self
    }
}

/// The retry strategy refused to continue.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RetryError {
    message: String,
    #[source]
    cause: Option<Box<ServiceError>>,
}

impl RetryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Attaches the last attempt's error.
    pub fn with_cause(mut self, cause: ServiceError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&ServiceError> {
        self.cause.as_deref()
    }
}

/// The single error type returned by every client operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] SerializationError),
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Modeled(Box<dyn ApiError>),
    #[error(transparent)]
    UnknownApi(#[from] UnknownApiError),
    #[error("retries stopped: {0}")]
    Retry(#[from] RetryError),
    #[error("auth failed: {message}")]
    Auth {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("endpoint resolution failed: {message}")]
    Endpoint { message: String },
    #[error("event stream failed: {message}")]
    EventStream { message: String },
    #[error("{0}")]
    Wrapped(#[source] BoxError),
}

impl ServiceError {
    /// Normalizes any error into a `ServiceError`, keeping the original as the cause.
    pub fn wrap(error: impl Into<BoxError>) -> Self {
        let error: BoxError = error.into();
        match error.downcast::<ServiceError>() {
            Ok(service_error) => *service_error,
            Err(other) => Self::Wrapped(other),
        }
    }

    /// Takes back ownership of a shared error, wrapping it when still shared.
    pub fn from_shared(error: Arc<ServiceError>) -> Self {
        Arc::try_unwrap(error).unwrap_or_else(|shared| Self::Wrapped(Box::new(shared)))
    }

    pub fn modeled(error: impl ApiError) -> Self {
        Self::Modeled(Box::new(error))
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
            source: None,
        }
    }

    pub fn endpoint(message: impl Into<String>) -> Self {
        Self::Endpoint {
            message: message.into(),
        }
    }

    pub fn event_stream(message: impl Into<String>) -> Self {
        Self::EventStream {
            message: message.into(),
        }
    }

    /// Downcasts a modeled error to its generated type.
    pub fn as_modeled<T: ApiError>(&self) -> Option<&T> {
        match self {
            Self::Modeled(error) => error.as_any().downcast_ref::<T>(),
            Self::Retry(error) => error.cause().and_then(ServiceError::as_modeled::<T>),
            Self::Wrapped(inner) => inner
                .downcast_ref::<Arc<ServiceError>>()
                .and_then(|shared| shared.as_modeled::<T>()),
            _ => None,
        }
    }

    /// Declared fault of the error, when the error declares one.
    pub fn fault(&self) -> Option<Fault> {
        match self {
            Self::Serialization(_) | Self::Endpoint { .. } | Self::Auth { .. } => {
                Some(Fault::Client)
            }
            Self::Modeled(error) => Some(error.fault()),
            Self::UnknownApi(error) => Some(error.fault),
            Self::Retry(error) => error.cause().and_then(ServiceError::fault),
            Self::Transport(_) | Self::EventStream { .. } | Self::Wrapped(_) => None,
        }
    }

    /// Short machine-readable code, mainly for logging.
    pub fn code(&self) -> &str {
        match self {
            Self::Serialization(_) => "serialization",
            Self::Transport(_) => "transport",
            Self::Modeled(error) => error.code(),
            Self::UnknownApi(error) => &error.code,
            Self::Retry(_) => "retry",
            Self::Auth { .. } => "auth",
            Self::Endpoint { .. } => "endpoint",
            Self::EventStream { .. } => "event_stream",
            Self::Wrapped(_) => "wrapped",
        }
    }
}
