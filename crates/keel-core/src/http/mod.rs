//! HTTP specialization of the transport request and response.

mod body;
mod fields;
mod uri;

use std::time::Duration;

use time::OffsetDateTime;

pub use body::{Body, BodyError, ByteStream, StreamBody};
pub use fields::{Field, FieldPosition, Fields};
pub use uri::{Uri, UriError};

use crate::protocol::{TransportRequest, TransportResponse};

/// HTTP request envelope produced by a protocol and sent by a transport.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub destination: Uri,
    pub method: String,
    pub fields: Fields,
    pub body: Body,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, destination: Uri) -> Self {
        Self {
            destination,
            method: method.into(),
            fields: Fields::new(),
            body: Body::Empty,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }
}

impl TransportRequest for HttpRequest {
    fn rewind_body(&self) -> Result<(), BodyError> {
        self.body.rewind()
    }

    fn set_body(&mut self, body: Body) {
        self.body = body;
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub fields: Fields,
    pub reason: Option<String>,
    pub body: Body,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            fields: Fields::new(),
            reason: None,
            body: Body::Empty,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

impl TransportResponse for HttpResponse {
    fn status_code(&self) -> Option<u16> {
        Some(self.status)
    }

    fn retry_after(&self) -> Option<Duration> {
        let value = self.fields.first("retry-after")?.trim();
        if let Ok(seconds) = value.parse::<u64>() {
            return Some(Duration::from_secs(seconds));
        }
        let at = crate::time_format::parse_timestamp(value, crate::TimestampFormat::HttpDate).ok()?;
        let wait = at - OffsetDateTime::now_utc();
        Some(Duration::try_from(wait).unwrap_or(Duration::ZERO))
    }

    fn body(&self) -> Body {
        self.body.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_accepts_delay_seconds() {
        let response = HttpResponse::new(429).with_header("Retry-After", "7");
        assert_eq!(response.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn retry_after_in_the_past_is_zero() {
        let response =
            HttpResponse::new(503).with_header("retry-after", "Tue, 29 Apr 2014 18:30:38 GMT");
        assert_eq!(response.retry_after(), Some(Duration::ZERO));
    }

    #[test]
    fn success_is_2xx_only() {
        assert!(HttpResponse::new(204).is_success());
        assert!(!HttpResponse::new(301).is_success());
    }
}
