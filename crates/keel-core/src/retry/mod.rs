//! Token-based retry strategies.
//!
//! | Item | Role |
//! |------|------|
//! | [`RetryStrategy`] | Hands out and refreshes [`RetryToken`]s |
//! | [`SimpleRetryStrategy`] | Max attempts plus backoff |
//! | [`StandardRetryStrategy`] | Adds a shared retry quota and a circuit breaker |
//! | [`Backoff`] | Stateless delay computation |
//! | [`classify_http_error`] | Turns a failed attempt into [`RetryInfo`](crate::RetryInfo) |

mod backoff;
mod circuit_breaker;
mod classification;
mod standard;

use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub use backoff::{Backoff, Jitter, RetryBackoffStrategy};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use classification::classify_http_error;
pub use standard::{RetryQuota, StandardRetryStrategy};

use crate::error::{ErrorRetryInfo, RetryError};

/// Per-execution retry state; replaced on every refresh, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryToken {
    retry_count: u32,
    retry_delay: Duration,
    quota_consumed: u32,
    scope: Option<String>,
}

impl RetryToken {
    pub fn new(scope: Option<&str>) -> Self {
        Self {
            retry_count: 0,
            retry_delay: Duration::ZERO,
            quota_consumed: 0,
            scope: scope.map(str::to_owned),
        }
    }

    /// Attempts made so far minus one.
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Wait before the next attempt.
    pub const fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub const fn quota_consumed(&self) -> u32 {
        self.quota_consumed
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub(crate) fn next(&self, retry_delay: Duration, quota_consumed: u32) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            retry_delay,
            quota_consumed,
            scope: self.scope.clone(),
        }
    }
}

/// Decides whether and when a failed attempt is retried.
pub trait RetryStrategy: Debug + Send + Sync {
    /// Upper bound on attempts per execution, first attempt included.
    fn max_attempts(&self) -> u32;

    /// # Errors
    ///
    /// Fails only when the strategy has no capacity at all, e.g. an open circuit.
    fn acquire_initial_retry_token(&self, token_scope: Option<&str>)
        -> Result<RetryToken, RetryError>;

    /// Returns the token for the next attempt.
    ///
    /// # Errors
    ///
    /// Fails when the error is not known to be safe to retry or the strategy
    /// will not make another attempt.
    fn refresh_retry_token_for_retry(
        &self,
        token: &RetryToken,
        error_info: &dyn ErrorRetryInfo,
    ) -> Result<RetryToken, RetryError>;

    /// Terminal: the execution succeeded with this token.
    fn record_success(&self, token: &RetryToken);
}

pub(crate) fn ensure_retry_safe(error_info: &dyn ErrorRetryInfo) -> Result<(), RetryError> {
    match error_info.is_retry_safe() {
        Some(true) => Ok(()),
        Some(false) => Err(RetryError::new("error is not safe to retry")),
        None => Err(RetryError::new("error is not known to be safe to retry")),
    }
}

pub(crate) fn next_delay(
    backoff: &dyn RetryBackoffStrategy,
    token: &RetryToken,
    error_info: &dyn ErrorRetryInfo,
) -> Duration {
    let computed = backoff.compute_next_backoff_delay(token.retry_count);
    match error_info.retry_after() {
        Some(minimum) => computed.max(minimum),
        None => computed,
    }
}

/// Retries retry-safe errors with backoff until `max_attempts` is reached.
#[derive(Debug, Clone)]
pub struct SimpleRetryStrategy {
    backoff: Arc<dyn RetryBackoffStrategy>,
    max_attempts: u32,
}

impl Default for SimpleRetryStrategy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl SimpleRetryStrategy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            backoff: Arc::new(Backoff::default()),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn with_backoff(mut self, backoff: impl RetryBackoffStrategy + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }
}

impl RetryStrategy for SimpleRetryStrategy {
    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn acquire_initial_retry_token(
        &self,
        token_scope: Option<&str>,
    ) -> Result<RetryToken, RetryError> {
        Ok(RetryToken::new(token_scope))
    }

    fn refresh_retry_token_for_retry(
        &self,
        token: &RetryToken,
        error_info: &dyn ErrorRetryInfo,
    ) -> Result<RetryToken, RetryError> {
        ensure_retry_safe(error_info)?;
        if token.retry_count + 1 >= self.max_attempts {
            return Err(RetryError::new(format!(
                "reached maximum number of attempts ({})",
                self.max_attempts
            )));
        }
        Ok(token.next(next_delay(self.backoff.as_ref(), token, error_info), 0))
    }

    fn record_success(&self, _token: &RetryToken) {}
}

/// Named retry strategy selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryMode {
    #[default]
    Simple,
    Standard,
}

impl RetryMode {
    pub fn strategy(self, max_attempts: Option<u32>) -> Arc<dyn RetryStrategy> {
        match self {
            Self::Simple => Arc::new(SimpleRetryStrategy::new(max_attempts.unwrap_or(5))),
            Self::Standard => Arc::new(StandardRetryStrategy::new(max_attempts.unwrap_or(3))),
        }
    }
}

impl FromStr for RetryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "standard" => Ok(Self::Standard),
            other => Err(format!("unknown retry mode '{other}'")),
        }
    }
}
