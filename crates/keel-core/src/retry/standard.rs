use std::sync::{Arc, Mutex};

use super::{
    ensure_retry_safe, next_delay, Backoff, CircuitBreaker, RetryBackoffStrategy, RetryStrategy,
    RetryToken,
};
use crate::error::{ErrorRetryInfo, RetryError};

const DEFAULT_CAPACITY: u32 = 500;
const RETRY_COST: u32 = 5;
const TIMEOUT_RETRY_COST: u32 = 10;
const NO_RETRY_INCREMENT: u32 = 1;

/// Capacity shared by every execution of one client.
///
/// Each retry draws from it; successful executions pay back what they drew,
/// or a small increment when they drew nothing.
#[derive(Debug)]
pub struct RetryQuota {
    capacity: u32,
    available: Mutex<u32>,
}

impl Default for RetryQuota {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RetryQuota {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            available: Mutex::new(capacity),
        }
    }

    pub fn available(&self) -> u32 {
        *self.available.lock().expect("retry quota lock is not poisoned")
    }

    fn try_acquire(&self, cost: u32) -> bool {
        let mut available = self.available.lock().expect("retry quota lock is not poisoned");
        if *available < cost {
            return false;
        }
        *available -= cost;
        true
    }

    fn release(&self, amount: u32) {
        let mut available = self.available.lock().expect("retry quota lock is not poisoned");
        *available = available.saturating_add(amount).min(self.capacity);
    }
}

/// Retry strategy with a shared quota and an optional circuit breaker.
#[derive(Debug, Clone)]
pub struct StandardRetryStrategy {
    backoff: Arc<dyn RetryBackoffStrategy>,
    max_attempts: u32,
    quota: Arc<RetryQuota>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl Default for StandardRetryStrategy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl StandardRetryStrategy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            backoff: Arc::new(Backoff::default()),
            max_attempts: max_attempts.max(1),
            quota: Arc::new(RetryQuota::default()),
            circuit_breaker: None,
        }
    }

    pub fn with_backoff(mut self, backoff: impl RetryBackoffStrategy + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    pub fn with_quota(mut self, quota: Arc<RetryQuota>) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    pub fn quota(&self) -> &RetryQuota {
        &self.quota
    }

    fn record_exhausted(&self) {
        if let Some(breaker) = &self.circuit_breaker {
            breaker.on_execution_exhausted();
        }
    }
}

impl RetryStrategy for StandardRetryStrategy {
    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn acquire_initial_retry_token(
        &self,
        token_scope: Option<&str>,
    ) -> Result<RetryToken, RetryError> {
        if let Some(breaker) = &self.circuit_breaker {
            if !breaker.permits_execution() {
                return Err(RetryError::new("circuit breaker is open"));
            }
        }
        Ok(RetryToken::new(token_scope))
    }

    fn refresh_retry_token_for_retry(
        &self,
        token: &RetryToken,
        error_info: &dyn ErrorRetryInfo,
    ) -> Result<RetryToken, RetryError> {
        let refused = |error: RetryError| {
            self.record_exhausted();
            error
        };

        // Errors that are not worth retrying say nothing about service health.
        ensure_retry_safe(error_info)?;
        if token.retry_count() + 1 >= self.max_attempts {
            return Err(refused(RetryError::new(format!(
                "reached maximum number of attempts ({})",
                self.max_attempts
            ))));
        }

        let cost = if error_info.is_timeout() {
            TIMEOUT_RETRY_COST
        } else {
            RETRY_COST
        };
        if !self.quota.try_acquire(cost) {
            return Err(refused(RetryError::new("retry quota exhausted")));
        }

        let delay = next_delay(self.backoff.as_ref(), token, error_info);
        Ok(token.next(delay, token.quota_consumed() + cost))
    }

    fn record_success(&self, token: &RetryToken) {
        let refund = if token.quota_consumed() == 0 {
            NO_RETRY_INCREMENT
        } else {
            token.quota_consumed()
        };
        self.quota.release(refund);
        if let Some(breaker) = &self.circuit_breaker {
            breaker.on_execution_succeeded();
        }
    }
}
