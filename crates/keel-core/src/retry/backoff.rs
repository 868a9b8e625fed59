//! Stateless backoff computation with jitter.

use std::fmt::Debug;
use std::time::Duration;

/// Computes the delay before a retry from the retry count alone.
pub trait RetryBackoffStrategy: Debug + Send + Sync {
    fn compute_next_backoff_delay(&self, retry_attempt: u32) -> Duration;
}

/// Randomization applied to an exponential delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// Use the computed delay as is.
    None,
    /// Uniform in `[0, delay]`.
    #[default]
    Full,
    /// `delay / 2` plus uniform in `[0, delay / 2]`.
    Equal,
}

/// Backoff strategy for retrying failed attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ attempt)`, capped at `max`,
    /// then jittered.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        jitter: Jitter,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(25),
            factor: 2.0,
            max: Duration::from_secs(20),
            jitter: Jitter::Full,
        }
    }
}

impl Backoff {
    /// Exponential backoff without jitter, mostly useful in tests.
    pub const fn deterministic(base: Duration, max: Duration) -> Self {
        Self::Exponential {
            base,
            factor: 2.0,
            max,
            jitter: Jitter::None,
        }
    }

    /// Calculate the delay for a given retry attempt (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                // zero base times an overflowed factor is NaN
                let capped = if seconds.is_nan() {
                    0.0
                } else {
                    seconds.min(max.as_secs_f64())
                };
                let delay_ms = (capped * 1000.0).round() as u64;

                let jittered_ms = match jitter {
                    Jitter::None => delay_ms,
                    Jitter::Full => fastrand::u64(0..=delay_ms),
                    Jitter::Equal => {
                        let half = delay_ms / 2;
                        half + fastrand::u64(0..=(delay_ms - half))
                    }
                };
                Duration::from_millis(jittered_ms)
            }
        }
    }
}

impl RetryBackoffStrategy for Backoff {
    fn compute_next_backoff_delay(&self, retry_attempt: u32) -> Duration {
        self.delay(retry_attempt)
    }
}
