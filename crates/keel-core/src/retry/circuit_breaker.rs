use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Observable state of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// When a breaker trips and how long it stays tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Invocations in a row whose retries were refused before the circuit opens.
    pub failure_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
enum Phase {
    Closed { exhausted: u32 },
    Open { reopens_at: Instant },
    Probing,
}

/// Shared gate in front of a retry strategy's initial tokens.
///
/// An invocation counts as exhausted when the strategy runs out of attempts
/// or quota for it. Enough of those in a row open the circuit, and new
/// invocations are turned away until `open_timeout` passes. The first
/// invocation after that is a trial: success closes the circuit, exhaustion
/// opens it again.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    phase: Mutex<Phase>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            phase: Mutex::new(Phase::Closed { exhausted: 0 }),
        }
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase
            .lock()
            .expect("circuit breaker lock is not poisoned")
    }

    /// Whether a new invocation may start. Moves an expired open circuit to probing.
    pub fn permits_execution(&self) -> bool {
        let mut phase = self.phase();
        match *phase {
            Phase::Closed { .. } | Phase::Probing => true,
            Phase::Open { reopens_at } if Instant::now() >= reopens_at => {
                *phase = Phase::Probing;
                true
            }
            Phase::Open { .. } => false,
        }
    }

    pub fn on_execution_succeeded(&self) {
        *self.phase() = Phase::Closed { exhausted: 0 };
    }

    pub fn on_execution_exhausted(&self) {
        let mut phase = self.phase();
        let trip = match *phase {
            Phase::Closed { exhausted } => {
                let exhausted = exhausted.saturating_add(1);
                *phase = Phase::Closed { exhausted };
                exhausted >= self.config.failure_threshold
            }
            Phase::Probing => true,
            Phase::Open { .. } => false,
        };
        if trip {
            tracing::warn!(
                open_for = ?self.config.open_timeout,
                "retry circuit opened"
            );
            *phase = Phase::Open {
                reopens_at: Instant::now() + self.config.open_timeout,
            };
        }
    }

    pub fn state(&self) -> CircuitState {
        match *self.phase() {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::Probing => CircuitState::HalfOpen,
        }
    }
}
