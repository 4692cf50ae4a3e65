//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker prevents cascading failures by failing fast when a
//! service is experiencing issues. It has three states:
//! - Closed: normal operation, calls pass through
//! - Open: service is unhealthy, calls are rejected immediately
//! - HalfOpen: testing whether the service has recovered
//!
//! State transitions:
//! ```text
//! Closed   → Open:     consecutive failures reach failure_threshold
//! Open     → HalfOpen: cooldown elapsed since the last failure
//! HalfOpen → Closed:   success_threshold consecutive successes
//! HalfOpen → Open:     any single failure (recovery progress discarded)
//! ```
//!
//! Failure here means the wrapped future resolved to `Err`. The breaker
//! never inspects the error value, so callers decide what counts as a
//! failure by what they raise.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, calls pass through normally
    Closed,
    /// Circuit is open, calls are rejected immediately
    Open,
    /// Circuit is half-open, testing service recovery
    HalfOpen,
}

impl CircuitState {
    /// Stable lowercase name, for logs and status output
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`]
#[derive(Debug, Clone, Error)]
pub enum CircuitError<E> {
    /// The breaker rejected the call without invoking the wrapped pipeline
    #[error("circuit open, retry after {retry_after:?}")]
    Open {
        /// Time remaining until the breaker will allow a probe call
        retry_after: Duration,
    },
    /// The wrapped pipeline ran and failed
    #[error(transparent)]
    Inner(E),
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Consecutive successes in half-open required to close the circuit
    pub success_threshold: u32,
    /// How long the circuit stays open before allowing a probe call
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Observable snapshot of breaker state and counters
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures observed in the closed state
    pub consecutive_failures: u32,
    /// Consecutive successes observed in the half-open state
    pub half_open_successes: u32,
    /// Time since the most recent recorded failure, if any
    pub last_failure_age: Option<Duration>,
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            last_failure: None,
        }
    }
}

/// Circuit breaker guarding one logical operation family.
///
/// All state lives behind a single mutex: concurrent success/failure
/// reports serialize, so two concurrent failures are both counted and a
/// threshold-crossing transition happens exactly once.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<BreakerState>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(BreakerState::new())),
        }
    }

    /// Create a new circuit breaker with default configuration
    pub fn new_default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Get an observable snapshot of the current state and counters
    pub async fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state.lock().await;
        BreakerSnapshot {
            state: state.state,
            consecutive_failures: state.consecutive_failures,
            half_open_successes: state.half_open_successes,
            last_failure_age: state.last_failure.map(|t| t.elapsed()),
        }
    }

    /// Reset the circuit breaker to the closed state, clearing all counters
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        *state = BreakerState::new();
    }

    /// Execute an operation behind the breaker gate.
    ///
    /// If the circuit is open and the cooldown has not elapsed, the wrapped
    /// future is never created and the call fails with
    /// [`CircuitError::Open`]. Otherwise the operation runs and its outcome
    /// is recorded: `Ok` counts as a success, `Err` as a failure.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.check_gate().await?;

        match op().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(e) => {
                self.on_failure().await;
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Check the gate, transitioning Open → HalfOpen when the cooldown has
    /// elapsed since the last failure.
    async fn check_gate<E>(&self) -> Result<(), CircuitError<E>> {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = state
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed > self.config.cooldown {
                    tracing::info!("circuit breaker half-open, probing service");
                    state.state = CircuitState::HalfOpen;
                    state.half_open_successes = 0;
                    Ok(())
                } else {
                    Err(CircuitError::Open {
                        retry_after: self.config.cooldown.saturating_sub(elapsed),
                    })
                }
            }
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                state.half_open_successes += 1;
                if state.half_open_successes >= self.config.success_threshold {
                    tracing::info!(
                        successes = state.half_open_successes,
                        "circuit breaker closed, service recovered"
                    );
                    *state = BreakerState::new();
                }
            }
            // A success landing after a half-open failure reopened the
            // circuit does not undo that transition.
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                state.last_failure = Some(Instant::now());
                if state.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        failures = state.consecutive_failures,
                        cooldown_secs = self.config.cooldown.as_secs(),
                        "circuit breaker opened"
                    );
                    state.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!("circuit breaker reopened, half-open probe failed");
                state.state = CircuitState::Open;
                state.half_open_successes = 0;
                state.last_failure = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }
}
