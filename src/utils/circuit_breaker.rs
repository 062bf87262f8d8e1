use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards calls to the broker so a dead broker fails fast instead of every
// publisher cycle waiting out the full delivery timeout.
//
// Closed   -> calls pass; `failure_threshold` consecutive failures open it
// Open     -> calls rejected until `timeout` has elapsed since last failure
// HalfOpen -> calls pass; `success_threshold` successes close it, any
//             failure reopens it
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric form for the state gauge.
    pub fn as_gauge(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
}

#[derive(Debug)]
struct Tracker {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

impl Tracker {
    fn admit(&mut self, timeout: Duration) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match self.opened_at {
                Some(at) if at.elapsed() >= timeout => {
                    tracing::info!("Circuit breaker half-open, probing broker");
                    self.state = CircuitState::HalfOpen;
                    self.successes = 0;
                    true
                }
                _ => false,
            },
        }
    }

    fn on_success(&mut self, config: &CircuitBreakerConfig) {
        match self.state {
            CircuitState::HalfOpen => {
                self.successes += 1;
                if self.successes >= config.success_threshold {
                    tracing::info!(successes = self.successes, "Circuit breaker closed");
                    *self = Tracker::closed();
                }
            }
            CircuitState::Closed => self.failures = 0,
            CircuitState::Open => {}
        }
    }

    fn on_failure(&mut self, config: &CircuitBreakerConfig) {
        self.failures += 1;
        self.opened_at = Some(Instant::now());

        let reopen = match self.state {
            CircuitState::Closed => self.failures >= config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if reopen {
            tracing::warn!(failures = self.failures, "Circuit breaker opened");
            self.state = CircuitState::Open;
            self.successes = 0;
        }
    }

    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            opened_at: None,
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    tracker: Arc<Mutex<Tracker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            tracker: Arc::new(Mutex::new(Tracker::closed())),
            config,
        }
    }

    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        if !self.tracker.lock().await.admit(self.config.timeout) {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        let result = operation.await;

        let mut tracker = self.tracker.lock().await;
        match result {
            Ok(value) => {
                tracker.on_success(&self.config);
                Ok(value)
            }
            Err(err) => {
                tracker.on_failure(&self.config);
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    pub async fn get_state(&self) -> CircuitState {
        self.tracker.lock().await.state
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("operation failed: {0}")]
    OperationFailed(E),
}
