use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Current state of the master-call circuit breaker.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Snapshot of breaker internals for observability.
#[derive(Debug, Copy, Clone)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: usize,
    pub opened_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
    probes_in_flight: usize,
}

/// Error returned when the breaker refuses to let a master call through.
#[derive(Debug)]
pub enum CircuitBreakerError {
    CircuitOpen,
}

impl std::fmt::Display for CircuitBreakerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "master circuit breaker is open"),
        }
    }
}

impl std::error::Error for CircuitBreakerError {}

/// Closed/Open/Half-Open breaker shared by every master call issued from one
/// loader. Workers hammering an unreachable master would otherwise each run
/// their own full retry schedule; the breaker makes the outage visible after
/// `failure_threshold` consecutive failures and lets a bounded number of
/// probes test recovery after the cooldown.
#[derive(Debug, Clone)]
pub struct MasterCircuitBreaker {
    state: Arc<Mutex<BreakerState>>,
    failure_threshold: usize,
    cooldown: Duration,
    probe_budget: usize,
}

impl Default for MasterCircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(15), 1)
    }
}

impl MasterCircuitBreaker {
    pub fn new(failure_threshold: usize, cooldown: Duration, probe_budget: usize) -> Self {
        let cooldown = if cooldown.is_zero() {
            Duration::from_secs(1)
        } else {
            cooldown
        };

        Self {
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probes_in_flight: 0,
            })),
            failure_threshold: failure_threshold.max(1),
            cooldown,
            probe_budget: probe_budget.max(1),
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let guard = self.state.lock().expect("circuit breaker mutex poisoned");
        CircuitBreakerSnapshot {
            state: guard.state,
            consecutive_failures: guard.consecutive_failures,
            opened_at: guard.opened_at,
        }
    }

    /// Checks whether a new master call is allowed, reserving a probe slot
    /// when the breaker is recovering.
    pub fn before_request(&self) -> Result<CircuitState, CircuitBreakerError> {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");

        if state.state == CircuitState::Open {
            match state.opened_at {
                Some(opened_at) if opened_at.elapsed() >= self.cooldown => {
                    self.transition(&mut state, CircuitState::HalfOpen);
                    state.probes_in_flight = 0;
                }
                _ => return Err(CircuitBreakerError::CircuitOpen),
            }
        }

        if state.state == CircuitState::HalfOpen {
            if state.probes_in_flight >= self.probe_budget {
                return Err(CircuitBreakerError::CircuitOpen);
            }
            state.probes_in_flight += 1;
        }

        Ok(state.state)
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        self.release_probe(&mut state);
        state.consecutive_failures = 0;

        if state.state == CircuitState::HalfOpen {
            state.opened_at = None;
            self.transition(&mut state, CircuitState::Closed);
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        self.release_probe(&mut state);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        let reopen = state.state == CircuitState::HalfOpen
            || (state.state == CircuitState::Closed
                && state.consecutive_failures >= self.failure_threshold);
        if reopen {
            state.opened_at = Some(Instant::now());
            state.probes_in_flight = 0;
            self.transition(&mut state, CircuitState::Open);
        }
    }

    fn release_probe(&self, state: &mut BreakerState) {
        if state.state == CircuitState::HalfOpen && state.probes_in_flight > 0 {
            state.probes_in_flight -= 1;
        }
    }

    fn transition(&self, state: &mut BreakerState, next: CircuitState) {
        if state.state != next {
            tracing::warn!(
                previous = ?state.state,
                next = ?next,
                consecutive_failures = state.consecutive_failures,
                "master circuit breaker state changed"
            );
            state.state = next;
        }
    }
}
