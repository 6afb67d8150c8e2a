//! Circuit breaker guarding workflow calls.
//!
//! Stops hammering a backend that is failing across the board: the engine
//! short-circuits calls while the circuit is open instead of burning retry
//! budgets against a dead backend.
//!
//! # State Machine
//!
//! ```text
//! CLOSED → OPEN (failure rate >= threshold)
//! OPEN → HALF_OPEN (cool-down elapsed)
//! HALF_OPEN → CLOSED (probe calls succeed)
//! HALF_OPEN → OPEN (a probe call fails)
//! ```

use std::collections::VecDeque;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without touching the backend.
    Open,
    /// A limited number of probe calls are let through.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failure rate that opens the circuit (0.0-1.0).
    pub failure_rate_threshold: f64,
    /// Number of call outcomes tracked.
    pub sliding_window_size: u32,
    /// Minimum outcomes in the window before the rate is evaluated.
    pub minimum_calls: u32,
    /// Cool-down spent in `OPEN` before probing.
    pub wait_duration_in_open: Duration,
    /// Probe calls allowed in `HALF_OPEN`.
    pub permitted_calls_in_half_open: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            sliding_window_size: 20,
            minimum_calls: 5,
            wait_duration_in_open: Duration::from_secs(10),
            permitted_calls_in_half_open: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallOutcome {
    Success,
    Failure,
}

/// Sliding-window circuit breaker for one engine's backend calls.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Engine name for logging.
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    sliding_window: RwLock<VecDeque<CallOutcome>>,
    /// When the circuit opened, for the cool-down clock.
    opened_at: RwLock<Option<Instant>>,
    half_open_calls: AtomicU32,
    half_open_successes: AtomicU32,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    state_transitions: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(CircuitState::Closed),
            sliding_window: RwLock::new(VecDeque::new()),
            opened_at: RwLock::new(None),
            half_open_calls: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            state_transitions: AtomicU64::new(0),
        }
    }

    /// Current state, applying the cool-down transition first.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.tick();
        *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether a call may proceed right now.
    #[must_use]
    pub fn is_call_permitted(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                self.half_open_calls.load(Ordering::Relaxed)
                    < self.config.permitted_calls_in_half_open
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.record_outcome(CallOutcome::Success);
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        self.record_outcome(CallOutcome::Failure);
    }

    fn record_outcome(&self, outcome: CallOutcome) {
        // Apply the cool-down first so probe outcomes recorded after it
        // elapsed land in the HALF_OPEN arm instead of being discarded
        self.tick();

        let current = *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match current {
            CircuitState::Closed => {
                self.push_outcome(outcome);
                if self.window_rate_exceeded() {
                    self.transition(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.half_open_calls.fetch_add(1, Ordering::Relaxed);
                if outcome == CallOutcome::Failure {
                    // Any probe failure reopens
                    self.transition(CircuitState::Open);
                    return;
                }
                let successes = self.half_open_successes.fetch_add(1, Ordering::Relaxed) + 1;
                if successes >= self.config.permitted_calls_in_half_open {
                    self.transition(CircuitState::Closed);
                }
            }
            CircuitState::Open => {
                tracing::warn!(
                    breaker = %self.name,
                    "Call outcome recorded while circuit is OPEN"
                );
            }
        }
    }

    fn push_outcome(&self, outcome: CallOutcome) {
        let mut window = self
            .sliding_window
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        window.push_back(outcome);
        while window.len() > self.config.sliding_window_size as usize {
            window.pop_front();
        }
    }

    fn window_rate_exceeded(&self) -> bool {
        let window = self
            .sliding_window
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if window.len() < self.config.minimum_calls as usize {
            return false;
        }
        let failures = window
            .iter()
            .filter(|o| **o == CallOutcome::Failure)
            .count();
        let rate = failures as f64 / window.len() as f64;
        rate >= self.config.failure_rate_threshold
    }

    /// Apply the `OPEN` → `HALF_OPEN` cool-down transition when due.
    fn tick(&self) {
        let state = *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if state == CircuitState::Open
            && let Some(opened) = *self
                .opened_at
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
            && opened.elapsed() >= self.config.wait_duration_in_open
        {
            self.transition(CircuitState::HalfOpen);
        }
    }

    fn transition(&self, to: CircuitState) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let from = *state;
        if from == to {
            return;
        }
        // HALF_OPEN is only reachable from OPEN
        if to == CircuitState::HalfOpen && from != CircuitState::Open {
            return;
        }
        *state = to;
        drop(state);

        match to {
            CircuitState::Open => {
                *self
                    .opened_at
                    .write()
                    .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                self.half_open_calls.store(0, Ordering::Relaxed);
                self.half_open_successes.store(0, Ordering::Relaxed);
            }
            CircuitState::Closed => {
                self.sliding_window
                    .write()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .clear();
                *self
                    .opened_at
                    .write()
                    .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
            }
        }

        self.state_transitions.fetch_add(1, Ordering::Relaxed);

        if to == CircuitState::Open {
            tracing::warn!(breaker = %self.name, from = %from, to = %to, "Circuit opened");
        } else {
            tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit state changed");
        }
    }

    /// Snapshot of breaker counters.
    #[must_use]
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let window = self
            .sliding_window
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let failure_rate = if window.is_empty() {
            0.0
        } else {
            let failures = window
                .iter()
                .filter(|o| **o == CallOutcome::Failure)
                .count();
            failures as f64 / window.len() as f64
        };
        drop(window);

        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: self.state(),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            state_transitions: self.state_transitions.load(Ordering::Relaxed),
            failure_rate,
        }
    }
}

/// Point-in-time view of a breaker's counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    /// Engine name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Total calls recorded.
    pub total_calls: u64,
    /// Total failures recorded.
    pub total_failures: u64,
    /// Number of state transitions.
    pub state_transitions: u64,
    /// Failure rate over the current window (0.0-1.0).
    pub failure_rate: f64,
}
