//! Resilience Layer
//!
//! Failure classification, retry with exponential backoff, and the
//! circuit breaker. The engine owns the policy (budgets, thresholds);
//! handlers only report structured failures.

pub mod circuit_breaker;
pub mod classify;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
pub use classify::{ErrorClass, classify, classify_message, classify_status, retry_after};
pub use retry::{BackoffSchedule, RetryFailure, RetrySettings, execute};
