//! Retry with exponential backoff.
//!
//! One driver serves every retried call site: connection establishment
//! runs under the (larger) connect budget, per-operation handler calls
//! under the invoke budget. Only failures classified rate-limited or
//! transient are retried; a server-supplied rate-limit delay takes
//! precedence over the computed backoff for that attempt.
//!
//! # Example
//!
//! ```rust,ignore
//! use marketflow::resilience::{RetrySettings, execute};
//!
//! let settings = RetrySettings::default();
//! let records = execute("read_prices", &settings, || source.fetch_prices(&query)).await?;
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use super::classify::{ErrorClass, classify, retry_after};
use crate::ports::handler::HandlerError;

/// Retry budget and backoff shape for one call site.
///
/// `max_attempts` counts every call, including the first: a budget of 4
/// makes at most 4 calls (3 retries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum calls, including the first (default: 4).
    pub max_attempts: u32,
    /// Initial backoff duration (default: 100ms).
    pub initial_backoff: Duration,
    /// Maximum backoff duration (default: 30s).
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth (default: 2.0).
    pub backoff_multiplier: f64,
    /// Jitter factor for randomization (default: 0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetrySettings {
    /// Budget for connection establishment: patient, with a long cap.
    #[must_use]
    pub const fn connect() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(64),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }

    /// Budget for per-operation handler calls: fail over to the caller
    /// quickly.
    #[must_use]
    pub fn invoke() -> Self {
        Self::default()
    }
}

/// Yields the delay before each retry, `None` once the budget is spent.
#[derive(Debug)]
pub struct BackoffSchedule {
    retries_taken: u32,
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
}

impl BackoffSchedule {
    /// Create a schedule from retry settings.
    #[must_use]
    pub const fn new(settings: &RetrySettings) -> Self {
        Self {
            retries_taken: 0,
            max_retries: settings.max_attempts.saturating_sub(1),
            initial_backoff_ms: settings.initial_backoff.as_millis() as u64,
            max_backoff_ms: settings.max_backoff.as_millis() as u64,
            backoff_multiplier: settings.backoff_multiplier,
            jitter_factor: settings.jitter_factor,
        }
    }

    /// Next backoff duration with jitter, `None` if the budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries_taken >= self.max_retries {
            return None;
        }

        let base_ms = self.base_backoff_ms();
        let jittered_ms = self.apply_jitter(base_ms).min(self.max_backoff_ms);

        self.retries_taken += 1;

        Some(Duration::from_millis(jittered_ms))
    }

    /// Consume one retry from the budget using a server-supplied delay
    /// instead of the computed backoff.
    pub fn hinted(&mut self, hint: Duration) -> Option<Duration> {
        if self.retries_taken >= self.max_retries {
            return None;
        }
        self.retries_taken += 1;
        Some(hint)
    }

    fn base_backoff_ms(&self) -> u64 {
        let multiplier = self.backoff_multiplier.powi(self.retries_taken as i32);
        let backoff = (self.initial_backoff_ms as f64 * multiplier) as u64;
        backoff.min(self.max_backoff_ms)
    }

    /// Random value in `[backoff * (1 - jitter), backoff * (1 + jitter)]`.
    fn apply_jitter(&self, backoff_ms: u64) -> u64 {
        if self.jitter_factor == 0.0 {
            return backoff_ms;
        }
        let mut rng = rand::rng();
        let jitter_range = backoff_ms as f64 * self.jitter_factor;
        let min = (backoff_ms as f64 - jitter_range).max(0.0);
        let max = backoff_ms as f64 + jitter_range;

        rng.random_range(min..=max) as u64
    }

    /// Retries consumed so far.
    #[must_use]
    pub const fn retries_taken(&self) -> u32 {
        self.retries_taken
    }

    /// Whether the budget has room for another retry.
    #[must_use]
    pub const fn has_remaining(&self) -> bool {
        self.retries_taken < self.max_retries
    }

    /// Reset the schedule for a fresh call.
    pub const fn reset(&mut self) {
        self.retries_taken = 0;
    }
}

/// Final failure of a retried call.
#[derive(Debug)]
pub struct RetryFailure {
    /// Handler error from the last attempt.
    pub error: HandlerError,
    /// Classification of that error.
    pub class: ErrorClass,
    /// Attempts consumed, including the first call.
    pub attempts: u32,
}

/// Drive an async call under a retry budget.
///
/// The closure is invoked once per attempt. Failures are classified;
/// fatal and configuration classes return immediately, retryable classes
/// sleep and try again until the budget is spent.
pub async fn execute<T, F, Fut>(
    label: &str,
    settings: &RetrySettings,
    mut call: F,
) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, HandlerError>>,
{
    let mut backoff = BackoffSchedule::new(settings);
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let error = match call().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let class = classify(&error);
        if !class.is_retryable() {
            return Err(RetryFailure {
                error,
                class,
                attempts,
            });
        }

        let delay = match retry_after(&error) {
            Some(hint) => backoff.hinted(hint),
            None => backoff.next_backoff(),
        };
        let Some(delay) = delay else {
            tracing::warn!(
                call = label,
                class = %class,
                attempts,
                error = %error,
                "Retry budget exhausted"
            );
            return Err(RetryFailure {
                error,
                class,
                attempts,
            });
        };

        tracing::warn!(
            call = label,
            class = %class,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying after backend failure"
        );
        crate::observability::record_retry(label, class);
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_jitter(max_attempts: u32) -> RetrySettings {
        RetrySettings {
            max_attempts,
            jitter_factor: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn backoff_sequence_doubles() {
        let mut backoff = BackoffSchedule::new(&no_jitter(4));

        // 3 retries out of a budget of 4 attempts
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(400)));
        assert!(backoff.next_backoff().is_none());
    }

    #[test]
    fn backoff_caps_at_max() {
        let settings = RetrySettings {
            max_attempts: 20,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 10.0,
            jitter_factor: 0.0,
        };
        let mut backoff = BackoffSchedule::new(&settings);

        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(5))); // Capped
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(5))); // Capped
    }

    #[test]
    fn jitter_stays_in_range() {
        let settings = RetrySettings {
            jitter_factor: 0.2,
            ..Default::default()
        };

        for _ in 0..100 {
            let mut backoff = BackoffSchedule::new(&settings);
            let duration = backoff.next_backoff().unwrap();

            // Base is 100ms, jitter is ±20%
            assert!(
                duration >= Duration::from_millis(80) && duration <= Duration::from_millis(120),
                "Duration {duration:?} not in expected range 80-120ms"
            );
        }
    }

    #[test]
    fn hint_consumes_budget() {
        let mut backoff = BackoffSchedule::new(&no_jitter(2));

        assert_eq!(
            backoff.hinted(Duration::from_secs(7)),
            Some(Duration::from_secs(7))
        );
        assert!(!backoff.has_remaining());
        assert!(backoff.hinted(Duration::from_secs(7)).is_none());
        assert!(backoff.next_backoff().is_none());
    }

    #[test]
    fn reset_restores_budget() {
        let mut backoff = BackoffSchedule::new(&no_jitter(3));
        let _ = backoff.next_backoff();
        let _ = backoff.next_backoff();
        assert_eq!(backoff.retries_taken(), 2);

        backoff.reset();
        assert_eq!(backoff.retries_taken(), 0);
        assert!(backoff.has_remaining());
    }

    #[tokio::test(start_paused = true)]
    async fn execute_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = execute("test", &no_jitter(4), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(HandlerError::Timeout)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_reports_attempts_on_exhaustion() {
        let start = tokio::time::Instant::now();
        let result: Result<u32, _> = execute("test", &no_jitter(4), || async {
            Err(HandlerError::Timeout)
        })
        .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 4);
        assert_eq!(failure.class, ErrorClass::Transient);
        assert!(matches!(failure.error, HandlerError::Timeout));
        // 100 + 200 + 400 ms of backoff under the paused clock
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn execute_never_retries_fatal() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = execute("test", &no_jitter(4), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(HandlerError::Status {
                    code: 400,
                    message: "bad request".to_string(),
                })
            }
        })
        .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.class, ErrorClass::Fatal);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_never_retries_configuration() {
        let result: Result<u32, _> = execute("test", &no_jitter(4), || async {
            Err(HandlerError::Misconfigured {
                message: "no api key".to_string(),
            })
        })
        .await;

        assert_eq!(result.unwrap_err().class, ErrorClass::Configuration);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_prefers_server_hint() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result: Result<u32, _> = execute("test", &no_jitter(4), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(HandlerError::RateLimited {
                        retry_after_secs: Some(9),
                    })
                } else {
                    Ok(1)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        // The server hint replaced the 100ms computed backoff
        assert_eq!(start.elapsed(), Duration::from_secs(9));
    }

    proptest! {
        #[test]
        fn backoff_never_exceeds_cap(
            max_attempts in 1u32..12,
            initial_ms in 1u64..5_000,
            max_ms in 1u64..60_000,
            multiplier in 1.0f64..8.0,
            jitter in 0.0f64..0.5,
        ) {
            let settings = RetrySettings {
                max_attempts,
                initial_backoff: Duration::from_millis(initial_ms),
                max_backoff: Duration::from_millis(max_ms),
                backoff_multiplier: multiplier,
                jitter_factor: jitter,
            };
            let mut backoff = BackoffSchedule::new(&settings);

            let mut yielded = 0u32;
            while let Some(delay) = backoff.next_backoff() {
                prop_assert!(delay.as_millis() as u64 <= max_ms);
                yielded += 1;
            }
            prop_assert_eq!(yielded, max_attempts - 1);
        }
    }
}
