//! Failure classification for retry decisions.
//!
//! Structured signals are consulted first: the dedicated handler error
//! variants, HTTP-style status codes, then backend code strings. Message
//! keyword matching is the last resort, for backends that only return
//! free-form text. Unknown unstructured failures classify as transient —
//! wrongly giving up on a retryable failure costs more than one wasted
//! retry of a permanent one.
//!
//! | Class | Examples | Retried |
//! |-------|----------|---------|
//! | `RateLimited` | 429, RESOURCE_EXHAUSTED | yes, honoring server hints |
//! | `Transient` | timeouts, 5xx, UNAVAILABLE | yes, under backoff |
//! | `Fatal` | 400, 404, decode failures | no |
//! | `Configuration` | 401/403, bad credentials | no |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::ports::handler::HandlerError;

/// Classification of a handler failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Backend asked us to slow down.
    RateLimited,
    /// Short-lived failure expected to clear on its own.
    Transient,
    /// Permanent failure; retrying cannot help.
    Fatal,
    /// Misconfiguration (credentials, endpoints); retrying cannot help.
    Configuration,
}

impl ErrorClass {
    /// Whether the engine may retry a failure of this class.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient)
    }

    /// Stable lowercase name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::Fatal => "fatal",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Backend code strings that signal rate limiting.
const RATE_LIMIT_CODES: &[&str] = &["RESOURCE_EXHAUSTED", "RATE_LIMITED", "42910000"];

/// Backend code strings that signal a short-lived outage.
const TRANSIENT_CODES: &[&str] = &["UNAVAILABLE", "DEADLINE_EXCEEDED", "ABORTED", "INTERNAL"];

/// Backend code strings that indicate misconfiguration.
const CONFIGURATION_CODES: &[&str] = &["UNAUTHENTICATED", "PERMISSION_DENIED"];

/// Backend code strings that are permanent failures.
const FATAL_CODES: &[&str] = &[
    "INVALID_ARGUMENT",
    "NOT_FOUND",
    "ALREADY_EXISTS",
    "FAILED_PRECONDITION",
    "OUT_OF_RANGE",
    "UNIMPLEMENTED",
];

/// Classify an HTTP-style status code.
#[must_use]
pub const fn classify_status(code: u16) -> ErrorClass {
    match code {
        429 => ErrorClass::RateLimited,
        401 | 403 => ErrorClass::Configuration,
        408 | 500..=599 => ErrorClass::Transient,
        _ => ErrorClass::Fatal,
    }
}

fn classify_backend_code(code: &str) -> Option<ErrorClass> {
    let matches_any = |codes: &[&str]| codes.iter().any(|c| code.eq_ignore_ascii_case(c));
    if matches_any(RATE_LIMIT_CODES) {
        return Some(ErrorClass::RateLimited);
    }
    if matches_any(TRANSIENT_CODES) {
        return Some(ErrorClass::Transient);
    }
    if matches_any(CONFIGURATION_CODES) {
        return Some(ErrorClass::Configuration);
    }
    if matches_any(FATAL_CODES) {
        return Some(ErrorClass::Fatal);
    }
    None
}

/// Classify a free-form error message. Last resort only.
#[must_use]
pub fn classify_message(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();

    // Rate limiting indicators
    if lower.contains("rate limit") || lower.contains("too many requests") || lower.contains("429")
    {
        return ErrorClass::RateLimited;
    }

    // Short-lived network failures
    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection reset")
        || lower.contains("connection refused")
        || lower.contains("dns")
        || lower.contains("temporary failure")
        || lower.contains("network")
        || lower.contains("socket")
        || lower.contains("broken pipe")
    {
        return ErrorClass::Transient;
    }

    // Misconfiguration
    if lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("credential")
        || lower.contains("api key")
    {
        return ErrorClass::Configuration;
    }

    // Permanent failures
    if lower.contains("invalid")
        || lower.contains("bad request")
        || lower.contains("not found")
        || lower.contains("unprocessable")
        || lower.contains("unsupported")
    {
        return ErrorClass::Fatal;
    }

    // Unknown unstructured errors stay retryable
    ErrorClass::Transient
}

/// Classify a handler failure.
#[must_use]
pub fn classify(error: &HandlerError) -> ErrorClass {
    match error {
        HandlerError::RateLimited { .. } => ErrorClass::RateLimited,
        HandlerError::Timeout | HandlerError::Connection { .. } => ErrorClass::Transient,
        HandlerError::Status { code, .. } => classify_status(*code),
        HandlerError::Misconfigured { .. } => ErrorClass::Configuration,
        HandlerError::Decode { .. } => ErrorClass::Fatal,
        HandlerError::Backend { code, message } => code
            .as_deref()
            .and_then(classify_backend_code)
            .unwrap_or_else(|| classify_message(message)),
    }
}

/// Server-supplied retry delay, when the failure carries one.
#[must_use]
pub const fn retry_after(error: &HandlerError) -> Option<Duration> {
    match error {
        HandlerError::RateLimited {
            retry_after_secs: Some(secs),
        } => Some(Duration::from_secs(*secs)),
        _ => None,
    }
}
