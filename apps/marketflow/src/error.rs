//! Engine error taxonomy.
//!
//! Every operation returns `Result<T, EngineError>`; failures flow through
//! return values, never panics. The variant decides what the caller may do
//! next: validation and configuration failures are final, transport
//! failures carry the classification and attempt count the resilience
//! layer produced, and schema drift is reported for operators to resolve.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::operation::Operation;
use crate::domain::validation::ValidationReport;
use crate::ports::handler::HandlerError;
use crate::resilience::classify::ErrorClass;

/// Correlation context attached to every failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Correlation id for joining log lines across a workflow call.
    pub correlation_id: String,
    /// Ordered detail fields (instrument, venue, resource, ...).
    pub fields: BTreeMap<String, String>,
}

impl ErrorContext {
    /// Fresh context with a random correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            fields: BTreeMap::new(),
        }
    }

    /// Attach a detail field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform failure type of every engine operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Record failed structural validation. Never retried.
    #[error("Validation failed for {operation}: {report}")]
    Validation {
        /// Operation the record was submitted under.
        operation: Operation,
        /// Every violated rule.
        report: ValidationReport,
        /// Correlation context.
        context: ErrorContext,
    },

    /// Backend failure, classified; retryable classes arrive here only
    /// after the retry budget is exhausted.
    #[error("{} failed ({class}) after {attempts} attempt(s): {source}", operation.map_or("connect", Operation::as_str))]
    Transport {
        /// Operation that failed; `None` for connection establishment.
        operation: Option<Operation>,
        /// Classification of the final failure.
        class: ErrorClass,
        /// Attempts consumed, including the first call.
        attempts: u32,
        /// The handler error from the final attempt.
        #[source]
        source: HandlerError,
        /// Correlation context.
        context: ErrorContext,
    },

    /// Engine, registry, or resource misconfiguration. Never retried.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is misconfigured.
        message: String,
        /// Correlation context.
        context: ErrorContext,
    },

    /// Deployed schema diverged from the generated one. Reported,
    /// never auto-healed.
    #[error("Schema drift in [{}]: {detail}", variants.join(", "))]
    SchemaDrift {
        /// Variants whose deployed fragment diverged or is missing.
        variants: Vec<String>,
        /// Human-readable description of the divergence.
        detail: String,
        /// Correlation context.
        context: ErrorContext,
    },
}

impl EngineError {
    /// Build a configuration failure.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    pub(crate) fn validation(operation: Operation, report: ValidationReport) -> Self {
        Self::Validation {
            operation,
            report,
            context: ErrorContext::new(),
        }
    }

    pub(crate) fn transport(
        operation: Option<Operation>,
        class: ErrorClass,
        attempts: u32,
        source: HandlerError,
    ) -> Self {
        Self::Transport {
            operation,
            class,
            attempts,
            source,
            context: ErrorContext::new(),
        }
    }

    pub(crate) fn schema_drift(variants: Vec<String>, detail: impl Into<String>) -> Self {
        Self::SchemaDrift {
            variants,
            detail: detail.into(),
            context: ErrorContext::new(),
        }
    }

    /// Correlation context of this failure.
    #[must_use]
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Validation { context, .. }
            | Self::Transport { context, .. }
            | Self::Configuration { context, .. }
            | Self::SchemaDrift { context, .. } => context,
        }
    }

    /// Operation the failure is tied to, when there is one.
    #[must_use]
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Validation { operation, .. } => Some(*operation),
            Self::Transport { operation, .. } => *operation,
            Self::Configuration { .. } | Self::SchemaDrift { .. } => None,
        }
    }
}
