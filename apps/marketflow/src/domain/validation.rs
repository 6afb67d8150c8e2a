//! Structural validation of records.
//!
//! Validation never touches a backend: it inspects one record and reports
//! every violated rule, not just the first. A failed validation is final —
//! the engine never retries it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::record::SeriesRecord;

/// One violated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Field the rule applies to.
    pub field: String,
    /// What the rule requires.
    pub message: String,
}

/// Outcome of validating one record: empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// An empty (passing) report.
    #[must_use]
    pub const fn ok() -> Self {
        Self { issues: Vec::new() }
    }

    /// Whether no rule was violated.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Record a violated rule.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            field: field.into(),
            message: message.into(),
        });
    }

    /// All violated rules, in the order they were checked.
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return write!(f, "valid");
        }
        let joined = self
            .issues
            .iter()
            .map(|issue| format!("{}: {}", issue.field, issue.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{joined}")
    }
}

pub(crate) fn require_non_empty(report: &mut ValidationReport, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        report.push(field, "must not be empty");
    }
}

pub(crate) fn require_positive(report: &mut ValidationReport, field: &'static str, value: Decimal) {
    if value <= Decimal::ZERO {
        report.push(field, "must be positive");
    }
}

pub(crate) fn require_non_negative(
    report: &mut ValidationReport,
    field: &'static str,
    value: Decimal,
) {
    if value < Decimal::ZERO {
        report.push(field, "must not be negative");
    }
}

type BoxedValidator<R> = Arc<dyn Fn(&R) -> ValidationReport + Send + Sync>;

/// Per-variant validator overrides.
///
/// Each record variant carries its structural validator; a `ValidatorSet`
/// lets a caller swap in a stricter or looser one per variant without
/// touching the others. Validators must be pure functions of the record.
#[derive(Clone, Default)]
pub struct ValidatorSet {
    overrides: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ValidatorSet {
    /// An empty set: every variant uses its structural validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the validator for one record variant.
    pub fn set<R>(&mut self, validator: impl Fn(&R) -> ValidationReport + Send + Sync + 'static)
    where
        R: SeriesRecord,
    {
        let boxed: BoxedValidator<R> = Arc::new(validator);
        self.overrides.insert(TypeId::of::<R>(), Arc::new(boxed));
    }

    /// Validate one record with the override for its variant, falling back
    /// to the variant's structural validator.
    #[must_use]
    pub fn validate<R: SeriesRecord>(&self, record: &R) -> ValidationReport {
        let validator = self
            .overrides
            .get(&TypeId::of::<R>())
            .and_then(|any| any.downcast_ref::<BoxedValidator<R>>());
        match validator {
            Some(validator) => validator(record),
            None => record.validate(),
        }
    }

    /// Number of overridden variants.
    #[must_use]
    pub fn overridden(&self) -> usize {
        self.overrides.len()
    }
}

impl fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorSet")
            .field("overrides", &self.overrides.len())
            .finish()
    }
}
