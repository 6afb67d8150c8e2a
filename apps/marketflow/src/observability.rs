//! Metrics recording for the workflow engine.
//!
//! Records through the `metrics` facade only; wiring an exporter
//! (Prometheus or otherwise) is the embedding application's job. Every
//! label value is a stable lowercase name from the domain enums, so
//! cardinality stays bounded.

use metrics::{counter, histogram};

use crate::domain::operation::Operation;
use crate::resilience::classify::ErrorClass;

/// Record the outcome and latency of one workflow call.
///
/// `outcome` is `"success"`, `"validation"`, `"transport"`, or
/// `"configuration"`.
pub fn record_workflow_call(operation: Operation, outcome: &'static str, latency_seconds: f64) {
    counter!(
        "marketflow_workflow_calls_total",
        "operation" => operation.as_str(),
        "outcome" => outcome,
    )
    .increment(1);

    histogram!(
        "marketflow_workflow_duration_seconds",
        "operation" => operation.as_str(),
    )
    .record(latency_seconds);
}

/// Record one retry of a backend call.
///
/// `call` is the retry driver's label: an operation name or `"connect"`.
pub fn record_retry(call: &str, class: ErrorClass) {
    counter!(
        "marketflow_retries_total",
        "call" => call.to_string(),
        "class" => class.as_str(),
    )
    .increment(1);
}

/// Record a call rejected by the open circuit.
pub fn record_circuit_rejection(operation: Operation) {
    counter!(
        "marketflow_circuit_rejections_total",
        "operation" => operation.as_str(),
    )
    .increment(1);
}

/// Record per-record outcomes of one batch write.
pub fn record_batch_outcome(operation: Operation, succeeded: u64, failed: u64) {
    counter!(
        "marketflow_batch_records_total",
        "operation" => operation.as_str(),
        "outcome" => "success",
    )
    .increment(succeeded);
    counter!(
        "marketflow_batch_records_total",
        "operation" => operation.as_str(),
        "outcome" => "failure",
    )
    .increment(failed);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder the facade is a no-op; these verify
    // the helpers are callable with every label combination.
    #[test]
    fn helpers_record_without_a_recorder() {
        record_workflow_call(Operation::ReadPrices, "success", 0.012);
        record_workflow_call(Operation::WriteOhlcv, "transport", 1.5);
        record_retry("read_prices", ErrorClass::RateLimited);
        record_retry("connect", ErrorClass::Transient);
        record_circuit_rejection(Operation::WriteTopOfBook);
        record_batch_outcome(Operation::WritePrices, 95, 5);
    }
}
