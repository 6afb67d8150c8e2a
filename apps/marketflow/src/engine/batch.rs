//! Aggregate outcome of batch writes.
//!
//! A batch never fails the call: per-record failures are collected into
//! one [`BatchOutcome`] so the caller can see exactly which records were
//! rejected and why. Fail-fast only stops admission of the remaining
//! items; records already processed stay in the counts.

use serde::{Deserialize, Serialize};

use crate::domain::identifiers::{InstrumentId, Timestamp, Venue};
use crate::domain::record::SeriesRecord;
use crate::error::EngineError;

/// One record that failed inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    /// Position of the record in the submitted batch.
    pub index: usize,
    /// Series identifier of the failed record.
    pub instrument: InstrumentId,
    /// Venue of the failed record.
    pub venue: Venue,
    /// Observation time of the failed record.
    pub observed_at: Timestamp,
    /// The failure, rendered.
    pub error: String,
}

/// Aggregate result of one batch write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Records written successfully.
    pub success_count: usize,
    /// Records that failed validation or transport.
    pub failure_count: usize,
    /// Per-record failure details, in batch order.
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    /// Whether every record in the batch was written.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failure_count == 0
    }

    /// Records this batch processed (written or failed).
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.success_count + self.failure_count
    }

    pub(crate) fn record_success(&mut self) {
        self.success_count += 1;
    }

    pub(crate) fn record_failure<R: SeriesRecord>(
        &mut self,
        index: usize,
        record: &R,
        error: &EngineError,
    ) {
        self.failure_count += 1;
        self.failures.push(BatchFailure {
            index,
            instrument: record.instrument().clone(),
            venue: record.venue().clone(),
            observed_at: record.observed_at(),
            error: error.to_string(),
        });
    }
}
