//! Series selection for read operations.

use serde::{Deserialize, Serialize};

use super::identifiers::{InstrumentId, Timestamp, Venue};

/// Half-open observation window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start of the window.
    pub start: Timestamp,
    /// Exclusive end of the window.
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a new range.
    #[must_use]
    pub const fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Whether the window is non-degenerate (`start < end`).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    /// Whether a timestamp falls inside the window.
    #[must_use]
    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Selector for one series: which instrument, observed where, over what
/// window. Passed to every read operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesQuery {
    /// Logical series identifier.
    pub instrument: InstrumentId,
    /// Venue the observations were made on.
    pub venue: Venue,
    /// Optional observation window; `None` means "latest available".
    pub range: Option<TimeRange>,
    /// Optional cap on returned records.
    pub limit: Option<u32>,
}

impl SeriesQuery {
    /// Create a query for the latest records of a series.
    #[must_use]
    pub const fn new(instrument: InstrumentId, venue: Venue) -> Self {
        Self {
            instrument,
            venue,
            range: None,
            limit: None,
        }
    }

    /// Restrict the query to an observation window.
    #[must_use]
    pub const fn with_range(mut self, range: TimeRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Cap the number of returned records.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}
