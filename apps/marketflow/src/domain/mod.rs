//! Domain Layer
//!
//! The innermost layer: the record variants of the data model, their
//! identifiers, the declared operation set, series selection, and
//! structural validation. Nothing in here touches a backend.

pub mod identifiers;
pub mod operation;
pub mod query;
pub mod record;
pub mod validation;

pub use identifiers::{InstrumentId, SourceTag, Timestamp, Venue};
pub use operation::{Operation, OperationKind};
pub use query::{SeriesQuery, TimeRange};
pub use record::{
    MarketAnalyticsRecord, OhlcvRecord, PriceRecord, Record, RecordKind, SeriesRecord,
    TopOfBookRecord,
};
pub use validation::{ValidationIssue, ValidationReport, ValidatorSet};
