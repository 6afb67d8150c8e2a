// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Marketflow - Market-Data Workflow Engine
//!
//! A data-access abstraction for market time-series (prices, OHLCV bars,
//! aggregate analytics, top-of-book quotes) read from and written to
//! heterogeneous backends through a narrow handler contract.
//!
//! # Architecture (Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: the data model and its laws
//!   - `record`: the four record variants and the `SeriesRecord` trait
//!   - `operation`: the declared operation set with read/write pairing
//!   - `validation`: structural validators and per-variant overrides
//!
//! - **Ports**: interfaces backends implement
//!   - `handler`: `SourcePort` / `SinkPort`, one method per operation
//!   - `resource`: `ResourceCapability` (connect / invoke / close)
//!
//! - **Engine**: the workflow around every handler call
//!   - admission, circuit gate, retry under budget, validation, results
//!   - `batch`: aggregate batch-write outcomes
//!   - `pipeline`: composed read → transform → write over one variant
//!
//! - **Resilience**: failure classification, backoff, circuit breaker
//! - **Registry**: per-engine lifecycle of named backend handles
//! - **Schema**: storage and stream schemas generated from the one model
//!
//! Every public operation returns `Result<_, EngineError>`; failures are
//! classified, never thrown.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Layers
// =============================================================================

/// Domain layer - the data model, operations, and validation.
pub mod domain;

/// Ports layer - handler and resource capability traits.
pub mod ports;

/// Workflow engine - operations, batches, pipelines.
pub mod engine;

/// Resource registry - named backend handle lifecycle.
pub mod registry;

/// Resilience layer - classification, retry, circuit breaker.
pub mod resilience;

/// Schema propagator - storage and stream schema generation.
pub mod schema;

/// Engine configuration loading and validation.
pub mod config;

/// Engine error taxonomy.
pub mod error;

/// Metrics recording helpers.
pub mod observability;

// =============================================================================
// Re-exports
// =============================================================================

// Domain
pub use domain::{
    InstrumentId, MarketAnalyticsRecord, OhlcvRecord, Operation, OperationKind, PriceRecord,
    Record, RecordKind, SeriesQuery, SeriesRecord, SourceTag, TimeRange, Timestamp,
    TopOfBookRecord, ValidationIssue, ValidationReport, ValidatorSet, Venue,
};

// Ports
pub use ports::{HandlerError, ResourceCapability, SinkPort, SourcePort};

// Engine
pub use engine::{
    BatchFailure, BatchOutcome, Pipeline, PipelineOutcome, WorkflowEngine, WorkflowEngineBuilder,
};

// Registry
pub use registry::{CloseFailure, CloseReport, ResourceKind, ResourceRegistry};

// Resilience
pub use resilience::{CircuitState, ErrorClass, RetrySettings};

// Schema
pub use schema::{DataModel, SchemaFragment, SchemaSet, StorageSchema, StreamSchema, generate};

// Config and errors
pub use config::{EngineConfig, load_config};
pub use error::{EngineError, ErrorContext};
