//! Workflow Engine
//!
//! Implements every declared operation exactly once and delegates the
//! backend-specific part to the handler ports. Each call runs the same
//! workflow: admission → circuit gate → handler invocation under the
//! invoke retry budget → validation → a uniform result. The engine holds
//! no mutable state across calls beyond its resource registry.
//!
//! Resource association comes in two shapes, never mixed in one engine:
//! *composition* (the engine holds a registry of externally built
//! handles) and *identity* (the engine's backend object is itself the
//! sole handle, registered as `"self"`).
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = WorkflowEngine::builder()
//!     .with_name("quotes")
//!     .with_source(Arc::clone(&source) as Arc<dyn SourcePort>)
//!     .with_resource("alpaca", ResourceKind::DataSource, source)
//!     .build()?;
//! engine.initialize().await?;
//! let prices = engine.read_prices(&query).await?;
//! ```

pub mod batch;
pub mod pipeline;

pub use batch::{BatchFailure, BatchOutcome};
pub use pipeline::{Pipeline, PipelineOutcome};

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::Notify;

use crate::config::EngineConfig;
use crate::domain::operation::Operation;
use crate::domain::query::SeriesQuery;
use crate::domain::record::{
    MarketAnalyticsRecord, OhlcvRecord, PriceRecord, SeriesRecord, TopOfBookRecord,
};
use crate::domain::validation::{ValidationReport, ValidatorSet};
use crate::error::EngineError;
use crate::observability;
use crate::ports::handler::{HandlerError, SinkPort, SourcePort};
use crate::ports::resource::ResourceCapability;
use crate::registry::{CloseReport, ResourceKind, ResourceRegistry};
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::classify::ErrorClass;
use crate::resilience::retry::{self, RetrySettings};

/// Name the identity-shape handle is registered under.
const SELF_HANDLE: &str = "self";

/// Builder for a [`WorkflowEngine`].
pub struct WorkflowEngineBuilder {
    name: String,
    config: EngineConfig,
    source: Option<Arc<dyn SourcePort>>,
    sink: Option<Arc<dyn SinkPort>>,
    validators: ValidatorSet,
    pending: Vec<(String, ResourceKind, Vec<String>, Arc<dyn ResourceCapability>)>,
    composition: bool,
    identity: bool,
}

impl WorkflowEngineBuilder {
    fn new() -> Self {
        Self {
            name: "marketflow".to_string(),
            config: EngineConfig::default(),
            source: None,
            sink: None,
            validators: ValidatorSet::new(),
            pending: Vec::new(),
            composition: false,
            identity: false,
        }
    }

    /// Name the engine, for logs and the circuit breaker.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Use the given configuration instead of the defaults.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach the handler serving read operations.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn SourcePort>) -> Self {
        self.source = Some(source);
        self
    }

    /// Attach the handler serving write operations.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn SinkPort>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Override record validators per variant.
    #[must_use]
    pub fn with_validators(mut self, validators: ValidatorSet) -> Self {
        self.validators = validators;
        self
    }

    /// Register an externally built resource handle (composition shape).
    #[must_use]
    pub fn with_resource(
        mut self,
        name: impl Into<String>,
        kind: ResourceKind,
        capability: Arc<dyn ResourceCapability>,
    ) -> Self {
        self.composition = true;
        self.pending.push((name.into(), kind, Vec::new(), capability));
        self
    }

    /// Register a tagged resource handle (composition shape).
    #[must_use]
    pub fn with_tagged_resource(
        mut self,
        name: impl Into<String>,
        kind: ResourceKind,
        tags: Vec<String>,
        capability: Arc<dyn ResourceCapability>,
    ) -> Self {
        self.composition = true;
        self.pending.push((name.into(), kind, tags, capability));
        self
    }

    /// Register the engine's own backend object as its sole handle
    /// (identity shape).
    #[must_use]
    pub fn self_hosted(mut self, kind: ResourceKind, capability: Arc<dyn ResourceCapability>) -> Self {
        self.identity = true;
        self.pending
            .push((SELF_HANDLE.to_string(), kind, Vec::new(), capability));
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the two resource shapes are
    /// mixed, no handler is attached, a resource name is duplicated, or a
    /// configuration value is out of range.
    pub fn build(self) -> Result<WorkflowEngine, EngineError> {
        if self.composition && self.identity {
            return Err(EngineError::configuration(
                "resource shapes are ambiguous: self_hosted cannot be combined with with_resource",
            ));
        }
        if self.source.is_none() && self.sink.is_none() {
            return Err(EngineError::configuration(
                "engine needs at least one handler (source or sink)",
            ));
        }
        self.config
            .validate()
            .map_err(|e| EngineError::configuration(e.to_string()))?;

        let registry = ResourceRegistry::new();
        for (name, kind, tags, capability) in self.pending {
            registry.register(name, kind, tags, capability)?;
        }

        let breaker = self
            .config
            .circuit_breaker
            .enabled
            .then(|| CircuitBreaker::new(self.name.clone(), self.config.circuit_breaker.to_settings()));

        Ok(WorkflowEngine {
            name: self.name,
            connect_retry: self.config.connect_retry.to_settings(),
            invoke_retry: self.config.invoke_retry.to_settings(),
            fail_fast: self.config.batch.fail_fast,
            source: self.source,
            sink: self.sink,
            validators: self.validators,
            registry,
            breaker,
            initialized: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        })
    }
}

/// Decrements the in-flight counter when a call completes.
struct InFlightGuard<'a> {
    engine: &'a WorkflowEngine,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.engine.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.engine.drained.notify_waiters();
        }
    }
}

/// The workflow engine: one instance per backend pairing.
pub struct WorkflowEngine {
    name: String,
    connect_retry: RetrySettings,
    invoke_retry: RetrySettings,
    fail_fast: bool,
    source: Option<Arc<dyn SourcePort>>,
    sink: Option<Arc<dyn SinkPort>>,
    validators: ValidatorSet,
    registry: ResourceRegistry,
    breaker: Option<CircuitBreaker>,
    initialized: AtomicBool,
    draining: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl WorkflowEngine {
    /// Start building an engine.
    #[must_use]
    pub fn builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::new()
    }

    /// Engine name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The engine's resource registry, for introspection.
    #[must_use]
    pub const fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Whether a read handler is attached.
    #[must_use]
    pub const fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Whether a write handler is attached.
    #[must_use]
    pub const fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Whether the engine is draining.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Connect every registered handle under the connect retry budget and
    /// admit traffic. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a transport failure naming the final error once the connect
    /// budget of any handle is exhausted; handles connected before the
    /// failure stay connected.
    pub async fn initialize(&self) -> Result<(), EngineError> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        for handle in self.registry.handles() {
            let capability = handle.capability();
            retry::execute("connect", &self.connect_retry, || capability.connect())
                .await
                .map_err(|failure| {
                    tracing::error!(
                        engine = %self.name,
                        resource = handle.name(),
                        attempts = failure.attempts,
                        "Resource failed to connect"
                    );
                    EngineError::transport(None, failure.class, failure.attempts, failure.error)
                })?;
            tracing::info!(engine = %self.name, resource = handle.name(), "Resource connected");
        }

        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!(engine = %self.name, resources = self.registry.len(), "Engine initialized");
        Ok(())
    }

    /// Stop admitting new operations; in-flight calls run to completion.
    pub fn begin_drain(&self) {
        if !self.draining.swap(true, Ordering::SeqCst) {
            tracing::info!(engine = %self.name, "Engine draining");
        }
    }

    /// Drain, wait for in-flight operations, and close every handle.
    ///
    /// Close failures are aggregated in the report, never raised.
    pub async fn shutdown(&self) -> CloseReport {
        self.begin_drain();

        loop {
            let notified = self.drained.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }

        let report = self.registry.close_all().await;
        tracing::info!(
            engine = %self.name,
            closed = report.closed,
            failures = report.failures.len(),
            "Engine shut down"
        );
        report
    }

    // ------------------------------------------------------------------
    // Generic operations
    // ------------------------------------------------------------------

    /// Read a series of one record variant.
    ///
    /// # Errors
    ///
    /// Configuration when the engine is uninitialized, draining, or has
    /// no source; Transport when the handler fails past the retry budget;
    /// Validation when returned records violate structural rules.
    pub async fn read<R: SeriesRecord>(&self, query: &SeriesQuery) -> Result<Vec<R>, EngineError> {
        self.admit(R::READ_OP)?;
        let _guard = self.track();
        let started = Instant::now();

        let result = self.read_inner::<R>(query).await;
        observability::record_workflow_call(
            R::READ_OP,
            outcome_label(&result),
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn read_inner<R: SeriesRecord>(
        &self,
        query: &SeriesQuery,
    ) -> Result<Vec<R>, EngineError> {
        let source = self.source.as_ref().ok_or_else(|| {
            EngineError::configuration(format!("no source handler for {}", R::READ_OP))
        })?;

        let records = self
            .dispatch(R::READ_OP, || R::fetch_from(source.as_ref(), query))
            .await?;

        let report = self.validate_batch(&records);
        if !report.is_valid() {
            return Err(EngineError::validation(R::READ_OP, report));
        }
        Ok(records)
    }

    /// Write one record of one variant.
    ///
    /// The record is validated before the handler is invoked; validation
    /// failures are final and never reach the backend.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`read`](Self::read).
    pub async fn write<R: SeriesRecord>(&self, record: &R) -> Result<(), EngineError> {
        self.admit(R::WRITE_OP)?;
        let _guard = self.track();
        let started = Instant::now();

        let result = self.write_one(record).await;
        observability::record_workflow_call(
            R::WRITE_OP,
            outcome_label(&result),
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn write_one<R: SeriesRecord>(&self, record: &R) -> Result<(), EngineError> {
        let report = self.validators.validate(record);
        if !report.is_valid() {
            return Err(EngineError::validation(R::WRITE_OP, report));
        }

        let sink = self.sink.as_ref().ok_or_else(|| {
            EngineError::configuration(format!("no sink handler for {}", R::WRITE_OP))
        })?;

        self.dispatch(R::WRITE_OP, || record.store_to(sink.as_ref()))
            .await
    }

    /// Write a batch of records, aggregating per-record failures.
    ///
    /// The batch itself succeeds even when records fail; failures show in
    /// the outcome's counts and details. With `fail_fast` configured, the
    /// first failure stops admission of the remaining records.
    ///
    /// # Errors
    ///
    /// Configuration only: uninitialized or draining engine.
    pub async fn write_batch<R: SeriesRecord>(
        &self,
        records: &[R],
    ) -> Result<BatchOutcome, EngineError> {
        self.admit(R::WRITE_OP)?;
        let _guard = self.track();

        let mut outcome = BatchOutcome::default();
        for (index, record) in records.iter().enumerate() {
            match self.write_one(record).await {
                Ok(()) => outcome.record_success(),
                Err(error) => {
                    outcome.record_failure(index, record, &error);
                    if self.fail_fast {
                        tracing::warn!(
                            engine = %self.name,
                            operation = %R::WRITE_OP,
                            index,
                            "Batch stopped at first failure"
                        );
                        break;
                    }
                }
            }
        }

        observability::record_batch_outcome(
            R::WRITE_OP,
            outcome.success_count as u64,
            outcome.failure_count as u64,
        );
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Per-variant wrappers
    // ------------------------------------------------------------------

    /// Read a price series.
    pub async fn read_prices(&self, query: &SeriesQuery) -> Result<Vec<PriceRecord>, EngineError> {
        self.read(query).await
    }

    /// Read an OHLCV bar series.
    pub async fn read_ohlcv(&self, query: &SeriesQuery) -> Result<Vec<OhlcvRecord>, EngineError> {
        self.read(query).await
    }

    /// Read an analytics series.
    pub async fn read_analytics(
        &self,
        query: &SeriesQuery,
    ) -> Result<Vec<MarketAnalyticsRecord>, EngineError> {
        self.read(query).await
    }

    /// Read a top-of-book series.
    pub async fn read_top_of_book(
        &self,
        query: &SeriesQuery,
    ) -> Result<Vec<TopOfBookRecord>, EngineError> {
        self.read(query).await
    }

    /// Write one price record.
    pub async fn write_price(&self, record: &PriceRecord) -> Result<(), EngineError> {
        self.write(record).await
    }

    /// Write one OHLCV bar.
    pub async fn write_ohlcv(&self, record: &OhlcvRecord) -> Result<(), EngineError> {
        self.write(record).await
    }

    /// Write one analytics record.
    pub async fn write_analytics(&self, record: &MarketAnalyticsRecord) -> Result<(), EngineError> {
        self.write(record).await
    }

    /// Write one top-of-book record.
    pub async fn write_top_of_book(&self, record: &TopOfBookRecord) -> Result<(), EngineError> {
        self.write(record).await
    }

    /// Write a batch of price records.
    pub async fn write_prices(&self, records: &[PriceRecord]) -> Result<BatchOutcome, EngineError> {
        self.write_batch(records).await
    }

    /// Write a batch of OHLCV bars.
    pub async fn write_ohlcv_batch(
        &self,
        records: &[OhlcvRecord],
    ) -> Result<BatchOutcome, EngineError> {
        self.write_batch(records).await
    }

    /// Write a batch of analytics records.
    pub async fn write_analytics_batch(
        &self,
        records: &[MarketAnalyticsRecord],
    ) -> Result<BatchOutcome, EngineError> {
        self.write_batch(records).await
    }

    /// Write a batch of top-of-book records.
    pub async fn write_top_of_book_batch(
        &self,
        records: &[TopOfBookRecord],
    ) -> Result<BatchOutcome, EngineError> {
        self.write_batch(records).await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn admit(&self, operation: Operation) -> Result<(), EngineError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(EngineError::configuration(format!(
                "engine is not initialized; {operation} rejected"
            )));
        }
        if self.is_draining() {
            return Err(EngineError::configuration(format!(
                "engine is draining; {operation} rejected"
            )));
        }
        Ok(())
    }

    fn track(&self) -> InFlightGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard { engine: self }
    }

    /// Run one handler call through the circuit gate and the invoke
    /// retry budget.
    async fn dispatch<T, F, Fut>(&self, operation: Operation, call: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HandlerError>>,
    {
        if let Some(breaker) = &self.breaker
            && !breaker.is_call_permitted()
        {
            observability::record_circuit_rejection(operation);
            return Err(EngineError::transport(
                Some(operation),
                ErrorClass::Transient,
                0,
                HandlerError::Connection {
                    message: "circuit-open".to_string(),
                },
            ));
        }

        match retry::execute(operation.as_str(), &self.invoke_retry, call).await {
            Ok(value) => {
                if let Some(breaker) = &self.breaker {
                    breaker.record_success();
                }
                Ok(value)
            }
            Err(failure) => {
                if let Some(breaker) = &self.breaker {
                    breaker.record_failure();
                }
                Err(EngineError::transport(
                    Some(operation),
                    failure.class,
                    failure.attempts,
                    failure.error,
                ))
            }
        }
    }

    /// Validate every returned record, prefixing issues with the record's
    /// position.
    fn validate_batch<R: SeriesRecord>(&self, records: &[R]) -> ValidationReport {
        let mut report = ValidationReport::ok();
        for (index, record) in records.iter().enumerate() {
            for issue in self.validators.validate(record).issues() {
                report.push(format!("[{index}].{}", issue.field), issue.message.clone());
            }
        }
        report
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("name", &self.name)
            .field("has_source", &self.has_source())
            .field("has_sink", &self.has_sink())
            .field("resources", &self.registry.len())
            .field("initialized", &self.initialized.load(Ordering::SeqCst))
            .field("draining", &self.is_draining())
            .finish()
    }
}

fn outcome_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(EngineError::Validation { .. }) => "validation",
        Err(EngineError::Transport { .. }) => "transport",
        Err(EngineError::Configuration { .. }) => "configuration",
        Err(EngineError::SchemaDrift { .. }) => "schema_drift",
    }
}
