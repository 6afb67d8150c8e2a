//! Resource Registry
//!
//! Owns every backend handle an engine manages: sources, stream targets,
//! databases. Registration order is observable — lookups return handles
//! in the order they were registered, so initialization and shutdown are
//! deterministic.
//!
//! A handle is `active` until closed; closing is terminal and exactly
//! once. `close_all` aggregates per-handle failures into a report and
//! never fails the call itself.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::ports::resource::ResourceCapability;

/// Kind of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Read-side backend (market data API, file dump).
    DataSource,
    /// Streaming write target (topic producer).
    StreamTarget,
    /// Storage write target (database pool).
    Database,
}

impl ResourceKind {
    /// Stable lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataSource => "data_source",
            Self::StreamTarget => "stream_target",
            Self::Database => "database",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One registered backend handle.
pub struct RegisteredResource {
    name: String,
    kind: ResourceKind,
    tags: Vec<String>,
    capability: Arc<dyn ResourceCapability>,
    closed: AtomicBool,
}

impl RegisteredResource {
    /// Handle name, unique within the registry.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Free-form tags attached at registration.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// The capability behind this handle.
    #[must_use]
    pub fn capability(&self) -> Arc<dyn ResourceCapability> {
        Arc::clone(&self.capability)
    }

    /// Whether the handle has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flip `active` → `closed`; returns whether this call won the flip.
    fn mark_closed(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl fmt::Debug for RegisteredResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredResource")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("tags", &self.tags)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// One handle that failed to close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseFailure {
    /// Handle name.
    pub resource: String,
    /// Close error, rendered.
    pub error: String,
}

/// Aggregate outcome of `close_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReport {
    /// Handles this call attempted to close (already-closed ones are
    /// skipped).
    pub attempted: usize,
    /// Handles closed cleanly.
    pub closed: usize,
    /// Handles whose close failed; they are still marked closed.
    pub failures: Vec<CloseFailure>,
}

impl CloseReport {
    /// Whether every attempted close succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Registry of backend handles, read-mostly.
#[derive(Default)]
pub struct ResourceRegistry {
    entries: RwLock<Vec<Arc<RegisteredResource>>>,
}

impl ResourceRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle under a unique name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the name is already registered.
    pub fn register(
        &self,
        name: impl Into<String>,
        kind: ResourceKind,
        tags: Vec<String>,
        capability: Arc<dyn ResourceCapability>,
    ) -> Result<(), EngineError> {
        let name = name.into();
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if entries.iter().any(|entry| entry.name == name) {
            return Err(EngineError::configuration(format!(
                "duplicate resource name: {name}"
            )));
        }

        tracing::info!(resource = %name, kind = %kind, "Resource registered");
        entries.push(Arc::new(RegisteredResource {
            name,
            kind,
            tags,
            capability,
            closed: AtomicBool::new(false),
        }));
        Ok(())
    }

    /// Look up a handle by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<RegisteredResource>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .find(|entry| entry.name == name)
            .cloned()
    }

    /// All handles of one kind, in registration order.
    #[must_use]
    pub fn lookup_by_kind(&self, kind: ResourceKind) -> Vec<Arc<RegisteredResource>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.kind == kind)
            .cloned()
            .collect()
    }

    /// Snapshot of every handle, in registration order.
    #[must_use]
    pub fn handles(&self) -> Vec<Arc<RegisteredResource>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of registered handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every still-active handle, aggregating failures.
    ///
    /// Each handle is closed at most once across all callers; a handle
    /// whose close fails is still marked closed. The report is the only
    /// failure surface — this call itself never fails.
    pub async fn close_all(&self) -> CloseReport {
        let snapshot = self.handles();
        let mut report = CloseReport::default();

        for entry in snapshot {
            if !entry.mark_closed() {
                continue;
            }
            report.attempted += 1;
            match entry.capability.close().await {
                Ok(()) => {
                    report.closed += 1;
                    tracing::info!(resource = %entry.name, "Resource closed");
                }
                Err(error) => {
                    tracing::warn!(resource = %entry.name, error = %error, "Resource close failed");
                    report.failures.push(CloseFailure {
                        resource: entry.name.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        report
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("entries", &self.len())
            .finish()
    }
}
