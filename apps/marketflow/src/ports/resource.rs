//! Resource Capability Port
//!
//! Defines the lifecycle every managed backend handle implements. The
//! registry owns handles through this abstraction; the engine connects
//! them at startup and closes them at shutdown without knowing whether a
//! handle wraps an HTTP client, a stream producer, or a database pool.

use async_trait::async_trait;
use serde_json::Value;

use super::handler::HandlerError;

/// Lifecycle and invocation surface of a managed backend handle.
#[async_trait]
pub trait ResourceCapability: Send + Sync {
    /// Establish the backend connection.
    ///
    /// Called during engine initialization, under the connect retry
    /// budget. Must be safe to call again after a failure.
    async fn connect(&self) -> Result<(), HandlerError>;

    /// Invoke a named backend operation with an opaque payload.
    ///
    /// This is the generic escape hatch for operations outside the typed
    /// port surface (health probes, maintenance commands).
    async fn invoke(&self, operation: &str, payload: Value) -> Result<Value, HandlerError>;

    /// Release the backend connection.
    ///
    /// Called exactly once per handle during shutdown.
    async fn close(&self) -> Result<(), HandlerError>;
}
