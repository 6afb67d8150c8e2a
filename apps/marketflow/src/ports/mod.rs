//! Ports Layer
//!
//! Driven-port traits the infrastructure implements: typed handlers for
//! the operation set, and the generic resource lifecycle the registry
//! manages.

pub mod handler;
pub mod resource;

pub use handler::{HandlerError, SinkPort, SourcePort};
pub use resource::ResourceCapability;
