//! Error types for the ISP control runtime.
//!
//! `IspError` is the single error type returned by every client entry point
//! and carried through completion slots from the worker threads back to the
//! caller.
//!
//! ## Error Hierarchy
//!
//! - **`Param` / `ParamNull`**: client input rejected at the API boundary.
//!   Validation runs before any message is posted, so these never reach a
//!   worker thread.
//! - **`Alloc`**: the context table could not be allocated.
//! - **`QueueFull` / `QueueDestroyed`**: message-queue failures. A destroyed
//!   queue is how a blocked worker learns it has to exit.
//! - **`NoSupport`**: the request names something the runtime or the driver
//!   does not implement.
//! - **`NotInitialized` / `HandleInUse` / `HandleLimit`**: handle lifecycle
//!   misuse.
//! - **`Hardware`**: wraps [`HalError`] from the register driver. Inside the
//!   worker loops these are logged and the loop carries on.
//! - **`WorkerSpawn`**: a worker thread could not be created; initialization
//!   is aborted.
//! - **`Abandoned`**: the worker dropped a completion without answering,
//!   because its queue was torn down or the worker itself died.

use isp_hal::{HalError, HandleId};
use thiserror::Error;

use crate::completion::SyncPoint;
use crate::config::ConfigError;

/// Convenience alias for results using the runtime error type.
pub type IspResult<T> = std::result::Result<T, IspError>;

/// Error returned by the runtime; see the module docs for the categories.
#[derive(Error, Debug)]
pub enum IspError {
    /// A client parameter was out of range
    #[error("Invalid parameter: {0}")]
    Param(String),

    /// A required parameter was absent
    #[error("Required parameter missing: {0}")]
    ParamNull(&'static str),

    /// Memory for runtime state could not be reserved
    #[error("Allocation failed: {0}")]
    Alloc(String),

    /// The target queue already holds `capacity` messages
    #[error("Message queue full (capacity {capacity})")]
    QueueFull {
        /// Queue capacity
        capacity: usize,
    },

    /// The target queue was torn down
    #[error("Message queue destroyed")]
    QueueDestroyed,

    /// The runtime or driver does not implement the request
    #[error("Not supported: {0}")]
    NoSupport(String),

    /// No session is open for the handle
    #[error("Handle {0} is not initialized")]
    NotInitialized(HandleId),

    /// The handle already has a session
    #[error("Handle {0} is already initialized")]
    HandleInUse(HandleId),

    /// Every handle slot is taken
    #[error("Handle limit reached ({max} active)")]
    HandleLimit {
        /// Configured handle limit
        max: usize,
    },

    /// The register driver failed
    #[error("Hardware error: {0}")]
    Hardware(#[from] HalError),

    /// An algorithm suite rejected its input
    #[error("Algorithm error: {0}")]
    Algorithm(String),

    /// A worker thread could not be created
    #[error("Failed to spawn {name} worker: {source}")]
    WorkerSpawn {
        /// Thread name
        name: &'static str,
        /// OS error
        #[source]
        source: std::io::Error,
    },

    /// The worker dropped a completion without answering
    #[error("{0:?} completion abandoned before it was signaled")]
    Abandoned(SyncPoint),

    /// Configuration could not be loaded or validated
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl IspError {
    /// Whether the error was produced by client-side validation.
    pub fn is_param(&self) -> bool {
        matches!(self, Self::Param(_) | Self::ParamNull(_))
    }

    /// Whether the error is a message-queue failure.
    pub fn is_queue(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::QueueDestroyed)
    }
}
