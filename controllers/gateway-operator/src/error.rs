//! Controller-specific error types.
//!
//! Per-listener and per-class problems never surface here: they end up in
//! resource status. What remains are startup problems and internal invariant
//! violations, the latter being fatal to the whole pipeline.

use thiserror::Error;
use kube::Error as KubeError;

/// Errors that can occur in the STUNner gateway operator.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal invariant violation (poisoned store lock, closed channel)
    #[error("Fatal: {0}")]
    Fatal(String),

    /// A component was started twice
    #[error("{0} already started")]
    AlreadyStarted(&'static str),

    /// A component was started after shutdown was requested
    #[error("{0} started after cancellation")]
    Cancelled(&'static str),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Rendered configuration could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Metrics registration or encoding failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Probe server failed
    #[error("Probe server error: {0}")]
    Io(#[from] std::io::Error),
}
