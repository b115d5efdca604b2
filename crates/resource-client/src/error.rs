//! Resource client errors

use thiserror::Error;

/// Errors that can occur when writing back to the cluster
#[derive(Debug, Error)]
pub enum ClientError {
    /// The target resource does not exist (anymore)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The resourceVersion used for the write is stale
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The API server rejected the request for another reason
    #[error("API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport or client-side Kubernetes error
    #[error("Kubernetes error: {0}")]
    Kube(kube::Error),
}

impl ClientError {
    /// Whether a fresh read-patch-write cycle may succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Whether the target is gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<kube::Error> for ClientError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound(ae.message),
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict(ae.message),
            kube::Error::Api(ae) => Self::Api(format!("{} ({})", ae.message, ae.code)),
            other => Self::Kube(other),
        }
    }
}
