//! ResourceClient trait for mocking
//!
//! The updater only ever talks to the cluster through this trait, so tests can
//! swap in an in-memory implementation.

use crate::error::ClientError;
use crate::models::{ObjectStatus, TargetRef};
use std::collections::BTreeMap;

/// Write-back operations against the cluster
///
/// All writes are guarded by a resourceVersion read beforehand: a stale
/// version yields [`ClientError::Conflict`].
#[async_trait::async_trait]
pub trait ResourceClient: Send + Sync {
    /// Current resourceVersion of the target
    async fn resource_version(&self, target: &TargetRef) -> Result<String, ClientError>;

    /// Current resourceVersion and status of the target
    async fn read_status(&self, target: &TargetRef) -> Result<ObjectStatus, ClientError>;

    /// Merge-patch the status subresource of the target
    async fn patch_status(
        &self,
        target: &TargetRef,
        resource_version: &str,
        status: &serde_json::Value,
    ) -> Result<(), ClientError>;

    /// Create the ConfigMap (`resource_version == None`) or replace it
    async fn apply_config_map(
        &self,
        target: &TargetRef,
        resource_version: Option<&str>,
        data: BTreeMap<String, String>,
    ) -> Result<(), ClientError>;
}
