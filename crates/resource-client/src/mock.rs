//! Mock ResourceClient for unit testing
//!
//! Stores objects in memory with a monotonically increasing resourceVersion
//! and can be told to fail specific targets.

use crate::client_trait::ResourceClient;
use crate::error::ClientError;
use crate::models::{ObjectStatus, TargetKind, TargetRef};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-memory object
#[derive(Debug, Clone, Default)]
pub struct MockObject {
    /// Current resourceVersion
    pub resource_version: u64,
    /// Last status written
    pub status: Option<serde_json::Value>,
    /// ConfigMap data
    pub data: Option<BTreeMap<String, String>>,
}

/// Mock ResourceClient for testing
#[derive(Debug, Clone, Default)]
pub struct MockResourceClient {
    objects: Arc<Mutex<HashMap<TargetRef, MockObject>>>,
    // Number of conflicts still to inject per target
    conflicts: Arc<Mutex<HashMap<TargetRef, u32>>>,
    // Targets that always fail with an API error
    failures: Arc<Mutex<HashMap<TargetRef, String>>>,
    // Successful writes, in order
    writes: Arc<Mutex<Vec<TargetRef>>>,
    next_version: Arc<Mutex<u64>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockResourceClient {
    /// Create an empty mock
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_version(&self) -> u64 {
        let mut v = lock(&self.next_version);
        *v += 1;
        *v
    }

    /// Add an object so status patches against it succeed (for test setup)
    pub fn add_object(&self, target: TargetRef) {
        let resource_version = self.bump_version();
        lock(&self.objects).insert(target, MockObject {
            resource_version,
            ..Default::default()
        });
    }

    /// Add an object already carrying `status` (for test setup)
    pub fn add_object_with_status(&self, target: TargetRef, status: serde_json::Value) {
        let resource_version = self.bump_version();
        lock(&self.objects).insert(target, MockObject {
            resource_version,
            status: Some(status),
            data: None,
        });
    }

    /// Delete an object (for test setup)
    pub fn remove_object(&self, target: &TargetRef) {
        lock(&self.objects).remove(target);
    }

    /// Make the next `count` writes to `target` fail with a conflict
    pub fn inject_conflicts(&self, target: TargetRef, count: u32) {
        lock(&self.conflicts).insert(target, count);
    }

    /// Make every write to `target` fail with an API error
    pub fn fail_with(&self, target: TargetRef, message: impl Into<String>) {
        lock(&self.failures).insert(target, message.into());
    }

    /// Last status written to `target`
    pub fn status(&self, target: &TargetRef) -> Option<serde_json::Value> {
        lock(&self.objects).get(target).and_then(|o| o.status.clone())
    }

    /// Data of the ConfigMap `target`
    pub fn config_map(&self, target: &TargetRef) -> Option<BTreeMap<String, String>> {
        lock(&self.objects).get(target).and_then(|o| o.data.clone())
    }

    /// Successful writes in the order they happened
    pub fn writes(&self) -> Vec<TargetRef> {
        lock(&self.writes).clone()
    }

    // Shared precondition checks for every write
    fn check_write(&self, target: &TargetRef) -> Result<(), ClientError> {
        if let Some(msg) = lock(&self.failures).get(target) {
            return Err(ClientError::Api(msg.clone()));
        }
        let mut conflicts = lock(&self.conflicts);
        if let Some(remaining) = conflicts.get_mut(target) {
            if *remaining > 0 {
                *remaining -= 1;
                drop(conflicts);
                // Somebody else wrote in the meantime
                let resource_version = self.bump_version();
                if let Some(obj) = lock(&self.objects).get_mut(target) {
                    obj.resource_version = resource_version;
                }
                return Err(ClientError::Conflict(format!("{target} was modified")));
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResourceClient for MockResourceClient {
    async fn resource_version(&self, target: &TargetRef) -> Result<String, ClientError> {
        lock(&self.objects)
            .get(target)
            .map(|o| o.resource_version.to_string())
            .ok_or_else(|| ClientError::NotFound(target.to_string()))
    }

    async fn read_status(&self, target: &TargetRef) -> Result<ObjectStatus, ClientError> {
        lock(&self.objects)
            .get(target)
            .map(|o| ObjectStatus {
                resource_version: o.resource_version.to_string(),
                status: o.status.clone(),
            })
            .ok_or_else(|| ClientError::NotFound(target.to_string()))
    }

    async fn patch_status(
        &self,
        target: &TargetRef,
        resource_version: &str,
        status: &serde_json::Value,
    ) -> Result<(), ClientError> {
        self.check_write(target)?;
        let next = self.bump_version();
        let mut objects = lock(&self.objects);
        let obj = objects
            .get_mut(target)
            .ok_or_else(|| ClientError::NotFound(target.to_string()))?;
        if obj.resource_version.to_string() != resource_version {
            return Err(ClientError::Conflict(format!("{target} was modified")));
        }
        obj.status = Some(status.clone());
        obj.resource_version = next;
        drop(objects);
        lock(&self.writes).push(target.clone());
        Ok(())
    }

    async fn apply_config_map(
        &self,
        target: &TargetRef,
        resource_version: Option<&str>,
        data: BTreeMap<String, String>,
    ) -> Result<(), ClientError> {
        if target.kind != TargetKind::ConfigMap {
            return Err(ClientError::Api(format!("{target} is not a ConfigMap")));
        }
        self.check_write(target)?;
        let next = self.bump_version();
        let mut objects = lock(&self.objects);
        match (objects.get_mut(target), resource_version) {
            (None, None) => {
                objects.insert(target.clone(), MockObject {
                    resource_version: next,
                    status: None,
                    data: Some(data),
                });
            }
            (None, Some(_)) => return Err(ClientError::NotFound(target.to_string())),
            (Some(_), None) => return Err(ClientError::Conflict(format!("{target} already exists"))),
            (Some(obj), Some(rv)) => {
                if obj.resource_version.to_string() != rv {
                    return Err(ClientError::Conflict(format!("{target} was modified")));
                }
                obj.data = Some(data);
                obj.resource_version = next;
            }
        }
        drop(objects);
        lock(&self.writes).push(target.clone());
        Ok(())
    }
}
