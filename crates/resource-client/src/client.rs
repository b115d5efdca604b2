//! Kubernetes-backed resource client
//!
//! Status writes are merge patches carrying `metadata.resourceVersion`, so the
//! API server rejects them with 409 when the object changed since it was read.

use crate::error::ClientError;
use crate::models::{ObjectStatus, TargetKind, TargetRef};
use crate::client_trait::ResourceClient;
use crds::{Gateway, GatewayClass, UDPRoute};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::debug;

/// Label put on every ConfigMap written by the operator
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Resource client talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
    manager: String,
}

impl std::fmt::Debug for KubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClient").field("manager", &self.manager).finish_non_exhaustive()
    }
}

impl KubeClient {
    /// Create a client; `manager` is used as the managed-by label value
    pub fn new(client: Client, manager: impl Into<String>) -> Self {
        Self {
            client,
            manager: manager.into(),
        }
    }

    fn namespace(target: &TargetRef) -> &str {
        target.namespace.as_deref().unwrap_or("default")
    }
}

async fn resource_version_of<K>(api: Api<K>, name: &str) -> Result<String, ClientError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let obj = api.get(name).await?;
    obj.meta()
        .resource_version
        .clone()
        .ok_or_else(|| ClientError::Api(format!("{name} has no resourceVersion")))
}

async fn status_of<K>(api: Api<K>, name: &str) -> Result<ObjectStatus, ClientError>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let obj = api.get(name).await?;
    let resource_version = obj
        .meta()
        .resource_version
        .clone()
        .ok_or_else(|| ClientError::Api(format!("{name} has no resourceVersion")))?;
    let status = serde_json::to_value(&obj)?
        .get("status")
        .filter(|s| !s.is_null())
        .cloned();
    Ok(ObjectStatus {
        resource_version,
        status,
    })
}

async fn patch_status_of<K>(
    api: Api<K>,
    name: &str,
    resource_version: &str,
    status: &serde_json::Value,
) -> Result<(), ClientError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let body = serde_json::json!({
        "metadata": { "resourceVersion": resource_version },
        "status": status,
    });
    let pp = PatchParams::default();
    api.patch_status(name, &pp, &Patch::Merge(&body)).await?;
    Ok(())
}

#[async_trait::async_trait]
impl ResourceClient for KubeClient {
    async fn resource_version(&self, target: &TargetRef) -> Result<String, ClientError> {
        let ns = Self::namespace(target);
        match target.kind {
            TargetKind::GatewayClass => {
                resource_version_of(Api::<GatewayClass>::all(self.client.clone()), &target.name).await
            }
            TargetKind::Gateway => {
                resource_version_of(Api::<Gateway>::namespaced(self.client.clone(), ns), &target.name).await
            }
            TargetKind::UdpRoute => {
                resource_version_of(Api::<UDPRoute>::namespaced(self.client.clone(), ns), &target.name).await
            }
            TargetKind::ConfigMap => {
                resource_version_of(Api::<ConfigMap>::namespaced(self.client.clone(), ns), &target.name).await
            }
        }
    }

    async fn read_status(&self, target: &TargetRef) -> Result<ObjectStatus, ClientError> {
        let ns = Self::namespace(target);
        match target.kind {
            TargetKind::GatewayClass => status_of(Api::<GatewayClass>::all(self.client.clone()), &target.name).await,
            TargetKind::Gateway => status_of(Api::<Gateway>::namespaced(self.client.clone(), ns), &target.name).await,
            TargetKind::UdpRoute => status_of(Api::<UDPRoute>::namespaced(self.client.clone(), ns), &target.name).await,
            TargetKind::ConfigMap => Err(ClientError::Api(format!("{target} has no status subresource"))),
        }
    }

    async fn patch_status(
        &self,
        target: &TargetRef,
        resource_version: &str,
        status: &serde_json::Value,
    ) -> Result<(), ClientError> {
        debug!("Patching status of {} at resourceVersion {}", target, resource_version);
        let ns = Self::namespace(target);
        match target.kind {
            TargetKind::GatewayClass => {
                patch_status_of(Api::<GatewayClass>::all(self.client.clone()), &target.name, resource_version, status).await
            }
            TargetKind::Gateway => {
                patch_status_of(Api::<Gateway>::namespaced(self.client.clone(), ns), &target.name, resource_version, status).await
            }
            TargetKind::UdpRoute => {
                patch_status_of(Api::<UDPRoute>::namespaced(self.client.clone(), ns), &target.name, resource_version, status).await
            }
            TargetKind::ConfigMap => Err(ClientError::Api(format!("{target} has no status subresource"))),
        }
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
        let ns = Self::namespace(target);
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), ns);

        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(target.name.clone()),
                namespace: Some(ns.to_string()),
                resource_version: resource_version.map(str::to_string),
                labels: Some(BTreeMap::from([(MANAGED_BY_LABEL.to_string(), self.manager.clone())])),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };

        let pp = PostParams::default();
        match resource_version {
            None => {
                debug!("Creating {}", target);
                api.create(&pp, &cm).await?;
            }
            Some(rv) => {
                debug!("Replacing {} at resourceVersion {}", target, rv);
                api.replace(&target.name, &pp, &cm).await?;
            }
        }
        Ok(())
    }
}
