//! UDPRoute CRD
//!
//! Binds one or more Gateways to backend Services that receive relayed UDP
//! traffic.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use crate::condition::Condition;
use crate::references::{BackendObjectReference, ParentReference};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1alpha2",
    kind = "UDPRoute",
    namespaced,
    status = "UDPRouteStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct UDPRouteSpec {
    /// Gateways this route attaches to
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,

    /// Routing rules
    #[serde(default)]
    pub rules: Vec<UDPRouteRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UDPRouteRule {
    /// Backends receiving the traffic
    #[serde(default)]
    pub backend_refs: Vec<BackendObjectReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UDPRouteStatus {
    /// Status per parent Gateway
    #[serde(default)]
    pub parents: Vec<RouteParentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteParentStatus {
    /// The parent this status refers to
    pub parent_ref: ParentReference,

    /// Controller that wrote this entry
    pub controller_name: String,

    /// Conditions ("Accepted", "ResolvedRefs")
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
