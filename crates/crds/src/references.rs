//! Object references used across the Gateway API CRDs
//!
//! Gateway API references are loosely typed: group and kind are optional and
//! default to the Gateway API group and the kind the field expects.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the Gateway API resources
pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

/// API group of the STUNner resources
pub const STUNNER_GROUP: &str = "stunner.l7mp.io";

/// Reference from a GatewayClass to its parameters object (a GatewayConfig)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParametersReference {
    /// API group of the referent (`stunner.l7mp.io`)
    pub group: String,

    /// Kind of the referent (`GatewayConfig`)
    pub kind: String,

    /// Name of the referent
    pub name: String,

    /// Namespace of the referent (GatewayClass is cluster scoped, so this is
    /// required for namespaced parameter objects)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Reference from a route to a parent Gateway
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    /// API group of the parent (defaults to the Gateway API group)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Kind of the parent (defaults to `Gateway`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Namespace of the parent (defaults to the namespace of the route)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Name of the parent Gateway
    pub name: String,

    /// Listener name to attach to; empty means every listener
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

impl ParentReference {
    /// Whether the reference points to a Gateway (group and kind either unset
    /// or set to the Gateway API defaults)
    pub fn is_gateway(&self) -> bool {
        self.group.as_deref().is_none_or(|g| g == GATEWAY_API_GROUP)
            && self.kind.as_deref().is_none_or(|k| k == "Gateway")
    }
}

/// Reference from a route rule to a backend Service
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BackendObjectReference {
    /// API group of the backend (empty for core Services)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Kind of the backend (defaults to `Service`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Name of the backend Service
    pub name: String,

    /// Namespace of the backend (defaults to the namespace of the route)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Target port on the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}
