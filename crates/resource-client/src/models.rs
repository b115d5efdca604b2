//! Write targets

use std::fmt;

/// Kinds of resources the operator writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetKind {
    /// Status subresource of a GatewayClass
    GatewayClass,

    /// Status subresource of a Gateway
    Gateway,

    /// Status subresource of a UDPRoute
    UdpRoute,

    /// The rendered dataplane configuration artifact
    ConfigMap,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GatewayClass => "GatewayClass",
            Self::Gateway => "Gateway",
            Self::UdpRoute => "UDPRoute",
            Self::ConfigMap => "ConfigMap",
        };
        f.write_str(s)
    }
}

/// Status of an object as last read, with the version it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStatus {
    /// resourceVersion to guard the following write with
    pub resource_version: String,
    /// Status subresource, `None` when never written
    pub status: Option<serde_json::Value>,
}

/// A resource addressed by kind and namespaced name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetRef {
    /// Resource kind
    pub kind: TargetKind,

    /// Namespace, `None` for cluster-scoped kinds
    pub namespace: Option<String>,

    /// Resource name
    pub name: String,
}

impl TargetRef {
    /// Reference to a namespaced resource
    pub fn namespaced(kind: TargetKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Reference to a cluster-scoped resource
    pub fn cluster(kind: TargetKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}
