//! Gateway CRD
//!
//! Declares the TURN listeners STUNner should expose.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::condition::Condition;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1alpha2",
    kind = "Gateway",
    namespaced,
    status = "GatewayStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// Name of the GatewayClass this Gateway belongs to
    pub gateway_class_name: String,

    /// Listeners to expose
    #[serde(default)]
    pub listeners: Vec<Listener>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    /// Listener name, unique within the Gateway
    pub name: String,

    /// Port to listen on
    pub port: i32,

    /// Listener protocol
    pub protocol: ListenerProtocol,
}

/// Listener protocols
///
/// Only the TURN protocols are served by STUNner; anything else (`HTTP` on a
/// Gateway of another controller, say) deserializes as `Unknown`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListenerProtocol {
    /// TURN over UDP
    Udp,

    /// TURN over TCP
    Tcp,

    /// TURN over TLS
    Tls,

    /// TURN over DTLS
    Dtls,

    /// Not a TURN protocol
    #[serde(other)]
    Unknown,
}

impl ListenerProtocol {
    /// Transport protocol a Service port must carry to expose this listener,
    /// `None` for non-TURN listeners
    pub fn transport(self) -> Option<&'static str> {
        match self {
            Self::Udp | Self::Dtls => Some("UDP"),
            Self::Tcp | Self::Tls => Some("TCP"),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for ListenerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Udp => "UDP",
            Self::Tcp => "TCP",
            Self::Tls => "TLS",
            Self::Dtls => "DTLS",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    /// Public addresses the Gateway is reachable at
    #[serde(default)]
    pub addresses: Vec<GatewayAddress>,

    /// Gateway conditions ("Scheduled", "Ready")
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Per-listener status
    #[serde(default)]
    pub listeners: Vec<ListenerStatus>,
}

/// A reachable address of a Gateway
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAddress {
    /// Address type
    #[serde(rename = "type")]
    pub type_: AddressType,

    /// Address value
    pub value: String,
}

/// Type of a Gateway address
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressType {
    /// IPv4 or IPv6 literal
    #[serde(rename = "IPAddress")]
    IpAddress,

    /// DNS hostname
    Hostname,

    /// Any other address type (`NamedAddress`, vendor types)
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatus {
    /// Listener name
    pub name: String,

    /// Number of routes attached to the listener
    pub attached_routes: i32,

    /// Listener conditions ("Ready")
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
