//! Public address resolution for Gateway listeners.
//!
//! A listener is reachable at the address of the first associated Service that
//! exposes it. The public-address annotation on a Service overrides whatever the
//! load balancer reports; otherwise the listener must match a Service port by
//! transport and number and the address comes from the ingress entry tied to
//! that port.

use crate::config::PUBLIC_ADDRESS_ANNOTATION;
use crate::store::ObjectKey;
use crds::{AddressType, GatewayAddress, Listener};
use k8s_openapi::api::core::v1::{LoadBalancerIngress, Service, ServicePort};
use kube::ResourceExt;
use std::net::IpAddr;
use thiserror::Error;

/// Why a listener has no public address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// No Service is associated with the Gateway
    #[error("no Service associated with the Gateway")]
    NoService,

    /// The listener does not speak a TURN protocol
    #[error("unsupported listener protocol")]
    UnsupportedProtocol,

    /// The override annotation is neither an IP literal nor a hostname
    #[error("malformed public address annotation {value:?} on Service {service}")]
    MalformedAnnotation {
        /// Service carrying the annotation
        service: String,
        /// Annotation value
        value: String,
    },

    /// No Service port carries the listener's transport and port number
    #[error("Service {service} exposes no {transport} port {port}")]
    PortMismatch {
        /// Candidate Service
        service: String,
        /// Required transport
        transport: &'static str,
        /// Listener port
        port: i32,
    },

    /// The matched Service has no usable load-balancer ingress
    #[error("Service {service} has no load balancer address")]
    NoLoadBalancerAddress {
        /// Matched Service
        service: String,
    },
}

/// Resolved public endpoint of a listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicAddress {
    /// Address and its type
    pub address: GatewayAddress,
    /// Public port
    pub port: i32,
}

/// Resolve the public address of `listener` among `services`
///
/// Services are tried in the given order and the first one that resolves wins.
/// A malformed override annotation is reported immediately; otherwise, when no
/// Service resolves, the first failure is returned.
pub fn resolve_public_address<'a, I>(listener: &Listener, services: I) -> Result<PublicAddress, ResolutionError>
where
    I: IntoIterator<Item = &'a Service>,
{
    if listener.protocol.transport().is_none() {
        return Err(ResolutionError::UnsupportedProtocol);
    }
    let mut first_error = None;
    for svc in services {
        match resolve_for_service(listener, svc) {
            Ok(addr) => return Ok(addr),
            Err(e @ ResolutionError::MalformedAnnotation { .. }) => return Err(e),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    Err(first_error.unwrap_or(ResolutionError::NoService))
}

/// Resolve the public address of `listener` through a single Service
pub fn resolve_for_service(listener: &Listener, svc: &Service) -> Result<PublicAddress, ResolutionError> {
    let service = ObjectKey::of(svc).map(|k| k.to_string()).unwrap_or_default();

    if let Some(value) = svc.annotations().get(PUBLIC_ADDRESS_ANNOTATION) {
        let address = parse_address(value).ok_or_else(|| ResolutionError::MalformedAnnotation {
            service: service.clone(),
            value: value.clone(),
        })?;
        return Ok(PublicAddress {
            address,
            port: listener.port,
        });
    }

    let transport = listener.protocol.transport().ok_or(ResolutionError::UnsupportedProtocol)?;
    let ports = svc
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_deref())
        .unwrap_or_default();
    let (index, port) = ports
        .iter()
        .enumerate()
        .find(|(_, p)| port_matches(p, transport, listener.port))
        .ok_or_else(|| ResolutionError::PortMismatch {
            service: service.clone(),
            transport,
            port: listener.port,
        })?;

    let ingress = svc
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_deref())
        .unwrap_or_default();
    let address = address_for_port(ingress, index, transport, port.port)
        .ok_or(ResolutionError::NoLoadBalancerAddress { service })?;

    Ok(PublicAddress {
        address,
        port: port.port,
    })
}

// Absent protocol means TCP.
fn port_matches(port: &ServicePort, transport: &str, number: i32) -> bool {
    port.port == number
        && port
            .protocol
            .as_deref()
            .unwrap_or("TCP")
            .eq_ignore_ascii_case(transport)
}

/// Address of the ingress entry tied to the service port at `index`
///
/// An entry listing the port in its port status wins; otherwise the entry at
/// the same position, otherwise the first entry.
pub fn address_for_port(
    ingress: &[LoadBalancerIngress],
    index: usize,
    transport: &str,
    port: i32,
) -> Option<GatewayAddress> {
    let listed = ingress.iter().find(|entry| {
        entry.ports.as_deref().is_some_and(|ports| {
            ports
                .iter()
                .any(|p| p.port == port && p.protocol.eq_ignore_ascii_case(transport))
        })
    });

    listed
        .and_then(ingress_address)
        .or_else(|| ingress.get(index).and_then(ingress_address))
        .or_else(|| ingress.first().and_then(ingress_address))
}

// IP wins over hostname.
fn ingress_address(entry: &LoadBalancerIngress) -> Option<GatewayAddress> {
    if let Some(ip) = entry.ip.as_deref().filter(|ip| !ip.is_empty()) {
        return Some(GatewayAddress {
            type_: AddressType::IpAddress,
            value: ip.to_string(),
        });
    }
    entry
        .hostname
        .as_deref()
        .filter(|h| !h.is_empty())
        .map(|h| GatewayAddress {
            type_: AddressType::Hostname,
            value: h.to_string(),
        })
}

/// Classify an override annotation value
///
/// Dotted all-numeric strings that fail IP parsing are rejected rather than
/// taken as hostnames.
pub fn parse_address(value: &str) -> Option<GatewayAddress> {
    let value = value.trim();
    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(GatewayAddress {
            type_: AddressType::IpAddress,
            value: ip.to_string(),
        });
    }
    if value.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    is_rfc1123_hostname(value).then(|| GatewayAddress {
        type_: AddressType::Hostname,
        value: value.to_string(),
    })
}

fn is_rfc1123_hostname(value: &str) -> bool {
    if value.is_empty() || value.len() > 253 {
        return false;
    }
    value.split('.').all(|label| {
        let bytes = label.as_bytes();
        !bytes.is_empty()
            && bytes.len() <= 63
            && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
            && bytes.first().is_some_and(u8::is_ascii_alphanumeric)
            && bytes.last().is_some_and(u8::is_ascii_alphanumeric)
    })
}
