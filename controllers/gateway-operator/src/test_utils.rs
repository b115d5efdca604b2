//! Test utilities for unit testing the render pipeline
//!
//! Builders for the watched resources and the canonical "ours"/"default"/"gw1"
//! fixture used across the renderer and operator tests.

use crate::config::{DEFAULT_CONTROLLER_NAME, PUBLIC_ADDRESS_ANNOTATION, RELATED_GATEWAY_ANNOTATION};
use crate::store::{Object, Store};
use crds::*;
use k8s_openapi::api::core::v1::{
    LoadBalancerIngress, LoadBalancerStatus, PortStatus, Service, ServicePort, ServiceSpec,
    ServiceStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

fn meta(namespace: Option<&str>, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(|s| s.to_string()),
        generation: Some(1),
        ..Default::default()
    }
}

/// Helper to create a GatewayClass pointing to a GatewayConfig
pub fn create_test_gateway_class(name: &str, config: Option<(&str, &str)>) -> GatewayClass {
    GatewayClass {
        metadata: meta(None, name),
        spec: GatewayClassSpec {
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
            parameters_ref: config.map(|(ns, name)| ParametersReference {
                group: STUNNER_GROUP.to_string(),
                kind: "GatewayConfig".to_string(),
                name: name.to_string(),
                namespace: Some(ns.to_string()),
            }),
            description: None,
        },
        status: None,
    }
}

/// Helper to create a GatewayConfig with defaults and plaintext credentials
pub fn create_test_gateway_config(namespace: &str, name: &str) -> GatewayConfig {
    GatewayConfig {
        metadata: meta(Some(namespace), name),
        spec: GatewayConfigSpec {
            realm: Some("stunner.l7mp.io".to_string()),
            auth_type: Some("plaintext".to_string()),
            user_name: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..Default::default()
        },
    }
}

/// Helper to create a Gateway with `(name, protocol, port)` listeners
pub fn create_test_gateway(
    namespace: &str,
    name: &str,
    class: &str,
    listeners: &[(&str, ListenerProtocol, i32)],
) -> Gateway {
    Gateway {
        metadata: meta(Some(namespace), name),
        spec: GatewaySpec {
            gateway_class_name: class.to_string(),
            listeners: listeners
                .iter()
                .map(|(name, protocol, port)| Listener {
                    name: name.to_string(),
                    port: *port,
                    protocol: *protocol,
                })
                .collect(),
        },
        status: None,
    }
}

/// Helper to create a UDPRoute attached to `parents` (`(namespace, name)`)
/// with one rule listing `backends`
pub fn create_test_udp_route(
    namespace: &str,
    name: &str,
    parents: &[(&str, &str)],
    backends: &[&str],
) -> UDPRoute {
    UDPRoute {
        metadata: meta(Some(namespace), name),
        spec: UDPRouteSpec {
            parent_refs: parents
                .iter()
                .map(|(ns, name)| ParentReference {
                    namespace: Some(ns.to_string()),
                    name: name.to_string(),
                    ..Default::default()
                })
                .collect(),
            rules: vec![UDPRouteRule {
                backend_refs: backends
                    .iter()
                    .map(|name| BackendObjectReference {
                        name: name.to_string(),
                        ..Default::default()
                    })
                    .collect(),
            }],
        },
        status: None,
    }
}

/// A Service port: `(name, protocol, port)`; protocol `None` means TCP
pub type TestPort<'a> = (Option<&'a str>, Option<&'a str>, i32);

/// Helper to create a Service related to `gateway` (`namespace/name`) with
/// load-balancer ingress IPs
pub fn create_test_service(
    namespace: &str,
    name: &str,
    gateway: Option<&str>,
    ports: &[TestPort<'_>],
    ingress_ips: &[&str],
) -> Service {
    let mut annotations = BTreeMap::new();
    if let Some(gw) = gateway {
        annotations.insert(RELATED_GATEWAY_ANNOTATION.to_string(), gw.to_string());
    }
    Service {
        metadata: ObjectMeta {
            annotations: Some(annotations),
            ..meta(Some(namespace), name)
        },
        spec: Some(ServiceSpec {
            ports: Some(
                ports
                    .iter()
                    .map(|(name, protocol, port)| ServicePort {
                        name: name.map(|s| s.to_string()),
                        protocol: protocol.map(|s| s.to_string()),
                        port: *port,
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(
                    ingress_ips
                        .iter()
                        .map(|ip| LoadBalancerIngress {
                            ip: Some(ip.to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
            }),
            ..Default::default()
        }),
    }
}

/// Set the public-address override annotation on a Service
pub fn with_public_address(mut svc: Service, value: &str) -> Service {
    svc.metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(PUBLIC_ADDRESS_ANNOTATION.to_string(), value.to_string());
    svc
}

/// Replace the ingress list of a Service
pub fn with_ingress(mut svc: Service, ingress: Vec<LoadBalancerIngress>) -> Service {
    if let Some(status) = svc.status.as_mut() {
        status.load_balancer = Some(LoadBalancerStatus { ingress: Some(ingress) });
    }
    svc
}

/// Ingress entry listing the ports it serves
pub fn ingress_for_ports(ip: &str, ports: &[(&str, i32)]) -> LoadBalancerIngress {
    LoadBalancerIngress {
        ip: Some(ip.to_string()),
        ports: Some(
            ports
                .iter()
                .map(|(protocol, port)| PortStatus {
                    port: *port,
                    protocol: protocol.to_string(),
                    error: None,
                })
                .collect(),
        ),
        ..Default::default()
    }
}

/// Store holding the canonical fixture: class "ours" -> config
/// "default/default", Gateway "default/gw1" with one UDP/1 listener, Service
/// "default/svc1" with port UDP/1 and ingress 1.2.3.4
pub fn create_test_store() -> Store {
    let store = Store::new();
    let objects = [
        Object::GatewayClass(create_test_gateway_class("ours", Some(("default", "default")))),
        Object::GatewayConfig(create_test_gateway_config("default", "default")),
        Object::Gateway(create_test_gateway(
            "default",
            "gw1",
            "ours",
            &[("udp", ListenerProtocol::Udp, 1)],
        )),
        Object::Service(create_test_service(
            "default",
            "svc1",
            Some("default/gw1"),
            &[(None, Some("UDP"), 1)],
            &["1.2.3.4"],
        )),
    ];
    for object in objects {
        store.upsert(object).unwrap();
    }
    store
}
