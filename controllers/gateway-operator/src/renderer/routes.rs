//! Route attachment and backend clusters.

use crate::renderer::document::{CLUSTER_TYPE_STRICT_DNS, ClusterConfig};
use crate::store::{ObjectKey, Snapshot, parent_names_gateway};
use crds::{BackendObjectReference, Gateway, Listener, UDPRoute};
use kube::ResourceExt;
use std::collections::BTreeSet;

/// `<namespace>/<name>` of a route, also the name of its cluster
pub fn route_name(route: &UDPRoute) -> String {
    ObjectKey::of(route).map(|k| k.to_string()).unwrap_or_default()
}

/// Whether `route` attaches to `listener` of `gw`
///
/// A parent reference without section name attaches to every listener.
pub fn route_attaches_to_listener(route: &UDPRoute, gw: &Gateway, listener: &Listener) -> bool {
    route.spec.parent_refs.iter().any(|p| {
        parent_names_gateway(p, route, gw)
            && p.section_name.as_deref().is_none_or(|s| s == listener.name)
    })
}

/// Routes attached to `listener`, sorted by key
pub fn attached_routes<'a>(snapshot: &'a Snapshot, gw: &Gateway, listener: &Listener) -> Vec<&'a UDPRoute> {
    snapshot
        .udp_routes
        .iter()
        .filter(|r| route_attaches_to_listener(r, gw, listener))
        .collect()
}

fn is_service_backend(backend: &BackendObjectReference) -> bool {
    backend.group.as_deref().is_none_or(str::is_empty)
        && backend.kind.as_deref().is_none_or(|k| k == "Service")
}

/// Keys of the backend Services of `route`, sorted and deduplicated
pub fn backend_keys(route: &UDPRoute) -> BTreeSet<ObjectKey> {
    let route_ns = route.namespace().unwrap_or_default();
    route
        .spec
        .rules
        .iter()
        .flat_map(|rule| rule.backend_refs.iter())
        .filter(|b| is_service_backend(b))
        .map(|b| ObjectKey::namespaced(b.namespace.as_deref().unwrap_or(&route_ns), b.name.as_str()))
        .collect()
}

/// Backend Services of `route` missing from the snapshot
pub fn missing_backends(snapshot: &Snapshot, route: &UDPRoute) -> Vec<ObjectKey> {
    backend_keys(route)
        .into_iter()
        .filter(|key| snapshot.service(key).is_none())
        .collect()
}

/// Cluster of `route`: one STRICT_DNS endpoint per backend Service
pub fn cluster_for_route(route: &UDPRoute) -> ClusterConfig {
    let endpoints: BTreeSet<String> = backend_keys(route)
        .into_iter()
        .map(|key| {
            format!(
                "{}.{}.svc.cluster.local",
                key.name,
                key.namespace.unwrap_or_default()
            )
        })
        .collect();
    ClusterConfig {
        name: route_name(route),
        type_: CLUSTER_TYPE_STRICT_DNS.to_string(),
        endpoints: endpoints.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Object;
    use crate::test_utils::*;
    use crds::{ListenerProtocol, UDPRouteRule};

    fn listener(name: &str) -> Listener {
        Listener {
            name: name.to_string(),
            port: 1,
            protocol: ListenerProtocol::Udp,
        }
    }

    #[test]
    fn test_section_name_selects_listener() {
        let gw = create_test_gateway("default", "gw1", "ours", &[]);
        let mut route = create_test_udp_route("default", "r", &[("default", "gw1")], &[]);
        assert!(route_attaches_to_listener(&route, &gw, &listener("a")));
        assert!(route_attaches_to_listener(&route, &gw, &listener("b")));

        route.spec.parent_refs[0].section_name = Some("a".to_string());
        assert!(route_attaches_to_listener(&route, &gw, &listener("a")));
        assert!(!route_attaches_to_listener(&route, &gw, &listener("b")));
    }

    #[test]
    fn test_cluster_endpoints_sorted_and_deduplicated() {
        let mut route = create_test_udp_route("media", "r", &[("default", "gw1")], &["zeta", "alpha"]);
        route.spec.rules.push(UDPRouteRule {
            backend_refs: vec![
                BackendObjectReference {
                    name: "alpha".to_string(),
                    ..Default::default()
                },
                BackendObjectReference {
                    name: "other".to_string(),
                    namespace: Some("ext".to_string()),
                    ..Default::default()
                },
                BackendObjectReference {
                    name: "not-a-service".to_string(),
                    kind: Some("Pod".to_string()),
                    ..Default::default()
                },
            ],
        });
        let cluster = cluster_for_route(&route);
        assert_eq!(cluster.name, "media/r");
        assert_eq!(cluster.type_, "STRICT_DNS");
        assert_eq!(
            cluster.endpoints,
            vec![
                "alpha.media.svc.cluster.local",
                "other.ext.svc.cluster.local",
                "zeta.media.svc.cluster.local",
            ]
        );
    }

    #[test]
    fn test_missing_backends() {
        let store = create_test_store();
        store
            .upsert(Object::Service(create_test_service("default", "echo", None, &[], &[])))
            .unwrap();
        let snapshot = store.snapshot().unwrap();
        let route = create_test_udp_route("default", "r", &[("default", "gw1")], &["echo", "gone"]);
        assert_eq!(missing_backends(&snapshot, &route), vec![ObjectKey::namespaced("default", "gone")]);
    }
}
