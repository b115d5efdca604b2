//! Desired status of GatewayClasses, Gateways and UDPRoutes.
//!
//! Conditions are built without transition times; the updater stamps them.

use crate::renderer::RenderedListener;
use crate::renderer::routes::missing_backends;
use crate::store::{Snapshot, parent_names_gateway};
use crds::{
    Condition, ConditionStatus, Gateway, GatewayAddress, GatewayClass, GatewayClassStatus,
    GatewayStatus, ListenerStatus, RouteParentStatus, UDPRoute, UDPRouteStatus,
};
use kube::ResourceExt;
use std::collections::BTreeSet;

/// Class or Gateway accepted, or route accepted by a parent
pub const CONDITION_ACCEPTED: &str = "Accepted";
/// Gateway scheduled onto the dataplane
pub const CONDITION_SCHEDULED: &str = "Scheduled";
/// Gateway or listener has a public address
pub const CONDITION_READY: &str = "Ready";
/// Route backends all exist
pub const CONDITION_RESOLVED_REFS: &str = "ResolvedRefs";

/// Object accepted
pub const REASON_ACCEPTED: &str = "Accepted";
/// Class parameters missing or unusable
pub const REASON_INVALID_PARAMETERS: &str = "InvalidParameters";
/// Gateway scheduled
pub const REASON_SCHEDULED: &str = "Scheduled";
/// Address assigned
pub const REASON_READY: &str = "Ready";
/// No public address could be resolved
pub const REASON_ADDRESS_NOT_ASSIGNED: &str = "AddressNotAssigned";
/// Some listener of the Gateway has no public address
pub const REASON_LISTENERS_NOT_READY: &str = "ListenersNotReady";
/// Route parent is not a Gateway we manage
pub const REASON_NO_MATCHING_PARENT: &str = "NoMatchingParent";
/// All backends found
pub const REASON_RESOLVED_REFS: &str = "ResolvedRefs";
/// Some route backend Service does not exist
pub const REASON_BACKEND_NOT_FOUND: &str = "BackendNotFound";

/// Status of a class: accepted, or rejected with the config problem
pub fn class_status(class: &GatewayClass, config_error: Option<&str>) -> GatewayClassStatus {
    let generation = class.metadata.generation;
    let condition = match config_error {
        None => Condition::new(
            CONDITION_ACCEPTED,
            ConditionStatus::True,
            REASON_ACCEPTED,
            "GatewayClass is now managed by the STUNner gateway operator",
            generation,
        ),
        Some(message) => Condition::new(
            CONDITION_ACCEPTED,
            ConditionStatus::False,
            REASON_INVALID_PARAMETERS,
            message,
            generation,
        ),
    };
    GatewayClassStatus {
        conditions: vec![condition],
    }
}

/// Status of a Gateway from its rendered listeners
pub fn gateway_status(gw: &Gateway, listeners: &[RenderedListener<'_>]) -> GatewayStatus {
    let generation = gw.metadata.generation;

    let addresses: BTreeSet<GatewayAddress> = listeners
        .iter()
        .filter_map(|l| l.address.as_ref().ok())
        .map(|a| a.address.clone())
        .collect();

    let listener_statuses: Vec<ListenerStatus> = listeners
        .iter()
        .map(|l| {
            let ready = match &l.address {
                Ok(addr) => Condition::new(
                    CONDITION_READY,
                    ConditionStatus::True,
                    REASON_READY,
                    format!("public address {}:{}", addr.address.value, addr.port),
                    generation,
                ),
                Err(e) => Condition::new(
                    CONDITION_READY,
                    ConditionStatus::False,
                    REASON_ADDRESS_NOT_ASSIGNED,
                    e.to_string(),
                    generation,
                ),
            };
            ListenerStatus {
                name: l.listener.name.clone(),
                attached_routes: i32::try_from(l.routes.len()).unwrap_or(i32::MAX),
                conditions: vec![ready],
            }
        })
        .collect();

    let failed = listeners.iter().filter(|l| l.address.is_err()).count();
    let ready = if failed == 0 {
        Condition::new(
            CONDITION_READY,
            ConditionStatus::True,
            REASON_READY,
            "all listeners have a public address",
            generation,
        )
    } else {
        Condition::new(
            CONDITION_READY,
            ConditionStatus::False,
            REASON_LISTENERS_NOT_READY,
            format!("{failed} of {} listeners have no public address", listeners.len()),
            generation,
        )
    };

    GatewayStatus {
        addresses: addresses.into_iter().collect(),
        conditions: vec![
            Condition::new(
                CONDITION_SCHEDULED,
                ConditionStatus::True,
                REASON_SCHEDULED,
                "Gateway is scheduled",
                generation,
            ),
            ready,
        ],
        listeners: listener_statuses,
    }
}

/// Status of a route towards the Gateways in `ours`
///
/// Parent references naming anything else are left out; `None` when the route
/// references none of our Gateways.
pub fn route_status(
    snapshot: &Snapshot,
    route: &UDPRoute,
    ours: &[&Gateway],
    controller_name: &str,
) -> Option<UDPRouteStatus> {
    let generation = route.metadata.generation;
    let missing = missing_backends(snapshot, route);
    let resolved = if missing.is_empty() {
        Condition::new(
            CONDITION_RESOLVED_REFS,
            ConditionStatus::True,
            REASON_RESOLVED_REFS,
            "all backend references resolved",
            generation,
        )
    } else {
        let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
        Condition::new(
            CONDITION_RESOLVED_REFS,
            ConditionStatus::False,
            REASON_BACKEND_NOT_FOUND,
            format!("backend Service not found: {}", names.join(", ")),
            generation,
        )
    };

    let parents: Vec<RouteParentStatus> = route
        .spec
        .parent_refs
        .iter()
        .filter_map(|parent| {
            let gw = ours.iter().find(|gw| parent_names_gateway(parent, route, gw))?;
            let accepted = match parent.section_name.as_deref() {
                Some(section) if !gw.spec.listeners.iter().any(|l| l.name == section) => Condition::new(
                    CONDITION_ACCEPTED,
                    ConditionStatus::False,
                    REASON_NO_MATCHING_PARENT,
                    format!("Gateway {} has no listener {section}", gw.name_any()),
                    generation,
                ),
                _ => Condition::new(
                    CONDITION_ACCEPTED,
                    ConditionStatus::True,
                    REASON_ACCEPTED,
                    "route accepted",
                    generation,
                ),
            };
            Some(RouteParentStatus {
                parent_ref: parent.clone(),
                controller_name: controller_name.to_string(),
                conditions: vec![accepted, resolved.clone()],
            })
        })
        .collect();

    (!parents.is_empty()).then_some(UDPRouteStatus { parents })
}
