//! Renderer
//!
//! Turns a store snapshot into the desired state of every write target: one
//! status per managed GatewayClass, Gateway and UDPRoute plus one dataplane
//! configuration ConfigMap per class. Only targets whose desired state changed
//! since the last pass are handed to the updater.
//!
//! Render passes never overlap: they run on the single renderer task, fed by
//! the single-slot render channel.

pub mod address;
pub mod cache;
pub mod document;
pub mod routes;
pub mod status;

#[cfg(test)]
mod address_test;

pub use address::{PublicAddress, ResolutionError, resolve_public_address};
pub use cache::{DesiredState, RenderCache};
pub use document::RenderedConfig;

use crate::error::ControllerError;
use crate::event::{EventBus, RenderTrigger, UpdatePayload, UpdateRequest};
use crate::metrics::{Metrics, RESULT_ABANDONED};
use crate::store::{ObjectKey, Snapshot, Store};
use crds::{Gateway, GatewayClass, GatewayConfig, Listener, STUNNER_GROUP, UDPRoute};
use document::{ListenerConfig, PublicAddressConfig};
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use resource_client::{TargetKind, TargetRef};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One Gateway listener with its resolution outcome and attached routes
#[derive(Debug)]
pub struct RenderedListener<'a> {
    /// The listener
    pub listener: &'a Listener,
    /// Public address or the reason there is none
    pub address: Result<PublicAddress, ResolutionError>,
    /// Attached routes, sorted by key
    pub routes: Vec<&'a UDPRoute>,
}

/// The render loop
#[derive(Debug, Clone)]
pub struct Renderer {
    store: Arc<Store>,
    bus: EventBus,
    cache: RenderCache,
    metrics: Metrics,
    controller_name: String,
    receiver: Arc<Mutex<Option<mpsc::Receiver<RenderTrigger>>>>,
}

impl Renderer {
    /// Create a renderer consuming `receiver`
    pub fn new(
        controller_name: impl Into<String>,
        store: Arc<Store>,
        bus: EventBus,
        receiver: mpsc::Receiver<RenderTrigger>,
        cache: RenderCache,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            bus,
            cache,
            metrics,
            controller_name: controller_name.into(),
            receiver: Arc::new(Mutex::new(Some(receiver))),
        }
    }

    /// Spawn the render loop
    ///
    /// Fails if the renderer was already started or `token` is already
    /// cancelled.
    pub fn start(&self, token: CancellationToken) -> Result<JoinHandle<Result<(), ControllerError>>, ControllerError> {
        if token.is_cancelled() {
            return Err(ControllerError::Cancelled("Renderer"));
        }
        let receiver = self
            .receiver
            .lock()
            .map_err(|e| ControllerError::Fatal(format!("renderer lock poisoned: {e}")))?
            .take()
            .ok_or(ControllerError::AlreadyStarted("Renderer"))?;

        let renderer = self.clone();
        Ok(tokio::spawn(async move { renderer.run(receiver, token).await }))
    }

    async fn run(
        self,
        mut receiver: mpsc::Receiver<RenderTrigger>,
        token: CancellationToken,
    ) -> Result<(), ControllerError> {
        info!("Renderer started");
        loop {
            let trigger = tokio::select! {
                biased;
                () = token.cancelled() => break,
                trigger = receiver.recv() => trigger,
            };
            let Some(trigger) = trigger else {
                return Err(ControllerError::Fatal("render channel closed".to_string()));
            };
            debug!("Render triggered by {}: {}", trigger.origin, trigger.reason);

            match self.render_all().await {
                Ok(_) => {}
                Err(e) if token.is_cancelled() => {
                    debug!("Render pass interrupted by shutdown: {}", e);
                    break;
                }
                Err(e) => {
                    error!("Render pass failed: {}", e);
                    return Err(e);
                }
            }
        }
        info!("Renderer stopped");
        Ok(())
    }

    /// Run one render pass against the live store and enqueue what changed
    ///
    /// Returns the number of update requests emitted.
    pub async fn render_all(&self) -> Result<usize, ControllerError> {
        let snapshot = self.store.snapshot()?;
        let desired = render(&snapshot, &self.controller_name)?;
        let requests = self.cache.diff(desired)?;
        self.metrics.record_render_pass();

        let count = requests.len();
        if count > 0 {
            info!("Render pass emitted {} update(s)", count);
        } else {
            debug!("Render pass: nothing changed");
        }
        let mut pending = requests.into_iter();
        while let Some(request) = pending.next() {
            if let Err(e) = self.bus.publish_update_request(request.clone()).await {
                for abandoned in std::iter::once(request).chain(pending) {
                    self.abandon(&abandoned)?;
                }
                return Err(e);
            }
        }
        self.metrics.record_updates_emitted(count);
        Ok(count)
    }

    // Never reached the updater: forget it so a later pass re-emits it
    fn abandon(&self, request: &UpdateRequest) -> Result<(), ControllerError> {
        warn!("Abandoning update of {}, update channel closed", request.target);
        self.metrics
            .record_update_applied(&request.target.kind.to_string(), RESULT_ABANDONED);
        self.cache.invalidate(&request.target)
    }
}

/// Desired state of every target for `snapshot`
///
/// Classes, Gateways and routes are visited in key order, so equal snapshots
/// give equal results regardless of how the store was filled.
pub fn render(snapshot: &Snapshot, controller_name: &str) -> Result<DesiredState, ControllerError> {
    let mut desired = DesiredState::new();
    let mut ours: Vec<&Gateway> = Vec::new();

    for class in snapshot
        .gateway_classes
        .iter()
        .filter(|c| c.spec.controller_name == controller_name)
    {
        let class_name = class.name_any();
        let config = gateway_config_for_class(snapshot, class);
        if let Err(message) = &config {
            warn!("GatewayClass {}: {}", class_name, message);
        }
        desired.insert(
            TargetRef::cluster(TargetKind::GatewayClass, class_name.as_str()),
            status_payload(&status::class_status(class, config.as_ref().err().map(String::as_str)))?,
        );

        let mut document = config.as_ref().ok().map(|cfg| RenderedConfig::new(cfg));
        for gw in snapshot.gateways_for_class(class) {
            let Some(key) = ObjectKey::of(gw) else { continue };
            let listeners = render_gateway(snapshot, gw);
            desired.insert(
                TargetRef::namespaced(TargetKind::Gateway, gw.namespace().unwrap_or_default(), gw.name_any()),
                status_payload(&status::gateway_status(gw, &listeners))?,
            );
            if let (Some(doc), Ok(cfg)) = (document.as_mut(), &config) {
                add_gateway(doc, cfg, &key, &listeners);
            }
            ours.push(gw);
        }

        if let (Some(doc), Ok(cfg)) = (document, &config) {
            let target = TargetRef::namespaced(
                TargetKind::ConfigMap,
                cfg.namespace().unwrap_or_default(),
                cfg.spec.stunner_config_name(),
            );
            if desired.contains_key(&target) {
                warn!("{} already rendered for another GatewayClass, skipping {}", target, class_name);
            } else {
                desired.insert(target, UpdatePayload::ConfigMap(doc.to_config_map_data()?));
            }
        }
    }

    for route in &snapshot.udp_routes {
        if let Some(status) = status::route_status(snapshot, route, &ours, controller_name) {
            desired.insert(
                TargetRef::namespaced(TargetKind::UdpRoute, route.namespace().unwrap_or_default(), route.name_any()),
                status_payload(&status)?,
            );
        }
    }

    Ok(desired)
}

/// The GatewayConfig referenced by `class`, or why there is none
pub fn gateway_config_for_class<'a>(snapshot: &'a Snapshot, class: &GatewayClass) -> Result<&'a GatewayConfig, String> {
    let Some(params) = &class.spec.parameters_ref else {
        return Err("missing parametersRef".to_string());
    };
    if params.group != STUNNER_GROUP || params.kind != "GatewayConfig" {
        return Err(format!(
            "parametersRef must point to a {STUNNER_GROUP}/GatewayConfig, got {}/{}",
            params.group, params.kind
        ));
    }
    let Some(namespace) = params.namespace.as_deref() else {
        return Err(format!("parametersRef to GatewayConfig {} has no namespace", params.name));
    };
    snapshot
        .gateway_config(&ObjectKey::namespaced(namespace, params.name.as_str()))
        .ok_or_else(|| format!("GatewayConfig {}/{} not found", namespace, params.name))
}

/// Resolve every listener of `gw` and collect its routes
pub fn render_gateway<'a>(snapshot: &'a Snapshot, gw: &'a Gateway) -> Vec<RenderedListener<'a>> {
    let services: Vec<&Service> = snapshot.services_exposing_gateway(gw).collect();
    gw.spec
        .listeners
        .iter()
        .map(|listener| {
            let address = resolve_public_address(listener, services.iter().copied());
            if let Err(e) = &address {
                debug!("Gateway {}/{} listener {}: {}", gw.namespace().unwrap_or_default(), gw.name_any(), listener.name, e);
            }
            RenderedListener {
                listener,
                address,
                routes: routes::attached_routes(snapshot, gw, listener),
            }
        })
        .collect()
}

fn add_gateway(doc: &mut RenderedConfig, config: &GatewayConfig, gw_key: &ObjectKey, listeners: &[RenderedListener<'_>]) {
    let (min_relay_port, max_relay_port) = config.spec.port_range();
    for l in listeners.iter().filter(|l| l.listener.protocol.transport().is_some()) {
        let resolved = l.address.as_ref().ok();
        doc.listeners.push(ListenerConfig {
            name: format!("{}/{}", gw_key, l.listener.name),
            protocol: l.listener.protocol.to_string(),
            port: l.listener.port,
            min_relay_port,
            max_relay_port,
            public_address: resolved.map(|a| PublicAddressConfig {
                type_: a.address.type_,
                value: a.address.value.clone(),
            }),
            public_port: resolved.map(|a| a.port),
            routes: l.routes.iter().map(|r| routes::route_name(r)).collect(),
        });
        for route in &l.routes {
            doc.add_cluster(routes::cluster_for_route(route));
        }
    }
}

fn status_payload<T: Serialize>(status: &T) -> Result<UpdatePayload, ControllerError> {
    Ok(UpdatePayload::Status(serde_json::to_value(status)?))
}
