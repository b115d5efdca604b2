//! Last emitted payload per write target.
//!
//! Shared between the renderer, which only emits what changed, and the updater,
//! which invalidates entries whose write did not land.
//!
//! A status target that drops out of the desired state (its Gateway was deleted
//! or moved to a foreign class) gets one last request clearing what we wrote.
//! The ConfigMap artifact is left in place.

use crate::error::ControllerError;
use crate::event::{UpdatePayload, UpdateRequest};
use resource_client::{TargetKind, TargetRef};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Desired payload per target, as computed by one render pass
pub type DesiredState = BTreeMap<TargetRef, UpdatePayload>;

/// Diff cache keyed by target
#[derive(Debug, Clone, Default)]
pub struct RenderCache {
    emitted: Arc<Mutex<BTreeMap<TargetRef, UpdatePayload>>>,
}

impl RenderCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<TargetRef, UpdatePayload>>, ControllerError> {
        self.emitted
            .lock()
            .map_err(|e| ControllerError::Fatal(format!("render cache lock poisoned: {e}")))
    }

    /// Requests for every target whose desired payload differs from the last
    /// one emitted, in target order
    ///
    /// Records the new payloads as emitted. Targets that are no longer desired
    /// are forgotten, status targets with a clearing request.
    pub fn diff(&self, desired: DesiredState) -> Result<Vec<UpdateRequest>, ControllerError> {
        let mut emitted = self.lock()?;
        let gone: Vec<TargetRef> = emitted
            .keys()
            .filter(|target| !desired.contains_key(*target))
            .cloned()
            .collect();

        let mut requests = Vec::new();
        for target in gone {
            emitted.remove(&target);
            if let Some(payload) = cleared_status(target.kind) {
                debug!("{} no longer rendered, clearing its status", target);
                requests.push(UpdateRequest { target, payload });
            }
        }
        for (target, payload) in desired {
            if emitted.get(&target) == Some(&payload) {
                continue;
            }
            emitted.insert(target.clone(), payload.clone());
            requests.push(UpdateRequest { target, payload });
        }
        requests.sort_by(|a, b| a.target.cmp(&b.target));
        Ok(requests)
    }

    /// Forget the last payload of `target` so the next render re-emits it
    pub fn invalidate(&self, target: &TargetRef) -> Result<(), ControllerError> {
        debug!("Invalidating render cache entry for {}", target);
        self.lock()?.remove(target);
        Ok(())
    }

    /// Last payload emitted for `target`
    pub fn get(&self, target: &TargetRef) -> Result<Option<UpdatePayload>, ControllerError> {
        Ok(self.lock()?.get(target).cloned())
    }
}

/// Status written to a target we stop managing
pub fn cleared_status(kind: TargetKind) -> Option<UpdatePayload> {
    let status = match kind {
        TargetKind::GatewayClass => serde_json::json!({ "conditions": [] }),
        TargetKind::Gateway => serde_json::json!({ "addresses": [], "conditions": [], "listeners": [] }),
        TargetKind::UdpRoute => serde_json::json!({ "parents": [] }),
        TargetKind::ConfigMap => return None,
    };
    Some(UpdatePayload::Status(status))
}
