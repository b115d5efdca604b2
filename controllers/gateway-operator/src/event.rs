//! Event bus between the watchers, the renderer and the updater.
//!
//! Render triggers go through a single-slot channel: while a render is pending
//! further triggers are dropped, the pending render reads the live store anyway.
//! Update requests go through a bounded channel and are never dropped.

use crate::error::ControllerError;
use crate::metrics::Metrics;
use resource_client::TargetRef;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

/// Request to recompute the desired configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTrigger {
    /// Component that noticed the change ("Gateway", "Updater", ...)
    pub origin: String,
    /// Human-readable description
    pub reason: String,
}

/// Desired state of one write target
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    /// Full status subresource, as JSON
    Status(serde_json::Value),
    /// Data of the configuration ConfigMap
    ConfigMap(BTreeMap<String, String>),
}

/// Desired state for a single resource
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// Resource to write
    pub target: TargetRef,
    /// What to write
    pub payload: UpdatePayload,
}

/// Anything travelling on the bus
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Recompute
    Render(RenderTrigger),
    /// Apply
    Update(UpdateRequest),
}

/// Receiving halves, handed to the renderer and the updater
#[derive(Debug)]
pub struct EventReceivers {
    /// Render triggers
    pub render: mpsc::Receiver<RenderTrigger>,
    /// Update requests
    pub update: mpsc::Receiver<UpdateRequest>,
}

/// Sending side of the bus, cheap to clone
#[derive(Debug, Clone)]
pub struct EventBus {
    render_tx: mpsc::Sender<RenderTrigger>,
    update_tx: mpsc::Sender<UpdateRequest>,
    metrics: Metrics,
}

impl EventBus {
    /// Create the bus with the given update channel capacity
    pub fn new(update_capacity: usize, metrics: Metrics) -> (Self, EventReceivers) {
        let (render_tx, render) = mpsc::channel(1);
        let (update_tx, update) = mpsc::channel(update_capacity.max(1));
        (
            Self {
                render_tx,
                update_tx,
                metrics,
            },
            EventReceivers { render, update },
        )
    }

    /// Request a render pass without blocking
    ///
    /// Returns `false` when a render is already pending and the trigger was
    /// coalesced into it.
    pub fn publish_render_trigger(
        &self,
        origin: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<bool, ControllerError> {
        let trigger = RenderTrigger {
            origin: origin.into(),
            reason: reason.into(),
        };
        match self.render_tx.try_send(trigger) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(trigger)) => {
                trace!("Render already pending, dropping trigger from {}: {}", trigger.origin, trigger.reason);
                self.metrics.record_trigger_dropped();
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => {
                Err(ControllerError::Fatal("render channel closed".to_string()))
            }
        }
    }

    /// Enqueue an update request, waiting for capacity
    pub async fn publish_update_request(&self, request: UpdateRequest) -> Result<(), ControllerError> {
        debug!("Enqueueing update for {}", request.target);
        self.update_tx
            .send(request)
            .await
            .map_err(|_closed| ControllerError::Fatal("update channel closed".to_string()))
    }

    /// Dispatch an event to its channel
    pub async fn publish(&self, event: Event) -> Result<(), ControllerError> {
        match event {
            Event::Render(trigger) => self
                .publish_render_trigger(trigger.origin, trigger.reason)
                .map(|_| ()),
            Event::Update(request) => self.publish_update_request(request).await,
        }
    }
}
