//! Updater
//!
//! Applies update requests through the [`ResourceClient`] in the order they
//! were enqueued. Every write is a read-then-write guarded by the object's
//! resourceVersion:
//!
//! - Conflict: retried with Fibonacci backoff; when retries run out the render
//!   cache entry is invalidated and a fresh render is requested.
//! - NotFound: retried once, then the request is dropped and the vanished
//!   object is removed from the store. A missing ConfigMap is created instead.
//! - Anything else: logged, cache entry invalidated, next request proceeds. A
//!   render is requested after a delay that grows with consecutive failures.


use crate::backoff::FibonacciBackoff;
use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::event::{EventBus, UpdatePayload, UpdateRequest};
use crate::metrics::{
    Metrics, RESULT_ABANDONED, RESULT_CONFLICT, RESULT_ERROR, RESULT_NOT_FOUND, RESULT_SUCCESS,
};
use crate::renderer::RenderCache;
use crate::store::{Kind, ObjectKey, Store};
use chrono::{SecondsFormat, Utc};
use resource_client::{ClientError, ResourceClient, TargetKind, TargetRef};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Requests taken off the queue at once
const BATCH_SIZE: usize = 64;

/// What happened to one update request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Written
    Applied,
    /// Gave up after persistent conflicts, re-render requested
    Conflict,
    /// Target does not exist, dropped
    NotFound,
    /// Other client error, dropped
    Failed,
}

/// The update loop
#[derive(Clone)]
pub struct Updater {
    client: Arc<dyn ResourceClient>,
    store: Arc<Store>,
    bus: EventBus,
    cache: RenderCache,
    metrics: Metrics,
    conflict_retries: u32,
    backoff_min: Duration,
    backoff_max: Duration,
    failure_backoff: Arc<Mutex<FibonacciBackoff>>,
    failure_backoff_min: Duration,
    failure_backoff_max: Duration,
    receiver: Arc<Mutex<Option<mpsc::Receiver<UpdateRequest>>>>,
}

impl fmt::Debug for Updater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Updater")
            .field("conflict_retries", &self.conflict_retries)
            .field("backoff_min", &self.backoff_min)
            .field("backoff_max", &self.backoff_max)
            .finish_non_exhaustive()
    }
}

impl Updater {
    /// Create an updater consuming `receiver`
    pub fn new(
        config: &OperatorConfig,
        client: Arc<dyn ResourceClient>,
        store: Arc<Store>,
        bus: EventBus,
        receiver: mpsc::Receiver<UpdateRequest>,
        cache: RenderCache,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            store,
            bus,
            cache,
            metrics,
            conflict_retries: config.conflict_retries.max(1),
            backoff_min: config.conflict_backoff_min,
            backoff_max: config.conflict_backoff_max,
            failure_backoff: Arc::new(Mutex::new(FibonacciBackoff::new(
                config.failure_backoff_min,
                config.failure_backoff_max,
            ))),
            failure_backoff_min: config.failure_backoff_min,
            failure_backoff_max: config.failure_backoff_max,
            receiver: Arc::new(Mutex::new(Some(receiver))),
        }
    }

    /// Spawn the update loop
    ///
    /// Fails if the updater was already started or `token` is already
    /// cancelled.
    pub fn start(&self, token: CancellationToken) -> Result<JoinHandle<Result<(), ControllerError>>, ControllerError> {
        if token.is_cancelled() {
            return Err(ControllerError::Cancelled("Updater"));
        }
        let receiver = self
            .receiver
            .lock()
            .map_err(|e| ControllerError::Fatal(format!("updater lock poisoned: {e}")))?
            .take()
            .ok_or(ControllerError::AlreadyStarted("Updater"))?;

        let updater = self.clone();
        Ok(tokio::spawn(async move { updater.run(receiver, token).await }))
    }

    async fn run(
        self,
        mut receiver: mpsc::Receiver<UpdateRequest>,
        token: CancellationToken,
    ) -> Result<(), ControllerError> {
        info!("Updater started");
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        loop {
            let received = tokio::select! {
                biased;
                () = token.cancelled() => break,
                n = receiver.recv_many(&mut batch, BATCH_SIZE) => n,
            };
            if received == 0 {
                return Err(ControllerError::Fatal("update channel closed".to_string()));
            }

            for request in batch.drain(..) {
                if token.is_cancelled() {
                    self.abandon(&request);
                    continue;
                }
                match self.apply(&request).await {
                    Ok(_) => {}
                    Err(e) if token.is_cancelled() => {
                        debug!("Update of {} interrupted by shutdown: {}", request.target, e);
                    }
                    Err(e) => {
                        error!("Updater failed: {}", e);
                        return Err(e);
                    }
                }
            }
        }

        receiver.close();
        while let Ok(request) = receiver.try_recv() {
            self.abandon(&request);
        }
        info!("Updater stopped");
        Ok(())
    }

    fn abandon(&self, request: &UpdateRequest) {
        warn!("Abandoning update of {} at shutdown", request.target);
        self.metrics
            .record_update_applied(&request.target.kind.to_string(), RESULT_ABANDONED);
    }

    /// Apply a single request
    ///
    /// Client failures are absorbed into the outcome; only internal errors
    /// (closed render channel, poisoned cache) are returned.
    pub async fn apply(&self, request: &UpdateRequest) -> Result<ApplyOutcome, ControllerError> {
        let target = &request.target;
        let kind = target.kind.to_string();
        let mut backoff = FibonacciBackoff::new(self.backoff_min, self.backoff_max);
        let mut conflicts = 0;
        let mut not_found_retried = false;

        loop {
            match self.write(request).await {
                Ok(()) => {
                    debug!("Applied update to {}", target);
                    *self.lock_failure_backoff()? =
                        FibonacciBackoff::new(self.failure_backoff_min, self.failure_backoff_max);
                    self.metrics.record_update_applied(&kind, RESULT_SUCCESS);
                    return Ok(ApplyOutcome::Applied);
                }
                Err(e) if e.is_conflict() => {
                    conflicts += 1;
                    if conflicts >= self.conflict_retries {
                        warn!(
                            "Giving up on {} after {} conflicts, requesting a new render",
                            target, conflicts
                        );
                        self.cache.invalidate(target)?;
                        self.bus
                            .publish_render_trigger("Updater", format!("conflict on {target}"))?;
                        self.metrics.record_update_applied(&kind, RESULT_CONFLICT);
                        return Ok(ApplyOutcome::Conflict);
                    }
                    let delay = backoff.next_backoff();
                    debug!("Conflict on {}, retrying in {:?}", target, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_not_found() && !not_found_retried => {
                    debug!("{} not found, retrying once", target);
                    not_found_retried = true;
                }
                Err(e) if e.is_not_found() => {
                    warn!("{} not found, dropping update", target);
                    self.cache.invalidate(target)?;
                    self.forget(target)?;
                    self.metrics.record_update_applied(&kind, RESULT_NOT_FOUND);
                    return Ok(ApplyOutcome::NotFound);
                }
                Err(e) => {
                    error!("Failed to update {}: {}", target, e);
                    self.cache.invalidate(target)?;
                    self.schedule_render(target)?;
                    self.metrics.record_update_applied(&kind, RESULT_ERROR);
                    return Ok(ApplyOutcome::Failed);
                }
            }
        }
    }

    fn lock_failure_backoff(&self) -> Result<std::sync::MutexGuard<'_, FibonacciBackoff>, ControllerError> {
        self.failure_backoff
            .lock()
            .map_err(|e| ControllerError::Fatal(format!("updater backoff lock poisoned: {e}")))
    }

    // Re-render later so the invalidated target gets another attempt
    fn schedule_render(&self, target: &TargetRef) -> Result<(), ControllerError> {
        let delay = self.lock_failure_backoff()?.next_backoff();
        debug!("Requesting a new render for {} in {:?}", target, delay);
        let bus = self.bus.clone();
        let reason = format!("retry {target}");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = bus.publish_render_trigger("Updater", reason) {
                debug!("Delayed render request dropped: {}", e);
            }
        });
        Ok(())
    }

    // Drop a vanished object ahead of its delete event
    fn forget(&self, target: &TargetRef) -> Result<(), ControllerError> {
        let kind = match target.kind {
            TargetKind::GatewayClass => Kind::GatewayClass,
            TargetKind::Gateway => Kind::Gateway,
            TargetKind::UdpRoute => Kind::UdpRoute,
            TargetKind::ConfigMap => return Ok(()),
        };
        let key = ObjectKey {
            namespace: target.namespace.clone(),
            name: target.name.clone(),
        };
        if self.store.remove(kind, &key)? {
            info!("Removed vanished {} {} from the store", kind, key);
            self.bus
                .publish_render_trigger("Updater", format!("{target} vanished"))?;
        }
        Ok(())
    }

    async fn write(&self, request: &UpdateRequest) -> Result<(), ClientError> {
        let target = &request.target;
        match &request.payload {
            UpdatePayload::Status(status) => {
                let current = self.client.read_status(target).await?;
                let mut status = status.clone();
                stamp_transition_times(
                    &mut status,
                    current.status.as_ref(),
                    &Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                );
                self.client
                    .patch_status(target, &current.resource_version, &status)
                    .await
            }
            UpdatePayload::ConfigMap(data) => {
                let resource_version = match self.client.resource_version(target).await {
                    Ok(rv) => Some(rv),
                    Err(e) if e.is_not_found() => None,
                    Err(e) => return Err(e),
                };
                self.client
                    .apply_config_map(target, resource_version.as_deref(), data.clone())
                    .await
            }
        }
    }
}

/// Set `lastTransitionTime` on every condition in `value` that has none
///
/// A condition whose status equals that of the same-typed condition in
/// `current` (the status the object carries now) keeps that condition's time;
/// every other condition gets `now`. Listeners are matched by `name`, route
/// parents by `parentRef`.
pub fn stamp_transition_times(value: &mut Value, current: Option<&Value>, now: &str) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let current_child = current.and_then(|c| c.get(key));
                if key == "conditions" {
                    if let Value::Array(conditions) = child {
                        for condition in conditions.iter_mut().filter_map(|c| c.as_object_mut()) {
                            if condition.contains_key("lastTransitionTime") {
                                continue;
                            }
                            let time = previous_transition_time(condition, current_child)
                                .unwrap_or_else(|| Value::String(now.to_string()));
                            condition.insert("lastTransitionTime".to_string(), time);
                        }
                    }
                } else {
                    stamp_transition_times(child, current_child, now);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let current_item = current.and_then(|c| matching_item(item, c));
                stamp_transition_times(item, current_item, now);
            }
        }
        _ => {}
    }
}

fn previous_transition_time(condition: &Map<String, Value>, current: Option<&Value>) -> Option<Value> {
    let type_ = condition.get("type")?;
    current?
        .as_array()?
        .iter()
        .find(|c| c.get("type") == Some(type_) && c.get("status") == condition.get("status"))?
        .get("lastTransitionTime")
        .filter(|t| t.is_string())
        .cloned()
}

// Entry of `current` describing the same listener or route parent as `item`
fn matching_item<'a>(item: &Value, current: &'a Value) -> Option<&'a Value> {
    let items = current.as_array()?;
    ["name", "parentRef"].iter().find_map(|key| {
        let id = item.get(*key)?;
        items.iter().find(|c| c.get(*key) == Some(id))
    })
}
