//! Operator
//!
//! Owns the event bus and runs the renderer and updater as two background
//! loops. If either loop fails the whole pipeline is cancelled.

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::event::EventBus;
use crate::metrics::Metrics;
use crate::renderer::{RenderCache, Renderer};
use crate::store::Store;
use crate::updater::Updater;
use resource_client::ResourceClient;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

type LoopHandle = JoinHandle<Result<(), ControllerError>>;

#[derive(Debug)]
struct Running {
    renderer: LoopHandle,
    updater: LoopHandle,
    token: CancellationToken,
}

/// Supervisor of the render/update pipeline
#[derive(Debug)]
pub struct Operator {
    bus: EventBus,
    renderer: Renderer,
    updater: Updater,
    ready: Arc<AtomicBool>,
    running: Option<Running>,
}

impl Operator {
    /// Build the event bus, renderer and updater
    pub fn new(
        config: &OperatorConfig,
        store: Arc<Store>,
        client: Arc<dyn ResourceClient>,
        metrics: Metrics,
    ) -> Self {
        let (bus, receivers) = EventBus::new(config.update_channel_capacity, metrics.clone());
        let cache = RenderCache::new();
        let renderer = Renderer::new(
            config.controller_name.clone(),
            store.clone(),
            bus.clone(),
            receivers.render,
            cache.clone(),
            metrics.clone(),
        );
        let updater = Updater::new(config, client, store, bus.clone(), receivers.update, cache, metrics);
        Self {
            bus,
            renderer,
            updater,
            ready: Arc::new(AtomicBool::new(false)),
            running: None,
        }
    }

    /// Sending side of the event bus, for the watchers
    pub fn event_bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Flag raised once the pipeline is running
    pub fn readiness(&self) -> Arc<AtomicBool> {
        self.ready.clone()
    }

    /// Start the renderer and updater loops and request an initial render
    ///
    /// Fails if already started or `token` is already cancelled.
    pub fn start(&mut self, token: CancellationToken) -> Result<(), ControllerError> {
        if self.running.is_some() {
            return Err(ControllerError::AlreadyStarted("Operator"));
        }
        if token.is_cancelled() {
            return Err(ControllerError::Cancelled("Operator"));
        }

        let updater = self.updater.start(token.clone())?;
        let renderer = match self.renderer.start(token.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                updater.abort();
                return Err(e);
            }
        };
        self.running = Some(Running {
            renderer,
            updater,
            token,
        });

        self.bus.publish_render_trigger("Operator", "startup")?;
        self.ready.store(true, Ordering::Release);
        info!("Operator started");
        Ok(())
    }

    /// Supervise the loops until cancellation or the first failure
    ///
    /// On failure the token is cancelled, the other loop is awaited and the
    /// error is returned.
    pub async fn run(self) -> Result<(), ControllerError> {
        let Some(Running {
            mut renderer,
            mut updater,
            token,
        }) = self.running
        else {
            return Err(ControllerError::Fatal("operator not started".to_string()));
        };
        info!("Operator running");

        let (first, other) = tokio::select! {
            result = &mut renderer => (loop_result("Renderer", result, &token), ("Updater", updater)),
            result = &mut updater => (loop_result("Updater", result, &token), ("Renderer", renderer)),
        };
        self.ready.store(false, Ordering::Release);
        if let Err(e) = &first {
            error!("Stopping pipeline: {}", e);
        }
        token.cancel();

        let (name, handle) = other;
        let second = loop_result(name, handle.await, &token);
        if let Err(e) = &second {
            error!("{} failed during shutdown: {}", name, e);
        }

        info!("Operator stopped");
        first.and(second)
    }
}

fn loop_result(
    name: &str,
    result: Result<Result<(), ControllerError>, JoinError>,
    token: &CancellationToken,
) -> Result<(), ControllerError> {
    match result {
        Ok(Ok(())) if token.is_cancelled() => Ok(()),
        Ok(Ok(())) => Err(ControllerError::Fatal(format!("{name} stopped unexpectedly"))),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(ControllerError::Fatal(format!("{name} panicked: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RenderedConfig;
    use crate::test_utils::*;
    use resource_client::{MockResourceClient, TargetKind, TargetRef};
    use std::time::Duration;

    fn operator(store: Arc<Store>, client: &MockResourceClient) -> Operator {
        Operator::new(
            &OperatorConfig::default(),
            store,
            Arc::new(client.clone()),
            Metrics::new().unwrap(),
        )
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_pipeline_writes_status_and_config() {
        let client = MockResourceClient::new();
        let class = TargetRef::cluster(TargetKind::GatewayClass, "ours");
        let gw = TargetRef::namespaced(TargetKind::Gateway, "default", "gw1");
        let cm = TargetRef::namespaced(TargetKind::ConfigMap, "default", "stunnerd-config");
        client.add_object(class.clone());
        client.add_object(gw.clone());

        let mut operator = operator(Arc::new(create_test_store()), &client);
        let ready = operator.readiness();
        let token = CancellationToken::new();
        operator.start(token.clone()).unwrap();
        assert!(ready.load(Ordering::Acquire));
        let run = tokio::spawn(operator.run());

        wait_for(|| client.writes().len() == 3).await;
        let status = client.status(&gw).unwrap();
        assert_eq!(status["addresses"][0]["value"], "1.2.3.4");
        let doc = RenderedConfig::from_config_map_data(&client.config_map(&cm).unwrap()).unwrap();
        assert_eq!(doc.listeners[0].public_address.as_ref().unwrap().value, "1.2.3.4");

        token.cancel();
        run.await.unwrap().unwrap();
        assert!(!ready.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_failing_loop_stops_pipeline() {
        let store = Arc::new(create_test_store());
        let client = MockResourceClient::new();
        let mut operator = operator(store.clone(), &client);
        let bus = operator.event_bus();
        let token = CancellationToken::new();

        store.poison_for_test();
        operator.start(token.clone()).unwrap();
        let err = operator.run().await.unwrap_err();

        assert!(matches!(err, ControllerError::Fatal(_)));
        assert!(token.is_cancelled());
        // loops are gone, nothing receives anymore
        assert!(bus.publish_render_trigger("test", "after shutdown").is_err());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut operator = operator(Arc::new(Store::new()), &MockResourceClient::new());
        let token = CancellationToken::new();
        operator.start(token.clone()).unwrap();
        let err = operator.start(token.clone()).unwrap_err();
        assert!(matches!(err, ControllerError::AlreadyStarted("Operator")));

        token.cancel();
        operator.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_after_cancel_fails() {
        let mut operator = operator(Arc::new(Store::new()), &MockResourceClient::new());
        let token = CancellationToken::new();
        token.cancel();
        let err = operator.start(token).unwrap_err();
        assert!(matches!(err, ControllerError::Cancelled("Operator")));
    }

    #[tokio::test]
    async fn test_run_before_start_fails() {
        let operator = operator(Arc::new(Store::new()), &MockResourceClient::new());
        assert!(operator.run().await.is_err());
    }
}
