//! STUNner Gateway Operator
//!
//! Watches the Gateway API objects (GatewayClass, Gateway, UDPRoute), STUNner
//! GatewayConfigs and Services, and renders them into:
//! - a `stunnerd` configuration ConfigMap per GatewayConfig
//! - status on the GatewayClasses, Gateways and UDPRoutes it manages
//!
//! Watchers feed a shared store; a renderer turns store snapshots into update
//! requests which an updater writes back to the cluster.

mod backoff;
mod config;
mod error;
mod event;
mod metrics;
mod operator;
mod probes;
mod renderer;
mod store;
mod updater;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::operator::Operator;
use crate::store::{Store, StoreObject};
use crate::watcher::Watcher;
use crds::{Gateway, GatewayClass, GatewayConfig, UDPRoute};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client, Resource};
use resource_client::{KubeClient, ResourceClient};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const FIELD_MANAGER: &str = "stunner-gateway-operator";

type Tasks = JoinSet<Result<(), ControllerError>>;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls backend needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }

    info!("Starting STUNner Gateway Operator");

    let config = OperatorConfig::from_env()?;
    info!("Configuration:");
    info!("  Controller name: {}", config.controller_name);
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Probe address: {}", config.probe_addr);

    let client = Client::try_default().await?;
    let store = Arc::new(Store::new());
    let metrics = Metrics::new()?;
    let resource_client: Arc<dyn ResourceClient> = Arc::new(KubeClient::new(client.clone(), FIELD_MANAGER));

    let token = CancellationToken::new();
    let mut operator = Operator::new(&config, store.clone(), resource_client, metrics.clone());
    operator.start(token.clone())?;

    let mut tasks = Tasks::new();
    let watcher = Watcher::new(store, operator.event_bus());
    let namespace = config.watch_namespace.as_deref();
    spawn_watch(&mut tasks, &watcher, Api::<GatewayClass>::all(client.clone()), &token);
    spawn_watch(&mut tasks, &watcher, scoped_api::<GatewayConfig>(&client, namespace), &token);
    spawn_watch(&mut tasks, &watcher, scoped_api::<Gateway>(&client, namespace), &token);
    spawn_watch(&mut tasks, &watcher, scoped_api::<UDPRoute>(&client, namespace), &token);
    spawn_watch(&mut tasks, &watcher, scoped_api::<Service>(&client, namespace), &token);

    let router = probes::router(operator.readiness(), metrics);
    tasks.spawn(probes::serve(config.probe_addr, router, token.clone()));

    let run = operator.run();
    tokio::pin!(run);
    let outcome = tokio::select! {
        result = &mut run => {
            token.cancel();
            drain(&mut tasks).await;
            return result;
        }
        Some(joined) = tasks.join_next() => task_result(joined, &token),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
            Ok(())
        }
    };

    if let Err(e) = &outcome {
        error!("Shutting down: {}", e);
    }
    token.cancel();
    let operator_result = run.await;
    drain(&mut tasks).await;

    info!("STUNner Gateway Operator stopped");
    outcome.and(operator_result)
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn spawn_watch<K>(tasks: &mut Tasks, watcher: &Watcher, api: Api<K>, token: &CancellationToken)
where
    K: StoreObject + DeserializeOwned + Debug,
{
    let watcher = watcher.clone();
    let token = token.clone();
    tasks.spawn(async move { watcher.watch(api, token).await });
}

fn task_result(
    joined: Result<Result<(), ControllerError>, JoinError>,
    token: &CancellationToken,
) -> Result<(), ControllerError> {
    match joined {
        Ok(Ok(())) if token.is_cancelled() => Ok(()),
        Ok(Ok(())) => Err(ControllerError::Fatal("background task stopped unexpectedly".to_string())),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(ControllerError::Fatal(format!("background task panicked: {e}"))),
    }
}

async fn drain(tasks: &mut Tasks) {
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Background task failed during shutdown: {}", e),
            Err(e) => warn!("Background task panicked during shutdown: {}", e),
        }
    }
}
