//! Kubernetes resource watchers.
//!
//! One watch stream per kind mirrors the cluster into the [`Store`] and asks
//! the renderer for a new pass after every change.

use crate::error::ControllerError;
use crate::event::EventBus;
use crate::store::{ObjectKey, Store, StoreObject};
use futures::TryStreamExt;
use kube::Api;
use kube_runtime::{WatchStreamExt, watcher};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Feeds watch events into the store
#[derive(Debug, Clone)]
pub struct Watcher {
    store: Arc<Store>,
    bus: EventBus,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(store: Arc<Store>, bus: EventBus) -> Self {
        Self { store, bus }
    }

    /// Watch `api` until `token` is cancelled
    ///
    /// Stream errors are logged and the watch is resumed with backoff.
    pub async fn watch<K>(&self, api: Api<K>, token: CancellationToken) -> Result<(), ControllerError>
    where
        K: StoreObject + DeserializeOwned + Debug,
    {
        info!("Starting {} watcher", K::KIND);

        let mut stream = Box::pin(watcher(api, watcher::Config::default()).default_backoff());
        let mut relisted = BTreeSet::new();
        loop {
            let next = tokio::select! {
                () = token.cancelled() => break,
                next = stream.try_next() => next,
            };
            match next {
                Ok(Some(event)) => self.handle_event(event, &mut relisted)?,
                Ok(None) => {
                    return Err(ControllerError::Watch(format!("{} watch stream ended", K::KIND)));
                }
                Err(e) => warn!("{} watch stream error: {}", K::KIND, e),
            }
        }

        info!("{} watcher stopped", K::KIND);
        Ok(())
    }

    /// Apply one watch event to the store and trigger a render
    ///
    /// `relisted` collects the keys seen between `Init` and `InitDone`; on
    /// `InitDone` everything else of the kind is pruned.
    pub fn handle_event<K: StoreObject>(
        &self,
        event: watcher::Event<K>,
        relisted: &mut BTreeSet<ObjectKey>,
    ) -> Result<(), ControllerError> {
        match event {
            watcher::Event::Apply(obj) => {
                let Some(key) = ObjectKey::of(&obj) else { return Ok(()) };
                debug!("{} applied: {}", K::KIND, key);
                self.store.upsert(obj.into_object())?;
                self.trigger::<K>(&key)?;
            }
            watcher::Event::Delete(obj) => {
                let Some(key) = ObjectKey::of(&obj) else { return Ok(()) };
                info!("{} deleted: {}", K::KIND, key);
                self.store.remove(K::KIND, &key)?;
                self.trigger::<K>(&key)?;
            }
            watcher::Event::Init => {
                debug!("{} watcher (re)listing", K::KIND);
                relisted.clear();
            }
            watcher::Event::InitApply(obj) => {
                let Some(key) = ObjectKey::of(&obj) else { return Ok(()) };
                debug!("{} init apply: {}", K::KIND, key);
                self.store.upsert(obj.into_object())?;
                self.trigger::<K>(&key)?;
                relisted.insert(key);
            }
            watcher::Event::InitDone => {
                let pruned = self.store.retain(K::KIND, relisted)?;
                relisted.clear();
                if pruned > 0 {
                    info!("{} watcher pruned {} stale object(s) after re-list", K::KIND, pruned);
                    self.bus
                        .publish_render_trigger(K::KIND.to_string(), format!("re-list pruned {pruned} object(s)"))?;
                }
                debug!("{} watcher initialization complete", K::KIND);
            }
        }
        Ok(())
    }

    fn trigger<K: StoreObject>(&self, key: &ObjectKey) -> Result<(), ControllerError> {
        self.bus
            .publish_render_trigger(K::KIND.to_string(), format!("update on {key}"))
            .map(|_| ())
    }
}
