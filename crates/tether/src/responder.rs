//! The primary-context side.
//!
//! A [`Responder`] claims the primary role, answers query/update requests
//! against its target store and announces every local transform on the
//! broadcast channel. The target may be created lazily on the first
//! request; creation happens once and is shared by every later request.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use tether_core::{Query, QueryResult, Transform, TransformId, TransformLog, TransformResult};
use tether_store::{closed_subscription, EventReceiver, Store, StoreError};
use tether_sync::{
    endpoint, BroadcastChannel, BroadcastNetwork, ContextId, MessageRouter, RouterHandle,
    TransformBroadcaster,
};

use crate::config::TetherConfig;
use crate::error::{Result, TetherError};

/// Future returned by a target factory.
pub type TargetFuture<S> = Pin<Box<dyn Future<Output = anyhow::Result<Arc<S>>> + Send>>;

type TargetFactory<S> = Box<dyn Fn() -> TargetFuture<S> + Send + Sync>;

/// A store created on first use.
///
/// Concurrent first requests await the same initialisation. A failed
/// creation is reported as [`StoreError::Unavailable`] and retried on the
/// next request.
pub struct LazyTarget<S> {
    cell: OnceCell<Arc<S>>,
    factory: Option<TargetFactory<S>>,
    channel: Mutex<Option<BroadcastChannel>>,
    broadcaster: Mutex<Option<TransformBroadcaster>>,
}

impl<S: Store + 'static> LazyTarget<S> {
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<S>> + Send + 'static,
    {
        let factory: TargetFactory<S> = Box::new(move || {
            let created = factory();
            Box::pin(async move { created.await.map(Arc::new) })
        });
        Self {
            cell: OnceCell::new(),
            factory: Some(factory),
            channel: Mutex::new(None),
            broadcaster: Mutex::new(None),
        }
    }

    /// A target that already exists.
    pub fn ready(store: Arc<S>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(store)),
            factory: None,
            channel: Mutex::new(None),
            broadcaster: Mutex::new(None),
        }
    }

    /// The target, if it has been created.
    pub fn get(&self) -> Option<Arc<S>> {
        self.cell.get().cloned()
    }

    async fn target(&self) -> tether_store::Result<Arc<S>> {
        let store = self
            .cell
            .get_or_try_init(|| async {
                let factory = self
                    .factory
                    .as_ref()
                    .ok_or_else(|| StoreError::Unavailable("no target factory".into()))?;
                let store = factory().await.map_err(|e| {
                    warn!(error = %e, "target creation failed");
                    StoreError::Unavailable(format!("{e:#}"))
                })?;
                info!("target created");
                self.bind_broadcaster(&store);
                Ok::<_, StoreError>(store)
            })
            .await?;
        Ok(Arc::clone(store))
    }

    /// Hand over the broadcast channel. Announcing starts as soon as the
    /// target exists.
    fn attach_channel(&self, channel: BroadcastChannel) {
        *self.channel.lock().unwrap_or_else(PoisonError::into_inner) = Some(channel);
        if let Some(store) = self.cell.get() {
            self.bind_broadcaster(store);
        }
    }

    fn bind_broadcaster(&self, store: &Arc<S>) {
        let channel = self
            .channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(channel) = channel else {
            return;
        };
        match TransformBroadcaster::activate(store.as_ref(), channel) {
            Ok(broadcaster) => {
                *self.broadcaster.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(broadcaster);
            }
            Err(err) => warn!(error = %err, "broadcaster not started"),
        }
    }

    fn detach(&self) {
        self.channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(broadcaster) = self
            .broadcaster
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            broadcaster.deactivate();
        }
    }
}

#[async_trait]
impl<S: Store + 'static> Store for LazyTarget<S> {
    async fn query(&self, query: &Query) -> tether_store::Result<QueryResult> {
        self.target().await?.query(query).await
    }

    async fn update(&self, transform: &Transform) -> tether_store::Result<TransformResult> {
        self.target().await?.update(transform).await
    }

    async fn transformed(&self, transform: &Transform) -> tether_store::Result<bool> {
        self.target().await?.transformed(transform).await
    }

    async fn has_applied(&self, id: &TransformId) -> tether_store::Result<bool> {
        self.target().await?.has_applied(id).await
    }

    async fn transform_log(&self) -> tether_store::Result<TransformLog> {
        self.target().await?.transform_log().await
    }

    fn subscribe(&self) -> EventReceiver {
        match self.cell.get() {
            Some(store) => store.subscribe(),
            // Nothing can be applied before the target exists.
            None => closed_subscription(),
        }
    }
}

struct Active {
    id: ContextId,
    router: RouterHandle,
}

/// Serves a store to other contexts as the primary.
pub struct Responder<S: Store + 'static> {
    network: Arc<BroadcastNetwork>,
    name: String,
    config: TetherConfig,
    target: Arc<LazyTarget<S>>,
    active: Option<Active>,
}

impl<S: Store + 'static> Responder<S> {
    /// Create a responder whose target is built by `factory` on the first
    /// request.
    pub fn new<F, Fut>(
        network: Arc<BroadcastNetwork>,
        name: impl Into<String>,
        config: TetherConfig,
        factory: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<S>> + Send + 'static,
    {
        Self::from_target(network, name, config, LazyTarget::new(factory))
    }

    /// Create a responder for an existing store.
    pub fn with_target(
        network: Arc<BroadcastNetwork>,
        name: impl Into<String>,
        config: TetherConfig,
        store: Arc<S>,
    ) -> Self {
        Self::from_target(network, name, config, LazyTarget::ready(store))
    }

    fn from_target(
        network: Arc<BroadcastNetwork>,
        name: impl Into<String>,
        config: TetherConfig,
        target: LazyTarget<S>,
    ) -> Self {
        Self {
            network,
            name: name.into(),
            config,
            target: Arc::new(target),
            active: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The target store, once created.
    pub fn target(&self) -> Option<Arc<S>> {
        self.target.get()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Start answering requests and claim the primary role.
    pub async fn activate(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Ok(());
        }
        self.config.validate()?;
        if self.name.is_empty() {
            return Err(TetherError::InvalidConfig(
                "responder name must not be empty".into(),
            ));
        }

        if let Some(channel_name) = &self.config.broadcast_channel_name {
            let channel = self.network.join(channel_name).await;
            self.target.attach_channel(channel);
        }

        let (handle, inbox) = endpoint(self.name.as_str());
        let id = handle.id();
        let router = MessageRouter::new(Arc::clone(&self.target))?.activate(inbox);
        self.network.claim_primary(handle);

        info!(name = %self.name, endpoint = %id, "responder activated");
        self.active = Some(Active { id, router });
        Ok(())
    }

    /// Stop answering requests and give up the primary role if still held.
    ///
    /// Returns once the endpoint no longer accepts requests.
    pub async fn deactivate(&mut self) {
        if let Some(router) = self.stop() {
            router.deactivate().await;
            info!(name = %self.name, "responder deactivated");
        }
    }

    fn stop(&mut self) -> Option<RouterHandle> {
        let active = self.active.take()?;
        self.network.release_primary(active.id);
        self.target.detach();
        Some(active.router)
    }
}

impl<S: Store + 'static> Drop for Responder<S> {
    fn drop(&mut self) {
        // Dropping the router handle aborts the listener.
        self.stop();
    }
}
