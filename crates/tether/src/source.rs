//! The secondary-context view of the primary's store.

use std::sync::Arc;

use tracing::{debug, info, warn};

use tether_core::{Query, QueryResult, Transform, TransformResult};
use tether_store::Store;
use tether_sync::{
    BroadcastNetwork, EndpointHandle, FollowHandle, PrimaryResolver, RequestClient,
    TransformReplicator,
};

use crate::config::TetherConfig;
use crate::error::{Result, TetherError};

struct Active {
    _follow: FollowHandle,
    _replicator: Option<TransformReplicator>,
}

/// Relays queries and updates to the current primary and keeps a local
/// replica in sync through broadcast replay.
pub struct RemoteSource<S: Store + 'static> {
    local: Arc<S>,
    network: Arc<BroadcastNetwork>,
    config: TetherConfig,
    resolver: PrimaryResolver,
    client: RequestClient,
    active: Option<Active>,
}

impl<S: Store + 'static> RemoteSource<S> {
    pub fn new(local: Arc<S>, network: Arc<BroadcastNetwork>, config: TetherConfig) -> Self {
        let resolver = PrimaryResolver::new(Arc::clone(&network), config.resolver_config());
        let client = RequestClient::new(config.client_config());
        Self {
            local,
            network,
            config,
            resolver,
            client,
            active: None,
        }
    }

    /// The local replica.
    pub fn local(&self) -> &Arc<S> {
        &self.local
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Join replication, resolve the primary and start following it.
    ///
    /// Replication starts before resolution so no announcement made while
    /// waiting for the primary is missed.
    pub async fn activate(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Ok(());
        }
        self.config.validate()?;

        let replicator = match &self.config.broadcast_channel_name {
            Some(name) => {
                let channel = self.network.join(name).await;
                Some(TransformReplicator::activate(Arc::clone(&self.local), channel)?)
            }
            None => None,
        };

        let primary = self.resolver.resolve().await?;
        let follow = self.resolver.follow();
        info!(primary = %primary.id(), "remote source activated");

        self.active = Some(Active {
            _follow: follow,
            _replicator: replicator,
        });
        Ok(())
    }

    /// Stop replaying and following.
    pub fn deactivate(&mut self) {
        if self.active.take().is_some() {
            info!("remote source deactivated");
        }
    }

    async fn primary(&self) -> Result<Arc<EndpointHandle>> {
        if self.active.is_none() {
            return Err(TetherError::NotActivated);
        }
        Ok(self.resolver.resolve().await?)
    }

    /// Run a query on the primary's store.
    pub async fn query(&self, query: Query) -> Result<QueryResult> {
        let primary = self.primary().await?;
        Ok(self.client.query(primary.as_ref(), query).await?)
    }

    /// Apply a transform on the primary's store, then on the local replica.
    ///
    /// The broadcast copy that arrives later is a duplicate and is discarded.
    pub async fn update(&self, transform: Transform) -> Result<TransformResult> {
        let primary = self.primary().await?;
        let result = self.client.update(primary.as_ref(), transform.clone()).await?;

        match self.local.transformed(&transform).await {
            Ok(true) => debug!(transform = %transform.id, "applied remote update locally"),
            Ok(false) => {}
            Err(err) => warn!(transform = %transform.id, error = %err, "local replica not updated"),
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tether_store::MemoryStore;

    #[tokio::test]
    async fn test_calls_before_activation_fail() {
        let source = RemoteSource::new(
            Arc::new(MemoryStore::new()),
            BroadcastNetwork::new(),
            TetherConfig::default(),
        );
        let err = source
            .query(Query::find_records("planet"))
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::NotActivated));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_times_out_without_primary() {
        let mut source = RemoteSource::new(
            Arc::new(MemoryStore::new()),
            BroadcastNetwork::new(),
            TetherConfig::default().with_resolve_timeout(Duration::from_millis(300)),
        );
        let err = source.activate().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Getting primary timed out. It took longer than 300ms."
        );
        assert!(!source.is_active());
    }
}
