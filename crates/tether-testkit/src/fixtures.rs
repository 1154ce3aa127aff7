//! Test fixtures for common scenarios.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::{sleep, timeout};

use tether::store::{MemoryStore, Store};
use tether::{BroadcastNetwork, RemoteSource, Responder, TetherConfig};
use tether_core::{Record, Transform, TransformId};

/// How long [`eventually_applied`] waits before giving up.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// A small planet/moon data set.
pub fn solar_system() -> Vec<Record> {
    vec![
        Record::new("planet", "earth")
            .with_attribute("name", "Earth")
            .with_attribute("moons", json!(1)),
        Record::new("planet", "mars")
            .with_attribute("name", "Mars")
            .with_attribute("moons", json!(2)),
        Record::new("moon", "luna")
            .with_attribute("name", "Luna")
            .with_attribute("planet", "earth"),
    ]
}

/// Wait until `store` has applied transform `id`.
///
/// Panics after [`SETTLE_TIMEOUT`].
pub async fn eventually_applied<S: Store + ?Sized>(store: &S, id: impl Into<TransformId>) {
    let id = id.into();
    let settled = timeout(SETTLE_TIMEOUT, async {
        loop {
            match store.has_applied(&id).await {
                Ok(true) => break,
                Ok(false) => sleep(Duration::from_millis(5)).await,
                Err(err) => panic!("has_applied({id}) failed: {err}"),
            }
        }
    })
    .await;
    if settled.is_err() {
        panic!("{id} was never applied");
    }
}

/// One primary context and a set of secondaries on a shared network.
pub struct ContextFixture {
    pub network: Arc<BroadcastNetwork>,
    pub primary_store: Arc<MemoryStore>,
    pub responder: Responder<MemoryStore>,
    pub secondaries: Vec<RemoteSource<MemoryStore>>,
}

impl ContextFixture {
    /// Start a primary over an empty store plus `secondaries` activated
    /// remote sources.
    pub async fn new(secondaries: usize) -> tether::Result<Self> {
        Self::with_records(secondaries, Vec::new()).await
    }

    /// Like [`ContextFixture::new`], with the primary's store seeded.
    pub async fn with_records(secondaries: usize, records: Vec<Record>) -> tether::Result<Self> {
        let network = BroadcastNetwork::new();
        let primary_store = Arc::new(MemoryStore::with_records(records));
        let mut responder = Responder::with_target(
            Arc::clone(&network),
            "primary",
            TetherConfig::default(),
            Arc::clone(&primary_store),
        );
        responder.activate().await?;

        let mut sources = Vec::with_capacity(secondaries);
        for _ in 0..secondaries {
            let mut source = RemoteSource::new(
                Arc::new(MemoryStore::new()),
                Arc::clone(&network),
                TetherConfig::default(),
            );
            source.activate().await?;
            sources.push(source);
        }

        Ok(Self {
            network,
            primary_store,
            responder,
            secondaries: sources,
        })
    }

    /// A secondary by index.
    pub fn secondary(&self, index: usize) -> &RemoteSource<MemoryStore> {
        &self.secondaries[index]
    }

    /// Wait until every secondary replica has applied `id`.
    pub async fn settle(&self, id: impl Into<TransformId>) {
        let id = id.into();
        for source in &self.secondaries {
            eventually_applied(source.local().as_ref(), id.clone()).await;
        }
    }

    /// Apply a transform directly on the primary store, as a local write.
    pub async fn apply_on_primary(&self, transform: &Transform) -> tether::Result<()> {
        self.primary_store.update(transform).await?;
        Ok(())
    }
}
