//! Primary endpoint resolver.
//!
//! Resolves and caches a handle to whichever context currently acts as the
//! primary. The cache is an [`EndpointCell`]: a new handle replaces the old
//! one whole, so a call already holding the old `Arc` finishes (or times
//! out) against it undisturbed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::client::DEFAULT_TIMEOUT;
use crate::error::{Result, SyncError};
use crate::transport::memory::BroadcastNetwork;
use crate::transport::EndpointHandle;

/// Configuration for [`PrimaryResolver`].
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// How long `resolve` waits for a primary to appear.
    pub timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Versioned holder of the cached endpoint handle.
#[derive(Debug, Default)]
pub struct EndpointCell {
    slot: RwLock<Option<Arc<EndpointHandle>>>,
    version: AtomicU64,
}

impl EndpointCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<EndpointHandle>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bumped on every `replace` and `invalidate`.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Install a new handle, then publish the new version.
    pub fn replace(&self, handle: EndpointHandle) -> Arc<EndpointHandle> {
        let handle = Arc::new(handle);
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&handle));
        self.version.fetch_add(1, Ordering::AcqRel);
        handle
    }

    pub fn invalidate(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.version.fetch_add(1, Ordering::AcqRel);
    }
}

/// Resolves the current primary endpoint.
pub struct PrimaryResolver {
    network: Arc<BroadcastNetwork>,
    cell: Arc<EndpointCell>,
    config: ResolverConfig,
}

impl PrimaryResolver {
    pub fn new(network: Arc<BroadcastNetwork>, config: ResolverConfig) -> Self {
        Self {
            network,
            cell: Arc::new(EndpointCell::new()),
            config,
        }
    }

    pub fn cell(&self) -> &Arc<EndpointCell> {
        &self.cell
    }

    /// Return the cached primary if it is live, otherwise wait for one.
    ///
    /// Fails with [`SyncError::ResolutionTimeout`] if none appears within the
    /// configured timeout. The registry subscription is dropped on every path.
    pub async fn resolve(&self) -> Result<Arc<EndpointHandle>> {
        if let Some(handle) = self.cell.current() {
            if handle.is_live() {
                return Ok(handle);
            }
            debug!(primary = %handle.id(), "cached primary is gone");
            self.cell.invalidate();
        }

        let mut registry = self.network.watch_primary();
        let wait = async {
            loop {
                let current = registry.borrow_and_update().clone();
                if let Some(handle) = current.filter(EndpointHandle::is_live) {
                    return Ok(handle);
                }
                if registry.changed().await.is_err() {
                    return Err(SyncError::TransportError("primary registry closed".into()));
                }
            }
        };

        match tokio::time::timeout(self.config.timeout, wait).await {
            Ok(Ok(handle)) => {
                debug!(primary = %handle.id(), "primary resolved");
                Ok(self.cell.replace(handle))
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(SyncError::ResolutionTimeout {
                timeout: self.config.timeout,
            }),
        }
    }

    /// Keep the cached handle in step with "primary changed" notifications.
    ///
    /// The registry's value at subscription time is applied first, so a
    /// change that lands between `resolve` and `follow` is not missed.
    /// Only a new primary replaces the cache; a cleared registry leaves it
    /// for `resolve` to find dead.
    pub fn follow(&self) -> FollowHandle {
        let mut registry = self.network.watch_primary();
        let cell = Arc::clone(&self.cell);

        let task = tokio::spawn(async move {
            loop {
                let next = registry.borrow_and_update().clone();
                if let Some(handle) = next {
                    let cached = cell.current().map(|current| current.id());
                    if cached != Some(handle.id()) {
                        info!(primary = %handle.id(), "following new primary");
                        cell.replace(handle);
                    }
                }
                if registry.changed().await.is_err() {
                    break;
                }
            }
        });

        FollowHandle { task }
    }
}

/// Background task started by [`PrimaryResolver::follow`].
pub struct FollowHandle {
    task: JoinHandle<()>,
}

impl FollowHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for FollowHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    use crate::transport::endpoint;

    fn resolver(network: &Arc<BroadcastNetwork>, timeout: Duration) -> PrimaryResolver {
        PrimaryResolver::new(Arc::clone(network), ResolverConfig { timeout })
    }

    #[test]
    fn test_cell_versions() {
        let cell = EndpointCell::new();
        assert_eq!(cell.version(), 0);

        let (handle, _inbox) = endpoint("primary");
        let installed = cell.replace(handle.clone());
        assert_eq!(installed.id(), handle.id());
        assert_eq!(cell.version(), 1);

        cell.invalidate();
        assert!(cell.current().is_none());
        assert_eq!(cell.version(), 2);
    }

    #[tokio::test]
    async fn test_existing_primary_resolves_immediately() {
        let network = BroadcastNetwork::new();
        let (handle, _inbox) = endpoint("primary");
        network.claim_primary(handle.clone());

        let resolver = resolver(&network, Duration::from_millis(100));
        assert_eq!(resolver.resolve().await.unwrap().id(), handle.id());
        // Second call hits the cache.
        assert_eq!(resolver.resolve().await.unwrap().id(), handle.id());
        assert_eq!(resolver.cell().version(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_success() {
        let network = BroadcastNetwork::new();
        let resolver = resolver(&network, Duration::from_millis(10_000));

        let started = Instant::now();
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, SyncError::ResolutionTimeout { .. }));
        assert!(started.elapsed() >= Duration::from_millis(10_000));

        let (handle, _inbox) = endpoint("primary");
        network.claim_primary(handle.clone());

        let started = Instant::now();
        assert_eq!(resolver.resolve().await.unwrap().id(), handle.id());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_primary_to_appear() {
        let network = BroadcastNetwork::new();
        let resolver = resolver(&network, Duration::from_secs(10));
        let (handle, _inbox) = endpoint("primary");

        let claimer = {
            let network = Arc::clone(&network);
            let handle = handle.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                network.claim_primary(handle);
            })
        };

        assert_eq!(resolver.resolve().await.unwrap().id(), handle.id());
        claimer.await.unwrap();
    }

    #[tokio::test]
    async fn test_dead_cached_primary_is_replaced() {
        let network = BroadcastNetwork::new();
        let resolver = resolver(&network, Duration::from_secs(1));

        let (old, old_inbox) = endpoint("old");
        network.claim_primary(old.clone());
        resolver.resolve().await.unwrap();

        drop(old_inbox);
        let (new, _new_inbox) = endpoint("new");
        network.claim_primary(new.clone());

        assert_eq!(resolver.resolve().await.unwrap().id(), new.id());
    }

    #[tokio::test]
    async fn test_follow_replaces_cached_handle() {
        let network = BroadcastNetwork::new();
        let resolver = resolver(&network, Duration::from_secs(1));
        let (first, _first_inbox) = endpoint("first");
        network.claim_primary(first.clone());
        let held = resolver.resolve().await.unwrap();

        let _follow = resolver.follow();
        let (second, _second_inbox) = endpoint("second");
        network.claim_primary(second.clone());

        tokio::time::timeout(Duration::from_secs(5), async {
            while resolver.cell().current().map(|h| h.id()) != Some(second.id()) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        // The handle taken before the change is untouched.
        assert_eq!(held.id(), first.id());
        assert!(held.is_live());
    }

    #[tokio::test]
    async fn test_follow_sees_change_made_before_it_started() {
        let network = BroadcastNetwork::new();
        let resolver = resolver(&network, Duration::from_secs(1));
        let (first, _first_inbox) = endpoint("first");
        network.claim_primary(first.clone());
        resolver.resolve().await.unwrap();

        // The primary changes after resolution but before following starts,
        // while the old primary is still live.
        let (second, _second_inbox) = endpoint("second");
        network.claim_primary(second.clone());
        let _follow = resolver.follow();

        tokio::time::timeout(Duration::from_secs(5), async {
            while resolver.cell().current().map(|h| h.id()) != Some(second.id()) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(resolver.resolve().await.unwrap().id(), second.id());
    }

    #[tokio::test]
    async fn test_follow_keeps_cache_for_unchanged_primary() {
        let network = BroadcastNetwork::new();
        let resolver = resolver(&network, Duration::from_secs(1));
        let (first, _first_inbox) = endpoint("first");
        network.claim_primary(first);
        resolver.resolve().await.unwrap();

        let _follow = resolver.follow();
        tokio::task::yield_now().await;
        assert_eq!(resolver.cell().version(), 1);
    }
}
