//! Broadcast synchronizer.
//!
//! The publisher side ([`TransformBroadcaster`]) announces every locally
//! applied transform on a named broadcast channel. The subscriber side
//! ([`TransformReplicator`]) replays announced transforms into a local
//! replica unless the replica's transform log already has them.
//!
//! Only [`Origin::Local`] changes are announced, so a replayed transform is
//! never broadcast again.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use tether_core::{Envelope, Transform};
use tether_store::{Origin, Store};

use crate::error::{Result, SyncError};
use crate::transport::memory::BroadcastChannel;

/// Result of offering a transform to a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Not in the log; applied now.
    Applied,
    /// Already in the log; discarded.
    Duplicate,
}

/// Replay a broadcast transform into `store`, at most once per id.
pub async fn replay<S>(store: &S, transform: &Transform) -> Result<ReplayOutcome>
where
    S: Store + ?Sized,
{
    if store.has_applied(&transform.id).await? {
        return Ok(ReplayOutcome::Duplicate);
    }
    // `transformed` re-checks the log, so a concurrent application wins once.
    if store.transformed(transform).await? {
        Ok(ReplayOutcome::Applied)
    } else {
        Ok(ReplayOutcome::Duplicate)
    }
}

fn check_channel(channel: &BroadcastChannel) -> Result<()> {
    if channel.name().is_empty() {
        return Err(SyncError::InvalidConfig(
            "broadcast channel name must not be empty".into(),
        ));
    }
    Ok(())
}

/// Announces local transforms on a broadcast channel.
pub struct TransformBroadcaster {
    task: JoinHandle<()>,
}

impl TransformBroadcaster {
    /// Start forwarding `store`'s local transforms to `channel`.
    ///
    /// Subscribes before returning, so every transform applied after this
    /// call is announced.
    pub fn activate<S>(store: &S, mut channel: BroadcastChannel) -> Result<Self>
    where
        S: Store + ?Sized,
    {
        check_channel(&channel)?;
        let mut events = store.subscribe();
        info!(channel = channel.name(), "broadcaster activated");

        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event.origin {
                    Origin::Local => {
                        let id = event.transform.id.clone();
                        let posted = Envelope::Transform(event.transform)
                            .encode()
                            .map_err(SyncError::from)
                            .and_then(|bytes| channel.post_message(bytes));
                        match posted {
                            Ok(()) => debug!(transform = %id, "transform broadcast"),
                            Err(err) => warn!(transform = %id, error = %err, "broadcast failed"),
                        }
                    }
                    Origin::Replicated => {
                        trace!(transform = %event.transform.id, "not re-broadcasting replayed transform");
                    }
                }
            }
            channel.close();
        });

        Ok(Self { task })
    }

    /// Stop announcing. Dropping the broadcaster has the same effect.
    pub fn deactivate(self) {
        self.task.abort();
    }
}

impl Drop for TransformBroadcaster {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Replays broadcast transforms into a local replica.
pub struct TransformReplicator {
    task: JoinHandle<()>,
}

impl TransformReplicator {
    pub fn activate<S>(store: Arc<S>, mut channel: BroadcastChannel) -> Result<Self>
    where
        S: Store + ?Sized + 'static,
    {
        check_channel(&channel)?;
        info!(channel = channel.name(), "replicator activated");

        let task = tokio::spawn(async move {
            while let Some(data) = channel.recv().await {
                let transform = match Envelope::decode(&data) {
                    Ok(Some(Envelope::Transform(transform))) => transform,
                    Ok(Some(other)) => {
                        trace!(kind = %other.kind(), "ignoring non-transform broadcast");
                        continue;
                    }
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(error = %err, "malformed broadcast");
                        continue;
                    }
                };

                match replay(store.as_ref(), &transform).await {
                    Ok(ReplayOutcome::Applied) => debug!(transform = %transform.id, "replayed"),
                    Ok(ReplayOutcome::Duplicate) => {
                        trace!(transform = %transform.id, "duplicate discarded")
                    }
                    Err(err) => warn!(transform = %transform.id, error = %err, "replay failed"),
                }
            }
        });

        Ok(Self { task })
    }

    /// Stop replaying. Dropping the replicator has the same effect.
    pub fn deactivate(self) {
        self.task.abort();
    }
}

impl Drop for TransformReplicator {
    fn drop(&mut self) {
        self.task.abort();
    }
}
