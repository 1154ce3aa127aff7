//! Store trait: the boundary between the synchronization layer and a
//! record store.
//!
//! The synchronization layer is storage-agnostic. Implementations include
//! an in-memory replica (for tests and ephemeral contexts) and SQLite.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use tether_core::{Query, QueryResult, Transform, TransformId, TransformLog, TransformResult};

use crate::error::Result;

/// Receiving side of a [`Store::subscribe`] subscription.
pub type EventReceiver = mpsc::UnboundedReceiver<TransformEvent>;
/// Where an applied transform came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Applied through [`Store::update`] in this context.
    Local,
    /// Replayed through [`Store::transformed`] from another context.
    Replicated,
}

/// Emitted once per transform, on its first application.
#[derive(Debug, Clone)]
pub struct TransformEvent {
    pub transform: Transform,
    pub origin: Origin,
}

/// Fan-out of transform events to every live subscriber.
///
/// Each subscriber has its own unbounded queue, so a slow subscriber never
/// loses events. Closed subscribers are pruned on publish.
#[derive(Debug, Default)]
pub struct EventSubscribers {
    senders: Mutex<Vec<mpsc::UnboundedSender<TransformEvent>>>,
}

impl EventSubscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    /// Deliver `event` to every subscriber. Having none is fine.
    pub fn publish(&self, event: TransformEvent) {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        senders.retain(|sender| sender.send(event.clone()).is_ok());
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        senders.retain(|sender| !sender.is_closed());
        senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A receiver that never yields an event.
pub fn closed_subscription() -> EventReceiver {
    mpsc::unbounded_channel().1
}

/// The Store trait: async interface at the store boundary.
///
/// # Design Notes
///
/// - **Idempotent application**: `update` and `transformed` consult the
///   transform log first; a logged id is never applied twice.
/// - **Events**: exactly one [`TransformEvent`] per first application, sent
///   after the effects and the log entry are visible.
/// - **Empty transforms** are rejected with `InvalidOperation`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Evaluate a read description.
    async fn query(&self, query: &Query) -> Result<QueryResult>;

    /// Apply a locally originated transform.
    ///
    /// If the transform is already logged, returns the current post-state of
    /// its records without reapplying.
    async fn update(&self, transform: &Transform) -> Result<TransformResult>;

    /// Apply a transform that already happened elsewhere.
    ///
    /// Returns `true` if it was applied, `false` if it was already logged.
    async fn transformed(&self, transform: &Transform) -> Result<bool>;

    /// Check the transform log for an id.
    async fn has_applied(&self, id: &TransformId) -> Result<bool>;

    /// Snapshot of the transform log.
    async fn transform_log(&self) -> Result<TransformLog>;

    /// Subscribe to applied-transform events.
    ///
    /// Every event applied after this call is delivered, in order.
    fn subscribe(&self) -> EventReceiver;
}
