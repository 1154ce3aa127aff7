//! The transform log.
//!
//! Every replica records the identifier of each transform it has applied.
//! The log only grows, and membership is the sole deduplication key when a
//! transform arrives more than once (directly, via broadcast, or both).

use std::collections::HashSet;

use crate::operation::Transform;
use crate::types::TransformId;

/// Decision taken when a transform is offered to a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Not seen before; the caller must apply its effects.
    Apply,
    /// Already applied; the caller must discard it.
    Duplicate,
}

/// Append-only set of applied transform identifiers.
#[derive(Debug, Clone, Default)]
pub struct TransformLog {
    /// Identifiers in application order.
    entries: Vec<TransformId>,
    /// Membership index over `entries`.
    index: HashSet<TransformId>,
}

impl TransformLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &TransformId) -> bool {
        self.index.contains(id)
    }

    /// Record an identifier. Returns `false` if it was already present.
    pub fn insert(&mut self, id: TransformId) -> bool {
        if !self.index.insert(id.clone()) {
            return false;
        }
        self.entries.push(id);
        true
    }

    /// Offer a transform to the log.
    ///
    /// The identifier is recorded on `Apply`; the log is untouched on
    /// `Duplicate`.
    pub fn admit(&mut self, transform: &Transform) -> Admission {
        if self.insert(transform.id.clone()) {
            Admission::Apply
        } else {
            Admission::Duplicate
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifiers in the order they were applied.
    pub fn iter(&self) -> impl Iterator<Item = &TransformId> {
        self.entries.iter()
    }
}

impl PartialEq for TransformLog {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for TransformLog {}

impl FromIterator<TransformId> for TransformLog {
    fn from_iter<I: IntoIterator<Item = TransformId>>(iter: I) -> Self {
        let mut log = TransformLog::new();
        for id in iter {
            log.insert(id);
        }
        log
    }
}
