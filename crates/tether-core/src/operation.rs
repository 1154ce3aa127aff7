//! Operations and transforms.
//!
//! An [`Operation`] describes a single record change. A [`Transform`] is an
//! ordered batch of operations with its own identifier; it is what gets
//! applied, logged, and broadcast.

use serde::{Deserialize, Serialize};

use crate::record::{Record, RecordIdentity};
use crate::types::TransformId;

/// A single, serializable record change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    /// Insert the record, replacing any existing record with the same identity.
    AddRecord { record: Record },
    /// Merge the record's attributes into the existing record (created if absent).
    UpdateRecord { record: Record },
    /// Delete the record. Removing an absent record is a no-op.
    RemoveRecord { record: RecordIdentity },
    /// Set a single attribute (record created if absent).
    ReplaceAttribute {
        record: RecordIdentity,
        attribute: String,
        value: serde_json::Value,
    },
}

impl Operation {
    /// The record touched by this operation.
    pub fn identity(&self) -> RecordIdentity {
        match self {
            Operation::AddRecord { record } | Operation::UpdateRecord { record } => {
                record.identity()
            }
            Operation::RemoveRecord { record } | Operation::ReplaceAttribute { record, .. } => {
                record.clone()
            }
        }
    }
}

/// An ordered batch of operations with a unique identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    pub id: TransformId,
    pub operations: Vec<Operation>,
}

impl Transform {
    /// Create a transform with a fresh random id.
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            id: TransformId::random(),
            operations,
        }
    }

    /// Create a transform with a caller-chosen id.
    pub fn with_id(id: impl Into<TransformId>, operations: Vec<Operation>) -> Self {
        Self {
            id: id.into(),
            operations,
        }
    }

    /// Start building a transform.
    pub fn builder() -> TransformBuilder {
        TransformBuilder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

/// Builder for transforms.
#[derive(Debug, Default)]
pub struct TransformBuilder {
    id: Option<TransformId>,
    operations: Vec<Operation>,
}

impl TransformBuilder {
    /// Use a specific id instead of a random one.
    pub fn id(mut self, id: impl Into<TransformId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn add_record(mut self, record: Record) -> Self {
        self.operations.push(Operation::AddRecord { record });
        self
    }

    pub fn update_record(mut self, record: Record) -> Self {
        self.operations.push(Operation::UpdateRecord { record });
        self
    }

    pub fn remove_record(mut self, record: RecordIdentity) -> Self {
        self.operations.push(Operation::RemoveRecord { record });
        self
    }

    pub fn replace_attribute(
        mut self,
        record: RecordIdentity,
        attribute: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.operations.push(Operation::ReplaceAttribute {
            record,
            attribute: attribute.into(),
            value: value.into(),
        });
        self
    }

    pub fn build(self) -> Transform {
        Transform {
            id: self.id.unwrap_or_else(TransformId::random),
            operations: self.operations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_order() {
        let earth = RecordIdentity::new("planet", "earth");
        let transform = Transform::builder()
            .id("t1")
            .add_record(Record::new("planet", "earth"))
            .replace_attribute(earth.clone(), "name", "Earth")
            .remove_record(earth.clone())
            .build();

        assert_eq!(transform.id, TransformId::from("t1"));
        assert_eq!(transform.len(), 3);
        assert!(matches!(transform.operations[0], Operation::AddRecord { .. }));
        assert!(matches!(transform.operations[1], Operation::ReplaceAttribute { .. }));
        assert!(matches!(transform.operations[2], Operation::RemoveRecord { .. }));
        assert!(transform.operations.iter().all(|op| op.identity() == earth));
    }

    #[test]
    fn test_builder_generates_id() {
        let t1 = Transform::builder().build();
        let t2 = Transform::builder().build();
        assert_ne!(t1.id, t2.id);
        assert!(t1.is_empty());
    }
}
