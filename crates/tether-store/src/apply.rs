//! Pure record semantics shared by every store implementation.
//!
//! Operations are order tolerant: adding an existing record replaces it,
//! updating or replacing an attribute on an absent record creates it, and
//! removing an absent record does nothing. A transform never fails because
//! of what a replica has or has not seen before it.

use tether_core::{Operation, Record, Transform};

use crate::error::{Result, StoreError};

/// Compute the post-state of one record under one operation.
pub fn apply_operation(existing: Option<Record>, operation: &Operation) -> Option<Record> {
    match operation {
        Operation::AddRecord { record } => Some(record.clone()),
        Operation::UpdateRecord { record } => {
            let mut merged = existing.unwrap_or_else(|| Record::new(&record.kind, &record.id));
            merged
                .attributes
                .extend(record.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
            Some(merged)
        }
        Operation::RemoveRecord { .. } => None,
        Operation::ReplaceAttribute {
            record,
            attribute,
            value,
        } => {
            let mut target = existing.unwrap_or_else(|| Record::new(&record.kind, &record.id));
            target.attributes.insert(attribute.clone(), value.clone());
            Some(target)
        }
    }
}

/// Reject transforms no store will accept.
pub fn validate_transform(transform: &Transform) -> Result<()> {
    if transform.id.as_str().is_empty() {
        return Err(StoreError::InvalidOperation(
            "transform id must not be empty".into(),
        ));
    }
    if transform.is_empty() {
        return Err(StoreError::InvalidOperation(format!(
            "transform {} has no operations",
            transform.id
        )));
    }
    for operation in &transform.operations {
        let identity = operation.identity();
        if identity.kind.is_empty() || identity.id.is_empty() {
            return Err(StoreError::InvalidOperation(format!(
                "transform {} touches a record without type or id",
                transform.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use tether_core::RecordIdentity;

    fn earth() -> Record {
        Record::new("planet", "earth").with_attribute("name", "Earth")
    }

    #[test]
    fn test_add_replaces_existing() {
        let existing = earth().with_attribute("moons", 1);
        let op = Operation::AddRecord { record: earth() };
        let after = apply_operation(Some(existing), &op).unwrap();
        assert_eq!(after, earth());
    }

    #[test]
    fn test_update_merges_and_creates() {
        let patch = Record::new("planet", "earth").with_attribute("moons", 1);
        let op = Operation::UpdateRecord { record: patch };

        let merged = apply_operation(Some(earth()), &op).unwrap();
        assert_eq!(merged.attribute("name"), Some(&json!("Earth")));
        assert_eq!(merged.attribute("moons"), Some(&json!(1)));

        let created = apply_operation(None, &op).unwrap();
        assert_eq!(created.attribute("name"), None);
        assert_eq!(created.attribute("moons"), Some(&json!(1)));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let op = Operation::RemoveRecord {
            record: RecordIdentity::new("planet", "pluto"),
        };
        assert_eq!(apply_operation(None, &op), None);
    }

    #[test]
    fn test_replace_attribute_creates_record() {
        let op = Operation::ReplaceAttribute {
            record: RecordIdentity::new("planet", "mars"),
            attribute: "color".into(),
            value: json!("red"),
        };
        let after = apply_operation(None, &op).unwrap();
        assert_eq!(after.identity(), RecordIdentity::new("planet", "mars"));
        assert_eq!(after.attribute("color"), Some(&json!("red")));
    }

    #[test]
    fn test_validate_rejects_empty_transform() {
        let err = validate_transform(&Transform::with_id("t1", vec![])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation(_)));
    }

    #[test]
    fn test_validate_rejects_blank_identity() {
        let transform = Transform::builder().id("t1").add_record(Record::new("", "x")).build();
        assert!(validate_transform(&transform).is_err());
    }

    fn arb_record() -> impl Strategy<Value = Record> {
        let attrs = prop::collection::btree_map("[a-c]", any::<i32>().prop_map(|v| json!(v)), 0..3);
        ("[a-b]", attrs).prop_map(|(id, attributes)| Record {
            kind: "planet".into(),
            id,
            attributes,
        })
    }

    fn arb_operation() -> impl Strategy<Value = Operation> {
        prop_oneof![
            arb_record().prop_map(|record| Operation::AddRecord { record }),
            arb_record().prop_map(|record| Operation::UpdateRecord { record }),
            "[a-b]".prop_map(|id| Operation::RemoveRecord {
                record: RecordIdentity::new("planet", id),
            }),
            ("[a-b]", "[a-c]", any::<i32>()).prop_map(|(id, attribute, v)| {
                Operation::ReplaceAttribute {
                    record: RecordIdentity::new("planet", id),
                    attribute,
                    value: json!(v),
                }
            }),
        ]
    }

    proptest! {
        #[test]
        fn operation_is_idempotent(op in arb_operation(), seeded in any::<bool>()) {
            let existing = seeded.then(|| {
                let identity = op.identity();
                Record::new(identity.kind, identity.id).with_attribute("z", 0)
            });
            let once = apply_operation(existing, &op);
            let twice = apply_operation(once.clone(), &op);
            prop_assert_eq!(once, twice);
        }
    }
}
