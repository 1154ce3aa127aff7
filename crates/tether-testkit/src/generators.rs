//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::Value;

use tether_core::{Operation, Record, RecordIdentity, Transform, TransformId};

/// A record type from a small fixed set, so operations collide often.
pub fn record_kind() -> impl Strategy<Value = String> {
    prop_oneof![Just("planet"), Just("moon"), Just("star")].prop_map(String::from)
}

/// Generate a RecordIdentity from a small id space.
pub fn record_identity() -> impl Strategy<Value = RecordIdentity> {
    (record_kind(), "[a-e]").prop_map(|(kind, id)| RecordIdentity::new(kind, id))
}

/// Generate a JSON-like attribute value.
pub fn attribute_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[a-z ]{0,12}".prop_map(Value::from),
    ]
}

/// Generate a record with up to three attributes.
pub fn record() -> impl Strategy<Value = Record> {
    (
        record_identity(),
        prop::collection::btree_map("[a-c]", attribute_value(), 0..3),
    )
        .prop_map(|(identity, attributes)| Record {
            kind: identity.kind,
            id: identity.id,
            attributes,
        })
}

/// Generate an Operation of any kind.
pub fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        record().prop_map(|record| Operation::AddRecord { record }),
        record().prop_map(|record| Operation::UpdateRecord { record }),
        record_identity().prop_map(|record| Operation::RemoveRecord { record }),
        (record_identity(), "[a-c]", attribute_value()).prop_map(|(record, attribute, value)| {
            Operation::ReplaceAttribute {
                record,
                attribute,
                value,
            }
        }),
    ]
}

/// Generate a non-empty Transform with a random id.
pub fn transform() -> impl Strategy<Value = Transform> {
    prop::collection::vec(operation(), 1..5).prop_map(Transform::new)
}

/// Generate transforms with distinct, stable ids (`t0`, `t1`, ...).
pub fn transforms(max: usize) -> impl Strategy<Value = Vec<Transform>> {
    prop::collection::vec(prop::collection::vec(operation(), 1..5), 0..=max).prop_map(|batches| {
        batches
            .into_iter()
            .enumerate()
            .map(|(i, operations)| Transform::with_id(TransformId::new(format!("t{i}")), operations))
            .collect()
    })
}
