//! In-memory implementation of the Store trait.
//!
//! Used by ephemeral contexts and tests. It has the same semantics as
//! SQLite but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::{debug, trace};

use tether_core::{
    Admission, Query, QueryResult, Record, RecordIdentity, Transform, TransformId, TransformLog,
    TransformResult,
};

use crate::apply::{apply_operation, validate_transform};
use crate::error::{Result, StoreError};
use crate::traits::{EventReceiver, EventSubscribers, Origin, Store, TransformEvent};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
    events: EventSubscribers,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Records indexed by identity.
    records: HashMap<RecordIdentity, Record>,

    /// Applied transform ids.
    log: TransformLog,
}

impl MemoryStoreInner {
    fn post_state(&self, transform: &Transform) -> TransformResult {
        TransformResult {
            transform_id: transform.id.clone(),
            records: transform
                .operations
                .iter()
                .map(|op| self.records.get(&op.identity()).cloned())
                .collect(),
        }
    }

    /// Apply every operation in order and return the post-state per operation.
    fn apply(&mut self, transform: &Transform) -> TransformResult {
        let mut records = Vec::with_capacity(transform.len());
        for operation in &transform.operations {
            let identity = operation.identity();
            let existing = self.records.remove(&identity);
            let after = apply_operation(existing, operation);
            if let Some(record) = &after {
                self.records.insert(identity, record.clone());
            }
            records.push(after);
        }
        TransformResult {
            transform_id: transform.id.clone(),
            records,
        }
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
            events: EventSubscribers::new(),
        }
    }

    /// Create a store pre-populated with records. Seeding does not touch
    /// the transform log.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.write() {
            for record in records {
                inner.records.insert(record.identity(), record);
            }
        }
        store
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn publish(&self, transform: &Transform, origin: Origin) {
        self.events.publish(TransformEvent {
            transform: transform.clone(),
            origin,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn query(&self, query: &Query) -> Result<QueryResult> {
        let inner = self.read()?;
        match query {
            Query::FindRecord { record } => inner
                .records
                .get(record)
                .cloned()
                .map(QueryResult::Record)
                .ok_or_else(|| StoreError::RecordNotFound {
                    kind: record.kind.clone(),
                    id: record.id.clone(),
                }),
            Query::FindRecords { kind } => {
                let mut records: Vec<Record> = inner
                    .records
                    .values()
                    .filter(|r| &r.kind == kind)
                    .cloned()
                    .collect();
                records.sort_by(|a, b| a.id.cmp(&b.id));
                Ok(QueryResult::Records(records))
            }
        }
    }

    async fn update(&self, transform: &Transform) -> Result<TransformResult> {
        validate_transform(transform)?;

        let result = {
            let mut inner = self.write()?;
            match inner.log.admit(transform) {
                Admission::Duplicate => {
                    trace!(transform = %transform.id, "update already applied");
                    return Ok(inner.post_state(transform));
                }
                Admission::Apply => inner.apply(transform),
            }
        };

        debug!(transform = %transform.id, operations = transform.len(), "applied local transform");
        self.publish(transform, Origin::Local);
        Ok(result)
    }

    async fn transformed(&self, transform: &Transform) -> Result<bool> {
        validate_transform(transform)?;

        {
            let mut inner = self.write()?;
            if inner.log.admit(transform) == Admission::Duplicate {
                trace!(transform = %transform.id, "replay already applied");
                return Ok(false);
            }
            inner.apply(transform);
        }

        debug!(transform = %transform.id, "applied replicated transform");
        self.publish(transform, Origin::Replicated);
        Ok(true)
    }

    async fn has_applied(&self, id: &TransformId) -> Result<bool> {
        Ok(self.read()?.log.contains(id))
    }

    async fn transform_log(&self) -> Result<TransformLog> {
        Ok(self.read()?.log.clone())
    }

    fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_earth(id: &str) -> Transform {
        Transform::builder()
            .id(id)
            .add_record(Record::new("planet", "earth").with_attribute("name", "Earth"))
            .build()
    }

    #[tokio::test]
    async fn test_update_then_query() {
        let store = MemoryStore::new();
        let result = store.update(&add_earth("t1")).await.unwrap();
        assert_eq!(result.records.len(), 1);

        let found = store
            .query(&Query::find_record("planet", "earth"))
            .await
            .unwrap();
        match found {
            QueryResult::Record(record) => assert_eq!(record.attribute("name"), Some(&json!("Earth"))),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_find_missing_record() {
        let store = MemoryStore::new();
        let err = store
            .query(&Query::find_record("planet", "pluto"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn test_find_records_sorted_by_id() {
        let store = MemoryStore::with_records([
            Record::new("planet", "venus"),
            Record::new("planet", "earth"),
            Record::new("moon", "luna"),
        ]);
        let QueryResult::Records(records) = store.query(&Query::find_records("planet")).await.unwrap()
        else {
            panic!("expected records");
        };
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["earth", "venus"]);
    }

    #[tokio::test]
    async fn test_update_is_idempotent() {
        let store = MemoryStore::new();
        let mut events = store.subscribe();

        store.update(&add_earth("t1")).await.unwrap();
        let again = store.update(&add_earth("t1")).await.unwrap();
        assert_eq!(again.records[0].as_ref().map(|r| r.id.as_str()), Some("earth"));

        let event = events.recv().await.unwrap();
        assert_eq!(event.origin, Origin::Local);
        assert!(events.try_recv().is_err());
        assert_eq!(store.transform_log().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transformed_skips_logged_ids() {
        let store = MemoryStore::new();
        store.update(&add_earth("t1")).await.unwrap();

        assert!(!store.transformed(&add_earth("t1")).await.unwrap());
        assert!(store.transformed(&add_earth("t2")).await.unwrap());
        assert!(store.has_applied(&TransformId::from("t2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_replicated_event_origin() {
        let store = MemoryStore::new();
        let mut events = store.subscribe();
        store.transformed(&add_earth("t9")).await.unwrap();
        assert_eq!(events.recv().await.unwrap().origin, Origin::Replicated);
    }

    #[tokio::test]
    async fn test_empty_transform_rejected_without_logging() {
        let store = MemoryStore::new();
        let empty = Transform::with_id("t0", vec![]);
        assert!(matches!(
            store.update(&empty).await,
            Err(StoreError::InvalidOperation(_))
        ));
        assert!(!store.has_applied(&TransformId::from("t0")).await.unwrap());
    }
}
