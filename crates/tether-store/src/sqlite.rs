//! SQLite implementation of the Store trait.
//!
//! The durable replica. Uses rusqlite with bundled SQLite, wrapped in async
//! via tokio::spawn_blocking. Each transform runs in a single SQL
//! transaction so its effects and its log entry commit together.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, trace};

use tether_core::{
    Attributes, Query, QueryResult, Record, RecordIdentity, Transform, TransformId, TransformLog,
    TransformResult,
};

use crate::apply::{apply_operation, validate_transform};
use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{EventReceiver, EventSubscribers, Origin, Store, TransformEvent};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
    events: EventSubscribers,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            events: EventSubscribers::new(),
        }
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Apply a transform unless it is logged. Returns the post-state and
    /// whether it was applied by this call.
    async fn apply_logged(
        &self,
        transform: &Transform,
        origin: Origin,
    ) -> Result<(TransformResult, bool)> {
        validate_transform(transform)?;

        let owned = transform.clone();
        let outcome = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                if is_logged(&tx, &owned.id)? {
                    return Ok((post_state(&tx, &owned)?, false));
                }

                let mut records = Vec::with_capacity(owned.len());
                for operation in &owned.operations {
                    let identity = operation.identity();
                    let existing = load_record(&tx, &identity)?;
                    let after = apply_operation(existing, operation);
                    save_record(&tx, &identity, after.as_ref())?;
                    records.push(after);
                }

                tx.execute(
                    "INSERT INTO transform_log (transform_id, origin, applied_at) VALUES (?1, ?2, ?3)",
                    params![owned.id.as_str(), origin_code(origin), now_millis()],
                )?;
                tx.commit()?;

                Ok((
                    TransformResult {
                        transform_id: owned.id.clone(),
                        records,
                    },
                    true,
                ))
            })
            .await?;

        if outcome.1 {
            debug!(transform = %transform.id, ?origin, "applied transform");
            self.events.publish(TransformEvent {
                transform: transform.clone(),
                origin,
            });
        } else {
            trace!(transform = %transform.id, ?origin, "transform already applied");
        }
        Ok(outcome)
    }
}

fn origin_code(origin: Origin) -> i64 {
    match origin {
        Origin::Local => 0,
        Origin::Replicated => 1,
    }
}

fn is_logged(conn: &Connection, id: &TransformId) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT seq FROM transform_log WHERE transform_id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn post_state(conn: &Connection, transform: &Transform) -> Result<TransformResult> {
    let records = transform
        .operations
        .iter()
        .map(|op| load_record(conn, &op.identity()))
        .collect::<Result<Vec<_>>>()?;
    Ok(TransformResult {
        transform_id: transform.id.clone(),
        records,
    })
}

fn decode_attributes(blob: &[u8]) -> Result<Attributes> {
    ciborium::from_reader(blob).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn encode_attributes(attributes: &Attributes) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(attributes, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn load_record(conn: &Connection, identity: &RecordIdentity) -> Result<Option<Record>> {
    let blob: Option<Vec<u8>> = conn
        .query_row(
            "SELECT attributes FROM records WHERE kind = ?1 AND id = ?2",
            params![identity.kind, identity.id],
            |row| row.get(0),
        )
        .optional()?;

    blob.map(|blob| {
        Ok(Record {
            kind: identity.kind.clone(),
            id: identity.id.clone(),
            attributes: decode_attributes(&blob)?,
        })
    })
    .transpose()
}

fn save_record(conn: &Connection, identity: &RecordIdentity, record: Option<&Record>) -> Result<()> {
    match record {
        Some(record) => {
            conn.execute(
                "INSERT INTO records (kind, id, attributes, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(kind, id) DO UPDATE SET
                    attributes = excluded.attributes,
                    updated_at = excluded.updated_at",
                params![
                    identity.kind,
                    identity.id,
                    encode_attributes(&record.attributes)?,
                    now_millis()
                ],
            )?;
        }
        None => {
            conn.execute(
                "DELETE FROM records WHERE kind = ?1 AND id = ?2",
                params![identity.kind, identity.id],
            )?;
        }
    }
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn query(&self, query: &Query) -> Result<QueryResult> {
        let query = query.clone();
        self.with_conn(move |conn| match query {
            Query::FindRecord { record } => load_record(conn, &record)?
                .map(QueryResult::Record)
                .ok_or(StoreError::RecordNotFound {
                    kind: record.kind,
                    id: record.id,
                }),
            Query::FindRecords { kind } => {
                let mut stmt =
                    conn.prepare("SELECT id, attributes FROM records WHERE kind = ?1 ORDER BY id")?;
                let rows = stmt
                    .query_map(params![kind], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let records = rows
                    .into_iter()
                    .map(|(id, blob)| {
                        Ok(Record {
                            kind: kind.clone(),
                            id,
                            attributes: decode_attributes(&blob)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(QueryResult::Records(records))
            }
        })
        .await
    }

    async fn update(&self, transform: &Transform) -> Result<TransformResult> {
        let (result, _) = self.apply_logged(transform, Origin::Local).await?;
        Ok(result)
    }

    async fn transformed(&self, transform: &Transform) -> Result<bool> {
        let (_, applied) = self.apply_logged(transform, Origin::Replicated).await?;
        Ok(applied)
    }

    async fn has_applied(&self, id: &TransformId) -> Result<bool> {
        let id = id.clone();
        self.with_conn(move |conn| is_logged(conn, &id)).await
    }

    async fn transform_log(&self) -> Result<TransformLog> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT transform_id FROM transform_log ORDER BY seq")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids.into_iter().map(TransformId::from).collect())
        })
        .await
    }

    fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }
}
