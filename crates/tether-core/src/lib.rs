//! # Tether Core
//!
//! Pure primitives shared by every execution context: records, operations,
//! transforms, queries, the transform log, and the envelope protocol that
//! carries them between contexts.
//!
//! This crate contains no I/O, no channels, no timers. Everything here is
//! plain data plus deterministic functions over it.
//!
//! ## Key Types
//!
//! - [`Transform`] - A uniquely identified batch of [`Operation`]s; the unit of
//!   mutation and of replication
//! - [`TransformId`] - The stable identifier used to deduplicate replays
//! - [`TransformLog`] - The append-only set of applied transform identifiers
//! - [`Query`] - A read description; never logged
//! - [`Envelope`] - The tagged message shape exchanged between contexts
//!
//! ## Wire Format
//!
//! Envelopes are encoded as CBOR maps carrying a protocol marker. Anything
//! that lacks the marker is not ours and decodes to `None`. See [`envelope`].

pub mod envelope;
pub mod error;
pub mod log;
pub mod operation;
pub mod query;
pub mod record;
pub mod types;

pub use envelope::{
    Envelope, ErrorCode, Kind, Reason, Request, RequestKind, Status, WireEnvelope,
    PROTOCOL_MARKER,
};
pub use error::{CoreError, Result};
pub use log::{Admission, TransformLog};
pub use operation::{Operation, Transform, TransformBuilder};
pub use query::{Query, QueryResult, Reply, TransformResult};
pub use record::{Attributes, Record, RecordIdentity};
pub use types::TransformId;
