//! # Tether Sync
//!
//! Cross-context messaging: request/response over per-call channels,
//! request routing, broadcast replication and primary resolution.
//!
//! ## Overview
//!
//! A caller in one context wants to query or update a store that lives in
//! another. The [`PrimaryResolver`] supplies a live handle to the primary
//! context, the [`RequestClient`] sends the request and awaits the
//! correlated response, and the primary's [`MessageRouter`] runs it against
//! its store. Independently, the primary's [`TransformBroadcaster`]
//! announces each applied transform and every [`TransformReplicator`]
//! replays it once.
//!
//! ## Message Flow
//!
//! ```text
//! Secondary                          Primary
//!   |-- query/update + reply port -->|
//!   |<------ response (port) --------|
//!   |                                |-- transform (broadcast) --> all others
//! ```
//!
//! ## Key Properties
//!
//! - **Exactly one outcome per call**: a reply, a rejection, or a timeout
//! - **No leaked channels**: the reply port closes on every path
//! - **Idempotent replay**: dedup by transform id against the local log
//! - **No re-broadcast**: replayed transforms are never announced again

pub mod broadcast;
pub mod client;
pub mod convergence;
pub mod error;
pub mod resolver;
pub mod router;
pub mod transport;

pub use broadcast::{replay, ReplayOutcome, TransformBroadcaster, TransformReplicator};
pub use client::{request, ClientConfig, RequestClient, DEFAULT_RECIPIENT_NAME, DEFAULT_TIMEOUT};
pub use convergence::{compare_logs, compute_log_digest, log_digest, verify_convergence, ConvergenceResult};
pub use error::{Result, SyncError};
pub use resolver::{EndpointCell, FollowHandle, PrimaryResolver, ResolverConfig};
pub use router::{handle_request, Dispatch, Handler, MessageRouter, RouterHandle};
pub use transport::memory::{BroadcastChannel, BroadcastNetwork};
pub use transport::{channel, endpoint, ContextId, EndpointHandle, Inbox, Message, Port, Recipient};
