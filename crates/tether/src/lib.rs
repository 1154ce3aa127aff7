//! # Tether
//!
//! Keep record stores in isolated execution contexts in sync.
//!
//! ## Overview
//!
//! One context is the primary: its [`Responder`] answers queries and
//! updates against the authoritative store and announces every applied
//! transform. Every other context uses a [`RemoteSource`] to relay calls to
//! whichever context is currently primary, and to replay announced
//! transforms into its own replica exactly once.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tether::{BroadcastNetwork, RemoteSource, Responder, TetherConfig};
//! use tether::core::{Query, Record, Transform};
//! use tether::store::MemoryStore;
//!
//! async fn example() -> tether::Result<()> {
//!     let network = BroadcastNetwork::new();
//!
//!     // Primary context: the store is created on the first request.
//!     let mut responder = Responder::new(
//!         Arc::clone(&network),
//!         "main",
//!         TetherConfig::default(),
//!         || async { Ok(MemoryStore::new()) },
//!     );
//!     responder.activate().await?;
//!
//!     // Secondary context.
//!     let mut source = RemoteSource::new(
//!         Arc::new(MemoryStore::new()),
//!         Arc::clone(&network),
//!         TetherConfig::default(),
//!     );
//!     source.activate().await?;
//!
//!     let transform = Transform::builder()
//!         .add_record(Record::new("planet", "earth").with_attribute("name", "Earth"))
//!         .build();
//!     source.update(transform).await?;
//!     let earth = source.query(Query::find_record("planet", "earth")).await?;
//!     println!("{earth:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `tether::core` - Records, transforms, queries, the envelope protocol
//! - `tether::store` - Store boundary, in-memory and SQLite replicas
//! - `tether::sync` - Transport, client, router, broadcast, resolver

pub mod config;
pub mod error;
pub mod responder;
pub mod source;

// Re-export component crates
pub use tether_core as core;
pub use tether_store as store;
pub use tether_sync as sync;

// Re-export main types for convenience
pub use config::{TetherConfig, DEFAULT_BROADCAST_CHANNEL};
pub use error::{Result, TetherError};
pub use responder::{LazyTarget, Responder, TargetFuture};
pub use source::RemoteSource;

pub use tether_sync::BroadcastNetwork;
