//! # Tether Store
//!
//! The store boundary consumed by the cross-context machinery, plus two
//! replica implementations.
//!
//! ## Overview
//!
//! The synchronization layer never looks inside a store. It calls exactly
//! two operations ([`Store::query`], [`Store::update`]), reads the transform
//! log, and invokes the "apply transform" effect ([`Store::transformed`])
//! when replaying a broadcast. Every store also publishes a
//! [`TransformEvent`] after each first-time application so a broadcaster
//! can announce it.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait at the boundary
//! - [`MemoryStore`] - In-memory replica
//! - [`SqliteStore`] - Durable replica with a persistent transform log
//! - [`Origin`] - Whether a change was made here or replayed from elsewhere
//!
//! ## Design Notes
//!
//! - **Idempotent application**: applying a transform whose id is already
//!   logged returns the current state and changes nothing.
//! - **Order tolerance**: record operations commute closely enough that
//!   replicas converge regardless of delivery order (see [`apply`]).
//! - **Atomic logging**: effects and the log entry are committed together.

pub mod apply;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    closed_subscription, EventReceiver, EventSubscribers, Origin, Store, TransformEvent,
};
