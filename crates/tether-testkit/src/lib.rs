//! # Tether Testkit
//!
//! Testing utilities for Tether.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Generators**: Proptest strategies for records, operations and transforms
//! - **Fixtures**: A primary plus secondaries wired over one in-process network
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tether_testkit::generators::transform;
//!
//! proptest! {
//!     #[test]
//!     fn transform_encodes(t in transform()) {
//!         let bytes = tether_core::Envelope::Transform(t).encode().unwrap();
//!         prop_assert!(!bytes.is_empty());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use tether_testkit::fixtures::ContextFixture;
//! use tether_core::{Record, Transform};
//!
//! async fn example() -> tether::Result<()> {
//!     let fixture = ContextFixture::new(2).await?;
//!     let transform = Transform::builder()
//!         .id("t1")
//!         .add_record(Record::new("planet", "earth"))
//!         .build();
//!     fixture.secondary(0).update(transform).await?;
//!     fixture.settle("t1").await;
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{eventually_applied, solar_system, ContextFixture};
