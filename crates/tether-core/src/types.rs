//! Strong type definitions for Tether.
//!
//! Identifiers are newtypes to prevent misuse at compile time.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique, stable identifier of a [`Transform`](crate::Transform).
///
/// Membership of this identifier in a store's transform log is the sole
/// deduplication key for replays.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformId(String);

impl TransformId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier (128 bits, hex encoded).
    pub fn random() -> Self {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TransformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransformId({})", self.0)
    }
}

impl fmt::Display for TransformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransformId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TransformId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for TransformId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
