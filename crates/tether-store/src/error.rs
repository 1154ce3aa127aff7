//! Error types for the store module.

use thiserror::Error;

use tether_core::{ErrorCode, Reason};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Attribute serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The queried record does not exist.
    #[error("record not found: {kind}:{id}")]
    RecordNotFound { kind: String, id: String },

    /// The transform or query was rejected.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The store could not be reached or created.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A lock guarding store state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// A blocking task running a database operation failed.
    #[error("background task failed: {0}")]
    Task(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),
}

impl StoreError {
    /// Wire classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::RecordNotFound { .. } => ErrorCode::RecordNotFound,
            StoreError::InvalidOperation(_) => ErrorCode::InvalidOperation,
            StoreError::Unavailable(_) => ErrorCode::Unavailable,
            StoreError::Database(_)
            | StoreError::Serialization(_)
            | StoreError::LockPoisoned
            | StoreError::Task(_)
            | StoreError::Migration(_) => ErrorCode::Internal,
        }
    }

    /// Convert into a rejection reason, keeping code and message.
    pub fn to_reason(&self) -> Reason {
        Reason::error(self.code(), self.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
