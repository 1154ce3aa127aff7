//! Error types for the facade.

use tether_core::CoreError;
use tether_store::StoreError;
use tether_sync::SyncError;
use thiserror::Error;

/// Errors that can occur in sources and responders.
#[derive(Debug, Error)]
pub enum TetherError {
    /// The source or responder has not been activated.
    #[error("not activated")]
    NotActivated,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cross-context error (timeouts, rejections, transport).
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Local store error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Envelope encoding error.
    #[error("protocol error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, TetherError>;
