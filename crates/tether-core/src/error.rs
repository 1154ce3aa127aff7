//! Error types for Tether Core.

use thiserror::Error;

/// Errors raised while encoding or decoding protocol data.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    /// The message carries the protocol marker but breaks the envelope rules.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
