//! Error types for the sync module.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use tether_core::Reason;

/// Errors that can occur during cross-context operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No response arrived within the configured duration.
    #[error("Message timed out. Response took longer than {}ms.", .timeout.as_millis())]
    Timeout { timeout: Duration },

    /// The responder ran the operation and it failed.
    #[error("Error response from {recipient}: {reason}.")]
    Rejected { recipient: String, reason: Reason },

    /// A reply arrived that is not a recognized response.
    #[error("Unexpected response from {recipient}.")]
    UnexpectedResponse { recipient: String, payload: Bytes },

    /// No primary became available within the configured duration.
    #[error("Getting primary timed out. It took longer than {}ms.", .timeout.as_millis())]
    ResolutionTimeout { timeout: Duration },

    /// The other end of a channel is gone.
    #[error("channel closed")]
    ChannelClosed,

    /// The endpoint no longer accepts messages.
    #[error("endpoint gone: {0}")]
    EndpointGone(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Invalid configuration or activation argument.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] tether_store::StoreError),

    /// Envelope encoding or decoding failed.
    #[error("protocol error: {0}")]
    Core(#[from] tether_core::CoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::ErrorCode;

    #[test]
    fn test_messages() {
        let timeout = SyncError::Timeout {
            timeout: Duration::from_millis(250),
        };
        assert_eq!(
            timeout.to_string(),
            "Message timed out. Response took longer than 250ms."
        );

        let rejected = SyncError::Rejected {
            recipient: "primary".into(),
            reason: Reason::error(ErrorCode::RecordNotFound, "record not found: planet:pluto"),
        };
        assert_eq!(
            rejected.to_string(),
            "Error response from primary: record not found: planet:pluto."
        );

        let resolution = SyncError::ResolutionTimeout {
            timeout: Duration::from_secs(10),
        };
        assert_eq!(
            resolution.to_string(),
            "Getting primary timed out. It took longer than 10000ms."
        );
    }
}
