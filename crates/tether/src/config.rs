//! Configuration shared by sources and responders.

use std::time::Duration;

use tether_sync::{ClientConfig, ResolverConfig, DEFAULT_RECIPIENT_NAME, DEFAULT_TIMEOUT};

use crate::error::{Result, TetherError};

/// Default name of the broadcast channel transforms are announced on.
pub const DEFAULT_BROADCAST_CHANNEL: &str = "tether:transforms";

/// Configuration for [`RemoteSource`](crate::RemoteSource) and
/// [`Responder`](crate::Responder).
#[derive(Debug, Clone)]
pub struct TetherConfig {
    /// How long a query or update waits for the primary's response.
    pub request_timeout: Duration,
    /// How long activation and each call wait for a primary to exist.
    pub resolve_timeout: Duration,
    /// Broadcast channel for transform replication. `None` disables it.
    pub broadcast_channel_name: Option<String>,
    /// Name of the primary in error messages.
    pub recipient_name: String,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_TIMEOUT,
            resolve_timeout: DEFAULT_TIMEOUT,
            broadcast_channel_name: Some(DEFAULT_BROADCAST_CHANNEL.to_string()),
            recipient_name: DEFAULT_RECIPIENT_NAME.to_string(),
        }
    }
}

impl TetherConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn with_broadcast_channel(mut self, name: impl Into<String>) -> Self {
        self.broadcast_channel_name = Some(name.into());
        self
    }

    pub fn without_broadcast(mut self) -> Self {
        self.broadcast_channel_name = None;
        self
    }

    pub fn with_recipient_name(mut self, name: impl Into<String>) -> Self {
        self.recipient_name = name.into();
        self
    }

    /// Reject zero timeouts and empty names.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(TetherError::InvalidConfig(
                "request timeout must be greater than zero".into(),
            ));
        }
        if self.resolve_timeout.is_zero() {
            return Err(TetherError::InvalidConfig(
                "resolve timeout must be greater than zero".into(),
            ));
        }
        if matches!(&self.broadcast_channel_name, Some(name) if name.is_empty()) {
            return Err(TetherError::InvalidConfig(
                "broadcast channel name must not be empty".into(),
            ));
        }
        if self.recipient_name.is_empty() {
            return Err(TetherError::InvalidConfig(
                "recipient name must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: self.request_timeout,
            recipient_name: self.recipient_name.clone(),
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            timeout: self.resolve_timeout,
        }
    }
}
