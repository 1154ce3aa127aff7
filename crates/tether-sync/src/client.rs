//! Request/response client.
//!
//! Every call gets its own point-to-point channel. The local end waits for
//! exactly one reply; the remote end travels with the request as the reply
//! channel. The local port is closed on every exit path.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use tether_core::{Envelope, Query, QueryResult, Reply, Transform, TransformResult};

use crate::error::{Result, SyncError};
use crate::transport::{self, Message, Port, Recipient};

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default name used for the primary in error messages.
pub const DEFAULT_RECIPIENT_NAME: &str = "primary";

/// The local end of an in-flight call. Closes the port when dropped.
struct PendingCall {
    port: Port,
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.port.close();
    }
}

/// Send `envelope` to `recipient` and wait for the correlated response.
///
/// The timer starts before the request is posted. A response arriving after
/// the deadline is never observed: the port is already closed.
pub async fn request<R>(
    envelope: &Envelope,
    recipient: &R,
    recipient_name: &str,
    timeout: Duration,
) -> Result<Reply>
where
    R: Recipient + ?Sized,
{
    let deadline = Instant::now() + timeout;
    let (local, remote) = transport::channel();
    let mut call = PendingCall { port: local };

    let data = envelope.encode()?;
    recipient.post_message(Message::with_ports(data, vec![remote]))?;
    debug!(kind = %envelope.kind(), recipient = recipient_name, "request posted");

    let received = match tokio::time::timeout_at(deadline, call.port.recv()).await {
        Ok(Some(message)) => message,
        Ok(None) => return Err(SyncError::ChannelClosed),
        Err(_) => {
            warn!(recipient = recipient_name, timeout_ms = timeout.as_millis() as u64, "request timed out");
            return Err(SyncError::Timeout { timeout });
        }
    };
    drop(call);

    match Envelope::decode(&received.data) {
        Ok(Some(Envelope::Fulfilled(reply))) => Ok(reply),
        Ok(Some(Envelope::Rejected(reason))) => Err(SyncError::Rejected {
            recipient: recipient_name.to_string(),
            reason,
        }),
        _ => Err(SyncError::UnexpectedResponse {
            recipient: recipient_name.to_string(),
            payload: received.data,
        }),
    }
}

/// Configuration for [`RequestClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long to wait for each response.
    pub timeout: Duration,
    /// Name of the recipient in error messages.
    pub recipient_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            recipient_name: DEFAULT_RECIPIENT_NAME.to_string(),
        }
    }
}

/// Typed query/update calls over [`request`].
#[derive(Debug, Clone, Default)]
pub struct RequestClient {
    config: ClientConfig,
}

impl RequestClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run a query on the recipient's store.
    pub async fn query<R>(&self, recipient: &R, query: Query) -> Result<QueryResult>
    where
        R: Recipient + ?Sized,
    {
        let reply = self.call(recipient, Envelope::QueryRequest(query)).await?;
        match reply {
            Reply::Query(result) => Ok(result),
            other => Err(self.mismatched(other)),
        }
    }

    /// Apply a transform on the recipient's store.
    pub async fn update<R>(&self, recipient: &R, transform: Transform) -> Result<TransformResult>
    where
        R: Recipient + ?Sized,
    {
        let reply = self.call(recipient, Envelope::UpdateRequest(transform)).await?;
        match reply {
            Reply::Update(result) => Ok(result),
            other => Err(self.mismatched(other)),
        }
    }

    async fn call<R>(&self, recipient: &R, envelope: Envelope) -> Result<Reply>
    where
        R: Recipient + ?Sized,
    {
        request(
            &envelope,
            recipient,
            &self.config.recipient_name,
            self.config.timeout,
        )
        .await
    }

    /// A fulfilled reply of the wrong kind.
    fn mismatched(&self, reply: Reply) -> SyncError {
        match Envelope::Fulfilled(reply).encode() {
            Ok(payload) => SyncError::UnexpectedResponse {
                recipient: self.config.recipient_name.clone(),
                payload,
            },
            Err(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tether_core::{ErrorCode, Reason, Record};

    use crate::transport::{endpoint, Inbox};

    /// Answer the next request on `inbox` with `response` bytes and return the
    /// reply port so tests can probe it afterwards.
    async fn answer(inbox: &mut Inbox, response: Bytes) -> Port {
        let mut message = inbox.recv().await.unwrap();
        let port = message.ports.pop().unwrap();
        port.post_message(Message::new(response)).unwrap();
        port
    }

    fn earth() -> QueryResult {
        QueryResult::Record(Record::new("planet", "earth"))
    }

    #[tokio::test]
    async fn test_fulfilled_response() {
        let (handle, mut inbox) = endpoint("primary");
        let response = Envelope::Fulfilled(Reply::Query(earth())).encode().unwrap();
        let responder = tokio::spawn(async move { answer(&mut inbox, response).await });

        let client = RequestClient::default();
        let result = client
            .query(&handle, tether_core::Query::find_record("planet", "earth"))
            .await
            .unwrap();
        assert_eq!(result, earth());

        // The local end is closed once the call completes.
        let port = responder.await.unwrap();
        assert!(matches!(
            port.post_message(Message::new(Bytes::new())),
            Err(SyncError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_rejected_response() {
        let (handle, mut inbox) = endpoint("primary");
        let reason = Reason::error(ErrorCode::RecordNotFound, "record not found: planet:pluto");
        let response = Envelope::Rejected(reason.clone()).encode().unwrap();
        tokio::spawn(async move { answer(&mut inbox, response).await });

        let err = request(
            &Envelope::QueryRequest(tether_core::Query::find_record("planet", "pluto")),
            &handle,
            "primary",
            DEFAULT_TIMEOUT,
        )
        .await
        .unwrap_err();

        match err {
            SyncError::Rejected { recipient, reason: got } => {
                assert_eq!(recipient, "primary");
                assert_eq!(got, reason);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unrecognized_reply_is_unexpected() {
        let (handle, mut inbox) = endpoint("primary");
        let junk = Bytes::from_static(b"not an envelope");
        let sent = junk.clone();
        tokio::spawn(async move { answer(&mut inbox, sent).await });

        let err = request(
            &Envelope::QueryRequest(tether_core::Query::find_records("planet")),
            &handle,
            "primary",
            DEFAULT_TIMEOUT,
        )
        .await
        .unwrap_err();

        match err {
            SyncError::UnexpectedResponse { payload, .. } => assert_eq!(payload, junk),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_wrong_reply_kind_is_unexpected() {
        let (handle, mut inbox) = endpoint("primary");
        let response = Envelope::Fulfilled(Reply::Query(earth())).encode().unwrap();
        tokio::spawn(async move { answer(&mut inbox, response).await });

        let transform = Transform::builder()
            .add_record(Record::new("planet", "earth"))
            .build();
        let err = RequestClient::default()
            .update(&handle, transform)
            .await
            .unwrap_err();
        match err {
            SyncError::UnexpectedResponse { recipient, payload } => {
                assert_eq!(recipient, "primary");
                assert_eq!(
                    Envelope::decode(&payload).unwrap(),
                    Some(Envelope::Fulfilled(Reply::Query(earth())))
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_configured_duration() {
        let (handle, mut inbox) = endpoint("primary");
        let timeout = Duration::from_millis(500);
        let started = Instant::now();

        let err = request(
            &Envelope::QueryRequest(tether_core::Query::find_records("planet")),
            &handle,
            "primary",
            timeout,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SyncError::Timeout { timeout: t } if t == timeout));
        assert!(started.elapsed() >= timeout);
        assert_eq!(
            err.to_string(),
            "Message timed out. Response took longer than 500ms."
        );

        // A late response goes nowhere.
        let mut message = inbox.recv().await.unwrap();
        let port = message.ports.pop().unwrap();
        let late = Envelope::Fulfilled(Reply::Query(earth())).encode().unwrap();
        assert!(matches!(
            port.post_message(Message::new(late)),
            Err(SyncError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_dead_endpoint_fails_fast() {
        let (handle, inbox) = endpoint("primary");
        drop(inbox);
        let err = RequestClient::default()
            .query(&handle, tether_core::Query::find_records("planet"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::EndpointGone(_)));
    }
}
