//! Request router.
//!
//! Listens on a context's [`Inbox`], dispatches each request envelope to
//! the bound store through a fixed [`Dispatch`] table and posts exactly one
//! response envelope back on the request's reply port.
//!
//! Handler failures never escape: a [`StoreError`] becomes
//! [`Reason::Error`] with its code and message, and a panicking handler
//! becomes [`Reason::Unknown`] carrying the panic message.
//!
//! [`StoreError`]: tether_store::StoreError

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, trace, warn};

use tether_core::{Envelope, ErrorCode, Reason, Reply, Request, RequestKind};
use tether_store::{Store, StoreError};

use crate::error::{Result, SyncError};
use crate::transport::{Inbox, Message, Port, Recipient};

/// A statically known request handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Calls [`Store::query`].
    Query,
    /// Calls [`Store::update`].
    Update,
}

impl Handler {
    /// The request kind this handler accepts.
    pub fn accepts(self) -> RequestKind {
        match self {
            Handler::Query => RequestKind::Query,
            Handler::Update => RequestKind::Update,
        }
    }

    /// Run the handler against `target`.
    pub async fn invoke<S>(self, target: &S, request: Request) -> tether_store::Result<Reply>
    where
        S: Store + ?Sized,
    {
        match (self, request) {
            (Handler::Query, Request::Query(query)) => {
                target.query(&query).await.map(Reply::Query)
            }
            (Handler::Update, Request::Update(transform)) => {
                target.update(&transform).await.map(Reply::Update)
            }
            (handler, request) => Err(StoreError::InvalidOperation(format!(
                "{:?} handler cannot serve a {} request",
                handler,
                request.kind()
            ))),
        }
    }
}

/// Finite mapping from request kind to handler.
#[derive(Debug, Clone)]
pub struct Dispatch {
    entries: Vec<(RequestKind, Handler)>,
}

impl Dispatch {
    /// `query` to [`Handler::Query`], `update` to [`Handler::Update`].
    pub fn standard() -> Self {
        Self {
            entries: vec![
                (RequestKind::Query, Handler::Query),
                (RequestKind::Update, Handler::Update),
            ],
        }
    }

    /// Build a table from explicit entries. Call [`Dispatch::validate`]
    /// before use.
    pub fn from_entries(entries: Vec<(RequestKind, Handler)>) -> Self {
        Self { entries }
    }

    /// Every request kind maps to exactly one handler that accepts it.
    pub fn validate(&self) -> Result<()> {
        for kind in RequestKind::ALL {
            let handlers: Vec<Handler> = self
                .entries
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, h)| *h)
                .collect();
            match handlers.as_slice() {
                [handler] if handler.accepts() == kind => {}
                [handler] => {
                    return Err(SyncError::InvalidConfig(format!(
                        "{kind} is mapped to the {handler:?} handler"
                    )))
                }
                [] => {
                    return Err(SyncError::InvalidConfig(format!(
                        "no handler for {kind} requests"
                    )))
                }
                _ => {
                    return Err(SyncError::InvalidConfig(format!(
                        "more than one handler for {kind} requests"
                    )))
                }
            }
        }
        Ok(())
    }

    pub fn handler_for(&self, kind: RequestKind) -> Option<Handler> {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, h)| *h)
    }

    /// Run one request envelope and produce its response envelope.
    pub async fn respond<S>(&self, target: &Arc<S>, envelope: Envelope) -> Envelope
    where
        S: Store + ?Sized + 'static,
    {
        let kind = envelope.kind();
        let Some(request) = envelope.into_request() else {
            return invalid(format!("{kind} is not a request"));
        };
        let Some(handler) = self.handler_for(request.kind()) else {
            return invalid(format!("no handler for {kind} requests"));
        };

        // Run on its own task so a panicking handler surfaces as a JoinError.
        let target = Arc::clone(target);
        let outcome =
            tokio::spawn(async move { handler.invoke(target.as_ref(), request).await }).await;

        match outcome {
            Ok(Ok(reply)) => Envelope::Fulfilled(reply),
            Ok(Err(err)) => {
                debug!(%kind, error = %err, "handler failed");
                Envelope::Rejected(err.to_reason())
            }
            Err(join) => {
                let cause = panic_cause(join);
                warn!(%kind, %cause, "handler panicked");
                Envelope::Rejected(Reason::unknown(cause))
            }
        }
    }
}

impl Default for Dispatch {
    fn default() -> Self {
        Self::standard()
    }
}

fn invalid(message: String) -> Envelope {
    Envelope::Rejected(Reason::error(ErrorCode::InvalidOperation, message))
}

fn panic_cause(err: JoinError) -> String {
    if !err.is_panic() {
        return "handler cancelled".to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Dispatch one envelope with the standard table.
pub async fn handle_request<S>(target: &Arc<S>, envelope: Envelope) -> Envelope
where
    S: Store + ?Sized + 'static,
{
    Dispatch::standard().respond(target, envelope).await
}

/// Routes inbound requests to a store.
pub struct MessageRouter<S: ?Sized> {
    target: Arc<S>,
    dispatch: Arc<Dispatch>,
}

impl<S: ?Sized> Clone for MessageRouter<S> {
    fn clone(&self) -> Self {
        Self {
            target: Arc::clone(&self.target),
            dispatch: Arc::clone(&self.dispatch),
        }
    }
}

impl<S> MessageRouter<S>
where
    S: Store + ?Sized + 'static,
{
    /// Create a router with the standard dispatch table.
    pub fn new(target: Arc<S>) -> Result<Self> {
        Self::with_dispatch(target, Dispatch::standard())
    }

    /// Create a router with a custom table. The table is validated here,
    /// not per message.
    pub fn with_dispatch(target: Arc<S>, dispatch: Dispatch) -> Result<Self> {
        dispatch.validate()?;
        Ok(Self {
            target,
            dispatch: Arc::new(dispatch),
        })
    }

    /// Start listening on `inbox`.
    pub fn activate(self, mut inbox: Inbox) -> RouterHandle {
        let id = inbox.id();
        info!(endpoint = %id, "router activated");

        let task = tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                let router = self.clone();
                tokio::spawn(async move { router.process(message).await });
            }
            debug!(endpoint = %id, "inbox closed");
        });

        RouterHandle { task }
    }

    /// Handle one inbound message.
    pub async fn process(&self, message: Message) {
        let Message { data, mut ports } = message;

        let envelope = match Envelope::decode(&data) {
            Ok(None) => {
                trace!("ignoring unmarked message");
                return;
            }
            Ok(Some(envelope)) => Ok(envelope),
            Err(err) => Err(err),
        };

        let Some(mut reply_port) = ports.pop() else {
            warn!("dropping message without a reply port");
            return;
        };

        let response = match envelope {
            Ok(envelope) => self.dispatch.respond(&self.target, envelope).await,
            Err(err) => {
                warn!(error = %err, "malformed request");
                invalid(err.to_string())
            }
        };

        send_response(&mut reply_port, &response);
    }
}

/// Post the response and close the reply port. Failures are logged, not
/// retried.
fn send_response(port: &mut Port, response: &Envelope) {
    if let Some(bytes) = response_bytes(response.encode()) {
        if let Err(err) = port.post_message(Message::new(bytes)) {
            debug!(error = %err, "response undeliverable");
        }
    }
    port.close();
}

/// Wire bytes for a response. A response that cannot be encoded is
/// replaced by an unknown-failure rejection carrying the encoding error.
fn response_bytes(encoded: tether_core::Result<Bytes>) -> Option<Bytes> {
    match encoded {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(error = %err, "failed to encode response");
            match Envelope::Rejected(Reason::unknown(err.to_string())).encode() {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    warn!(error = %err, "failed to encode fallback rejection");
                    None
                }
            }
        }
    }
}

/// Handle to an active router. Dropping it stops listening.
pub struct RouterHandle {
    task: JoinHandle<()>,
}

impl RouterHandle {
    /// Stop listening and wait for the inbox to be released. In-flight
    /// requests are not awaited.
    pub async fn deactivate(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for RouterHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tether_core::CoreError;
    use tether_core::{Query, QueryResult, Record, Transform, TransformId, TransformLog, TransformResult};
    use tether_store::{closed_subscription, EventReceiver, MemoryStore};

    use crate::client::{request, RequestClient, DEFAULT_TIMEOUT};
    use crate::transport::{channel, endpoint};

    /// A store whose query handler panics with a plain string.
    struct PanickingStore;

    #[async_trait]
    impl Store for PanickingStore {
        async fn query(&self, _query: &Query) -> tether_store::Result<QueryResult> {
            panic!("index corrupted")
        }

        async fn update(&self, _transform: &Transform) -> tether_store::Result<TransformResult> {
            Err(StoreError::Unavailable("read only".into()))
        }

        async fn transformed(&self, _transform: &Transform) -> tether_store::Result<bool> {
            Ok(false)
        }

        async fn has_applied(&self, _id: &TransformId) -> tether_store::Result<bool> {
            Ok(false)
        }

        async fn transform_log(&self) -> tether_store::Result<TransformLog> {
            Ok(TransformLog::new())
        }

        fn subscribe(&self) -> EventReceiver {
            closed_subscription()
        }
    }

    fn seeded() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_records([
            Record::new("planet", "earth").with_attribute("name", "Earth")
        ]))
    }

    #[test]
    fn test_standard_dispatch_is_valid() {
        let dispatch = Dispatch::standard();
        dispatch.validate().unwrap();
        assert_eq!(dispatch.handler_for(RequestKind::Update), Some(Handler::Update));
    }

    #[test]
    fn test_dispatch_validation() {
        let missing = Dispatch::from_entries(vec![(RequestKind::Query, Handler::Query)]);
        assert!(missing.validate().is_err());

        let crossed = Dispatch::from_entries(vec![
            (RequestKind::Query, Handler::Update),
            (RequestKind::Update, Handler::Query),
        ]);
        assert!(crossed.validate().is_err());
        assert!(MessageRouter::with_dispatch(seeded(), crossed).is_err());
    }

    #[tokio::test]
    async fn test_query_round_trip() {
        let store = seeded();
        let (handle, inbox) = endpoint("primary");
        let _router = MessageRouter::new(store).unwrap().activate(inbox);

        let result = RequestClient::default()
            .query(&handle, Query::find_record("planet", "earth"))
            .await
            .unwrap();
        assert_eq!(
            result,
            QueryResult::Record(Record::new("planet", "earth").with_attribute("name", "Earth"))
        );
    }

    #[tokio::test]
    async fn test_store_error_forwarded_with_code() {
        let (handle, inbox) = endpoint("primary");
        let _router = MessageRouter::new(seeded()).unwrap().activate(inbox);

        let err = RequestClient::default()
            .query(&handle, Query::find_record("planet", "pluto"))
            .await
            .unwrap_err();
        match err {
            SyncError::Rejected { reason, .. } => {
                assert_eq!(reason.code(), Some(ErrorCode::RecordNotFound))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_panic_becomes_unknown_reason() {
        let target: Arc<PanickingStore> = Arc::new(PanickingStore);
        let response = handle_request(&target, Envelope::QueryRequest(Query::find_records("planet"))).await;
        assert_eq!(response, Envelope::Rejected(Reason::unknown("index corrupted")));

        let response = handle_request(
            &target,
            Envelope::UpdateRequest(Transform::builder().add_record(Record::new("a", "b")).build()),
        )
        .await;
        assert_eq!(
            response,
            Envelope::Rejected(Reason::error(ErrorCode::Unavailable, "store unavailable: read only"))
        );
    }

    #[tokio::test]
    async fn test_non_request_envelope_rejected() {
        let response = handle_request(
            &seeded(),
            Envelope::Transform(Transform::builder().add_record(Record::new("a", "b")).build()),
        )
        .await;
        let Envelope::Rejected(reason) = response else {
            panic!("expected a rejection");
        };
        assert_eq!(reason.code(), Some(ErrorCode::InvalidOperation));
    }

    #[tokio::test]
    async fn test_unmarked_traffic_ignored() {
        let (handle, inbox) = endpoint("primary");
        let _router = MessageRouter::new(seeded()).unwrap().activate(inbox);

        let (mut local, remote) = channel();
        handle
            .post_message(Message::with_ports(Bytes::from_static(b"hello"), vec![remote]))
            .unwrap();

        // No reply: the router drops the port without answering.
        assert!(local.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_deactivated_router_stops_listening() {
        let (handle, inbox) = endpoint("primary");
        let router = MessageRouter::new(seeded()).unwrap().activate(inbox);
        router.deactivate().await;
        assert!(!handle.is_live());

        let err = request(
            &Envelope::QueryRequest(Query::find_records("planet")),
            &handle,
            "primary",
            DEFAULT_TIMEOUT,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::EndpointGone(_)));
    }

    #[test]
    fn test_unencodable_response_becomes_unknown_rejection() {
        let bytes = response_bytes(Err(CoreError::Encoding("value too deep".into()))).unwrap();
        let Some(Envelope::Rejected(reason)) = Envelope::decode(&bytes).unwrap() else {
            panic!("expected a rejection");
        };
        assert_eq!(reason, Reason::unknown("encoding error: value too deep"));
        assert_eq!(reason.message(), "Unknown exception.");
    }

    #[tokio::test]
    async fn test_reply_port_gets_exactly_one_response() {
        let (mut local, mut remote) = channel();
        let response = Envelope::Fulfilled(Reply::Query(QueryResult::Records(vec![])));
        send_response(&mut remote, &response);

        let message = local.recv().await.unwrap();
        assert_eq!(Envelope::decode(&message.data).unwrap(), Some(response));
        assert!(local.recv().await.is_none());
    }
}
