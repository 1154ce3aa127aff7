//! The envelope protocol.
//!
//! Every message exchanged between contexts is an envelope: a CBOR map with
//! the shape
//!
//! ```text
//! { protocolMarker: true,
//!   kind: "query" | "update" | "transform" | "response",
//!   query?, transform?, status?: "fulfilled" | "rejected", value?, reason? }
//! ```
//!
//! The marker lets envelopes share a transport with unrelated traffic:
//! anything without it decodes to `Ok(None)` and is ignored by listeners.
//!
//! Rules enforced on decode:
//! - `kind` selects exactly one payload field (`query` → `query`,
//!   `update`/`transform` → `transform`); the other payload field is absent.
//! - A `response` carries a `status`. `fulfilled` carries a `value` and never
//!   a `reason`; `rejected` carries a `reason` and never a `value`.
//! - Requests and broadcasts never carry response fields.

use std::fmt;

use bytes::Bytes;
use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::operation::Transform;
use crate::query::{Query, Reply};

/// Name of the field that marks a message as ours.
pub const PROTOCOL_MARKER: &str = "protocolMarker";

/// Discriminant of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Query,
    Update,
    Transform,
    Response,
}

impl Kind {
    /// The payload field a message of this kind carries.
    pub const fn payload_field(self) -> Option<&'static str> {
        match self {
            Kind::Query => Some("query"),
            Kind::Update | Kind::Transform => Some("transform"),
            Kind::Response => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Kind::Query => "query",
            Kind::Update => "update",
            Kind::Transform => "transform",
            Kind::Response => "response",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request kinds a responder dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Query,
    Update,
}

impl RequestKind {
    /// Every dispatchable kind.
    pub const ALL: [RequestKind; 2] = [RequestKind::Query, RequestKind::Update];

    pub const fn kind(self) -> Kind {
        match self {
            RequestKind::Query => Kind::Query,
            RequestKind::Update => Kind::Update,
        }
    }

    pub const fn payload_field(self) -> &'static str {
        match self {
            RequestKind::Query => "query",
            RequestKind::Update => "transform",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind().fmt(f)
    }
}

/// Outcome carried by a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Fulfilled,
    Rejected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Fulfilled => f.write_str("fulfilled"),
            Status::Rejected => f.write_str("rejected"),
        }
    }
}

/// Machine-readable class of a recognized failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The queried record does not exist.
    RecordNotFound,
    /// The request or transform was rejected as invalid.
    InvalidOperation,
    /// The responder could not reach its target store.
    Unavailable,
    /// Any other store failure.
    Internal,
}

/// Why a request was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Reason {
    /// A recognized failure, forwarded as raised.
    Error { code: ErrorCode, message: String },
    /// Wrapper for a failure that was not a recognized error.
    Unknown { cause: String },
}

impl Reason {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Reason::Error {
            code,
            message: message.into(),
        }
    }

    pub fn unknown(cause: impl Into<String>) -> Self {
        Reason::Unknown {
            cause: cause.into(),
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Reason::Error { code, .. } => Some(*code),
            Reason::Unknown { .. } => None,
        }
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        match self {
            Reason::Error { message, .. } => message,
            Reason::Unknown { .. } => "Unknown exception.",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Payload of a request envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Query(Query),
    Update(Transform),
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Query(_) => RequestKind::Query,
            Request::Update(_) => RequestKind::Update,
        }
    }
}

impl From<Request> for Envelope {
    fn from(request: Request) -> Self {
        match request {
            Request::Query(query) => Envelope::QueryRequest(query),
            Request::Update(transform) => Envelope::UpdateRequest(transform),
        }
    }
}

/// A validated protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// `kind: query`: read request; expects a reply channel.
    QueryRequest(Query),
    /// `kind: update`: mutation request; expects a reply channel.
    UpdateRequest(Transform),
    /// `kind: transform`: broadcast replication; no reply channel.
    Transform(Transform),
    /// `kind: response, status: fulfilled`.
    Fulfilled(Reply),
    /// `kind: response, status: rejected`.
    Rejected(Reason),
}

impl Envelope {
    pub fn kind(&self) -> Kind {
        match self {
            Envelope::QueryRequest(_) => Kind::Query,
            Envelope::UpdateRequest(_) => Kind::Update,
            Envelope::Transform(_) => Kind::Transform,
            Envelope::Fulfilled(_) | Envelope::Rejected(_) => Kind::Response,
        }
    }

    /// Extract the request payload, if this is a request.
    pub fn into_request(self) -> Option<Request> {
        match self {
            Envelope::QueryRequest(query) => Some(Request::Query(query)),
            Envelope::UpdateRequest(transform) => Some(Request::Update(transform)),
            _ => None,
        }
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Result<Bytes> {
        let wire = WireEnvelope::from(self);
        let mut buf = Vec::new();
        ciborium::into_writer(&wire, &mut buf).map_err(|e| CoreError::Encoding(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    /// Decode wire bytes.
    ///
    /// Returns `Ok(None)` for traffic that is not ours (not CBOR, not a map,
    /// or no `protocolMarker: true`), and `Err(MalformedEnvelope)` for marked
    /// traffic that violates the envelope rules.
    pub fn decode(bytes: &[u8]) -> Result<Option<Envelope>> {
        let value: Value = match ciborium::from_reader(bytes) {
            Ok(value) => value,
            Err(_) => return Ok(None),
        };

        if !is_marked(&value) {
            return Ok(None);
        }

        let wire: WireEnvelope = value
            .deserialized()
            .map_err(|e| CoreError::MalformedEnvelope(e.to_string()))?;

        Envelope::try_from(wire).map(Some)
    }
}

/// Check for `protocolMarker: true` without committing to the full shape.
fn is_marked(value: &Value) -> bool {
    match value {
        Value::Map(entries) => entries.iter().any(|(key, value)| {
            matches!(key, Value::Text(name) if name == PROTOCOL_MARKER)
                && matches!(value, Value::Bool(true))
        }),
        _ => false,
    }
}

/// The flat wire mapping of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    #[serde(default)]
    pub protocol_marker: bool,
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Reply>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
}

impl WireEnvelope {
    fn empty(kind: Kind) -> Self {
        Self {
            protocol_marker: true,
            kind,
            query: None,
            transform: None,
            status: None,
            value: None,
            reason: None,
        }
    }
}

impl From<&Envelope> for WireEnvelope {
    fn from(envelope: &Envelope) -> Self {
        let mut wire = WireEnvelope::empty(envelope.kind());
        match envelope {
            Envelope::QueryRequest(query) => wire.query = Some(query.clone()),
            Envelope::UpdateRequest(transform) | Envelope::Transform(transform) => {
                wire.transform = Some(transform.clone())
            }
            Envelope::Fulfilled(value) => {
                wire.status = Some(Status::Fulfilled);
                wire.value = Some(value.clone());
            }
            Envelope::Rejected(reason) => {
                wire.status = Some(Status::Rejected);
                wire.reason = Some(reason.clone());
            }
        }
        wire
    }
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = CoreError;

    fn try_from(wire: WireEnvelope) -> Result<Self> {
        if !wire.protocol_marker {
            return Err(malformed("missing protocol marker"));
        }

        let WireEnvelope {
            kind,
            query,
            transform,
            status,
            value,
            reason,
            ..
        } = wire;
        let has_response_fields = status.is_some() || value.is_some() || reason.is_some();

        match kind {
            Kind::Query => {
                if transform.is_some() || has_response_fields {
                    return Err(unexpected_fields(kind));
                }
                query.map(Envelope::QueryRequest).ok_or_else(|| missing_payload(kind))
            }
            Kind::Update | Kind::Transform => {
                if query.is_some() || has_response_fields {
                    return Err(unexpected_fields(kind));
                }
                let transform = transform.ok_or_else(|| missing_payload(kind))?;
                Ok(if kind == Kind::Update {
                    Envelope::UpdateRequest(transform)
                } else {
                    Envelope::Transform(transform)
                })
            }
            Kind::Response => {
                if query.is_some() || transform.is_some() {
                    return Err(unexpected_fields(kind));
                }
                match (status, value, reason) {
                    (Some(Status::Fulfilled), Some(value), None) => Ok(Envelope::Fulfilled(value)),
                    (Some(Status::Rejected), None, Some(reason)) => Ok(Envelope::Rejected(reason)),
                    (None, _, _) => Err(malformed("response without status")),
                    (Some(status), _, _) => Err(malformed(format!(
                        "{} response must carry exactly one of value/reason matching its status",
                        status
                    ))),
                }
            }
        }
    }
}

fn malformed(message: impl Into<String>) -> CoreError {
    CoreError::MalformedEnvelope(message.into())
}

fn missing_payload(kind: Kind) -> CoreError {
    malformed(format!(
        "{} envelope without `{}` payload",
        kind,
        kind.payload_field().unwrap_or("?")
    ))
}

fn unexpected_fields(kind: Kind) -> CoreError {
    malformed(format!("{} envelope carries fields of another kind", kind))
}
