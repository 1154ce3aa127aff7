//! Channel transport.
//!
//! Two primitives, neither of which knows anything about the envelope
//! protocol:
//!
//! - a point-to-point channel ([`channel`] returns two linked [`Port`]s),
//!   created per request and closed after use, and
//! - named broadcast channels plus the platform's primary registry
//!   ([`memory::BroadcastNetwork`]).
//!
//! A context's request endpoint is an [`EndpointHandle`] (what callers post
//! to) paired with an [`Inbox`] (what the responder reads from).

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use rand::RngCore;
use tokio::sync::mpsc;

use crate::error::{Result, SyncError};

/// A message on the transport: opaque bytes plus any transferred ports.
#[derive(Debug)]
pub struct Message {
    pub data: Bytes,
    pub ports: Vec<Port>,
}

impl Message {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            ports: Vec::new(),
        }
    }

    /// A message that transfers ports to the receiver.
    pub fn with_ports(data: Bytes, ports: Vec<Port>) -> Self {
        Self { data, ports }
    }
}

/// Anything a message can be posted to.
pub trait Recipient: Send + Sync {
    fn post_message(&self, message: Message) -> Result<()>;

    /// Name used in diagnostics.
    fn name(&self) -> &str;
}

/// One end of a point-to-point channel.
pub struct Port {
    outgoing: Option<mpsc::UnboundedSender<Message>>,
    incoming: mpsc::UnboundedReceiver<Message>,
}

/// Create a linked pair of ports.
pub fn channel() -> (Port, Port) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        Port {
            outgoing: Some(b_tx),
            incoming: a_rx,
        },
        Port {
            outgoing: Some(a_tx),
            incoming: b_rx,
        },
    )
}

impl Port {
    /// Receive the next message from the peer.
    ///
    /// Returns `None` once the peer is gone or this port is closed and
    /// drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.incoming.recv().await
    }

    /// Close this end. Returns `true` if this call closed it.
    pub fn close(&mut self) -> bool {
        self.incoming.close();
        self.outgoing.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.outgoing.is_none()
    }
}

impl Recipient for Port {
    fn post_message(&self, message: Message) -> Result<()> {
        let sender = self.outgoing.as_ref().ok_or(SyncError::ChannelClosed)?;
        sender.send(message).map_err(|_| SyncError::ChannelClosed)
    }

    fn name(&self) -> &str {
        "port"
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Identity of an execution context's endpoint.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub [u8; 16]);

impl ContextId {
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Reference to a context's request endpoint.
#[derive(Clone)]
pub struct EndpointHandle {
    id: ContextId,
    name: Arc<str>,
    sender: mpsc::UnboundedSender<Message>,
}

impl EndpointHandle {
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Whether the endpoint still has a listener.
    pub fn is_live(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl Recipient for EndpointHandle {
    fn post_message(&self, message: Message) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| SyncError::EndpointGone(self.name.to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for EndpointHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Receiving side of a context's request endpoint.
pub struct Inbox {
    id: ContextId,
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl Inbox {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }
}

/// Create a request endpoint for a context.
pub fn endpoint(name: impl Into<Arc<str>>) -> (EndpointHandle, Inbox) {
    let id = ContextId::random();
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        EndpointHandle {
            id,
            name: name.into(),
            sender,
        },
        Inbox { id, receiver },
    )
}

/// In-process broadcast channels and primary registry.
///
/// Contexts are tasks in one process, so "the platform" is a shared
/// [`BroadcastNetwork`].
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Mutex, PoisonError};
    use tokio::sync::{watch, RwLock};
    use tracing::{debug, info};

    struct Member {
        id: u64,
        sender: mpsc::UnboundedSender<Bytes>,
    }

    /// Members of one named channel. Each has its own unbounded queue.
    #[derive(Default)]
    struct Members(Mutex<Vec<Member>>);

    impl Members {
        fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Member>> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Shared state for all contexts in a process.
    pub struct BroadcastNetwork {
        /// Named broadcast channels.
        channels: RwLock<HashMap<String, Arc<Members>>>,

        /// The current primary endpoint, if any.
        primary: watch::Sender<Option<EndpointHandle>>,

        /// Member id allocator.
        members: AtomicU64,
    }

    impl BroadcastNetwork {
        /// Create a new network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Join (creating if needed) the named broadcast channel.
        ///
        /// The new member receives every message posted after this call.
        pub async fn join(&self, name: &str) -> BroadcastChannel {
            let members = {
                let mut channels = self.channels.write().await;
                Arc::clone(channels.entry(name.to_string()).or_default())
            };
            let id = self.members.fetch_add(1, Ordering::Relaxed);
            let (sender, receiver) = mpsc::unbounded_channel();
            members.lock().push(Member { id, sender });

            BroadcastChannel {
                name: name.to_string(),
                id,
                members,
                receiver,
                closed: false,
            }
        }

        /// Designate `handle` as the primary and notify watchers.
        pub fn claim_primary(&self, handle: EndpointHandle) {
            info!(primary = %handle.id(), name = handle.name(), "primary changed");
            self.primary.send_replace(Some(handle));
        }

        /// Clear the primary if it is still `id`. Returns whether it was.
        pub fn release_primary(&self, id: ContextId) -> bool {
            self.primary.send_if_modified(|current| {
                if current.as_ref().map(EndpointHandle::id) == Some(id) {
                    *current = None;
                    true
                } else {
                    false
                }
            })
        }

        /// The current primary, if any.
        pub fn current_primary(&self) -> Option<EndpointHandle> {
            self.primary.borrow().clone()
        }

        /// Subscribe to "primary changed" notifications.
        pub fn watch_primary(&self) -> watch::Receiver<Option<EndpointHandle>> {
            self.primary.subscribe()
        }
    }

    impl Default for BroadcastNetwork {
        fn default() -> Self {
            Self {
                channels: RwLock::new(HashMap::new()),
                primary: watch::channel(None).0,
                members: AtomicU64::new(0),
            }
        }
    }

    /// A context's membership in a named broadcast channel.
    pub struct BroadcastChannel {
        name: String,
        id: u64,
        members: Arc<Members>,
        receiver: mpsc::UnboundedReceiver<Bytes>,
        closed: bool,
    }

    impl BroadcastChannel {
        pub fn name(&self) -> &str {
            &self.name
        }

        /// Post to every other member. Fire-and-forget.
        pub fn post_message(&self, data: Bytes) -> Result<()> {
            if self.closed {
                return Err(SyncError::ChannelClosed);
            }
            let mut members = self.members.lock();
            members.retain(|member| {
                member.id == self.id || member.sender.send(data.clone()).is_ok()
            });
            Ok(())
        }

        /// Receive the next message posted by another member.
        ///
        /// Returns `None` once closed.
        pub async fn recv(&mut self) -> Option<Bytes> {
            if self.closed {
                return None;
            }
            self.receiver.recv().await
        }

        /// Leave the channel. Later posts fail and `recv` returns `None`.
        pub fn close(&mut self) {
            if self.closed {
                return;
            }
            self.closed = true;
            self.receiver.close();
            self.members.lock().retain(|member| member.id != self.id);
            debug!(channel = %self.name, member = self.id, "left broadcast channel");
        }

        pub fn is_closed(&self) -> bool {
            self.closed
        }
    }

    impl Drop for BroadcastChannel {
        fn drop(&mut self) {
            self.close();
        }
    }
}
