//! Session state and QoS1 reliable delivery.
//!
//! A [`Session`] is the durable endpoint of a peerwire connection. It
//! outlives the byte stream that carries it: when the stream drops the
//! session is suspended, and a handshake with the same session key within
//! the grace window rebinds it with its buffers intact (see
//! [`crate::registry`]).
//!
//! Reliable delivery is QoS1: every reliable packet is retransmitted on a
//! fixed interval until the peer acknowledges its identifier, acks are
//! sent unconditionally, and the receiver deduplicates on the identifier
//! so the application sees each packet at most once.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use peerwire_protocol::{PacketId, QosClass, SessionKey, SessionPayload};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{NodeError, Result};

/// Fixed delay between retransmissions of an unacknowledged packet.
pub const RETRANSMIT_INTERVAL: Duration = Duration::from_millis(5_000);

/// Events surfaced to the owner of a [`SessionHandle`].
#[derive(Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Application data arrived, tagged with its delivery class. Reliable
    /// data is already deduplicated.
    Data {
        /// The class the peer sent the payload under.
        qos: QosClass,
        /// The application payload.
        payload: Vec<u8>,
    },
    /// The carrying stream detached; the session lingers for the grace
    /// window.
    Suspended,
    /// The session was rebound to a new stream.
    Resumed,
    /// The session was destroyed. No further events follow.
    Closed,
}

/// Encoded sub-frames queued for the writer task of the bound stream.
pub(crate) type OutboundSender = mpsc::UnboundedSender<Vec<u8>>;

struct PendingPacket {
    payload: Vec<u8>,
    timer: JoinHandle<()>,
}

struct Inner {
    /// Identifiers of reliable packets already delivered upward.
    accepted: HashSet<PacketId>,
    /// Outbound reliable packets not yet acknowledged.
    pending: HashMap<PacketId, PendingPacket>,
    /// Sink of the currently bound stream, if any.
    outbound: Option<OutboundSender>,
    ever_bound: bool,
    closed: bool,
}

/// One logical connection between two applications.
pub struct Session {
    app_id: String,
    key: SessionKey,
    next_packet: AtomicU32,
    /// Bumped on every bind and unbind; lets expiry timers detect that
    /// the session was touched after they were scheduled.
    generation: AtomicU64,
    events: mpsc::UnboundedSender<SessionEvent>,
    inner: Mutex<Inner>,
}

impl Session {
    /// Creates an unbound session and the handle its owner reads from.
    pub fn new(app_id: impl Into<String>, key: SessionKey) -> (Arc<Self>, SessionHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            app_id: app_id.into(),
            key,
            next_packet: AtomicU32::new(1),
            generation: AtomicU64::new(0),
            events: events_tx,
            inner: Mutex::new(Inner {
                accepted: HashSet::new(),
                pending: HashMap::new(),
                outbound: None,
                ever_bound: false,
                closed: false,
            }),
        });
        let handle = SessionHandle {
            session: Arc::clone(&session),
            events: events_rx,
        };
        (session, handle)
    }

    /// The application this session belongs to.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// The session key (the client's public key).
    pub fn session_key(&self) -> &SessionKey {
        &self.key
    }

    /// Attaches a stream sink, flushing every unacknowledged packet.
    ///
    /// At most one stream may be bound at a time: a bind while another
    /// stream is live is rejected, the caller drops its stream.
    pub fn bind(&self, sender: OutboundSender) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(NodeError::SessionClosed);
        }
        if inner.outbound.is_some() {
            return Err(NodeError::AlreadyBound);
        }

        let resumed = inner.ever_bound;
        inner.ever_bound = true;
        self.generation.fetch_add(1, Ordering::SeqCst);

        // Requeue unacknowledged packets ahead of new traffic, in id order.
        let mut ids: Vec<PacketId> = inner.pending.keys().copied().collect();
        ids.sort_unstable();
        for id in &ids {
            let payload = inner.pending[id].payload.clone();
            let _ = sender.send(SessionPayload::Reliable { id: *id, payload }.encode());
        }
        inner.outbound = Some(sender);
        drop(inner);

        debug!(
            session = %self.key,
            app_id = %self.app_id,
            resumed,
            requeued = ids.len(),
            "stream bound"
        );
        if resumed {
            self.emit(SessionEvent::Resumed);
        }
        Ok(())
    }

    /// Detaches the stream sink. Returns the new generation, which an
    /// expiry timer compares against before destroying the session.
    pub fn unbind(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.outbound = None;
        let closed = inner.closed;
        drop(inner);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if !closed {
            debug!(session = %self.key, app_id = %self.app_id, "stream detached");
            self.emit(SessionEvent::Suspended);
        }
        generation
    }

    /// The current bind/unbind generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether a stream is currently bound.
    pub fn is_bound(&self) -> bool {
        self.inner.lock().unwrap().outbound.is_some()
    }

    /// Whether the session has been destroyed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Number of outbound reliable packets awaiting acknowledgment.
    pub fn unacked(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    /// Sends a best-effort datagram (QoS0).
    ///
    /// Dropped silently when no stream is bound; QoS0 traffic is never
    /// buffered.
    pub fn send_datagram(&self, payload: Vec<u8>) {
        let inner = self.inner.lock().unwrap();
        match &inner.outbound {
            Some(tx) if !inner.closed => {
                let _ = tx.send(SessionPayload::Datagram(payload).encode());
            }
            _ => trace!(session = %self.key, "datagram dropped, no bound stream"),
        }
    }

    /// Sends a reliable packet (QoS1).
    ///
    /// The packet is buffered and retransmitted every
    /// [`RETRANSMIT_INTERVAL`] until the peer acknowledges it, across
    /// stream detach and resumption. There is no retry cap.
    pub fn send_reliable(self: &Arc<Self>, payload: Vec<u8>) -> Result<PacketId> {
        if self.is_closed() {
            return Err(NodeError::SessionClosed);
        }

        let id = self.next_packet.fetch_add(1, Ordering::Relaxed);
        let timer = spawn_retransmit(self, id, payload.clone());

        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            timer.abort();
            return Err(NodeError::SessionClosed);
        }
        if let Some(tx) = &inner.outbound {
            let _ = tx.send(
                SessionPayload::Reliable {
                    id,
                    payload: payload.clone(),
                }
                .encode(),
            );
        }
        inner.pending.insert(id, PendingPacket { payload, timer });
        Ok(id)
    }

    /// Processes one decrypted sub-frame from the bound stream.
    pub fn handle_payload(&self, payload: SessionPayload) {
        match payload {
            SessionPayload::Datagram(data) => self.emit(SessionEvent::Data {
                qos: QosClass::Datagram,
                payload: data,
            }),
            SessionPayload::Reliable { id, payload } => {
                let mut inner = self.inner.lock().unwrap();
                if inner.closed {
                    return;
                }
                // Ack unconditionally; the sender may have missed an
                // earlier ack and retransmitted.
                if let Some(tx) = &inner.outbound {
                    let _ = tx.send(SessionPayload::Ack { id }.encode());
                }
                let fresh = inner.accepted.insert(id);
                drop(inner);

                if fresh {
                    self.emit(SessionEvent::Data {
                        qos: QosClass::Reliable,
                        payload,
                    });
                } else {
                    trace!(session = %self.key, id, "duplicate reliable packet");
                }
            }
            SessionPayload::Ack { id } => {
                let mut inner = self.inner.lock().unwrap();
                if let Some(packet) = inner.pending.remove(&id) {
                    packet.timer.abort();
                    trace!(session = %self.key, id, "packet acknowledged");
                }
            }
        }
    }

    /// Destroys the session: stops every retransmission, drops buffered
    /// state, and emits [`SessionEvent::Closed`].
    pub fn destroy(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.outbound = None;
        for (_, packet) in inner.pending.drain() {
            packet.timer.abort();
        }
        inner.accepted.clear();
        drop(inner);

        self.generation.fetch_add(1, Ordering::SeqCst);
        debug!(session = %self.key, app_id = %self.app_id, "session destroyed");
        self.emit(SessionEvent::Closed);
    }

    fn emit(&self, event: SessionEvent) {
        // The handle may have been dropped; nothing to do then.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("app_id", &self.app_id)
            .field("session", &self.key.fingerprint())
            .finish_non_exhaustive()
    }
}

fn spawn_retransmit(session: &Arc<Session>, id: PacketId, payload: Vec<u8>) -> JoinHandle<()> {
    let weak: Weak<Session> = Arc::downgrade(session);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(RETRANSMIT_INTERVAL).await;
            let Some(session) = weak.upgrade() else {
                return;
            };
            let inner = session.inner.lock().unwrap();
            // The ack may have landed while we slept.
            if inner.closed || !inner.pending.contains_key(&id) {
                return;
            }
            if let Some(tx) = &inner.outbound {
                trace!(session = %session.key, id, "retransmitting packet");
                let _ = tx.send(
                    SessionPayload::Reliable {
                        id,
                        payload: payload.clone(),
                    }
                    .encode(),
                );
            }
        }
    })
}

/// The application-facing side of a session.
///
/// Created once per session; resumption rebinds the underlying session,
/// so the handle keeps working across stream detach.
pub struct SessionHandle {
    session: Arc<Session>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionHandle {
    /// The session key.
    pub fn session_key(&self) -> &SessionKey {
        self.session.session_key()
    }

    /// The application this session belongs to.
    pub fn app_id(&self) -> &str {
        self.session.app_id()
    }

    /// Sends a best-effort datagram (QoS0).
    pub fn send(&self, payload: Vec<u8>) {
        self.session.send_datagram(payload);
    }

    /// Sends a reliable packet (QoS1), returning its identifier.
    pub fn send_reliable(&self, payload: Vec<u8>) -> Result<PacketId> {
        self.session.send_reliable(payload)
    }

    /// Receives the next session event. Returns `None` after
    /// [`SessionEvent::Closed`] has been consumed.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Non-blocking variant of [`SessionHandle::recv`].
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Number of outbound reliable packets awaiting acknowledgment.
    pub fn unacked(&self) -> usize {
        self.session.unacked()
    }

    /// Whether a stream is currently bound.
    pub fn is_bound(&self) -> bool {
        self.session.is_bound()
    }

    /// Destroys the session.
    pub fn close(&self) {
        self.session.destroy();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.session.fmt(f)
    }
}
