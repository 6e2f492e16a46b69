//! Per-socket protocol state
//!
//! A [`Connection`] owns everything the gateway knows about one TCP socket:
//! its registration state, the source address it registered, the running
//! inactivity timer and the alive-check subscribers. The socket itself is
//! owned by the server tasks; the connection only holds the outbound queue
//! feeding the writer task.
//!
//! ```text
//! NotAssigned ──start()──► Initialized ──activate()──► RegisteredActive
//!      │                        │                            │
//!      └────────────────────────┴──────── stop() ────────────┴──► Closed
//! ```

mod timer;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use doipsim_proto::DoipMessage;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace};

use crate::config::InactivityTimings;
use crate::display::Addr;

pub use timer::TimerKind;
use timer::InactivityTimer;

/// Gateway-unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotAssigned,
    Initialized,
    /// Reserved, never entered
    PendingAuthentication,
    /// Reserved, never entered
    PendingConfirmation,
    RegisteredActive,
    Closed,
}

/// Alive check response forwarded to a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliveCheckReport {
    pub connection: ConnectionId,
    /// Source address carried in the alive check response
    pub reported_source_address: u16,
    /// Address registered on the connection when the response arrived
    pub registered_source_address: Option<u16>,
}

impl AliveCheckReport {
    pub fn confirms_registration(&self) -> bool {
        self.registered_source_address == Some(self.reported_source_address)
    }
}

pub type SubscriberId = u64;

struct Inner {
    state: ConnectionState,
    source_address: Option<u16>,
    outbound: Option<mpsc::UnboundedSender<DoipMessage>>,
    timer: Option<InactivityTimer>,
    generation: u64,
    subscribers: HashMap<SubscriberId, mpsc::UnboundedSender<AliveCheckReport>>,
    next_subscriber: SubscriberId,
}

pub struct Connection {
    id: ConnectionId,
    timings: InactivityTimings,
    inner: Mutex<Inner>,
    closed: watch::Sender<bool>,
}

impl Connection {
    /// Create a connection whose outbound messages go to `outbound`
    pub fn new(
        id: ConnectionId,
        timings: InactivityTimings,
        outbound: mpsc::UnboundedSender<DoipMessage>,
    ) -> Arc<Self> {
        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            id,
            timings,
            inner: Mutex::new(Inner {
                state: ConnectionState::NotAssigned,
                source_address: None,
                outbound: Some(outbound),
                timer: None,
                generation: 0,
                subscribers: HashMap::new(),
                next_subscriber: 0,
            }),
            closed,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    pub fn is_registered(&self) -> bool {
        self.state() == ConnectionState::RegisteredActive
    }

    pub fn registered_source_address(&self) -> Option<u16> {
        self.inner.lock().source_address
    }

    /// Socket accepted: start the initial inactivity timer
    pub fn start(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::NotAssigned {
            return;
        }
        inner.state = ConnectionState::Initialized;
        self.restart_timer(&mut inner, TimerKind::Initial);
        debug!(conn = %self.id, timeout_ms = self.timings.initial.as_millis() as u64, "Connection initialized");
    }

    /// Register `source_address` on this connection
    ///
    /// Returns false if the connection is closed or already registered.
    pub(crate) fn activate(self: &Arc<Self>, source_address: u16) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            ConnectionState::Closed | ConnectionState::RegisteredActive => return false,
            _ => {}
        }
        inner.state = ConnectionState::RegisteredActive;
        inner.source_address = Some(source_address);
        self.restart_timer(&mut inner, TimerKind::General);
        info!(conn = %self.id, source = %Addr(source_address), "Connection registered");
        true
    }

    /// Inbound traffic restarts the general timer once registered
    pub fn on_data_received(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::RegisteredActive {
            self.restart_timer(&mut inner, TimerKind::General);
        }
    }

    fn restart_timer(self: &Arc<Self>, inner: &mut Inner, kind: TimerKind) {
        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
        inner.generation += 1;
        let duration = match kind {
            TimerKind::Initial => self.timings.initial,
            TimerKind::General => self.timings.general,
        };
        inner.timer = Some(InactivityTimer::spawn(
            Arc::downgrade(self),
            kind,
            inner.generation,
            duration,
        ));
    }

    fn on_timer_expired(&self, kind: TimerKind, generation: u64) {
        {
            let mut inner = self.inner.lock();
            let current = inner
                .timer
                .as_ref()
                .is_some_and(|t| t.generation == generation && t.kind == kind);
            if !current || inner.state == ConnectionState::Closed {
                return;
            }
            // Expiring timer owns the running task; drop without aborting it
            inner.timer = None;
        }
        info!(conn = %self.id, timer = %kind, "Inactivity timer expired, closing connection");
        self.stop();
    }

    /// Queue a message for the writer task
    ///
    /// Returns false if the connection is closed.
    pub fn send(&self, message: DoipMessage) -> bool {
        let inner = self.inner.lock();
        match &inner.outbound {
            Some(tx) => {
                trace!(conn = %self.id, payload_type = ?message.payload_type(), "Queue message");
                tx.send(message).is_ok()
            }
            None => {
                debug!(conn = %self.id, payload_type = ?message.payload_type(), "Connection closed, message dropped");
                false
            }
        }
    }

    /// Close the connection; idempotent
    ///
    /// Messages queued before the call are still written out before the
    /// socket is shut down.
    pub fn stop(&self) {
        let timer = {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Closed {
                return;
            }
            inner.state = ConnectionState::Closed;
            inner.source_address = None;
            inner.generation += 1;
            inner.outbound = None;
            inner.subscribers.clear();
            inner.timer.take()
        };
        if let Some(timer) = timer {
            timer.cancel();
        }
        self.closed.send_replace(true);
        debug!(conn = %self.id, "Connection closed");
    }

    /// Resolves once the connection is closed
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Forward alive check responses on this connection to `tx`
    ///
    /// Returns `None` if the connection is already closed.
    pub fn subscribe_alive_check(
        &self,
        tx: mpsc::UnboundedSender<AliveCheckReport>,
    ) -> Option<SubscriberId> {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Closed {
            return None;
        }
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.insert(id, tx);
        Some(id)
    }

    pub fn unsubscribe_alive_check(&self, id: SubscriberId) {
        self.inner.lock().subscribers.remove(&id);
    }

    pub fn on_alive_check_response(&self, source_address: u16) {
        let inner = self.inner.lock();
        if inner.subscribers.is_empty() {
            debug!(conn = %self.id, source = %Addr(source_address), "Unsolicited alive check response");
            return;
        }
        let report = AliveCheckReport {
            connection: self.id,
            reported_source_address: source_address,
            registered_source_address: inner.source_address,
        };
        for tx in inner.subscribers.values() {
            let _ = tx.send(report);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("source_address", &inner.source_address)
            .finish()
    }
}
