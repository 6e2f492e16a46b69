//! Connection registry and routing activation arbitration
//!
//! The registry holds every live TCP connection of one gateway and decides
//! routing activation requests (ISO 13400-2 figure 26):
//!
//! - a registered connection asking again for its own address is accepted,
//!   asking for another address is denied (0x02)
//! - a free address is granted while capacity remains; at capacity all
//!   registered connections are alive-checked and silent ones are reclaimed
//! - an address held by another connection is alive-checked on that
//!   connection only; a confirmed holder wins (0x03), a silent one is closed
//!   and the address handed over
//!
//! Two locks are involved. The table lock guards the connection map only and
//! is never held across an await. The arbitration lock serializes every
//! decision, alive check wait included. Source addresses are assigned only
//! under the arbitration lock, which keeps them unique across connections.

mod alive_check;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use doipsim_proto::RoutingActivationCode;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionId};
use crate::display::Addr;

pub use alive_check::{AliveCheckResponses, AliveCheckSession, ALIVE_CHECK_WINDOW};

pub struct ConnectionRegistry {
    connections: Mutex<BTreeMap<ConnectionId, Arc<Connection>>>,
    arbitration: tokio::sync::Mutex<()>,
    max_registered: usize,
    alive_check: AliveCheckSession,
    next_id: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl ConnectionRegistry {
    pub fn new(max_registered: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            connections: Mutex::new(BTreeMap::new()),
            arbitration: tokio::sync::Mutex::new(()),
            max_registered,
            alive_check: AliveCheckSession::default(),
            next_id: AtomicU64::new(1),
            shutdown,
        }
    }

    pub fn max_registered(&self) -> usize {
        self.max_registered
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn add(&self, connection: Arc<Connection>) {
        debug!(conn = %connection.id(), "Connection added to registry");
        self.connections.lock().insert(connection.id(), connection);
    }

    /// Remove a connection; removing an unknown id is a no-op
    pub fn remove(&self, id: ConnectionId) {
        if self.connections.lock().remove(&id).is_some() {
            debug!(conn = %id, "Connection removed from registry");
        }
    }

    fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().values().cloned().collect()
    }

    /// The live connection currently registered with `source_address`
    pub fn lookup_by_source_address(&self, source_address: u16) -> Option<Arc<Connection>> {
        self.snapshot()
            .into_iter()
            .find(|c| c.registered_source_address() == Some(source_address))
    }

    fn lookup_other(&self, id: ConnectionId, source_address: u16) -> Option<Arc<Connection>> {
        self.snapshot()
            .into_iter()
            .find(|c| c.id() != id && c.registered_source_address() == Some(source_address))
    }

    fn registered_connections(&self) -> Vec<Arc<Connection>> {
        self.snapshot()
            .into_iter()
            .filter(|c| c.is_registered())
            .collect()
    }

    pub fn count_registered(&self) -> usize {
        self.registered_connections().len()
    }

    /// Open sockets, registered or not
    pub fn count_all(&self) -> usize {
        self.snapshot().iter().filter(|c| !c.is_closed()).count()
    }

    /// Decide a routing activation request of `connection` for `source_address`
    ///
    /// The caller validates the activation type and sends the response.
    pub async fn register(
        &self,
        connection: &Arc<Connection>,
        source_address: u16,
    ) -> RoutingActivationCode {
        // A registered connection only changes through stop(), no lock needed
        if let Some(code) = Self::check_registered(connection, source_address) {
            return code;
        }

        let _guard = self.arbitration.lock().await;
        if let Some(code) = Self::check_registered(connection, source_address) {
            return code;
        }

        let code = match self.lookup_other(connection.id(), source_address) {
            None => self.register_free_address(connection, source_address).await,
            Some(holder) => {
                self.register_held_address(connection, holder, source_address)
                    .await
            }
        };
        info!(
            conn = %connection.id(),
            source = %Addr(source_address),
            code = ?code,
            "Routing activation decided"
        );
        code
    }

    fn check_registered(
        connection: &Connection,
        source_address: u16,
    ) -> Option<RoutingActivationCode> {
        match connection.registered_source_address() {
            Some(registered) if registered == source_address => {
                Some(RoutingActivationCode::Success)
            }
            Some(registered) => {
                debug!(
                    conn = %connection.id(),
                    registered = %Addr(registered),
                    requested = %Addr(source_address),
                    "Different source address requested on registered socket"
                );
                Some(RoutingActivationCode::DeniedDifferentSourceAddress)
            }
            None => None,
        }
    }

    async fn register_free_address(
        &self,
        connection: &Arc<Connection>,
        source_address: u16,
    ) -> RoutingActivationCode {
        let registered = self.registered_connections();
        if registered.len() < self.max_registered {
            return self.commit(connection, source_address);
        }

        info!(
            registered = registered.len(),
            max = self.max_registered,
            "All sockets registered, alive checking them"
        );
        let responses = self.run_alive_check(&registered).await;
        let alive = responses.values().filter(|r| !r.is_empty()).count();
        if alive >= self.max_registered {
            return RoutingActivationCode::DeniedAllSocketsRegistered;
        }
        self.commit(connection, source_address)
    }

    async fn register_held_address(
        &self,
        connection: &Arc<Connection>,
        holder: Arc<Connection>,
        source_address: u16,
    ) -> RoutingActivationCode {
        info!(
            conn = %connection.id(),
            holder = %holder.id(),
            source = %Addr(source_address),
            "Source address registered on another socket, alive checking it"
        );
        let responses = self.run_alive_check(std::slice::from_ref(&holder)).await;
        let confirmed = responses
            .get(&holder.id())
            .is_some_and(|r| r.contains(&source_address));
        if confirmed {
            return RoutingActivationCode::DeniedSourceAddressActiveElsewhere;
        }

        // A silent holder has been closed by the alive check
        if let Some(still_held) = self.lookup_other(connection.id(), source_address) {
            warn!(
                conn = %connection.id(),
                holder = %still_held.id(),
                source = %Addr(source_address),
                "Source address still registered after alive check"
            );
            return RoutingActivationCode::DeniedSourceAddressActiveElsewhere;
        }
        self.commit(connection, source_address)
    }

    fn commit(&self, connection: &Arc<Connection>, source_address: u16) -> RoutingActivationCode {
        if !connection.activate(source_address) {
            debug!(conn = %connection.id(), "Connection closed during arbitration, not registered");
        }
        RoutingActivationCode::Success
    }

    async fn run_alive_check(&self, targets: &[Arc<Connection>]) -> AliveCheckResponses {
        let mut interrupt = self.shutdown.subscribe();
        self.alive_check.run(targets, &mut interrupt).await
    }

    /// Close every connection and interrupt a running alive check
    pub fn stop_all(&self) {
        self.shutdown.send_replace(true);
        let connections: Vec<_> = std::mem::take(&mut *self.connections.lock())
            .into_values()
            .collect();
        for connection in connections {
            connection.stop();
        }
    }
}
