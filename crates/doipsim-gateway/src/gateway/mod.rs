//! Simulated DoIP gateway
//!
//! A [`Gateway`] binds one TCP listener and one UDP socket, runs the
//! [`ConnectionRegistry`] for its TCP connections and relays diagnostic
//! messages to the ECUs configured behind it.

mod discovery;
mod dispatcher;
mod framing;
mod server;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{GatewayConfig, InactivityTimings};
use crate::ecu::{Ecu, StandardEcu, UdsMessage};
use crate::error::GatewayError;
use crate::registry::ConnectionRegistry;

use dispatcher::Dispatcher;

pub use discovery::{ANNOUNCEMENT_COUNT, ANNOUNCEMENT_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Created,
    Running { tcp: SocketAddr, udp: SocketAddr },
    Stopped,
}

pub struct Gateway {
    config: GatewayConfig,
    timings: InactivityTimings,
    dispatcher: Arc<Dispatcher>,
    shutdown: watch::Sender<bool>,
    state: Mutex<RunState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Gateway {
    /// Validate `config` and create its ECUs as [`StandardEcu`]s
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let mut ecus: Vec<Arc<dyn Ecu>> = Vec::with_capacity(config.ecus.len());
        for ecu in &config.ecus {
            ecus.push(Arc::new(StandardEcu::new(
                ecu,
                config.max_byte_array_size_lookup,
                config.max_byte_array_size_logging,
            )?));
        }
        Self::with_ecus(config, ecus)
    }

    /// Validate `config` and use the given ECUs instead of the configured ones
    pub fn with_ecus(config: GatewayConfig, ecus: Vec<Arc<dyn Ecu>>) -> Result<Self, GatewayError> {
        config.validate()?;
        let identity = config.identity()?;
        let dispatcher = Dispatcher {
            registry: Arc::new(ConnectionRegistry::new(config.max_registered_connections)),
            ecus,
            identity,
            max_sockets: config.max_sockets,
            max_data_size: config.max_data_size,
            max_logging: config.max_byte_array_size_logging,
        };
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            timings: config.inactivity_timings(),
            config,
            dispatcher: Arc::new(dispatcher),
            shutdown,
            state: Mutex::new(RunState::Created),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.dispatcher.registry
    }

    pub fn ecus(&self) -> &[Arc<dyn Ecu>] {
        &self.dispatcher.ecus
    }

    /// Bound TCP address while running
    pub fn tcp_local_addr(&self) -> Option<SocketAddr> {
        match *self.state.lock() {
            RunState::Running { tcp, .. } => Some(tcp),
            _ => None,
        }
    }

    /// Bound UDP address while running
    pub fn udp_local_addr(&self) -> Option<SocketAddr> {
        match *self.state.lock() {
            RunState::Running { udp, .. } => Some(udp),
            _ => None,
        }
    }

    /// Bind sockets, start the ECUs and spawn the server tasks
    pub async fn start(&self) -> Result<(), GatewayError> {
        if *self.state.lock() != RunState::Created {
            return Err(GatewayError::AlreadyStarted);
        }

        let bind = SocketAddr::new(self.config.local_address, self.config.local_port);
        let listener = TcpListener::bind(bind).await?;
        let udp = UdpSocket::bind(bind).await?;
        udp.set_broadcast(true)?;
        if let Some(group) = self.config.multicast_address {
            let interface = match self.config.local_address {
                IpAddr::V4(addr) => addr,
                IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
            };
            udp.join_multicast_v4(group, interface)?;
            debug!(%group, "Joined multicast group");
        }
        let tcp_addr = listener.local_addr()?;
        let udp_addr = udp.local_addr()?;
        let udp = Arc::new(udp);

        {
            let mut state = self.state.lock();
            if *state != RunState::Created {
                return Err(GatewayError::AlreadyStarted);
            }
            *state = RunState::Running {
                tcp: tcp_addr,
                udp: udp_addr,
            };
        }

        let (response_tx, response_rx) = mpsc::unbounded_channel();
        for ecu in self.ecus() {
            ecu.add_listener(response_tx.clone());
            ecu.start();
        }
        drop(response_tx);

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(route_ecu_responses(
            response_rx,
            self.dispatcher.clone(),
            self.shutdown.subscribe(),
        )));
        tasks.push(tokio::spawn(server::accept_loop(
            listener,
            self.dispatcher.clone(),
            self.timings,
            self.shutdown.subscribe(),
        )));
        tasks.push(tokio::spawn(discovery::udp_loop(
            udp.clone(),
            self.dispatcher.clone(),
            self.shutdown.subscribe(),
        )));
        if self.config.broadcast_enable {
            let target = SocketAddr::new(
                self.config.broadcast_address.into(),
                self.config.announce_port,
            );
            tasks.push(tokio::spawn(discovery::announce(
                udp,
                self.dispatcher.clone(),
                target,
                self.shutdown.subscribe(),
            )));
        }

        info!(
            gateway = %self.config.name,
            tcp = %tcp_addr,
            udp = %udp_addr,
            ecus = self.ecus().len(),
            "Gateway started"
        );
        Ok(())
    }

    /// Stop all tasks, close every connection and stop the ECUs
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if !matches!(*state, RunState::Running { .. }) {
                return;
            }
            *state = RunState::Stopped;
        }
        self.shutdown.send_replace(true);
        self.dispatcher.registry.stop_all();
        for ecu in self.ecus() {
            ecu.stop();
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!(gateway = %self.config.name, "Gateway stopped");
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn route_ecu_responses(
    mut responses: mpsc::UnboundedReceiver<UdsMessage>,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            response = responses.recv() => match response {
                Some(response) => dispatcher.on_ecu_response(response),
                None => break,
            },
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }
    warn!("ECU response routing stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    fn local_config() -> GatewayConfig {
        GatewayConfig {
            local_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            local_port: 0,
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn invalid_config_fails_construction() {
        let config = GatewayConfig {
            vin: "short".to_string(),
            ..GatewayConfig::default()
        };
        assert!(matches!(
            Gateway::new(config),
            Err(GatewayError::Config(ConfigError::InvalidIdentifier { field: "vin", .. }))
        ));
    }

    #[tokio::test]
    async fn start_binds_ephemeral_ports() {
        let gateway = Gateway::new(local_config()).unwrap();
        assert!(gateway.tcp_local_addr().is_none());

        gateway.start().await.unwrap();
        let tcp = gateway.tcp_local_addr().unwrap();
        let udp = gateway.udp_local_addr().unwrap();
        assert_ne!(tcp.port(), 0);
        assert_ne!(udp.port(), 0);
        assert!(matches!(gateway.start().await, Err(GatewayError::AlreadyStarted)));

        gateway.stop();
        assert!(gateway.tcp_local_addr().is_none());
        gateway.stop();
    }

    async fn announcements_received(broadcast_enable: bool) -> usize {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let gateway = Gateway::new(GatewayConfig {
            broadcast_enable,
            broadcast_address: Ipv4Addr::LOCALHOST,
            announce_port: receiver.local_addr().unwrap().port(),
            ..local_config()
        })
        .unwrap();
        gateway.start().await.unwrap();
        tokio::time::sleep(ANNOUNCEMENT_INTERVAL * (ANNOUNCEMENT_COUNT + 2)).await;

        let mut buf = [0u8; 512];
        let mut received = 0;
        while receiver.try_recv(&mut buf).is_ok() {
            received += 1;
        }
        gateway.stop();
        received
    }

    #[tokio::test(start_paused = true)]
    async fn announcements_follow_broadcast_enable() {
        assert_eq!(announcements_received(true).await, ANNOUNCEMENT_COUNT as usize);
        assert_eq!(announcements_received(false).await, 0);
    }
}
