//! Message handling for TCP connections, UDP datagrams and ECU responses

use std::sync::Arc;

use doipsim_proto::{
    DiagnosticMessage, DiagnosticNackCode, DoipMessage, EntityStatusResponse,
    RoutingActivationCode, RoutingActivationRequest, VehicleAnnouncement,
};
use tracing::{debug, info, warn};

use crate::config::VehicleIdentity;
use crate::connection::Connection;
use crate::display::{Addr, HexDump};
use crate::ecu::{Ecu, UdsMessage};
use crate::registry::ConnectionRegistry;

/// Node type reported in entity status responses (gateway)
const NODE_TYPE_GATEWAY: u8 = 0x00;

/// Diagnostic power mode reported to testers (not ready)
const POWER_MODE: u8 = 0x00;

/// Whether the reader keeps the socket open after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Close,
}

pub(crate) struct Dispatcher {
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) ecus: Vec<Arc<dyn Ecu>>,
    pub(crate) identity: VehicleIdentity,
    pub(crate) max_sockets: u8,
    pub(crate) max_data_size: u32,
    pub(crate) max_logging: usize,
}

impl Dispatcher {
    pub(crate) async fn handle_tcp(&self, connection: &Arc<Connection>, message: DoipMessage) -> Flow {
        match message {
            DoipMessage::RoutingActivationRequest(request) => {
                self.on_routing_activation(connection, request).await
            }
            DoipMessage::AliveCheckResponse(response) => {
                connection.on_alive_check_response(response.source_address);
                Flow::Continue
            }
            DoipMessage::DiagnosticMessage(message) => self.on_diagnostic_message(connection, message),
            DoipMessage::GenericNack(code) => {
                warn!(conn = %connection.id(), code = ?code, "Received generic header NACK, ignored");
                Flow::Continue
            }
            other => {
                info!(
                    conn = %connection.id(),
                    payload_type = ?other.payload_type(),
                    "Unexpected message on TCP, ignored"
                );
                Flow::Continue
            }
        }
    }

    async fn on_routing_activation(
        &self,
        connection: &Arc<Connection>,
        request: RoutingActivationRequest,
    ) -> Flow {
        let source = request.source_address;
        let code = if request.activation_type.is_supported() {
            self.registry.register(connection, source).await
        } else {
            warn!(
                conn = %connection.id(),
                activation_type = ?request.activation_type,
                "Unsupported routing activation type"
            );
            RoutingActivationCode::DeniedUnsupportedActivationType
        };

        connection.send(DoipMessage::routing_activation_response(
            source,
            self.identity.logical_address,
            code,
        ));
        if code.keeps_socket_open() {
            Flow::Continue
        } else {
            debug!(conn = %connection.id(), code = ?code, "Routing activation denied, closing socket");
            Flow::Close
        }
    }

    fn on_diagnostic_message(&self, connection: &Arc<Connection>, message: DiagnosticMessage) -> Flow {
        let source = message.source_address;
        let target = message.target_address;
        info!(
            conn = %connection.id(),
            source = %Addr(source),
            target = %Addr(target),
            data = %HexDump::new(&message.user_data, self.max_logging),
            "Diagnostic message received"
        );

        if connection.registered_source_address() != Some(source) {
            warn!(
                conn = %connection.id(),
                source = %Addr(source),
                "Source address not registered on this socket"
            );
            connection.send(DoipMessage::diagnostic_nack(
                target,
                source,
                DiagnosticNackCode::InvalidSourceAddress,
            ));
            return Flow::Close;
        }

        let targets: Vec<_> = self
            .ecus
            .iter()
            .filter_map(|ecu| ecu.addressing_for(target).map(|mode| (ecu, mode)))
            .collect();
        if targets.is_empty() {
            warn!(conn = %connection.id(), target = %Addr(target), "No ECU with target address");
            connection.send(DoipMessage::diagnostic_nack(
                target,
                source,
                DiagnosticNackCode::UnknownTargetAddress,
            ));
            return Flow::Continue;
        }

        connection.send(DoipMessage::diagnostic_ack(target, source));
        for (ecu, addressing) in targets {
            debug!(ecu = ecu.name(), addressing = ?addressing, "Forward request to ECU");
            ecu.put_request(UdsMessage {
                source_address: source,
                target_address: target,
                addressing,
                data: message.user_data.clone(),
            });
        }
        Flow::Continue
    }

    /// Route an ECU response to the connection registered for its target
    pub(crate) fn on_ecu_response(&self, response: UdsMessage) {
        let Some(connection) = self.registry.lookup_by_source_address(response.target_address) else {
            info!(
                source = %Addr(response.source_address),
                target = %Addr(response.target_address),
                "No connection registered for response target, response dropped"
            );
            return;
        };
        debug!(
            conn = %connection.id(),
            source = %Addr(response.source_address),
            target = %Addr(response.target_address),
            data = %HexDump::new(&response.data, self.max_logging),
            "Send diagnostic response"
        );
        connection.send(DoipMessage::diagnostic(
            response.source_address,
            response.target_address,
            response.data,
        ));
    }

    pub(crate) fn vehicle_announcement(&self) -> DoipMessage {
        DoipMessage::VehicleAnnouncement(VehicleAnnouncement {
            vin: self.identity.vin,
            logical_address: self.identity.logical_address,
            eid: self.identity.eid,
            gid: self.identity.gid,
            further_action: 0x00,
            sync_status: Some(0x00),
        })
    }

    /// Answer a datagram; `None` means no response is sent
    pub(crate) fn handle_udp(&self, message: DoipMessage) -> Option<DoipMessage> {
        match message {
            DoipMessage::VehicleIdentificationRequest => {
                info!("Vehicle identification request");
                Some(self.vehicle_announcement())
            }
            DoipMessage::VehicleIdentificationRequestWithEid(eid) => {
                if eid == self.identity.eid {
                    info!("Vehicle identification request with matching EID");
                    Some(self.vehicle_announcement())
                } else {
                    debug!(eid = %HexDump::new(&eid, eid.len()), "EID does not match, no response");
                    None
                }
            }
            DoipMessage::VehicleIdentificationRequestWithVin(vin) => {
                if vin == self.identity.vin {
                    info!("Vehicle identification request with matching VIN");
                    Some(self.vehicle_announcement())
                } else {
                    debug!(vin = %String::from_utf8_lossy(&vin), "VIN does not match, no response");
                    None
                }
            }
            DoipMessage::EntityStatusRequest => {
                let open_sockets = self.registry.count_all();
                info!(open_sockets, "Entity status request");
                Some(DoipMessage::EntityStatusResponse(EntityStatusResponse {
                    node_type: NODE_TYPE_GATEWAY,
                    max_concurrent_sockets: self.max_sockets,
                    open_sockets: u8::try_from(open_sockets).unwrap_or(u8::MAX),
                    max_data_size: Some(self.max_data_size),
                }))
            }
            DoipMessage::PowerModeRequest => {
                info!("Diagnostic power mode request");
                Some(DoipMessage::PowerModeResponse(POWER_MODE))
            }
            other => {
                debug!(payload_type = ?other.payload_type(), "Datagram ignored");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use doipsim_proto::{ActivationType, DiagnosticMessageAck};
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::{EcuConfig, InactivityTimings};
    use crate::ecu::{AddressingMode, StandardEcu};

    fn identity() -> VehicleIdentity {
        VehicleIdentity {
            vin: *b"WVWZZZ1JZ3W386752",
            eid: [1, 2, 3, 4, 5, 6],
            gid: [0; 6],
            logical_address: 0x0010,
        }
    }

    fn dispatcher() -> Dispatcher {
        let ecu = StandardEcu::new(
            &EcuConfig {
                name: "engine".to_string(),
                physical_address: 0x0001,
                functional_address: 0xE400,
                lookup: Vec::new(),
            },
            64,
            64,
        )
        .unwrap();
        Dispatcher {
            registry: Arc::new(ConnectionRegistry::new(1)),
            ecus: vec![Arc::new(ecu)],
            identity: identity(),
            max_sockets: 255,
            max_data_size: 4096,
            max_logging: 64,
        }
    }

    fn connection(dispatcher: &Dispatcher) -> (Arc<Connection>, mpsc::UnboundedReceiver<DoipMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timings = InactivityTimings {
            initial: Duration::from_secs(60),
            general: Duration::from_secs(60),
        };
        let conn = Connection::new(dispatcher.registry.next_connection_id(), timings, tx);
        conn.start();
        dispatcher.registry.add(conn.clone());
        (conn, rx)
    }

    fn activation(source_address: u16, activation_type: ActivationType) -> DoipMessage {
        DoipMessage::RoutingActivationRequest(RoutingActivationRequest {
            source_address,
            activation_type,
            oem_specific: None,
        })
    }

    #[tokio::test]
    async fn unsupported_activation_type_closes() {
        let dispatcher = dispatcher();
        let (conn, mut rx) = connection(&dispatcher);
        let flow = dispatcher
            .handle_tcp(&conn, activation(0x0EF1, ActivationType::CentralSecurity))
            .await;
        assert_eq!(flow, Flow::Close);
        assert_eq!(
            rx.recv().await,
            Some(DoipMessage::routing_activation_response(
                0x0EF1,
                0x0010,
                RoutingActivationCode::DeniedUnsupportedActivationType
            ))
        );
        assert!(!conn.is_registered());
    }

    #[tokio::test]
    async fn activation_then_diagnostic_ack() {
        let dispatcher = dispatcher();
        let (conn, mut rx) = connection(&dispatcher);
        let flow = dispatcher
            .handle_tcp(&conn, activation(0x0EF1, ActivationType::Default))
            .await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            rx.recv().await,
            Some(DoipMessage::routing_activation_response(0x0EF1, 0x0010, RoutingActivationCode::Success))
        );

        let flow = dispatcher
            .handle_tcp(&conn, DoipMessage::diagnostic(0x0EF1, 0xE400, vec![0x3E, 0x00]))
            .await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(rx.recv().await, Some(DoipMessage::diagnostic_ack(0xE400, 0x0EF1)));
    }

    #[tokio::test]
    async fn unregistered_source_is_nacked() {
        let dispatcher = dispatcher();
        let (conn, mut rx) = connection(&dispatcher);
        let flow = dispatcher
            .handle_tcp(&conn, DoipMessage::diagnostic(0x0EF1, 0x0001, vec![0x3E, 0x00]))
            .await;
        assert_eq!(flow, Flow::Close);
        match rx.recv().await {
            Some(DoipMessage::DiagnosticMessageNegativeAck(DiagnosticMessageAck { code, source_address, target_address, .. })) => {
                assert_eq!(code, DiagnosticNackCode::InvalidSourceAddress);
                assert_eq!(source_address, 0x0001);
                assert_eq!(target_address, 0x0EF1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_target_keeps_socket() {
        let dispatcher = dispatcher();
        let (conn, mut rx) = connection(&dispatcher);
        dispatcher
            .handle_tcp(&conn, activation(0x0EF1, ActivationType::Default))
            .await;
        rx.recv().await;

        let flow = dispatcher
            .handle_tcp(&conn, DoipMessage::diagnostic(0x0EF1, 0x0999, vec![0x3E, 0x00]))
            .await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            rx.recv().await,
            Some(DoipMessage::diagnostic_nack(0x0999, 0x0EF1, DiagnosticNackCode::UnknownTargetAddress))
        );
    }

    #[tokio::test]
    async fn ecu_response_is_routed_to_registered_tester() {
        let dispatcher = dispatcher();
        let (conn, mut rx) = connection(&dispatcher);
        dispatcher
            .handle_tcp(&conn, activation(0x0EF1, ActivationType::Default))
            .await;
        rx.recv().await;

        dispatcher.on_ecu_response(UdsMessage {
            source_address: 0x0001,
            target_address: 0x0EF1,
            addressing: AddressingMode::Physical,
            data: Bytes::from_static(&[0x7E, 0x00]),
        });
        assert_eq!(
            rx.recv().await,
            Some(DoipMessage::diagnostic(0x0001, 0x0EF1, vec![0x7E, 0x00]))
        );

        // Unknown tester: dropped without panicking
        dispatcher.on_ecu_response(UdsMessage {
            source_address: 0x0001,
            target_address: 0x0E80,
            addressing: AddressingMode::Physical,
            data: Bytes::from_static(&[0x7E, 0x00]),
        });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn identification_requests() {
        let dispatcher = dispatcher();
        assert!(matches!(
            dispatcher.handle_udp(DoipMessage::VehicleIdentificationRequest),
            Some(DoipMessage::VehicleAnnouncement(_))
        ));
        assert!(dispatcher
            .handle_udp(DoipMessage::VehicleIdentificationRequestWithEid([1, 2, 3, 4, 5, 6]))
            .is_some());
        assert!(dispatcher
            .handle_udp(DoipMessage::VehicleIdentificationRequestWithEid([6, 5, 4, 3, 2, 1]))
            .is_none());
        assert!(dispatcher
            .handle_udp(DoipMessage::VehicleIdentificationRequestWithVin(*b"WVWZZZ1JZ3W386752"))
            .is_some());
        assert!(dispatcher
            .handle_udp(DoipMessage::VehicleIdentificationRequestWithVin(*b"XXXXXXXXXXXXXXXXX"))
            .is_none());
    }

    #[tokio::test]
    async fn entity_status_counts_all_sockets() {
        let dispatcher = dispatcher();
        let status = |d: &Dispatcher| match d.handle_udp(DoipMessage::EntityStatusRequest) {
            Some(DoipMessage::EntityStatusResponse(status)) => status,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(status(&dispatcher).open_sockets, 0);
        let (_conn, _rx) = connection(&dispatcher);
        let response = status(&dispatcher);
        assert_eq!(response.open_sockets, 1);
        assert_eq!(response.max_concurrent_sockets, 255);
        assert_eq!(response.max_data_size, Some(4096));
    }

    #[test]
    fn power_mode() {
        assert_eq!(
            dispatcher().handle_udp(DoipMessage::PowerModeRequest),
            Some(DoipMessage::PowerModeResponse(0x00))
        );
    }
}
