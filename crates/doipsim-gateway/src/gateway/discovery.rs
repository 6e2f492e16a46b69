//! UDP discovery: vehicle identification, entity status, announcements

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use doipsim_proto::{DoipHeader, DoipMessage, ProtoError, HEADER_LEN};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::dispatcher::Dispatcher;
use crate::display::HexDump;

/// Vehicle announcements sent after start
pub const ANNOUNCEMENT_COUNT: u32 = 3;

pub const ANNOUNCEMENT_INTERVAL: Duration = Duration::from_millis(500);

/// Largest datagram accepted
const MAX_DATAGRAM: usize = 4096;

/// Pause after a failed receive before reading again
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub(crate) async fn udp_loop(
    socket: Arc<UdpSocket>,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let received = tokio::select! {
            received = socket.recv_from(&mut buf) => received,
            _ = shutdown.wait_for(|stop| *stop) => break,
        };
        let (len, peer) = match received {
            Ok(received) => received,
            Err(e) => {
                warn!(%e, "UDP receive failed");
                if backoff(&mut shutdown).await {
                    continue;
                }
                break;
            }
        };

        let datagram = &buf[..len];
        debug!(%peer, data = %HexDump::new(datagram, dispatcher.max_logging), "UDP datagram received");
        let response = match decode_datagram(datagram) {
            Ok(message) => dispatcher.handle_udp(message),
            Err(e) => {
                warn!(%peer, %e, "Invalid DoIP datagram");
                Some(DoipMessage::GenericNack(e.nack_code()))
            }
        };
        if let Some(response) = response {
            send_to(&socket, &response, peer).await;
        }
    }
    debug!("UDP loop stopped");
}

/// Wait out [`RECV_ERROR_BACKOFF`]; false if shutdown was signalled first
async fn backoff(shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(RECV_ERROR_BACKOFF) => true,
        _ = shutdown.wait_for(|stop| *stop) => false,
    }
}

fn decode_datagram(datagram: &[u8]) -> Result<DoipMessage, ProtoError> {
    let header = DoipHeader::parse(datagram)?;
    header.payload_kind()?;
    let payload = &datagram[HEADER_LEN..];
    if payload.len() != header.payload_length as usize {
        return Err(ProtoError::InvalidPayloadLength {
            payload_type: header.payload_type,
            length: payload.len(),
        });
    }
    DoipMessage::decode(&header, payload)
}

async fn send_to(socket: &UdpSocket, message: &DoipMessage, target: SocketAddr) {
    let bytes = message.encode();
    match socket.send_to(&bytes, target).await {
        Ok(_) => debug!(%target, payload_type = ?message.payload_type(), "UDP message sent"),
        Err(e) => warn!(%target, %e, "UDP send failed"),
    }
}

/// Broadcast the vehicle announcement a fixed number of times
pub(crate) async fn announce(
    socket: Arc<UdpSocket>,
    dispatcher: Arc<Dispatcher>,
    target: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    let announcement = dispatcher.vehicle_announcement();
    for round in 1..=ANNOUNCEMENT_COUNT {
        tokio::select! {
            _ = tokio::time::sleep(ANNOUNCEMENT_INTERVAL) => {}
            _ = shutdown.wait_for(|stop| *stop) => return,
        }
        info!(%target, round, "Send vehicle announcement");
        send_to(&socket, &announcement, target).await;
    }
}
