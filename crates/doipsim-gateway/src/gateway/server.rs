//! TCP accept loop and per-connection reader/writer tasks

use std::net::SocketAddr;
use std::sync::Arc;

use doipsim_proto::DoipMessage;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::dispatcher::{Dispatcher, Flow};
use super::framing::read_frame;
use crate::config::InactivityTimings;
use crate::connection::Connection;

pub(crate) async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    timings: InactivityTimings,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if dispatcher.registry.count_all() >= usize::from(dispatcher.max_sockets) {
                        warn!(%peer, max = dispatcher.max_sockets, "Socket limit reached, connection refused");
                        continue;
                    }
                    tokio::spawn(serve_connection(stream, peer, dispatcher.clone(), timings));
                }
                Err(e) => warn!(%e, "TCP accept failed"),
            },
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }
    debug!("TCP accept loop stopped");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    timings: InactivityTimings,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, %e, "Failed to set TCP_NODELAY");
    }
    let (reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();

    let registry = &dispatcher.registry;
    let connection = Connection::new(registry.next_connection_id(), timings, tx);
    let id = connection.id();
    registry.add(connection.clone());
    connection.start();
    info!(conn = %id, %peer, "TCP connection accepted");

    tokio::spawn(write_loop(writer, rx, connection.clone()));
    read_loop(reader, &connection, &dispatcher).await;

    connection.stop();
    registry.remove(id);
    info!(conn = %id, %peer, "TCP connection finished");
}

async fn read_loop(mut reader: OwnedReadHalf, connection: &Arc<Connection>, dispatcher: &Dispatcher) {
    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut reader, dispatcher.max_data_size) => frame,
            _ = connection.closed() => break,
        };

        let message = match frame {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                connection.on_data_received();
                warn!(conn = %connection.id(), %e, "Invalid DoIP frame");
                connection.send(DoipMessage::GenericNack(e.nack_code()));
                if e.closes_socket() {
                    break;
                }
                continue;
            }
            Ok(None) => {
                debug!(conn = %connection.id(), "Peer closed the connection");
                break;
            }
            Err(e) => {
                warn!(conn = %connection.id(), %e, "TCP receive failed");
                break;
            }
        };

        connection.on_data_received();
        if dispatcher.handle_tcp(connection, message).await == Flow::Close {
            break;
        }
    }
}

/// Drain the outbound queue until the connection drops its sender
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<DoipMessage>,
    connection: Arc<Connection>,
) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = writer.write_all(&message.encode()).await {
            warn!(conn = %connection.id(), %e, "TCP send failed, closing connection");
            connection.stop();
            break;
        }
    }
    let _ = writer.shutdown().await;
    debug!(conn = %connection.id(), "TCP writer stopped");
}
