//! Alive check session
//!
//! Probes a set of connections with alive check requests, collects the
//! responses for a fixed window and closes every target that stayed silent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use doipsim_proto::DoipMessage;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::connection::{Connection, ConnectionId, SubscriberId};
use crate::display::Addr;

/// Fixed alive check response window (ISO 13400-2 T_TCP_Alive_Check)
pub const ALIVE_CHECK_WINDOW: Duration = Duration::from_millis(500);

/// Reported source addresses per probed connection
pub type AliveCheckResponses = HashMap<ConnectionId, Vec<u16>>;

pub struct AliveCheckSession {
    window: Duration,
}

impl Default for AliveCheckSession {
    fn default() -> Self {
        Self::new(ALIVE_CHECK_WINDOW)
    }
}

impl AliveCheckSession {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Probe `targets` and wait for the window to elapse
    ///
    /// If `interrupt` turns true during the wait, the session ends early with
    /// the responses collected so far. Targets without a response are closed
    /// either way.
    pub async fn run(
        &self,
        targets: &[Arc<Connection>],
        interrupt: &mut watch::Receiver<bool>,
    ) -> AliveCheckResponses {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut subscriptions: Vec<(&Arc<Connection>, SubscriberId)> = Vec::new();
        let mut responses = AliveCheckResponses::new();

        for target in targets {
            responses.insert(target.id(), Vec::new());
            match target.subscribe_alive_check(tx.clone()) {
                Some(id) => {
                    subscriptions.push((target, id));
                    target.send(DoipMessage::AliveCheckRequest);
                    debug!(conn = %target.id(), "Alive check request sent");
                }
                None => debug!(conn = %target.id(), "Alive check target already closed"),
            }
        }
        drop(tx);

        let interrupted = tokio::select! {
            _ = tokio::time::sleep(self.window) => false,
            _ = interrupt.wait_for(|stop| *stop) => true,
        };
        if interrupted {
            error!(targets = targets.len(), "Alive check wait interrupted, deciding on partial responses");
        }

        for (target, id) in subscriptions {
            target.unsubscribe_alive_check(id);
        }

        while let Ok(report) = rx.try_recv() {
            if !report.confirms_registration() {
                debug!(
                    conn = %report.connection,
                    source = %Addr(report.reported_source_address),
                    "Alive check response does not match registered address, ignored"
                );
                continue;
            }
            if let Some(list) = responses.get_mut(&report.connection) {
                list.push(report.reported_source_address);
            }
        }

        for target in targets {
            let silent = responses.get(&target.id()).map_or(true, Vec::is_empty);
            if silent {
                info!(conn = %target.id(), "No alive check response, closing connection");
                target.stop();
            }
        }

        responses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InactivityTimings;

    fn registered(id: u64, source_address: u16) -> (Arc<Connection>, mpsc::UnboundedReceiver<DoipMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timings = InactivityTimings {
            initial: Duration::from_secs(60),
            general: Duration::from_secs(60),
        };
        let conn = Connection::new(ConnectionId(id), timings, tx);
        conn.start();
        assert!(conn.activate(source_address));
        (conn, rx)
    }

    /// Answer every alive check request received on `rx` with `source_address`
    fn responder(
        conn: Arc<Connection>,
        mut rx: mpsc::UnboundedReceiver<DoipMessage>,
        source_address: u16,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if msg == DoipMessage::AliveCheckRequest {
                    conn.on_alive_check_response(source_address);
                }
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn silent_targets_are_closed() {
        let (alive, alive_rx) = registered(1, 0x0EF1);
        let (silent, _silent_rx) = registered(2, 0x0EF2);
        let _task = responder(alive.clone(), alive_rx, 0x0EF1);

        let (_stop_tx, mut stop_rx) = watch::channel(false);
        let started = tokio::time::Instant::now();
        let responses = AliveCheckSession::default()
            .run(&[alive.clone(), silent.clone()], &mut stop_rx)
            .await;

        assert!(started.elapsed() >= ALIVE_CHECK_WINDOW);
        assert_eq!(responses[&ConnectionId(1)], vec![0x0EF1]);
        assert!(responses[&ConnectionId(2)].is_empty());
        assert!(alive.is_registered());
        assert!(silent.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_response_counts_as_silence() {
        let (conn, rx) = registered(1, 0x0EF1);
        let _task = responder(conn.clone(), rx, 0x0E80);

        let (_stop_tx, mut stop_rx) = watch::channel(false);
        let responses = AliveCheckSession::default()
            .run(&[conn.clone()], &mut stop_rx)
            .await;

        assert!(responses[&ConnectionId(1)].is_empty());
        assert!(conn.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_target_is_treated_as_silent() {
        let (conn, _rx) = registered(1, 0x0EF1);
        conn.stop();

        let (_stop_tx, mut stop_rx) = watch::channel(false);
        let responses = AliveCheckSession::default()
            .run(&[conn.clone()], &mut stop_rx)
            .await;
        assert!(responses[&ConnectionId(1)].is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn interruption_ends_wait_early() {
        let (conn, rx) = registered(1, 0x0EF1);
        let _task = responder(conn.clone(), rx, 0x0EF1);

        let (stop_tx, mut stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = stop_tx.send(true);
        });

        let started = tokio::time::Instant::now();
        let responses = AliveCheckSession::default()
            .run(&[conn.clone()], &mut stop_rx)
            .await;
        assert!(started.elapsed() < ALIVE_CHECK_WINDOW);
        assert_eq!(responses[&ConnectionId(1)], vec![0x0EF1]);
    }
}
