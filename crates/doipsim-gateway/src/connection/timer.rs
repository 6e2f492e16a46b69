//! Inactivity timers

use std::fmt;
use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Runs from accept until routing activation succeeds
    Initial,
    /// Runs while registered, restarted by inbound data
    General,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::General => write!(f, "general"),
        }
    }
}

/// A running inactivity timer
///
/// The generation ties the timer to the connection state it was started for;
/// the connection ignores an expiry whose generation is no longer current.
pub(crate) struct InactivityTimer {
    pub(crate) kind: TimerKind,
    pub(crate) generation: u64,
    handle: JoinHandle<()>,
}

impl InactivityTimer {
    pub(crate) fn spawn(
        connection: Weak<Connection>,
        kind: TimerKind,
        generation: u64,
        duration: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(connection) = connection.upgrade() {
                connection.on_timer_expired(kind, generation);
            }
        });
        Self {
            kind,
            generation,
            handle,
        }
    }

    pub(crate) fn cancel(self) {
        self.handle.abort();
    }
}
