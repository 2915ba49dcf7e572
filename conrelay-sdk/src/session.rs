//! Per-connection session state.
//!
//! A [`Session`] is owned by the client task and never shared. Its
//! [`ConnectionState`] is mirrored into a `watch` channel so handles can
//! check readiness without a round trip to the task.

use std::fmt;

use tokio::sync::watch;

use crate::config::SessionConfig;
use crate::dedup::DuplicateFilter;
use crate::framer::LineFramer;
use crate::handshake::Handshake;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Failed,
}

impl ConnectionState {
    /// Whether `self -> next` is an edge of the connection state machine.
    ///
    /// ```text
    /// Disconnected -> Connecting -> Authenticating -> Ready
    ///       ^             ^                |
    ///       |           Failed <-----------+  (any state)
    ///       +------------ any state (shutdown / close without reconnect)
    /// ```
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        if self == next {
            return false;
        }
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Failed, Connecting)
                | (Connecting, Authenticating)
                | (Authenticating, Ready)
                | (_, Failed)
                | (_, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// State of one logical console connection.
pub struct Session {
    host: String,
    port: u16,
    password: String,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    pub(crate) framer: LineFramer,
    pub(crate) dedup: DuplicateFilter,
    pub(crate) handshake: Handshake,
}

impl Session {
    pub(crate) fn new(config: &SessionConfig, state_tx: watch::Sender<ConnectionState>) -> Self {
        state_tx.send_replace(ConnectionState::Disconnected);
        Self {
            host: config.host.clone(),
            port: config.port,
            password: config.password.clone(),
            state: ConnectionState::Disconnected,
            state_tx,
            framer: LineFramer::new(),
            dedup: DuplicateFilter::new(),
            handshake: Handshake::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    /// Move to `next` if that is a legal edge. Illegal moves are logged and
    /// leave the state unchanged.
    pub(crate) fn transition(&mut self, next: ConnectionState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "Rejected illegal connection state transition");
            return false;
        }
        tracing::debug!(from = %self.state, to = %next, "Connection state changed");
        self.state = next;
        self.state_tx.send_replace(next);
        true
    }

    /// Clear per-connection stream state before a new socket is opened.
    pub(crate) fn reset_stream(&mut self) {
        self.framer.reset();
        self.dedup.reset();
        self.handshake.reset();
    }
}
