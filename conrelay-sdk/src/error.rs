//! Error types for the console session layer.

use std::time::Duration;

use thiserror::Error;

/// Structural problems with a [`SessionConfig`](crate::config::SessionConfig).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("host must not be empty")]
    EmptyHost,
    #[error("port must be non-zero")]
    InvalidPort,
    #[error("password must not be empty")]
    EmptyPassword,
}

/// Connection-level failures. These end a session; everything except
/// [`SessionError::AuthenticationFailed`] is retried after the reconnect
/// delay when auto-reconnect is on.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect timeout: {addr} did not accept within {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("handshake timeout: no login confirmation within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by server")]
    Closed,

    #[error("authentication failed: password rejected by server")]
    AuthenticationFailed,

    #[error("client task has stopped")]
    ClientStopped,
}

/// Raw failure of a single `exec` call, before classification.
///
/// The messages are chosen so the classifier maps each variant onto the
/// intended category.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("not connected")]
    NotConnected,

    #[error("socket not writable: {0}")]
    SocketNotWritable(String),

    #[error("response not received: {0}")]
    ResponseNotReceived(String),

    #[error("timeout: no reply within {0:?}")]
    Timeout(Duration),

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}
