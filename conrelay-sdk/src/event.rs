//! Events emitted by the console client for consumers (relay, bot, UI).

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// TCP connection established; handshake starting.
    Connected,

    /// Login confirmed. Commands may be issued.
    Ready,

    /// A de-duplicated console line not claimed by a waiter.
    Line(String),

    /// The server announced it is shutting down. The connection is torn
    /// down and follows the normal reconnect path.
    ServerShutdown,

    /// Transport-level failure (refused, reset, timeout).
    Error { message: String },

    /// The console rejected the password. The client will not retry.
    AuthFailed,

    /// The connection was closed.
    Closed { reason: String },

    /// A reconnect attempt will be made after `delay`.
    ReconnectScheduled { delay: Duration },
}
