//! conrelay-sdk: session layer for remote game server consoles.
//!
//! Owns one persistent TCP connection to a password-protected, line-oriented
//! admin console. The client task frames the byte stream into lines, drops
//! repeated status lines, runs the password handshake, serializes commands
//! with throttling and timeouts, and reconnects after a fixed delay when the
//! connection drops.
//!
//! Start with [`client::connect`], which returns a [`client::ClientHandle`]
//! for issuing commands and a receiver of [`event::Event`]s.

pub mod classify;
pub mod client;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod framer;
pub mod handshake;
pub mod queue;
pub mod session;

pub use classify::{ClassifiedError, ErrorCategory};
pub use client::ClientHandle;
pub use config::SessionConfig;
pub use dispatch::Waiter;
pub use event::Event;
pub use session::ConnectionState;
