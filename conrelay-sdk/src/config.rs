//! Connection settings for a console session.

use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

/// Default console port used by the game's telnet interface.
pub const DEFAULT_PORT: u16 = 8081;

/// Configuration for one logical console connection.
#[derive(Clone)]
pub struct SessionConfig {
    /// Console host name or IP.
    pub host: String,
    /// Console TCP port.
    pub port: u16,
    /// Console password, written in reply to the password prompt.
    pub password: String,
    /// Bound on the TCP connect, and separately on the login handshake.
    pub connect_timeout: Duration,
    /// Minimum spacing between two command writes.
    pub min_command_interval: Duration,
    /// Reply timeout used when `exec` is called without one.
    pub default_command_timeout: Duration,
    /// Fixed delay before a reconnect attempt.
    pub reconnect_delay: Duration,
    /// Reconnect after the connection drops.
    pub auto_reconnect: bool,
    /// Quiet period after the last reply line before a command resolves.
    pub reply_settle: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            password: String::new(),
            connect_timeout: Duration::from_secs(10),
            min_command_interval: Duration::from_millis(350),
            default_command_timeout: Duration::from_millis(5000),
            reconnect_delay: Duration::from_secs(5),
            auto_reconnect: true,
            reply_settle: Duration::from_millis(50),
        }
    }
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            ..Default::default()
        }
    }

    /// `host:port` as passed to the socket connect.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject structurally invalid settings before any socket is opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.password.is_empty() {
            return Err(ConfigError::EmptyPassword);
        }
        Ok(())
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .field("min_command_interval", &self.min_command_interval)
            .field("default_command_timeout", &self.default_command_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("reply_settle", &self.reply_settle)
            .finish()
    }
}
