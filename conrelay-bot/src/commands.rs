//! Operator commands typed on stdin.
//!
//!   /time      In-game day and time
//!   /version   Server game version
//!   /players   Online player count
//!   /help      List commands
//!   /quit      Disconnect and exit
//!
//! Anything not starting with `/` is sent to the console verbatim.

use std::time::Duration;

use conrelay_sdk::{ClientHandle, Waiter};

pub const HELP: &str = "\
/time      in-game day and time
/version   server game version
/players   online player count
/help      this list
/quit      disconnect and exit
<text>     send <text> to the console as-is";

/// How long a query waits for its summary line after the command returns.
const CLAIM_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Time,
    Version,
    Players,
    Help,
    Quit,
    /// Console command passed through unchanged.
    Raw(String),
}

impl OperatorCommand {
    /// `None` for blank input.
    pub fn parse(input: &str) -> Result<Option<Self>, String> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(None);
        }
        let Some(name) = input.strip_prefix('/') else {
            return Ok(Some(Self::Raw(input.to_string())));
        };
        let cmd = match name.to_ascii_lowercase().as_str() {
            "time" => Self::Time,
            "version" => Self::Version,
            "players" => Self::Players,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command /{other}; try /help")),
        };
        Ok(Some(cmd))
    }

    /// Text written to the console, if this command talks to it.
    pub fn console_command(&self) -> Option<&str> {
        match self {
            Self::Time => Some("gettime"),
            Self::Version => Some("version"),
            Self::Players => Some("listplayers"),
            Self::Raw(text) => Some(text.as_str()),
            Self::Help | Self::Quit => None,
        }
    }

    /// Waiter for the one line that answers this query.
    pub fn waiter(&self) -> Option<Waiter> {
        match self {
            Self::Time => Some(Waiter::time()),
            Self::Version => Some(Waiter::version()),
            Self::Players => Some(Waiter::players()),
            _ => None,
        }
    }
}

/// Run `cmd` against the console and return the text to show the operator.
///
/// Queries print only the line their waiter claims; raw commands print the
/// whole reply. Failures are reported by category, never as raw socket
/// errors.
pub async fn run(handle: &ClientHandle, cmd: &OperatorCommand) -> String {
    let Some(text) = cmd.console_command() else {
        return match cmd {
            OperatorCommand::Help => HELP.to_string(),
            // Intercepted by the caller; nothing to show.
            _ => String::new(),
        };
    };

    let claim = match cmd.waiter() {
        Some(waiter) => match handle.wait_for(waiter).await {
            Ok(rx) => Some(rx),
            Err(e) => return format!("error: {e}"),
        },
        None => None,
    };

    let reply = match handle.exec(text, None).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::debug!(command = %text, error = %e.original_message, "Operator command failed");
            return format!("error: {}", e.describe());
        }
    };

    match claim {
        Some(rx) => match tokio::time::timeout(CLAIM_TIMEOUT, rx).await {
            Ok(Ok(line)) => line,
            _ => {
                tracing::debug!(command = %text, "No summary line claimed; showing full reply");
                reply
            }
        },
        None => reply,
    }
}
