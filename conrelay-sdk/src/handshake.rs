//! Password handshake with the console.
//!
//! On connect the console sends a password prompt. The client answers with
//! the configured password and then waits for either a login confirmation or
//! a rejection. Markers are matched against whole lines.

/// Prompt asking for the console password.
pub const PASSWORD_PROMPT: &str = "Please enter password:";
/// Sent instead of a login confirmation when the password is wrong.
pub const PASSWORD_INCORRECT: &str = "Password incorrect, please enter password:";
/// Login confirmation on older console builds.
pub const LOGON_SUCCESSFUL: &str = "Logon successful";

const CONNECTED_PREFIX: &str = "*** Connected with ";
const CONNECTED_SUFFIX: &str = " server";

/// What the client should do after seeing a handshake line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Write the password followed by a newline.
    SendPassword,
    /// Login confirmed; the session is ready.
    Authenticated,
    /// Password rejected. Fatal.
    Rejected,
    /// Banner or noise; nothing to do.
    Ignore,
}

/// Classifies pre-login lines. One instance per connection.
#[derive(Debug, Default)]
pub struct Handshake {
    password_sent: bool,
}

impl Handshake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn password_sent(&self) -> bool {
        self.password_sent
    }

    pub fn on_line(&mut self, line: &str) -> HandshakeStep {
        let line = line.trim_end();
        if line == PASSWORD_INCORRECT {
            HandshakeStep::Rejected
        } else if is_password_prompt(line) {
            self.password_sent = true;
            HandshakeStep::SendPassword
        } else if is_login_success(line) {
            HandshakeStep::Authenticated
        } else {
            HandshakeStep::Ignore
        }
    }

    pub fn reset(&mut self) {
        self.password_sent = false;
    }
}

/// The prompt may arrive without a trailing terminator, so callers also test
/// the framer's partial buffer with this.
pub fn is_password_prompt(line: &str) -> bool {
    line.trim_end() == PASSWORD_PROMPT
}

/// `Logon successful`, or `*** Connected with <server> server` for any
/// non-empty server name.
pub fn is_login_success(line: &str) -> bool {
    if line == LOGON_SUCCESSFUL {
        return true;
    }
    line.strip_prefix(CONNECTED_PREFIX)
        .and_then(|rest| rest.strip_suffix(CONNECTED_SUFFIX))
        .is_some_and(|server| !server.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_successful_handshake() {
        let mut hs = Handshake::new();
        assert_eq!(hs.on_line("*** Server banner ***"), HandshakeStep::Ignore);
        assert_eq!(hs.on_line("Please enter password:"), HandshakeStep::SendPassword);
        assert!(hs.password_sent());
        assert_eq!(
            hs.on_line("*** Connected with 7DTD server"),
            HandshakeStep::Authenticated
        );
    }

    #[test]
    fn logon_successful_marker() {
        let mut hs = Handshake::new();
        hs.on_line(PASSWORD_PROMPT);
        assert_eq!(hs.on_line("Logon successful"), HandshakeStep::Authenticated);
    }

    #[test]
    fn rejection_is_not_mistaken_for_prompt() {
        let mut hs = Handshake::new();
        hs.on_line(PASSWORD_PROMPT);
        assert_eq!(
            hs.on_line("Password incorrect, please enter password:"),
            HandshakeStep::Rejected
        );
    }

    #[test]
    fn prompt_tolerates_trailing_space() {
        assert!(is_password_prompt("Please enter password: "));
        assert!(!is_password_prompt("please enter password:"));
    }

    #[test]
    fn success_markers_are_exact() {
        assert!(is_login_success("*** Connected with 7DTD server"));
        assert!(is_login_success("*** Connected with My Cool Server server"));
        assert!(!is_login_success("*** Connected with  server"));
        assert!(!is_login_success("Logon successful!"));
        assert!(!is_login_success("2024-01-01T00:00:00 1.0 INF Logon successful"));
    }

    #[test]
    fn reset_clears_password_flag() {
        let mut hs = Handshake::new();
        hs.on_line(PASSWORD_PROMPT);
        hs.reset();
        assert!(!hs.password_sent());
    }
}
