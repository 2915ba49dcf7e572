//! Coarse, user-facing classification of command failures.
//!
//! Callers show operators a short category string instead of a raw socket
//! or protocol error. Matching is a case-insensitive substring test against
//! the error message; the first rule that matches wins.

use std::fmt;

use crate::error::CommandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    NotResponding,
    NotConnected,
    Timeout,
    Unknown,
}

impl ErrorCategory {
    /// Human-readable text, or `None` for [`ErrorCategory::Unknown`] where
    /// the original message is shown instead.
    pub fn description(self) -> Option<&'static str> {
        match self {
            Self::NotResponding => Some("server not responding; may be loading or frozen"),
            Self::NotConnected => Some("not connected to server yet"),
            Self::Timeout => Some("took too long to respond"),
            Self::Unknown => None,
        }
    }
}

/// Map an error message onto a category. Total: never fails.
pub fn classify(message: &str) -> ErrorCategory {
    let lower = message.to_ascii_lowercase();
    if lower.contains("response not received") {
        ErrorCategory::NotResponding
    } else if lower.contains("socket not writable")
        || lower.contains("not connected")
        || lower.contains("econn")
    {
        ErrorCategory::NotConnected
    } else if lower.contains("timeout") {
        ErrorCategory::Timeout
    } else {
        ErrorCategory::Unknown
    }
}

/// A command failure after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub original_message: String,
}

impl ClassifiedError {
    pub fn from_error(err: &impl fmt::Display) -> Self {
        let original_message = err.to_string();
        Self {
            category: classify(&original_message),
            original_message,
        }
    }

    /// Text to show an operator.
    pub fn describe(&self) -> &str {
        self.category
            .description()
            .unwrap_or(&self.original_message)
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

impl std::error::Error for ClassifiedError {}

impl From<CommandError> for ClassifiedError {
    fn from(err: CommandError) -> Self {
        Self::from_error(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn sample_messages() {
        assert_eq!(classify("response not received"), ErrorCategory::NotResponding);
        assert_eq!(classify("socket not writable"), ErrorCategory::NotConnected);
        assert_eq!(classify("timeout"), ErrorCategory::Timeout);
        assert_eq!(classify("weird"), ErrorCategory::Unknown);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(classify("Response Not Received after 5s"), ErrorCategory::NotResponding);
        assert_eq!(classify("connect ECONNREFUSED 10.0.0.1:8081"), ErrorCategory::NotConnected);
        assert_eq!(classify("Not Connected"), ErrorCategory::NotConnected);
        assert_eq!(classify("operation TIMEOUT"), ErrorCategory::Timeout);
    }

    #[test]
    fn first_rule_wins() {
        // Mentions both; the not-responding rule is checked first.
        assert_eq!(
            classify("response not received: timeout"),
            ErrorCategory::NotResponding
        );
        assert_eq!(classify("not connected (timeout)"), ErrorCategory::NotConnected);
    }

    #[test]
    fn empty_message_is_unknown() {
        assert_eq!(classify(""), ErrorCategory::Unknown);
    }

    #[test]
    fn command_errors_land_in_intended_category() {
        let cases = [
            (CommandError::NotConnected, ErrorCategory::NotConnected),
            (
                CommandError::SocketNotWritable("broken pipe".into()),
                ErrorCategory::NotConnected,
            ),
            (
                CommandError::ResponseNotReceived("connection closed".into()),
                ErrorCategory::NotResponding,
            ),
            (
                CommandError::Timeout(Duration::from_millis(5000)),
                ErrorCategory::Timeout,
            ),
            (
                CommandError::InvalidCommand("contains a line terminator".into()),
                ErrorCategory::Unknown,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ClassifiedError::from(err.clone()).category, expected, "{err}");
        }
    }

    #[test]
    fn unknown_passes_original_message_through() {
        let err = ClassifiedError::from_error(&"weird");
        assert_eq!(err.describe(), "weird");
        assert_eq!(err.to_string(), "weird");
    }

    #[test]
    fn known_category_hides_raw_message() {
        let err = ClassifiedError::from(CommandError::Timeout(Duration::from_secs(5)));
        assert_eq!(err.to_string(), "took too long to respond");
        assert!(err.original_message.contains("5s"));
    }
}
