//! Suppression of immediately repeated console lines.
//!
//! Some consoles retransmit an unchanged status line. Forwarding it twice
//! makes downstream relays post the same chat message twice.

/// Remembers the last forwarded line and rejects an exact repeat of it.
#[derive(Debug, Default)]
pub struct DuplicateFilter {
    last: Option<String>,
}

impl DuplicateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `line` should be forwarded.
    ///
    /// Empty lines are never forwarded and leave the remembered line alone.
    pub fn admit(&mut self, line: &str) -> bool {
        if line.is_empty() {
            return false;
        }
        if self.last.as_deref() == Some(line) {
            return false;
        }
        self.last = Some(line.to_string());
        true
    }

    /// The last forwarded line, if any.
    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
