//! Chat lines relayed from the console.
//!
//! The console logs player chat and game messages as
//! `<date>T<time> <tick> INF Chat (<source info>): '<name>': <text>` and
//! `<date>T<time> <tick> INF GMSG: <text>`. Everything else is console noise
//! and is not relayed.

use std::io::{self, Write};

use chrono::{DateTime, Local};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    /// Player chat.
    Chat,
    /// Game message (joins, leaves, deaths).
    Gmsg,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub kind: ChatKind,
    /// Parenthesised routing info after the kind, without the parentheses.
    pub source: Option<String>,
    /// Quoted speaker name at the start of a chat message.
    pub sender: Option<String>,
    pub text: String,
}

/// Split off the first whitespace-delimited token.
fn token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    Some(s.split_once(char::is_whitespace).unwrap_or((s, "")))
}

impl ChatLine {
    pub fn parse(line: &str) -> Option<Self> {
        let (_timestamp, rest) = token(line)?;
        let (_tick, rest) = token(rest)?;
        let (level, rest) = token(rest)?;
        if level != "INF" {
            return None;
        }

        let rest = rest.trim_start();
        let (kind, rest) = if let Some(r) = rest.strip_prefix("Chat") {
            (ChatKind::Chat, r)
        } else if let Some(r) = rest.strip_prefix("GMSG") {
            (ChatKind::Gmsg, r)
        } else {
            return None;
        };

        let (info, body) = rest.split_once(": ")?;
        let info = info.trim();
        let source = match info {
            "" => None,
            _ => Some(
                info.strip_prefix('(')
                    .and_then(|s| s.strip_suffix(')'))
                    .unwrap_or(info)
                    .to_string(),
            ),
        };
        // Reject e.g. `ChatCommand:` that merely shares the prefix.
        if source.is_some() && !info.starts_with('(') {
            return None;
        }

        let (sender, text) = match kind {
            ChatKind::Chat => split_sender(body),
            ChatKind::Gmsg => (None, body),
        };
        Some(Self {
            kind,
            source,
            sender: sender.map(str::to_string),
            text: text.to_string(),
        })
    }

    /// Render for a plain-text chat backend.
    pub fn render(&self, at: DateTime<Local>) -> String {
        let stamp = at.format("%H:%M:%S");
        match (self.kind, &self.sender) {
            (ChatKind::Chat, Some(name)) => format!("[{stamp}] <{name}> {}", self.text),
            (ChatKind::Chat, None) => format!("[{stamp}] {}", self.text),
            (ChatKind::Gmsg, _) => format!("[{stamp}] * {}", self.text),
        }
    }
}

/// `'Bob': hello` → (`Bob`, `hello`).
fn split_sender(body: &str) -> (Option<&str>, &str) {
    body.strip_prefix('\'')
        .and_then(|rest| rest.split_once("': "))
        .map_or((None, body), |(name, text)| (Some(name), text))
}

/// Downstream destination for relayed chat.
pub trait RelaySink {
    fn relay(&mut self, line: &ChatLine) -> io::Result<()>;
}

/// Writes rendered chat lines to any writer, one per line.
pub struct WriterSink<W> {
    out: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl WriterSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> RelaySink for WriterSink<W> {
    fn relay(&mut self, line: &ChatLine) -> io::Result<()> {
        writeln!(self.out, "{}", line.render(Local::now()))?;
        self.out.flush()
    }
}
