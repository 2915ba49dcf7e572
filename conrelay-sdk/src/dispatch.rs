//! Fan-out of authenticated console lines.
//!
//! Every de-duplicated line is checked, in order, against the server
//! shutdown marker, then against the registered one-shot waiters, and is
//! otherwise forwarded to the general line stream.

use std::fmt;

use tokio::sync::oneshot;

/// Whether `line` is the server shutdown notice:
/// `<date>T<time> <tick> INF [NET] ServerShutdown ...`.
///
/// Tokens are split on whitespace; tokens 2, 3 and 4 must be exactly `INF`,
/// `[NET]` and `ServerShutdown`.
pub fn is_shutdown_marker(line: &str) -> bool {
    let mut tokens = line.split_whitespace().skip(2);
    tokens.next() == Some("INF")
        && tokens.next() == Some("[NET]")
        && tokens.next() == Some("ServerShutdown")
}

type LinePredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// A one-shot claim on the next line matching a predicate.
///
/// Waiters are keyed by class; at most one waiter per class is active.
pub struct Waiter {
    class: String,
    predicate: LinePredicate,
}

impl Waiter {
    pub fn new(
        class: impl Into<String>,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            class: class.into(),
            predicate: Box::new(predicate),
        }
    }

    /// Reply to `gettime`: `Day 12, 08:41`.
    pub fn time() -> Self {
        Self::new("time", |line| line.starts_with("Day "))
    }

    /// Reply to `version`: a line carrying `Game version:`.
    pub fn version() -> Self {
        Self::new("version", |line| line.contains("Game version:"))
    }

    /// Summary line closing a `listplayers` reply: `Total of 3 in the game`.
    pub fn players() -> Self {
        Self::new("players", |line| line.starts_with("Total of "))
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn matches(&self, line: &str) -> bool {
        (self.predicate)(line)
    }
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter").field("class", &self.class).finish_non_exhaustive()
    }
}

/// Outcome of dispatching one line.
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Shutdown marker; the caller tears the connection down.
    Shutdown,
    /// Delivered to a waiter.
    Claimed { class: String },
    /// Forward to the general line stream.
    Forward(String),
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    waiters: Vec<(Waiter, oneshot::Sender<String>)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `waiter`. An existing waiter of the same class is dropped,
    /// so its receiver observes cancellation.
    pub fn register(&mut self, waiter: Waiter, tx: oneshot::Sender<String>) {
        if let Some(pos) = self.waiters.iter().position(|(w, _)| w.class == waiter.class) {
            tracing::debug!(class = %waiter.class, "Replacing pending waiter");
            self.waiters.remove(pos);
        }
        self.waiters.push((waiter, tx));
    }

    pub fn pending(&self) -> usize {
        self.waiters.len()
    }

    pub fn dispatch(&mut self, line: String) -> Dispatch {
        if is_shutdown_marker(&line) {
            return Dispatch::Shutdown;
        }

        // Drop waiters whose caller has gone away.
        self.waiters.retain(|(_, tx)| !tx.is_closed());

        let Some(pos) = self.waiters.iter().position(|(w, _)| w.matches(&line)) else {
            return Dispatch::Forward(line);
        };
        let (waiter, tx) = self.waiters.remove(pos);
        match tx.send(line) {
            Ok(()) => Dispatch::Claimed { class: waiter.class },
            Err(line) => Dispatch::Forward(line),
        }
    }
}
