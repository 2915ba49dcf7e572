//! Serialization of commands onto the single console connection.
//!
//! The console is call-and-response over one pipe with no request ids, so
//! the only way to attribute a reply is to keep one command in flight at a
//! time. [`CommandQueue`] holds that invariant and the throttle; the client
//! task owns the socket and asks the queue what to write and when to wake.
//!
//! All methods take the current instant explicitly so timing is decided by
//! the caller.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::CommandError;

/// Stand-in for "never": roughly thirty years out.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + d`, saturating to a far-future instant instead of overflowing.
pub(crate) fn deadline_after(now: Instant, d: Duration) -> Instant {
    now.checked_add(d)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Where a command's outcome is delivered. Resolved exactly once.
pub type ReplySink = oneshot::Sender<Result<String, CommandError>>;

#[derive(Debug)]
pub struct PendingCommand {
    pub id: u64,
    pub text: String,
    pub enqueued_at: Instant,
    pub timeout: Duration,
    sink: ReplySink,
}

impl PendingCommand {
    fn resolve(self, result: Result<String, CommandError>) {
        let ok = result.is_ok();
        if self.sink.send(result).is_err() {
            tracing::debug!(id = self.id, ok, "Command caller went away before resolution");
        }
    }
}

#[derive(Debug)]
struct InFlight {
    cmd: PendingCommand,
    deadline: Instant,
    reply: Vec<String>,
    settle_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CommandQueue {
    pending: VecDeque<PendingCommand>,
    in_flight: Option<InFlight>,
    last_dispatched: Option<Instant>,
    next_id: u64,
    min_interval: Duration,
    reply_settle: Duration,
}

impl CommandQueue {
    pub fn new(min_interval: Duration, reply_settle: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: None,
            last_dispatched: None,
            next_id: 1,
            min_interval,
            reply_settle,
        }
    }

    /// Append a command to the FIFO. Returns its id.
    pub fn enqueue(&mut self, text: String, timeout: Duration, sink: ReplySink, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push_back(PendingCommand {
            id,
            text,
            enqueued_at: now,
            timeout,
            sink,
        });
        id
    }

    /// Commands waiting to be written, excluding the one in flight.
    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_empty()
    }

    pub fn in_flight_id(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|f| f.cmd.id)
    }

    /// Take the next command to write, if nothing is in flight and the
    /// throttle allows it. The returned command is now in flight.
    pub fn next_dispatch(&mut self, now: Instant) -> Option<(u64, String)> {
        if self.in_flight.is_some() {
            return None;
        }
        if let Some(last) = self.last_dispatched
            && now < deadline_after(last, self.min_interval)
        {
            return None;
        }

        let cmd = loop {
            let cmd = self.pending.pop_front()?;
            if cmd.sink.is_closed() {
                tracing::debug!(id = cmd.id, "Dropping command abandoned by its caller");
                continue;
            }
            break cmd;
        };

        tracing::trace!(
            id = cmd.id,
            queued_ms = now.saturating_duration_since(cmd.enqueued_at).as_millis() as u64,
            "Command leaving queue"
        );
        self.last_dispatched = Some(now);
        let out = (cmd.id, cmd.text.clone());
        self.in_flight = Some(InFlight {
            deadline: deadline_after(now, cmd.timeout),
            cmd,
            reply: Vec::new(),
            settle_at: None,
        });
        Some(out)
    }

    /// Attribute a received line to the in-flight command, if any.
    pub fn on_line(&mut self, line: &str, now: Instant) {
        if let Some(flight) = self.in_flight.as_mut() {
            flight.reply.push(line.to_string());
            flight.settle_at = Some(deadline_after(now, self.reply_settle));
        }
    }

    /// Resolve the in-flight command if its reply has settled or its
    /// deadline has passed.
    pub fn poll(&mut self, now: Instant) {
        let Some(flight) = self.in_flight.as_ref() else {
            return;
        };
        let settled = flight.settle_at.is_some_and(|at| now >= at);
        if !settled && now < flight.deadline {
            return;
        }

        let Some(flight) = self.in_flight.take() else {
            return;
        };
        if flight.reply.is_empty() {
            tracing::debug!(id = flight.cmd.id, command = %flight.cmd.text, "Command timed out");
            let timeout = flight.cmd.timeout;
            flight.cmd.resolve(Err(CommandError::Timeout(timeout)));
        } else {
            tracing::debug!(id = flight.cmd.id, lines = flight.reply.len(), "Command reply received");
            let reply = flight.reply.join("\n");
            flight.cmd.resolve(Ok(reply));
        }
    }

    /// When the client task should next call [`poll`](Self::poll) or
    /// [`next_dispatch`](Self::next_dispatch).
    pub fn next_wakeup(&self) -> Option<Instant> {
        if let Some(flight) = &self.in_flight {
            return Some(match flight.settle_at {
                Some(at) => at.min(flight.deadline),
                None => flight.deadline,
            });
        }
        if self.pending.is_empty() {
            return None;
        }
        self.last_dispatched
            .map(|last| deadline_after(last, self.min_interval))
    }

    /// Fail the in-flight command only (write error).
    pub fn fail_in_flight(&mut self, err: CommandError) {
        if let Some(flight) = self.in_flight.take() {
            flight.cmd.resolve(Err(err));
        }
    }

    /// Fail everything: the in-flight command with `in_flight_err`, queued
    /// commands with `NotConnected`. Resets the throttle for the next
    /// connection.
    pub fn fail_all(&mut self, in_flight_err: CommandError) {
        self.fail_in_flight(in_flight_err);
        for cmd in self.pending.drain(..) {
            cmd.resolve(Err(CommandError::NotConnected));
        }
        self.last_dispatched = None;
    }
}
