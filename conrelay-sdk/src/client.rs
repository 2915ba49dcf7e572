//! Console client: connection lifecycle, handshake and command execution.
//!
//! A single spawned task owns the socket, the [`Session`], the
//! [`CommandQueue`] and the [`Dispatcher`]. [`ClientHandle`]s talk to it over
//! an mpsc channel; replies come back over oneshot channels. Because only
//! that task reads and writes the socket, reads are never processed
//! concurrently and command writes never interleave.
//!
//! ## Reconnection
//!
//! When the connection drops and auto-reconnect is enabled, the task waits a
//! fixed [`SessionConfig::reconnect_delay`] (no backoff) and reconnects. The
//! wait happens inside the task's own loop, so at most one reconnect is ever
//! pending and at most one socket is ever open. A rejected password is fatal
//! and never retried.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep, sleep_until, timeout};

use crate::classify::ClassifiedError;
use crate::config::SessionConfig;
use crate::dispatch::{Dispatch, Dispatcher, Waiter};
use crate::error::{CommandError, ConfigError, SessionError};
use crate::event::Event;
use crate::handshake::{self, HandshakeStep};
use crate::queue::{CommandQueue, ReplySink, deadline_after};
use crate::session::{ConnectionState, Session};

const READ_BUF_SIZE: usize = 4096;
/// Placeholder timer length while idle without a reconnect pending.
const IDLE_TICK: Duration = Duration::from_secs(24 * 60 * 60);

/// Requests from handles to the client task.
#[derive(Debug)]
enum Request {
    Connect,
    Disconnect { done: oneshot::Sender<()> },
    Exec {
        text: String,
        timeout: Option<Duration>,
        reply: ReplySink,
    },
    Wait {
        waiter: Waiter,
        tx: oneshot::Sender<String>,
    },
}

/// A cloneable handle to a running console client.
///
/// Dropping every handle stops the client task and closes the socket.
#[derive(Clone)]
pub struct ClientHandle {
    req_tx: mpsc::Sender<Request>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ClientHandle {
    /// Open the connection. A no-op while a connection is being set up or
    /// is ready; re-enables auto-reconnect after [`disconnect`](Self::disconnect).
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.send(Request::Connect).await
    }

    /// Close the connection and disable auto-reconnect. Outstanding
    /// commands fail. Returns once the socket is closed.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let (done, rx) = oneshot::channel();
        self.send(Request::Disconnect { done }).await?;
        rx.await.map_err(|_| SessionError::ClientStopped)
    }

    /// Run a console command and return its reply text.
    ///
    /// Fails immediately with a `NotConnected` category when the session
    /// is not ready. Otherwise the command is queued behind earlier ones and
    /// its reply is the next line(s) the console sends after it is written.
    /// `timeout` defaults to [`SessionConfig::default_command_timeout`].
    pub async fn exec(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ClassifiedError> {
        let text = command.trim_end_matches(['\r', '\n']);
        if text.contains(['\r', '\n']) {
            return Err(CommandError::InvalidCommand(
                "command contains a line terminator".to_string(),
            )
            .into());
        }
        if text.is_empty() {
            return Err(CommandError::InvalidCommand("command is empty".to_string()).into());
        }
        if self.state() != ConnectionState::Ready {
            return Err(CommandError::NotConnected.into());
        }

        let (reply, rx) = oneshot::channel();
        let request = Request::Exec {
            text: text.to_string(),
            timeout,
            reply,
        };
        if self.req_tx.send(request).await.is_err() {
            return Err(CommandError::NotConnected.into());
        }
        match rx.await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(CommandError::ResponseNotReceived("client stopped".to_string()).into()),
        }
    }

    /// Register a one-shot waiter. The receiver yields the next matching
    /// line, or an error if a waiter of the same class replaces it.
    pub async fn wait_for(&self, waiter: Waiter) -> Result<oneshot::Receiver<String>, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Request::Wait { waiter, tx }).await?;
        Ok(rx)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Wait until the connection reaches `state`.
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<(), SessionError> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|s| *s == state)
            .await
            .map(|_| ())
            .map_err(|_| SessionError::ClientStopped)
    }

    async fn send(&self, request: Request) -> Result<(), SessionError> {
        self.req_tx
            .send(request)
            .await
            .map_err(|_| SessionError::ClientStopped)
    }
}

/// Start a client task in the `Disconnected` state.
///
/// Returns a handle and the event receiver. Nothing is opened until
/// [`ClientHandle::connect`] is called.
pub fn spawn(config: SessionConfig) -> Result<(ClientHandle, mpsc::Receiver<Event>), ConfigError> {
    config.validate()?;

    let (event_tx, event_rx) = mpsc::channel(4096);
    let (req_tx, req_rx) = mpsc::channel(256);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let client = Client {
        session: Session::new(&config, state_tx),
        queue: CommandQueue::new(config.min_command_interval, config.reply_settle),
        dispatcher: Dispatcher::new(),
        auto_reconnect: config.auto_reconnect,
        config,
        events: event_tx,
        requests: req_rx,
    };
    tokio::spawn(client.run());

    Ok((ClientHandle { req_tx, state_rx }, event_rx))
}

/// Validate `config`, start the client task and begin connecting.
pub async fn connect(
    config: SessionConfig,
) -> Result<(ClientHandle, mpsc::Receiver<Event>), SessionError> {
    let (handle, events) = spawn(config)?;
    handle.connect().await?;
    Ok((handle, events))
}

/// Why a connection ended.
#[derive(Debug)]
enum SessionEnd {
    /// Every handle was dropped.
    Stopped,
    /// A handle asked to disconnect.
    Disconnected(oneshot::Sender<()>),
    /// The console rejected the password.
    AuthFailed,
    /// The server announced shutdown.
    ServerShutdown,
    /// Transport failure or close.
    Lost(SessionError),
}

/// Outcome of waiting while no socket is open.
enum Wake {
    Connect,
    Disconnect(oneshot::Sender<()>),
    Stop,
}

struct Client {
    config: SessionConfig,
    session: Session,
    queue: CommandQueue,
    dispatcher: Dispatcher,
    events: mpsc::Sender<Event>,
    requests: mpsc::Receiver<Request>,
    auto_reconnect: bool,
}

impl Client {
    async fn run(mut self) {
        tracing::debug!(addr = %self.session.addr(), "Console client started");
        'idle: loop {
            match self.wait_offline(None).await {
                Wake::Connect => self.auto_reconnect = self.config.auto_reconnect,
                Wake::Disconnect(done) => {
                    let _ = done.send(());
                    continue 'idle;
                }
                Wake::Stop => break 'idle,
            }

            let mut attempt: u32 = 0;
            loop {
                let end = self.run_connection().await;
                if self.session.state() == ConnectionState::Ready {
                    attempt = 0;
                }
                if !self.finish_connection(end).await {
                    break 'idle;
                }
                if !self.auto_reconnect || self.session.state() != ConnectionState::Failed {
                    continue 'idle;
                }

                attempt += 1;
                let delay = self.config.reconnect_delay;
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting after delay");
                self.emit(Event::ReconnectScheduled { delay }).await;
                match self.wait_offline(Some(delay)).await {
                    Wake::Connect => {}
                    Wake::Disconnect(done) => {
                        self.auto_reconnect = false;
                        self.session.transition(ConnectionState::Disconnected);
                        self.emit(Event::Closed {
                            reason: "disconnected by client".to_string(),
                        })
                        .await;
                        let _ = done.send(());
                        continue 'idle;
                    }
                    Wake::Stop => break 'idle,
                }
            }
        }
        self.session.transition(ConnectionState::Disconnected);
        tracing::debug!("Console client stopped");
    }

    /// Serve requests while no socket is open. With `delay`, returns
    /// [`Wake::Connect`] once it elapses.
    async fn wait_offline(&mut self, delay: Option<Duration>) -> Wake {
        let timer = sleep(delay.unwrap_or(IDLE_TICK));
        tokio::pin!(timer);
        loop {
            tokio::select! {
                _ = &mut timer, if delay.is_some() => return Wake::Connect,
                req = self.requests.recv() => match req {
                    None => return Wake::Stop,
                    Some(Request::Connect) => return Wake::Connect,
                    Some(Request::Disconnect { done }) => return Wake::Disconnect(done),
                    Some(other) => self.serve_not_ready(other),
                },
            }
        }
    }

    /// Answer a request that needs no open socket.
    fn serve_not_ready(&mut self, request: Request) {
        match request {
            Request::Exec { reply, .. } => {
                let _ = reply.send(Err(CommandError::NotConnected));
            }
            Request::Wait { waiter, tx } => self.dispatcher.register(waiter, tx),
            Request::Connect => {
                tracing::debug!(state = %self.session.state(), "Connect requested while active; ignoring");
            }
            Request::Disconnect { .. } => {
                // Disconnect is always intercepted by the caller.
                tracing::warn!("Unexpected disconnect request routing");
            }
        }
    }

    async fn emit(&self, event: Event) {
        if self.events.send(event).await.is_err() {
            tracing::trace!("Event receiver dropped");
        }
    }

    /// Open the socket, run the session, and return why it ended.
    async fn run_connection(&mut self) -> SessionEnd {
        self.session.reset_stream();
        self.session.transition(ConnectionState::Connecting);

        let addr = self.session.addr();
        tracing::info!(%addr, "Connecting to console");

        let connect_timeout = self.config.connect_timeout;
        let connect = timeout(connect_timeout, TcpStream::connect(addr.clone()));
        tokio::pin!(connect);
        let stream = loop {
            tokio::select! {
                res = &mut connect => match res {
                    Ok(Ok(stream)) => break stream,
                    Ok(Err(source)) => return SessionEnd::Lost(SessionError::Connect { addr, source }),
                    Err(_) => return SessionEnd::Lost(SessionError::ConnectTimeout { addr, timeout: connect_timeout }),
                },
                req = self.requests.recv() => match req {
                    None => return SessionEnd::Stopped,
                    Some(Request::Disconnect { done }) => return SessionEnd::Disconnected(done),
                    Some(other) => self.serve_not_ready(other),
                },
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        tracing::debug!(%addr, "TCP connected; awaiting password prompt");
        self.emit(Event::Connected).await;

        let (reader, mut writer) = stream.into_split();
        let end = self.drive(reader, &mut writer).await;
        if let Err(e) = writer.shutdown().await {
            tracing::trace!(error = %e, "Socket shutdown failed");
        }
        end
    }

    /// Main loop for an open socket.
    async fn drive(&mut self, mut reader: OwnedReadHalf, writer: &mut OwnedWriteHalf) -> SessionEnd {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        let handshake_deadline = deadline_after(Instant::now(), self.config.connect_timeout);

        loop {
            if let Some(end) = self.pump(writer).await {
                return end;
            }

            let ready = self.session.state() == ConnectionState::Ready;
            let wakeup = self.queue.next_wakeup();

            tokio::select! {
                res = reader.read(&mut buf) => match res {
                    Ok(0) => return SessionEnd::Lost(SessionError::Closed),
                    Ok(n) => {
                        if let Some(end) = self.on_bytes(&buf[..n], writer).await {
                            return end;
                        }
                    }
                    Err(e) => return SessionEnd::Lost(SessionError::Io(e)),
                },
                req = self.requests.recv() => match req {
                    None => return SessionEnd::Stopped,
                    Some(Request::Disconnect { done }) => return SessionEnd::Disconnected(done),
                    Some(Request::Exec { text, timeout, reply }) if ready => {
                        let timeout = timeout.unwrap_or(self.config.default_command_timeout);
                        let id = self.queue.enqueue(text, timeout, reply, Instant::now());
                        tracing::debug!(id, queued = self.queue.queued(), "Command queued");
                    }
                    Some(other) => self.serve_not_ready(other),
                },
                _ = sleep_until(handshake_deadline), if !ready => {
                    return SessionEnd::Lost(SessionError::HandshakeTimeout(self.config.connect_timeout));
                }
                _ = sleep_until(wakeup.unwrap_or(handshake_deadline)), if wakeup.is_some() => {
                    self.queue.poll(Instant::now());
                }
            }
        }
    }

    /// Resolve settled commands and write the next one if the throttle
    /// allows.
    async fn pump(&mut self, writer: &mut OwnedWriteHalf) -> Option<SessionEnd> {
        let now = Instant::now();
        self.queue.poll(now);
        if self.session.state() != ConnectionState::Ready {
            return None;
        }
        let (id, text) = self.queue.next_dispatch(now)?;
        tracing::debug!(id, command = %text, "Writing command");
        if let Err(e) = writer.write_all(format!("{text}\n").as_bytes()).await {
            tracing::warn!(id, error = %e, "Command write failed");
            self.queue
                .fail_in_flight(CommandError::SocketNotWritable(e.to_string()));
            return Some(SessionEnd::Lost(SessionError::Io(e)));
        }
        None
    }

    /// Frame, filter and route one socket read.
    async fn on_bytes(&mut self, chunk: &[u8], writer: &mut OwnedWriteHalf) -> Option<SessionEnd> {
        let now = Instant::now();
        for line in self.session.framer.feed(chunk) {
            let ready = self.session.state() == ConnectionState::Ready;
            if ready {
                // Replies are attributed before de-duplication so a reply
                // identical to the previous line still resolves its command.
                self.queue.on_line(&line, now);
            }
            if !self.session.dedup.admit(&line) {
                tracing::trace!(%line, "Suppressed repeated line");
                continue;
            }

            if !ready {
                let step = self.session.handshake.on_line(&line);
                if let Some(end) = self.on_handshake(step, &line, writer).await {
                    return Some(end);
                }
                continue;
            }

            match self.dispatcher.dispatch(line) {
                Dispatch::Shutdown => {
                    tracing::info!("Server announced shutdown; closing connection");
                    self.emit(Event::ServerShutdown).await;
                    return Some(SessionEnd::ServerShutdown);
                }
                Dispatch::Claimed { class } => tracing::trace!(%class, "Line claimed by waiter"),
                Dispatch::Forward(line) => self.emit(Event::Line(line)).await,
            }
        }

        // Prompts are often sent without a terminator.
        if self.session.state() != ConnectionState::Ready && self.session.framer.pending() > 0 {
            let partial = self.session.framer.partial().trim_end().to_string();
            if handshake::is_password_prompt(&partial) || partial == handshake::PASSWORD_INCORRECT {
                self.session.framer.reset();
                let step = self.session.handshake.on_line(&partial);
                return self.on_handshake(step, &partial, writer).await;
            }
        }
        None
    }

    async fn on_handshake(
        &mut self,
        step: HandshakeStep,
        line: &str,
        writer: &mut OwnedWriteHalf,
    ) -> Option<SessionEnd> {
        match step {
            HandshakeStep::SendPassword => {
                let payload = format!("{}\n", self.session.password());
                if let Err(e) = writer.write_all(payload.as_bytes()).await {
                    return Some(SessionEnd::Lost(SessionError::Io(e)));
                }
                self.session.transition(ConnectionState::Authenticating);
                tracing::debug!("Password sent");
            }
            HandshakeStep::Authenticated => {
                if self.session.state() == ConnectionState::Connecting {
                    // Login confirmed without a prompt (console without a
                    // password prompt); walk the edges in order.
                    self.session.transition(ConnectionState::Authenticating);
                }
                self.session.transition(ConnectionState::Ready);
                tracing::info!(addr = %self.session.addr(), "Console session ready");
                self.emit(Event::Ready).await;
            }
            HandshakeStep::Rejected => return Some(SessionEnd::AuthFailed),
            HandshakeStep::Ignore => tracing::trace!(%line, "Pre-login line"),
        }
        None
    }

    /// Apply the state changes for a finished connection. Returns `false`
    /// when the task should stop.
    async fn finish_connection(&mut self, end: SessionEnd) -> bool {
        let reason = match &end {
            SessionEnd::Stopped => "client stopped".to_string(),
            SessionEnd::Disconnected(_) => "disconnected by client".to_string(),
            SessionEnd::AuthFailed => SessionError::AuthenticationFailed.to_string(),
            SessionEnd::ServerShutdown => "server shutdown".to_string(),
            SessionEnd::Lost(e) => e.to_string(),
        };
        self.queue
            .fail_all(CommandError::ResponseNotReceived(reason.clone()));

        match end {
            SessionEnd::Stopped => return false,
            SessionEnd::Disconnected(done) => {
                tracing::info!("Console connection closed by client");
                self.auto_reconnect = false;
                self.session.transition(ConnectionState::Disconnected);
                self.emit(Event::Closed { reason }).await;
                let _ = done.send(());
            }
            SessionEnd::AuthFailed => {
                tracing::error!(addr = %self.session.addr(), "Console rejected the password; not retrying");
                self.auto_reconnect = false;
                self.session.transition(ConnectionState::Failed);
                self.emit(Event::AuthFailed).await;
                self.emit(Event::Closed { reason }).await;
            }
            SessionEnd::ServerShutdown => {
                self.mark_lost(false);
                self.emit(Event::Closed { reason }).await;
            }
            SessionEnd::Lost(err) => {
                let is_error = !matches!(err, SessionError::Closed);
                if is_error {
                    tracing::warn!(error = %err, "Console connection failed");
                    self.emit(Event::Error { message: reason.clone() }).await;
                } else {
                    tracing::info!("Console connection closed by server");
                }
                self.mark_lost(is_error);
                self.emit(Event::Closed { reason }).await;
            }
        }
        true
    }

    /// Errors always land in `Failed`; a clean close only does when a
    /// reconnect will follow.
    fn mark_lost(&mut self, is_error: bool) {
        let next = if is_error || self.auto_reconnect {
            ConnectionState::Failed
        } else {
            ConnectionState::Disconnected
        };
        self.session.transition(next);
    }
}
