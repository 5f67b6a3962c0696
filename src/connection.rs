//! WebSocket connection manager for the alert stream
//!
//! Owns a single streaming connection and its reconnection policy. The actor
//! runs as an independent task controlled through a command channel; parsed
//! frames are forwarded to the single message sink returned by [`ConnectionHandle::spawn`].
//!
//! ## Message Flow
//!
//! ```text
//! socket frame → parse envelope → message sink → [AlertStore, ...]
//!     ↑
//!     └─── Commands (Connect, Disconnect, Send)
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};

use crate::StreamMessage;

/// Default stream endpoint when none is configured.
pub const DEFAULT_STREAM_URL: &str = "ws://localhost:8080";

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Lifecycle of the managed connection.
///
/// Owned exclusively by the actor; consumers read it through a watch channel.
/// `Terminated` is absorbing for automatic transitions, only an explicit
/// `connect()` leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Terminated,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Configuration for a single stream connection.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Stream endpoint (`ws://` or `wss://`).
    pub url: String,

    /// Base reconnect delay; doubled on every failed cycle.
    pub base_delay: Duration,

    /// Failed/closed cycles tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            base_delay: DEFAULT_BASE_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Exponential backoff policy: `base * 2^attempt`, capped at `max_attempts`.
///
/// A successful connection resets the counter, so a long-lived connection that
/// later drops starts over from the base delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts,
            attempts: 0,
        }
    }

    /// Delay before the next reconnect attempt, or `None` once the attempt
    /// budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }

        // Exponent is bounded by max_attempts, clamp anyway to avoid overflow
        // on pathological configs.
        let factor = 2u32.saturating_pow(self.attempts.min(20));
        self.attempts += 1;
        Some(self.base.saturating_mul(factor))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

enum ConnectionCommand {
    Connect { url: Option<String> },
    Disconnect,
    Send { payload: serde_json::Value },
}

/// Handle for controlling a connection actor.
///
/// Cloneable; all clones talk to the same actor and therefore the same single
/// underlying connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    sender: mpsc::Sender<ConnectionCommand>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Spawn a connection actor and return its handle together with the
    /// message sink. Exactly one receiver gets every well-formed frame, in
    /// transport delivery order.
    pub fn spawn(config: StreamConfig) -> (Self, mpsc::UnboundedReceiver<StreamMessage>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let actor = ConnectionActor::new(config, cmd_rx, msg_tx, state_tx);
        tokio::spawn(actor.run());

        (
            Self {
                sender: cmd_tx,
                state_rx,
            },
            msg_rx,
        )
    }

    /// Connect to the configured endpoint. No-op while already connecting or
    /// connected; from `Terminated` this is the explicit caller-driven
    /// restart.
    pub async fn connect(&self) -> Result<()> {
        self.sender
            .send(ConnectionCommand::Connect { url: None })
            .await
            .context("failed to send Connect command")
    }

    /// Connect to an explicit endpoint instead of the configured one.
    pub async fn connect_to(&self, url: impl Into<String>) -> Result<()> {
        self.sender
            .send(ConnectionCommand::Connect {
                url: Some(url.into()),
            })
            .await
            .context("failed to send Connect command")
    }

    /// Close the connection and suppress any pending or future automatic
    /// reconnection.
    pub async fn disconnect(&self) -> Result<()> {
        self.sender
            .send(ConnectionCommand::Disconnect)
            .await
            .context("failed to send Disconnect command")
    }

    /// Serialize and transmit a payload. Only transmits while connected;
    /// otherwise the payload is dropped with a warning.
    pub async fn send<T: serde::Serialize>(&self, payload: &T) -> Result<()> {
        let payload = serde_json::to_value(payload).context("failed to serialize payload")?;
        self.sender
            .send(ConnectionCommand::Send { payload })
            .await
            .context("failed to send Send command")
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch channel for observing state transitions.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

struct ConnectionActor {
    command_rx: mpsc::Receiver<ConnectionCommand>,
    message_tx: mpsc::UnboundedSender<StreamMessage>,
    state_tx: watch::Sender<ConnectionState>,
    backoff: Backoff,
    pending_delay: Duration,
    url: String,
}

impl ConnectionActor {
    fn new(
        config: StreamConfig,
        command_rx: mpsc::Receiver<ConnectionCommand>,
        message_tx: mpsc::UnboundedSender<StreamMessage>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let backoff = Backoff::new(config.base_delay, config.max_attempts);

        Self {
            command_rx,
            message_tx,
            state_tx,
            backoff,
            pending_delay: Duration::ZERO,
            url: config.url,
        }
    }

    async fn run(mut self) {
        loop {
            let state = *self.state_tx.borrow();
            match state {
                ConnectionState::Disconnected | ConnectionState::Terminated => {
                    match self.command_rx.recv().await {
                        Some(ConnectionCommand::Connect { url }) => {
                            if let Some(url) = url {
                                self.url = url;
                            }
                            self.backoff.reset();
                            self.set_state(ConnectionState::Connecting);
                        }
                        Some(ConnectionCommand::Disconnect) => {
                            self.set_state(ConnectionState::Terminated);
                        }
                        Some(ConnectionCommand::Send { .. }) => {
                            warn!("cannot send, not connected");
                        }
                        None => break,
                    }
                }

                ConnectionState::Connecting => {
                    info!("connecting to {}", self.url);
                    match connect_async(self.url.as_str()).await {
                        Ok((socket, _)) => {
                            self.backoff.reset();
                            self.set_state(ConnectionState::Connected);
                            self.drive(socket).await;
                        }
                        Err(e) => {
                            warn!("connection attempt failed: {e}");
                            self.on_connection_lost();
                        }
                    }
                }

                ConnectionState::Connected => {
                    // Only reachable if drive() returned without a transition,
                    // which it never does.
                    unreachable!("connected state is driven by the socket loop");
                }

                ConnectionState::Reconnecting => {
                    if !self.await_reconnect_timer().await {
                        break;
                    }
                }
            }
        }

        debug!("connection actor stopped");
    }

    /// Wait out the backoff delay, still reacting to commands so that a
    /// `disconnect()` deterministically cancels the scheduled attempt.
    /// Returns false when the command channel closed.
    async fn await_reconnect_timer(&mut self) -> bool {
        debug!(
            "reconnecting in {:?} (attempt {})",
            self.pending_delay,
            self.backoff.attempts()
        );

        let timer = tokio::time::sleep(self.pending_delay);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = &mut timer => {
                    self.set_state(ConnectionState::Connecting);
                    return true;
                }

                cmd = self.command_rx.recv() => match cmd {
                    Some(ConnectionCommand::Disconnect) => {
                        self.set_state(ConnectionState::Terminated);
                        return true;
                    }
                    Some(ConnectionCommand::Connect { url }) => {
                        // Explicit connect skips the remaining wait.
                        if let Some(url) = url {
                            self.url = url;
                        }
                        self.set_state(ConnectionState::Connecting);
                        return true;
                    }
                    Some(ConnectionCommand::Send { .. }) => {
                        warn!("cannot send, not connected");
                    }
                    None => return false,
                }
            }
        }
    }

    /// Drive an established connection until it closes, errors, or the caller
    /// disconnects. Always leaves the state machine in a follow-up state.
    async fn drive(&mut self, socket: WebSocketStream<MaybeTlsStream<TcpStream>>) {
        info!("stream connected");
        let (mut write, mut read) = socket.split();

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Close(_))) => {
                        info!("stream closed by server");
                        self.on_connection_lost();
                        return;
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong/Binary frames carry no envelopes.
                    }
                    Some(Err(e)) => {
                        warn!("stream error: {e}");
                        self.on_connection_lost();
                        return;
                    }
                    None => {
                        info!("stream ended");
                        self.on_connection_lost();
                        return;
                    }
                },

                cmd = self.command_rx.recv() => match cmd {
                    Some(ConnectionCommand::Connect { .. }) => {
                        debug!("already connected");
                    }
                    Some(ConnectionCommand::Disconnect) => {
                        let _ = write.send(Message::Close(None)).await;
                        self.set_state(ConnectionState::Terminated);
                        return;
                    }
                    Some(ConnectionCommand::Send { payload }) => {
                        match serde_json::to_string(&payload) {
                            Ok(text) => {
                                if let Err(e) = write.send(Message::Text(text)).await {
                                    warn!("failed to send payload: {e}");
                                    self.on_connection_lost();
                                    return;
                                }
                            }
                            Err(e) => warn!("failed to serialize payload: {e}"),
                        }
                    }
                    None => {
                        self.set_state(ConnectionState::Terminated);
                        return;
                    }
                }
            }
        }
    }

    /// Parse an inbound frame and forward it. Malformed payloads are logged
    /// and dropped; they never reach the sink and never tear down the
    /// connection.
    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<StreamMessage>(text) {
            Ok(message) => {
                if self.message_tx.send(message).is_err() {
                    trace!("message sink dropped, discarding frame");
                }
            }
            Err(e) => warn!("dropping malformed frame: {e}"),
        }
    }

    fn on_connection_lost(&mut self) {
        if *self.state_tx.borrow() == ConnectionState::Terminated {
            return;
        }

        match self.backoff.next_delay() {
            Some(delay) => {
                self.pending_delay = delay;
                self.set_state(ConnectionState::Reconnecting);
            }
            None => {
                error!(
                    "giving up after {} reconnect attempts",
                    self.backoff.attempts()
                );
                self.set_state(ConnectionState::Terminated);
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        trace!("connection state -> {state}");
        self.state_tx.send_replace(state);
    }
}
