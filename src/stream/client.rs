//! Low-level stream websocket client and outbound message sender.
//!
//! The client owns one background worker per connection. The worker opens the
//! socket, forwards inbound frames as [`ConnectionEvent`]s on a single ordered
//! channel, and reopens a brand new socket after every close, forever.

use std::fmt;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::reconnect::{wait_before_attempt, ReconnectPolicy};
use crate::stream::proto::{ClientMessage, ServerMessage};

/// Host used when none is configured.
pub const DEFAULT_HOST: &str = "localhost:8000";

const SESSION_ID_DIGITS: usize = 8;
const HOSTED_SHELL_MARKERS: [&str; 2] = ["cloudshell", "devshell"];

/// Opaque client-generated session identifier embedded in the stream URL.
///
/// Never validated; the server treats it as a user id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random numeric session id.
    pub fn random() -> Self {
        let mut rng = rand::rng();
        let digits: String = (0..SESSION_ID_DIGITS)
            .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
            .collect();
        Self(digits)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entry point for creating stream connections.
#[derive(Clone, Debug)]
pub struct StreamClient {
    host: String,
    secure: bool,
    session_id: SessionId,
    endpoint_override: Option<String>,
    reconnect: ReconnectPolicy,
}

impl StreamClient {
    /// Creates a client for `host` (`name[:port]`) with a fresh random session.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into().trim().to_string(),
            secure: false,
            session_id: SessionId::random(),
            endpoint_override: None,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Uses `wss://` instead of `ws://`.
    ///
    /// Hosted shell environments are always treated as secure.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Replaces the generated session id.
    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    /// Sets an explicit stream endpoint override.
    ///
    /// The override is used verbatim and takes precedence over host, scheme,
    /// and session id.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.endpoint_override = Some(endpoint.trim_end().to_string());
        self
    }

    /// Sets the delay between a close and the next connection attempt.
    pub fn with_reconnect_policy(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn reconnect_policy(&self) -> &ReconnectPolicy {
        &self.reconnect
    }

    /// Full websocket URL, `<ws|wss>://<host>/ws/<session_id>?is_audio=false`.
    pub fn endpoint(&self) -> String {
        if let Some(endpoint) = self.endpoint_override.as_deref() {
            return endpoint.to_string();
        }
        let scheme = if self.secure || is_hosted_shell(&self.host) {
            "wss"
        } else {
            "ws"
        };
        format!(
            "{scheme}://{}/ws/{}?is_audio=false",
            self.host, self.session_id
        )
    }

    /// Starts a connection worker.
    ///
    /// Returns immediately in the `Connecting` state; progress is reported
    /// through [`StreamConnection::recv`]. Must be called inside a tokio
    /// runtime.
    pub fn connect(&self) -> StreamConnection {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let url = self.endpoint();
        let policy = self.reconnect;
        info!(event = "stream_client_start", url = %url);

        tokio::spawn(async move {
            stream_connection_worker(url, policy, outbound_rx, events_tx, state_tx, shutdown_rx)
                .await;
        });

        StreamConnection {
            sender: StreamSender {
                tx: outbound_tx,
                state: state_rx,
            },
            events: events_rx,
            shutdown: Some(shutdown_tx),
        }
    }
}

fn is_hosted_shell(host: &str) -> bool {
    let name = host.split(':').next().unwrap_or(host);
    HOSTED_SHELL_MARKERS
        .iter()
        .any(|marker| name.contains(marker))
}

/// Transport lifecycle state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Socket open; sends are accepted.
    Open,
    /// Socket closed; a reconnect is scheduled.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Events produced by the connection worker, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake completed; sends are accepted.
    Opened,
    /// Decoded inbound message.
    Message(ServerMessage),
    /// Transport-level failure. Always followed by [`ConnectionEvent::Closed`].
    Error(String),
    /// Socket is gone. The next attempt starts after `retry_in`.
    Closed { retry_in: Duration },
}

/// Active stream connection.
#[derive(Debug)]
pub struct StreamConnection {
    sender: StreamSender,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StreamConnection {
    /// Returns a cloneable sender for outbound messages.
    pub fn sender(&self) -> StreamSender {
        self.sender.clone()
    }

    /// Current transport state.
    pub fn state(&self) -> ConnectionState {
        self.sender.state()
    }

    /// Receives the next worker event.
    ///
    /// Returns `None` once the worker has stopped.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.events.recv().await
    }

    /// Stops the worker.
    ///
    /// An open socket is closed, a pending reconnect is abandoned. Calling it
    /// twice is a no-op.
    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Cloneable sender for outbound messages.
#[derive(Clone, Debug)]
pub struct StreamSender {
    tx: mpsc::UnboundedSender<ClientMessage>,
    state: watch::Receiver<ConnectionState>,
}

impl StreamSender {
    /// Hands a message to the worker.
    ///
    /// Fails without touching the socket unless the connection is open.
    /// Rejected messages are not queued.
    pub fn send(&self, message: ClientMessage) -> Result<(), StreamClientError> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(StreamClientError::NotConnected(state));
        }
        self.tx
            .send(message)
            .map_err(|_| StreamClientError::SendQueueClosed)
    }

    /// Sends a `text/plain` message.
    pub fn send_text(&self, data: impl Into<String>) -> Result<(), StreamClientError> {
        self.send(ClientMessage::text(data))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

/// Errors produced by stream transport and protocol handling.
#[derive(Debug, Error)]
pub enum StreamClientError {
    /// Websocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A send was attempted while the connection was not open.
    #[error("not connected to server (connection is {0})")]
    NotConnected(ConnectionState),

    /// The connection worker has stopped.
    #[error("send queue is closed")]
    SendQueueClosed,
}

enum SessionOutcome {
    Shutdown,
    Reconnect,
}

async fn stream_connection_worker(
    url: String,
    policy: ReconnectPolicy,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientMessage>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    state_tx: watch::Sender<ConnectionState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut attempt: u64 = 0;

    loop {
        state_tx.send_replace(ConnectionState::Connecting);
        debug!(event = "stream_connecting", url = %url, attempt);

        let outcome = run_connected_session(
            &url,
            &mut outbound_rx,
            &events_tx,
            &state_tx,
            &mut shutdown_rx,
        )
        .await;

        state_tx.send_replace(ConnectionState::Closed);
        if let SessionOutcome::Shutdown = outcome {
            info!(event = "stream_client_stopped", url = %url);
            break;
        }

        attempt += 1;
        let retry_in = policy.delay_for_attempt(attempt);
        info!(
            event = "stream_closed",
            attempt,
            retry_in_ms = retry_in.as_millis() as u64
        );
        let _ = events_tx.send(ConnectionEvent::Closed { retry_in });

        if !discard_messages_during_delay(&policy, attempt, &mut outbound_rx, &mut shutdown_rx)
            .await
        {
            info!(event = "stream_client_stopped", url = %url);
            break;
        }
    }
}

async fn run_connected_session(
    url: &str,
    outbound_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    events_tx: &mpsc::UnboundedSender<ConnectionEvent>,
    state_tx: &watch::Sender<ConnectionState>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> SessionOutcome {
    let handshake = tokio::select! {
        result = connect_async(url) => result,
        _ = &mut *shutdown_rx => return SessionOutcome::Shutdown,
    };
    let mut socket = match handshake {
        Ok((socket, _)) => socket,
        Err(err) => {
            warn!(event = "stream_connect_failed", url = %url, error = %err);
            let _ = events_tx.send(ConnectionEvent::Error(err.to_string()));
            return SessionOutcome::Reconnect;
        }
    };

    drop_stale_messages(outbound_rx);
    state_tx.send_replace(ConnectionState::Open);
    info!(event = "stream_opened", url = %url);
    let _ = events_tx.send(ConnectionEvent::Opened);

    loop {
        tokio::select! {
            _ = &mut *shutdown_rx => {
                let _ = socket.close(None).await;
                return SessionOutcome::Shutdown;
            }
            maybe_outbound = outbound_rx.recv() => {
                let Some(client_msg) = maybe_outbound else {
                    let _ = socket.close(None).await;
                    return SessionOutcome::Shutdown;
                };
                if let Err(err) = send_client_message(&mut socket, &client_msg).await {
                    warn!(event = "stream_send_failed", error = %err);
                    let _ = events_tx.send(ConnectionEvent::Error(err.to_string()));
                    return SessionOutcome::Reconnect;
                }
            }
            maybe_inbound = socket.next() => {
                match maybe_inbound {
                    Some(Ok(Message::Text(text))) => {
                        match ServerMessage::from_text(text.as_str()) {
                            Ok(server_msg) => {
                                debug!(event = "stream_inbound", message = ?server_msg);
                                let _ = events_tx.send(ConnectionEvent::Message(server_msg));
                            }
                            Err(err) => {
                                warn!(event = "stream_malformed_message", error = %err, "dropping inbound frame");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(err) = socket.send(Message::Pong(payload)).await {
                            let _ = events_tx.send(ConnectionEvent::Error(err.to_string()));
                            return SessionOutcome::Reconnect;
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Binary(payload))) => {
                        debug!(event = "stream_binary_ignored", len = payload.len());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(event = "stream_close_frame", frame = ?frame);
                        return SessionOutcome::Reconnect;
                    }
                    Some(Err(err)) => {
                        warn!(event = "stream_receive_failed", error = %err);
                        let _ = events_tx.send(ConnectionEvent::Error(err.to_string()));
                        return SessionOutcome::Reconnect;
                    }
                    None => return SessionOutcome::Reconnect,
                }
            }
        }
    }
}

async fn send_client_message<S>(
    socket: &mut tokio_tungstenite::WebSocketStream<S>,
    message: &ClientMessage,
) -> Result<(), StreamClientError>
where
    tokio_tungstenite::WebSocketStream<S>: futures_util::Sink<Message, Error = WsError> + Unpin,
{
    let text = message.to_text()?;
    debug!(event = "stream_outbound", len = text.len());
    socket.send(Message::Text(text.into())).await?;
    Ok(())
}

/// Messages accepted just before a close never reach the new socket.
fn drop_stale_messages(outbound_rx: &mut mpsc::UnboundedReceiver<ClientMessage>) {
    while let Ok(message) = outbound_rx.try_recv() {
        warn!(event = "stream_message_dropped", len = message.data.len());
    }
}

async fn discard_messages_during_delay(
    policy: &ReconnectPolicy,
    attempt: u64,
    outbound_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> bool {
    let sleep = wait_before_attempt(policy, attempt);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            _ = &mut *shutdown_rx => return false,
            maybe_message = outbound_rx.recv() => {
                match maybe_message {
                    Some(message) => {
                        warn!(event = "stream_message_dropped", len = message.data.len());
                    }
                    None => return false,
                }
            }
        }
    }
}
