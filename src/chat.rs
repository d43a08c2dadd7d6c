//! Chat client tying the stream connection, turn tracking, and rendering
//! together.
//!
//! All state changes happen on one task: [`ChatClient::run`] multiplexes
//! connection events and input lines, so turn and render state never need
//! locking.

use std::io::BufRead;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::render::{Notice, Renderer};
use crate::stream::client::{
    ConnectionEvent, ConnectionState, StreamClient, StreamClientError, StreamConnection,
};
use crate::stream::proto::ClientMessage;
use crate::stream::session::{TurnTracker, TurnUpdate};

/// Streaming text chat client.
#[derive(Debug)]
pub struct ChatClient<R> {
    connection: StreamConnection,
    turns: TurnTracker,
    renderer: R,
}

impl<R: Renderer> ChatClient<R> {
    /// Connects immediately; the client starts in the `Connecting` state with
    /// input disabled.
    pub fn start(client: &StreamClient, mut renderer: R) -> Self {
        renderer.set_input_enabled(false);
        Self {
            connection: client.connect(),
            turns: TurnTracker::new(),
            renderer,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Waits for the next connection event without applying it.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.connection.recv().await
    }

    /// Applies one connection event to turn and render state.
    pub fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => {
                self.renderer.notice(Notice::Connected);
                self.renderer.set_input_enabled(true);
            }
            ConnectionEvent::Message(message) => match self.turns.apply(message) {
                TurnUpdate::Fragment {
                    turn,
                    text,
                    started,
                } => {
                    if started {
                        debug!(event = "turn_started", turn = %turn);
                        self.renderer.begin_agent_entry(&turn);
                    }
                    self.renderer.append_agent_text(&turn, &text);
                }
                TurnUpdate::Ended { turn, reason } => {
                    debug!(event = "turn_ended", reason = ?reason);
                    if let Some(turn) = turn {
                        self.renderer.end_agent_entry(&turn);
                    }
                }
                TurnUpdate::Ignored => {
                    debug!(event = "message_ignored");
                }
            },
            ConnectionEvent::Error(err) => {
                warn!(event = "connection_error", error = %err);
                self.renderer.notice(Notice::ConnectionError);
            }
            ConnectionEvent::Closed { retry_in } => {
                info!(
                    event = "connection_closed",
                    retry_in_ms = retry_in.as_millis() as u64
                );
                self.renderer.set_input_enabled(false);
                self.renderer.notice(Notice::Reconnecting);
            }
        }
    }

    /// Sends a message if the connection is open.
    ///
    /// When it is not, shows [`Notice::NotConnected`] and drops the message.
    pub fn send(&mut self, message: ClientMessage) -> Result<(), StreamClientError> {
        let result = self.connection.sender().send(message);
        if let Err(err) = &result {
            error!(event = "send_rejected", state = %self.state(), error = %err);
            self.renderer.notice(Notice::NotConnected);
        }
        result
    }

    /// Submits the contents of the input buffer.
    ///
    /// Blank input is ignored and left in place. Otherwise the trimmed text is
    /// shown as a user entry, the buffer is cleared, and the text is sent.
    /// Returns whether anything was submitted.
    pub fn submit(&mut self, input: &mut String) -> bool {
        let message = input.trim().to_string();
        if message.is_empty() {
            return false;
        }

        self.renderer.user_entry(&message);
        input.clear();
        debug!(event = "user_submitted", len = message.len());
        let _ = self.send(ClientMessage::text(message));
        true
    }

    /// Drives the client until the input channel closes or the worker stops.
    pub async fn run(&mut self, mut input: mpsc::Receiver<String>) {
        loop {
            tokio::select! {
                maybe_event = self.connection.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_event(event),
                        None => return,
                    }
                }
                maybe_line = input.recv() => {
                    match maybe_line {
                        Some(mut line) => {
                            self.submit(&mut line);
                        }
                        None => return,
                    }
                }
            }
        }
    }

    /// Stops the connection worker and hands back the renderer.
    pub fn stop(mut self) -> R {
        self.connection.close();
        self.renderer
    }
}

/// Reads lines from `reader` on a dedicated OS thread.
///
/// The returned channel closes at EOF or on the first read error. The thread
/// is detached: a read that never returns does not hold up runtime shutdown,
/// unlike `tokio::io::stdin`, which parks the read on the blocking pool.
pub fn spawn_line_reader<B>(
    reader: B,
    capacity: usize,
) -> std::io::Result<mpsc::Receiver<String>>
where
    B: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    std::thread::Builder::new()
        .name("input-reader".to_string())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(event = "input_read_failed", error = %err);
                        break;
                    }
                }
            }
            debug!(event = "input_closed");
        })?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::reconnect::ReconnectPolicy;
    use crate::render::Transcript;
    use crate::stream::proto::ServerMessage;

    fn offline_client() -> ChatClient<Transcript> {
        // Port 9 is discard; nothing accepts websocket handshakes there.
        let client = StreamClient::new("127.0.0.1:9")
            .with_reconnect_policy(ReconnectPolicy::forever(Duration::from_secs(60)));
        ChatClient::start(&client, Transcript::new())
    }

    fn text(data: &str) -> ConnectionEvent {
        ConnectionEvent::Message(ServerMessage::Text(data.to_string()))
    }

    #[tokio::test]
    async fn fragments_render_as_one_entry_per_turn() {
        let mut chat = offline_client();
        chat.handle_event(text("Hello"));
        chat.handle_event(text(" world"));
        chat.handle_event(ConnectionEvent::Message(ServerMessage::TurnComplete));
        chat.handle_event(text("Next"));

        let transcript = chat.stop();
        let agent: Vec<_> = transcript.agent_entries().collect();
        assert_eq!(agent.len(), 2);
        assert_eq!(agent[0].text, "Hello world");
        assert_eq!(agent[1].text, "Next");
        assert_ne!(agent[0].turn, agent[1].turn);
    }

    #[tokio::test]
    async fn interruption_starts_a_fresh_entry() {
        let mut chat = offline_client();
        chat.handle_event(text("cut"));
        chat.handle_event(ConnectionEvent::Message(ServerMessage::Interrupted));
        chat.handle_event(text("again"));

        let transcript = chat.stop();
        let texts: Vec<_> = transcript
            .agent_entries()
            .map(|entry| entry.text.clone())
            .collect();
        assert_eq!(texts, vec!["cut", "again"]);
    }

    #[tokio::test]
    async fn unsupported_messages_render_nothing() {
        let mut chat = offline_client();
        chat.handle_event(ConnectionEvent::Message(ServerMessage::Unsupported {
            mime_type: Some("audio/pcm".to_string()),
        }));
        let transcript = chat.stop();
        assert!(transcript.entries().is_empty());
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let mut chat = offline_client();
        for raw in ["", "   ", "\t\n "] {
            let mut input = raw.to_string();
            assert!(!chat.submit(&mut input));
            assert_eq!(input, raw);
        }
        let transcript = chat.stop();
        assert!(transcript.entries().is_empty());
        assert!(transcript.notices().is_empty());
    }

    #[tokio::test]
    async fn submit_while_disconnected_renders_and_reports() {
        let mut chat = offline_client();
        let mut input = "  hello agent \n".to_string();

        assert!(chat.submit(&mut input));
        assert!(input.is_empty());

        let transcript = chat.stop();
        let users: Vec<_> = transcript.user_entries().collect();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].text, "hello agent");
        assert_eq!(transcript.last_notice(), Some(Notice::NotConnected));
    }

    #[tokio::test]
    async fn send_while_disconnected_is_an_error_not_a_panic() {
        let mut chat = offline_client();
        let result = chat.send(ClientMessage::text("x"));
        assert!(matches!(result, Err(StreamClientError::NotConnected(_))));
        assert_eq!(chat.renderer().last_notice(), Some(Notice::NotConnected));
        chat.stop();
    }

    #[tokio::test]
    async fn open_and_close_toggle_input() {
        let mut chat = offline_client();
        assert!(!chat.renderer().input_enabled());

        chat.handle_event(ConnectionEvent::Opened);
        assert!(chat.renderer().input_enabled());
        assert_eq!(chat.renderer().last_notice(), Some(Notice::Connected));

        chat.handle_event(ConnectionEvent::Error("reset".to_string()));
        assert!(chat.renderer().input_enabled());
        assert_eq!(chat.renderer().last_notice(), Some(Notice::ConnectionError));

        chat.handle_event(ConnectionEvent::Closed {
            retry_in: Duration::from_secs(5),
        });
        assert!(!chat.renderer().input_enabled());
        assert_eq!(chat.renderer().last_notice(), Some(Notice::Reconnecting));
        chat.stop();
    }

    #[tokio::test]
    async fn run_returns_at_end_of_input() {
        let mut chat = offline_client();
        let (tx, rx) = mpsc::channel(4);
        for line in ["first", "", "second"] {
            tx.send(line.to_string()).await.expect("queue line");
        }
        drop(tx);
        chat.run(rx).await;

        let transcript = chat.stop();
        let users: Vec<_> = transcript
            .user_entries()
            .map(|entry| entry.text.clone())
            .collect();
        assert_eq!(users, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn line_reader_forwards_lines_until_eof() {
        let input = std::io::Cursor::new(b"one\ntwo\n".to_vec());
        let mut lines = spawn_line_reader(input, 1).expect("spawn reader");
        assert_eq!(lines.recv().await.as_deref(), Some("one"));
        assert_eq!(lines.recv().await.as_deref(), Some("two"));
        assert_eq!(lines.recv().await, None);
    }

    /// Blocks every read until the paired sender is dropped, like a terminal
    /// nobody types into.
    struct StalledInput(std::sync::mpsc::Receiver<()>);

    impl std::io::Read for StalledInput {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[test]
    fn runtime_shuts_down_while_input_is_stalled() {
        let (release, stalled) = std::sync::mpsc::channel::<()>();
        let lines = spawn_line_reader(std::io::BufReader::new(StalledInput(stalled)), 8)
            .expect("spawn reader");
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("build runtime");

        let transcript = runtime.block_on(async move {
            let mut chat = offline_client();
            let interrupted =
                tokio::time::timeout(Duration::from_millis(50), chat.run(lines)).await;
            assert!(interrupted.is_err(), "run should still be waiting for input");
            chat.stop()
        });
        assert!(transcript.user_entries().next().is_none());

        let started = std::time::Instant::now();
        drop(runtime);
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "runtime shutdown waited on the input read"
        );
        drop(release);
    }
}
