//! Rendering surface for the chat transcript.
//!
//! [`Renderer`] is the seam between the chat client and whatever displays the
//! conversation. [`Transcript`] keeps everything in memory; [`TerminalRenderer`]
//! streams it to a writer.

use std::fmt;
use std::io::Write;

use tracing::warn;

use crate::stream::session::TurnId;

/// Status line shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    Connected,
    Reconnecting,
    ConnectionError,
    NotConnected,
}

impl Notice {
    /// Whether the notice reports a problem rather than readiness.
    pub fn is_error(&self) -> bool {
        !matches!(self, Notice::Connected)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Notice::Connected => "Connected. Ready for your message.",
            Notice::Reconnecting => "Connection closed. Reconnecting...",
            Notice::ConnectionError => "Connection error. Check the logs for details.",
            Notice::NotConnected => "Error: Not connected to server",
        };
        f.write_str(text)
    }
}

/// Receives everything the chat client wants displayed.
pub trait Renderer {
    /// Shows a status notice.
    fn notice(&mut self, notice: Notice);

    /// Enables or disables the input control.
    fn set_input_enabled(&mut self, enabled: bool);

    /// Opens a new agent entry for `turn`.
    fn begin_agent_entry(&mut self, turn: &TurnId);

    /// Appends `text` verbatim to the entry opened for `turn`.
    fn append_agent_text(&mut self, turn: &TurnId, text: &str);

    /// Called when `turn` completes or is interrupted.
    fn end_agent_entry(&mut self, _turn: &TurnId) {}

    /// Adds an entry with text the user submitted.
    fn user_entry(&mut self, text: &str);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Agent,
}

/// One rendered message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub role: Role,
    /// Owning turn for agent entries.
    pub turn: Option<TurnId>,
    pub text: String,
}

/// In-memory transcript.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
    notices: Vec<Notice>,
    input_enabled: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn agent_entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|entry| entry.role == Role::Agent)
    }

    pub fn user_entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|entry| entry.role == Role::User)
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn last_notice(&self) -> Option<Notice> {
        self.notices.last().copied()
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    fn agent_entry_mut(&mut self, turn: &TurnId) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .rev()
            .find(|entry| entry.turn.as_ref() == Some(turn))
    }
}

impl Renderer for Transcript {
    fn notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
    }

    fn begin_agent_entry(&mut self, turn: &TurnId) {
        self.entries.push(Entry {
            role: Role::Agent,
            turn: Some(turn.clone()),
            text: String::new(),
        });
    }

    fn append_agent_text(&mut self, turn: &TurnId, text: &str) {
        if let Some(entry) = self.agent_entry_mut(turn) {
            entry.text.push_str(text);
        }
    }

    fn user_entry(&mut self, text: &str) {
        self.entries.push(Entry {
            role: Role::User,
            turn: None,
            text: text.to_string(),
        });
    }
}

/// Writes the transcript as plain text, flushing after each fragment.
#[derive(Debug)]
pub struct TerminalRenderer<W: Write> {
    out: W,
    open_turn: Option<TurnId>,
    line_open: bool,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            open_turn: None,
            line_open: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        let result = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush());
        if let Err(err) = result {
            warn!(event = "render_write_failed", error = %err);
        }
    }

    /// Terminates a dangling agent line before unrelated output.
    fn break_line(&mut self) {
        if self.line_open {
            self.line_open = false;
            self.write("\n");
        }
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn notice(&mut self, notice: Notice) {
        self.break_line();
        let marker = if notice.is_error() { '!' } else { '*' };
        self.write(&format!("[{marker}] {notice}\n"));
    }

    fn set_input_enabled(&mut self, _enabled: bool) {}

    fn begin_agent_entry(&mut self, turn: &TurnId) {
        self.break_line();
        self.write("Agent Response:\n");
        self.open_turn = Some(turn.clone());
        self.line_open = true;
    }

    fn append_agent_text(&mut self, turn: &TurnId, text: &str) {
        if self.open_turn.as_ref() != Some(turn) {
            return;
        }
        if !self.line_open {
            self.write("Agent Response (continued):\n");
            self.line_open = true;
        }
        self.write(text);
    }

    fn end_agent_entry(&mut self, turn: &TurnId) {
        if self.open_turn.as_ref() == Some(turn) {
            self.break_line();
            self.open_turn = None;
        }
    }

    fn user_entry(&mut self, text: &str) {
        self.break_line();
        self.write(&format!("You: {text}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::proto::ServerMessage;
    use crate::stream::session::{TurnTracker, TurnUpdate};

    fn new_turn(tracker: &mut TurnTracker) -> TurnId {
        tracker.apply(ServerMessage::TurnComplete);
        match tracker.apply(ServerMessage::Text(String::new())) {
            TurnUpdate::Fragment { turn, .. } => turn,
            other => panic!("expected fragment, got {other:?}"),
        }
    }

    #[test]
    fn transcript_appends_only_to_the_matching_entry() {
        let mut tracker = TurnTracker::new();
        let first = new_turn(&mut tracker);
        let second = new_turn(&mut tracker);

        let mut transcript = Transcript::new();
        transcript.begin_agent_entry(&first);
        transcript.append_agent_text(&first, "one");
        transcript.begin_agent_entry(&second);
        transcript.append_agent_text(&second, "two");
        transcript.append_agent_text(&first, "!");

        let texts: Vec<&str> = transcript
            .agent_entries()
            .map(|entry| entry.text.as_str())
            .collect();
        assert_eq!(texts, vec!["one!", "two"]);
    }

    #[test]
    fn transcript_ignores_text_for_unknown_turns() {
        let mut tracker = TurnTracker::new();
        let turn = new_turn(&mut tracker);
        let mut transcript = Transcript::new();
        transcript.append_agent_text(&turn, "lost");
        assert!(transcript.entries().is_empty());
    }

    #[test]
    fn terminal_renderer_streams_a_turn() {
        let mut tracker = TurnTracker::new();
        let turn = new_turn(&mut tracker);

        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.user_entry("hi");
        renderer.begin_agent_entry(&turn);
        renderer.append_agent_text(&turn, "Hello");
        renderer.append_agent_text(&turn, " world");
        renderer.end_agent_entry(&turn);
        renderer.notice(Notice::Reconnecting);

        let output = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert_eq!(
            output,
            "You: hi\nAgent Response:\nHello world\n[!] Connection closed. Reconnecting...\n"
        );
    }

    #[test]
    fn terminal_renderer_breaks_line_before_notice_mid_turn() {
        let mut tracker = TurnTracker::new();
        let turn = new_turn(&mut tracker);

        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.begin_agent_entry(&turn);
        renderer.append_agent_text(&turn, "partial");
        renderer.notice(Notice::NotConnected);

        let output = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert_eq!(
            output,
            "Agent Response:\npartial\n[!] Error: Not connected to server\n"
        );
    }

    #[test]
    fn terminal_renderer_resumes_a_turn_after_user_input() {
        let mut tracker = TurnTracker::new();
        let turn = new_turn(&mut tracker);

        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.begin_agent_entry(&turn);
        renderer.append_agent_text(&turn, "Hel");
        renderer.user_entry("wait");
        renderer.append_agent_text(&turn, "lo");
        renderer.end_agent_entry(&turn);

        let output = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert_eq!(
            output,
            "Agent Response:\nHel\nYou: wait\nAgent Response (continued):\nlo\n"
        );
    }

    #[test]
    fn terminal_renderer_marks_error_notices() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.notice(Notice::Connected);
        renderer.notice(Notice::ConnectionError);

        let output = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert_eq!(
            output,
            "[*] Connected. Ready for your message.\n\
             [!] Connection error. Check the logs for details.\n"
        );
    }

    #[test]
    fn only_connected_is_not_an_error() {
        assert!(!Notice::Connected.is_error());
        assert!(Notice::Reconnecting.is_error());
        assert!(Notice::ConnectionError.is_error());
        assert!(Notice::NotConnected.is_error());
    }
}
