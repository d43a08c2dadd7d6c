//! Turn tracking over the inbound message stream.
//!
//! `TurnTracker` consumes classified [`ServerMessage`]s and keeps the single
//! active turn: the first text fragment opens one, `turn_complete` or
//! `interrupted` closes it.

use std::fmt;

use rand::Rng;

use crate::stream::proto::ServerMessage;

const TURN_TOKEN_LEN: usize = 6;
const TURN_TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identifier of one agent turn.
///
/// The random token keeps ids opaque; the sequence number makes them unique
/// within a tracker.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TurnId {
    seq: u64,
    token: String,
}

impl TurnId {
    fn allocate(seq: u64) -> Self {
        let mut rng = rand::rng();
        let token = (0..TURN_TOKEN_LEN)
            .map(|_| {
                let idx = rng.random_range(0..TURN_TOKEN_ALPHABET.len());
                char::from(TURN_TOKEN_ALPHABET[idx])
            })
            .collect();
        Self { seq, token }
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.token, self.seq)
    }
}

/// Why a turn ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnEnd {
    Complete,
    Interrupted,
}

/// Effect of one inbound message on turn state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnUpdate {
    /// Text to append to `turn`. `started` is set on the first fragment.
    Fragment {
        turn: TurnId,
        text: String,
        started: bool,
    },
    /// The active turn, if any, was cleared.
    Ended { turn: Option<TurnId>, reason: TurnEnd },
    /// Message carries nothing the client renders.
    Ignored,
}

/// Tracks the active agent turn.
#[derive(Debug, Default)]
pub struct TurnTracker {
    active: Option<TurnId>,
    issued: u64,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The turn currently receiving fragments.
    pub fn active(&self) -> Option<&TurnId> {
        self.active.as_ref()
    }

    /// Applies one inbound message.
    pub fn apply(&mut self, message: ServerMessage) -> TurnUpdate {
        match message {
            ServerMessage::TurnComplete => TurnUpdate::Ended {
                turn: self.active.take(),
                reason: TurnEnd::Complete,
            },
            ServerMessage::Interrupted => TurnUpdate::Ended {
                turn: self.active.take(),
                reason: TurnEnd::Interrupted,
            },
            ServerMessage::Text(text) => {
                let started = self.active.is_none();
                let turn = match &self.active {
                    Some(turn) => turn.clone(),
                    None => {
                        self.issued += 1;
                        let turn = TurnId::allocate(self.issued);
                        self.active = Some(turn.clone());
                        turn
                    }
                };
                TurnUpdate::Fragment {
                    turn,
                    text,
                    started,
                }
            }
            ServerMessage::Unsupported { .. } => TurnUpdate::Ignored,
        }
    }
}
