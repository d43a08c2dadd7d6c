//! Streaming text chat client for agent servers.
//!
//! The crate is organized by concern:
//! - `stream`: realtime websocket client, protocol, and turn tracking.
//! - `chat`: the chat client that renders agent turns and sends user input.
//! - `render`: rendering surface, in-memory transcript, and terminal output.
//! - `reconnect`: the fixed-delay reconnect policy.
//! - `config`: client settings and the command line surface.

/// Chat client: event dispatch, submit path, and lifecycle.
pub mod chat;
/// Client settings and command line arguments.
pub mod config;
/// Reconnect policy used by the stream worker.
pub mod reconnect;
/// Renderer trait and implementations.
pub mod render;
/// Realtime stream client, protocol types, and turn tracking.
pub mod stream;

pub use chat::{spawn_line_reader, ChatClient};
pub use render::{Notice, Renderer, TerminalRenderer, Transcript};
pub use stream::client::{ConnectionEvent, ConnectionState, StreamClient, StreamClientError};
