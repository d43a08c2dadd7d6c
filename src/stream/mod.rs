//! Realtime stream modules.
//!
//! - `client`: websocket transport, send gate, and reconnect handling.
//! - `proto`: messages exchanged with the agent server.
//! - `session`: turn lifecycle over the inbound message stream.

/// Websocket connection and outbound sender.
pub mod client;
/// Stream protocol messages.
pub mod proto;
/// Turn tracking for streamed agent output.
pub mod session;
