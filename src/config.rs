//! Client configuration.
//!
//! [`ClientConfig`] is the library-level settings struct; [`Args`] is the
//! command line surface of the `agent-chat` binary, with environment variable
//! fallbacks for every flag.

use std::time::Duration;

use clap::Parser;

use crate::reconnect::{ReconnectPolicy, DEFAULT_RECONNECT_DELAY};
use crate::stream::client::{SessionId, StreamClient, DEFAULT_HOST};

const ENV_HOST: &str = "AGENT_CHAT_HOST";
const ENV_SECURE: &str = "AGENT_CHAT_SECURE";
const ENV_ENDPOINT: &str = "AGENT_CHAT_ENDPOINT";
const ENV_SESSION_ID: &str = "AGENT_CHAT_SESSION_ID";
const ENV_RECONNECT_DELAY_MS: &str = "AGENT_CHAT_RECONNECT_DELAY_MS";

/// Settings used to build a [`StreamClient`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub secure: bool,
    pub endpoint: Option<String>,
    pub session_id: Option<String>,
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            secure: false,
            endpoint: None,
            session_id: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ClientConfig {
    pub fn stream_client(&self) -> StreamClient {
        let mut client = StreamClient::new(self.host.clone())
            .with_secure(self.secure)
            .with_reconnect_policy(ReconnectPolicy::forever(self.reconnect_delay));
        if let Some(session_id) = &self.session_id {
            client = client.with_session_id(SessionId::new(session_id.clone()));
        }
        if let Some(endpoint) = &self.endpoint {
            client = client.with_endpoint(endpoint.clone());
        }
        client
    }
}

/// Terminal chat client for streaming agent servers.
#[derive(Parser, Debug)]
#[command(name = "agent-chat", version, about, long_about = None)]
pub struct Args {
    /// Agent server host, `name[:port]`
    #[arg(long, env = ENV_HOST, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Connect with wss:// instead of ws://
    #[arg(long, env = ENV_SECURE)]
    pub secure: bool,

    /// Full websocket URL; overrides host, scheme, and session id
    #[arg(long, env = ENV_ENDPOINT)]
    pub endpoint: Option<String>,

    /// Session id to embed in the URL (random when unset)
    #[arg(long, env = ENV_SESSION_ID)]
    pub session_id: Option<String>,

    /// Delay before reconnecting after a close, in milliseconds
    #[arg(
        long,
        env = ENV_RECONNECT_DELAY_MS,
        default_value_t = DEFAULT_RECONNECT_DELAY.as_millis() as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub reconnect_delay_ms: u64,
}

impl From<Args> for ClientConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            secure: args.secure,
            endpoint: args.endpoint,
            session_id: args.session_id,
            reconnect_delay: Duration::from_millis(args.reconnect_delay_ms),
        }
    }
}
