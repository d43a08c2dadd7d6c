//! Terminal chat client for streaming agent servers.
//!
//! Reads user messages from stdin, one per line, and streams agent responses
//! to stdout. Logs go to stderr.

use std::error::Error;
use std::io::BufReader;

use agent_chat_client::config::{Args, ClientConfig};
use agent_chat_client::{spawn_line_reader, ChatClient, TerminalRenderer};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const INPUT_BUFFER: usize = 16;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_chat_client=info,agent_chat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::from(Args::parse());
    let client = config.stream_client();
    info!(
        session_id = %client.session_id(),
        endpoint = %client.endpoint(),
        "Starting agent chat"
    );

    // Stdin is read on its own thread so ctrl-c can exit with a read pending.
    let input = spawn_line_reader(BufReader::new(std::io::stdin()), INPUT_BUFFER)?;
    let mut chat = ChatClient::start(&client, TerminalRenderer::new(std::io::stdout()));

    tokio::select! {
        _ = chat.run(input) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
    }

    chat.stop();
    info!("Agent chat stopped");
    Ok(())
}
