use std::error::Error;
use std::time::Duration;

use agent_chat_client::reconnect::ReconnectPolicy;
use agent_chat_client::stream::client::{ConnectionEvent, StreamClient, DEFAULT_HOST};
use agent_chat_client::stream::proto::ServerMessage;

fn main() -> Result<(), Box<dyn Error>> {
    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let client = StreamClient::new(host)
            .with_reconnect_policy(ReconnectPolicy::forever(Duration::from_secs(2)));
        println!("endpoint={}", client.endpoint());

        let mut connection = client.connect();
        while let Some(event) = connection.recv().await {
            match event {
                ConnectionEvent::Opened => {
                    println!("opened");
                    connection.sender().send_text("Hello from connect_stream")?;
                }
                ConnectionEvent::Message(ServerMessage::Text(text)) => {
                    println!("text={text:?}");
                }
                ConnectionEvent::Message(ServerMessage::TurnComplete) => {
                    println!("turn_complete");
                    break;
                }
                ConnectionEvent::Message(other) => println!("message={other:?}"),
                ConnectionEvent::Error(err) => println!("error={err}"),
                ConnectionEvent::Closed { retry_in } => {
                    println!("closed retry_in_ms={}", retry_in.as_millis());
                }
            }
        }

        connection.close();
        Ok::<(), Box<dyn Error>>(())
    })
}
