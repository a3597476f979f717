//! WebSocket echo server for trying the bridge locally
//!
//! ```bash
//! cargo run --example echo_server
//! TARGET_URL=ws://127.0.0.1:8883 cargo run --bin coap-ws-bridge
//! ```

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::var("ECHO_ADDR").unwrap_or_else(|_| "127.0.0.1:8883".to_string());
    let listener = TcpListener::bind(&addr).await?;
    println!("WebSocket echo server listening on ws://{addr}");

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            let Ok(mut ws) = accept_async(stream).await else {
                return;
            };
            println!("{peer} connected");
            while let Some(Ok(message)) = ws.next().await {
                match message {
                    Message::Text(_) | Message::Binary(_) => {
                        if ws.send(message).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            println!("{peer} disconnected");
        });
    }
}
