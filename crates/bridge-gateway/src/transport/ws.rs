//! WebSocket transport adapter
//!
//! Duplex connector backed by `tokio-tungstenite`. Each session gets its
//! own client connection, split into sink and stream halves.

use async_trait::async_trait;
use bridge_core::{DuplexConnector, DuplexError, DuplexEvent, DuplexSink, DuplexStream};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsTransport = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket implementation of the duplex transport
pub struct WsConnector {
    target: String,
}

impl WsConnector {
    /// Create a connector for a `ws://` or `wss://` target URL
    pub fn new(target: String) -> Self {
        Self { target }
    }

    /// The configured target URL
    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl DuplexConnector for WsConnector {
    async fn connect(&self) -> Result<(Box<dyn DuplexSink>, Box<dyn DuplexStream>), DuplexError> {
        let (stream, _response) = connect_async(self.target.as_str())
            .await
            .map_err(|e| DuplexError::Connect(e.to_string()))?;
        let (sink, stream) = stream.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsEvents { stream })))
    }
}

struct WsSink {
    sink: SplitSink<WsTransport, Message>,
}

#[async_trait]
impl DuplexSink for WsSink {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), DuplexError> {
        // backends behind this bridge speak JSON text; non-UTF-8 payloads
        // fall back to binary frames
        let message = match String::from_utf8(payload) {
            Ok(text) => Message::Text(text),
            Err(raw) => Message::Binary(raw.into_bytes()),
        };
        self.sink
            .send(message)
            .await
            .map_err(|e| DuplexError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

struct WsEvents {
    stream: SplitStream<WsTransport>,
}

#[async_trait]
impl DuplexStream for WsEvents {
    async fn next_event(&mut self) -> DuplexEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return DuplexEvent::Message(text.into_bytes());
                }
                Some(Ok(Message::Binary(payload))) => return DuplexEvent::Message(payload),
                Some(Ok(Message::Close(_))) | None => return DuplexEvent::Closed,
                // control frames are transport noise
                Some(Ok(_)) => continue,
                Some(Err(e)) => return DuplexEvent::Error(e.to_string()),
            }
        }
    }
}
