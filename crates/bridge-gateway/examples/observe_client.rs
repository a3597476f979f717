//! Minimal CoAP client exercising the bridge
//!
//! Registers an observation, waits for the session token, then sends one
//! correlated payload and prints everything pushed back.
//!
//! ```bash
//! COAP_ADDR=127.0.0.1:5683 cargo run --example observe_client
//! ```

use coap_lite::{CoapOption, MessageClass, MessageType, Packet, RequestType};
use serde_json::Value;
use tokio::net::UdpSocket;

/// Option number carrying the session token
const SESSION_TOKEN_OPTION: u16 = 111;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = std::env::var("COAP_ADDR").unwrap_or_else(|_| "127.0.0.1:5683".to_string());
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(&server).await?;

    // register an observation; the bridge answers with the session token
    socket.send(&observe_request(None, &[])?).await?;
    println!("observing {server}");

    let mut session: Option<String> = None;
    let mut buf = vec![0u8; 4096];
    loop {
        let len = socket.recv(&mut buf).await?;
        let Ok(packet) = Packet::from_bytes(&buf[..len]) else {
            continue;
        };

        if packet.header.get_type() == MessageType::Reset {
            println!("session reset by bridge");
            return Ok(());
        }
        if packet.payload.is_empty() {
            continue;
        }

        let text = String::from_utf8_lossy(&packet.payload).to_string();
        println!("<- {text}");

        if session.is_none() {
            if let Some(id) = parse_session_id(&text) {
                session = Some(id.clone());
                let payload = b"hello from the coap side";
                socket.send(&observe_request(Some(&id), payload)?).await?;
                println!("-> {}", String::from_utf8_lossy(payload));
            }
        }
    }
}

fn parse_session_id(text: &str) -> Option<String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => match map.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn observe_request(
    session: Option<&str>,
    payload: &[u8],
) -> Result<Vec<u8>, coap_lite::error::MessageError> {
    let mut request = Packet::new();
    request.header.set_type(MessageType::Confirmable);
    request.header.code = MessageClass::Request(RequestType::Get);
    request.header.message_id = rand::random();
    request.set_token(rand::random::<u32>().to_be_bytes().to_vec());
    request.add_option(CoapOption::Observe, Vec::new());
    if let Some(session) = session {
        request.add_option(
            CoapOption::Unknown(SESSION_TOKEN_OPTION),
            session.as_bytes().to_vec(),
        );
    }
    request.payload = payload.to_vec();
    request.to_bytes()
}
