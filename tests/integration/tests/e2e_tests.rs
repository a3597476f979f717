//! End-to-end tests over real sockets
//!
//! A coap-lite UDP client talks to the bridge, which talks to a real
//! WebSocket echo server; the forwarding proxy is checked against a stub
//! HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bridge_common::{
    AppSettings, BridgeConfig, Environment, ListenerConfig, SessionLimits, TargetConfig,
};
use bridge_gateway::proxy::HttpProxy;
use bridge_gateway::transport::CoapListener;
use bridge_gateway::BridgeServer;
use coap_lite::{CoapOption, MessageClass, MessageType, Packet, RequestType, ResponseType};
use futures_util::{SinkExt, StreamExt};
use integration_tests::eventually;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio_tungstenite::tungstenite::Message;

const SESSION_TOKEN_OPTION: u16 = 111;
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Echo server that closes the connection when it reads `__close__`
async fn spawn_echo_server() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Text(text) => {
                            if text == "__close__" {
                                let _ = ws.close(None).await;
                                break;
                            }
                            if ws.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Message::Binary(payload) => {
                            if ws.send(Message::Binary(payload)).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            });
        }
    });
    Ok(addr)
}

async fn spawn_bridge(
    target: SocketAddr,
    max_sessions: usize,
) -> Result<(SocketAddr, Arc<BridgeServer>)> {
    let config = BridgeConfig {
        app: AppSettings {
            name: "bridge-e2e".to_string(),
            env: Environment::Development,
        },
        coap: ListenerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        target: TargetConfig {
            url: format!("ws://{target}"),
        },
        sessions: SessionLimits {
            max_sessions,
            establish_timeout_ms: 5_000,
        },
    };

    let bridge = bridge_gateway::create_bridge(&config)?;
    let listener = CoapListener::bind(&config.coap.address(), Arc::clone(&bridge)).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = listener.run().await;
    });
    Ok((addr, bridge))
}

fn observe_request(coap_token: &[u8], session: Option<&str>, payload: &[u8]) -> Packet {
    let mut packet = plain_request(coap_token, payload);
    packet.add_option(CoapOption::Observe, Vec::new());
    if let Some(session) = session {
        packet.add_option(
            CoapOption::Unknown(SESSION_TOKEN_OPTION),
            session.as_bytes().to_vec(),
        );
    }
    packet
}

fn plain_request(coap_token: &[u8], payload: &[u8]) -> Packet {
    let mut packet = Packet::new();
    packet.header.set_type(MessageType::Confirmable);
    packet.header.code = MessageClass::Request(RequestType::Get);
    packet.header.message_id = rand::random();
    packet.set_token(coap_token.to_vec());
    packet.payload = payload.to_vec();
    packet
}

async fn send(socket: &UdpSocket, packet: &Packet) -> Result<()> {
    let bytes = packet
        .to_bytes()
        .map_err(|e| anyhow::anyhow!("encode failed: {e}"))?;
    socket.send(&bytes).await?;
    Ok(())
}

async fn recv_packet(socket: &UdpSocket) -> Result<Packet> {
    let mut buf = vec![0u8; 4096];
    let len = tokio::time::timeout(RECV_TIMEOUT, socket.recv(&mut buf)).await??;
    Packet::from_bytes(&buf[..len]).map_err(|e| anyhow::anyhow!("decode failed: {e}"))
}

/// Receive until a packet carrying a payload arrives
async fn recv_payload(socket: &UdpSocket) -> Result<Vec<u8>> {
    loop {
        let packet = recv_packet(socket).await?;
        if !packet.payload.is_empty() {
            return Ok(packet.payload);
        }
    }
}

/// Receive until an RST arrives
async fn recv_reset(socket: &UdpSocket) -> Result<()> {
    loop {
        let packet = recv_packet(socket).await?;
        if packet.header.get_type() == MessageType::Reset {
            return Ok(());
        }
    }
}

/// Pull the session id out of the establishment payloads
fn extract_session_id(payloads: &[Vec<u8>]) -> Result<String> {
    for payload in payloads {
        if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(payload) {
            if let Some(Value::String(id)) = map.get("id") {
                return Ok(id.clone());
            }
        }
    }
    anyhow::bail!("no establishment payload carried a session id");
}

#[tokio::test]
async fn test_bridge_end_to_end_over_sockets() -> Result<()> {
    let echo_addr = spawn_echo_server().await?;
    let (bridge_addr, bridge) = spawn_bridge(echo_addr, 4).await?;

    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket.connect(bridge_addr).await?;

    // establish: the id payload and the ready payload both arrive
    send(&socket, &observe_request(b"e2e1", None, b"")).await?;
    let first = recv_payload(&socket).await?;
    let second = recv_payload(&socket).await?;
    let session = extract_session_id(&[first.clone(), second.clone()])?;
    assert!(
        first == br#"{"status":0}"#.to_vec() || second == br#"{"status":0}"#.to_vec(),
        "expected a ready payload, got {first:?} / {second:?}"
    );
    assert_eq!(bridge.session_count(), 1);

    // relay a payload through the session and read the echo back
    send(
        &socket,
        &observe_request(b"e2e2", Some(&session), b"ping"),
    )
    .await?;
    assert_eq!(recv_payload(&socket).await?, b"ping");

    // ask the echo server to close; the bridge aborts the exchange
    send(
        &socket,
        &observe_request(b"e2e3", Some(&session), b"__close__"),
    )
    .await?;
    recv_reset(&socket).await?;
    assert_eq!(bridge.session_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_capacity_exceeded_over_sockets() -> Result<()> {
    let echo_addr = spawn_echo_server().await?;
    let (bridge_addr, bridge) = spawn_bridge(echo_addr, 1).await?;

    let first = UdpSocket::bind("127.0.0.1:0").await?;
    first.connect(bridge_addr).await?;
    send(&first, &observe_request(b"cap1", None, b"")).await?;
    recv_payload(&first).await?;
    recv_payload(&first).await?;

    let second = UdpSocket::bind("127.0.0.1:0").await?;
    second.connect(bridge_addr).await?;
    send(&second, &observe_request(b"cap2", None, b"")).await?;
    assert_eq!(
        recv_payload(&second).await?,
        br#"{"error":"capacity-exceeded"}"#
    );
    assert_eq!(bridge.session_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_protocol_violation_over_sockets() -> Result<()> {
    let echo_addr = spawn_echo_server().await?;
    let (bridge_addr, bridge) = spawn_bridge(echo_addr, 4).await?;

    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket.connect(bridge_addr).await?;

    send(&socket, &plain_request(b"bare", b"data")).await?;
    assert_eq!(
        recv_payload(&socket).await?,
        br#"{"error":"protocol-violation"}"#
    );
    assert_eq!(bridge.session_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_observe_deregister_tears_down_session() -> Result<()> {
    let echo_addr = spawn_echo_server().await?;
    let (bridge_addr, bridge) = spawn_bridge(echo_addr, 4).await?;

    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket.connect(bridge_addr).await?;

    send(&socket, &observe_request(b"dereg", None, b"")).await?;
    recv_payload(&socket).await?;
    recv_payload(&socket).await?;
    assert_eq!(bridge.session_count(), 1);

    // deregister reuses the CoAP token of the original observe
    let mut deregister = plain_request(b"dereg", b"");
    deregister.add_option(CoapOption::Observe, vec![1]);
    send(&socket, &deregister).await?;

    eventually(|| bridge.session_count() == 0).await;
    Ok(())
}

/// Stub HTTP server answering every request with 200 "ok"
async fn spawn_http_stub() -> Result<(
    SocketAddr,
    tokio::sync::mpsc::UnboundedReceiver<String>,
)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut data = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    let Ok(n) = stream.read(&mut buf).await else {
                        return;
                    };
                    if n == 0 {
                        break;
                    }
                    data.extend_from_slice(&buf[..n]);
                    if let Some(total) = expected_length(&data) {
                        if data.len() >= total {
                            break;
                        }
                    }
                }
                let _ = tx.send(String::from_utf8_lossy(&data).to_string());

                let body = b"ok";
                let head = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes()).await;
                let _ = stream.write_all(body).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    Ok((addr, rx))
}

/// Total request size once headers (and content-length) are readable
fn expected_length(data: &[u8]) -> Option<usize> {
    let text = String::from_utf8_lossy(data);
    let end = text.find("\r\n\r\n")?;
    let body_length = text[..end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    Some(end + 4 + body_length)
}

#[tokio::test]
async fn test_http_proxy_forwards_requests() -> Result<()> {
    let (http_addr, mut requests) = spawn_http_stub().await?;

    let proxy = HttpProxy::bind("127.0.0.1:0", format!("http://{http_addr}")).await?;
    let proxy_addr = proxy.local_addr()?;
    tokio::spawn(async move {
        let _ = proxy.run().await;
    });

    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket.connect(proxy_addr).await?;

    let mut request = plain_request(b"http", br#"{"hello":true}"#);
    request.header.code = MessageClass::Request(RequestType::Post);
    request.add_option(CoapOption::UriPath, b"api".to_vec());
    request.add_option(CoapOption::UriPath, b"echo".to_vec());
    request.add_option(CoapOption::ContentFormat, vec![50]);
    send(&socket, &request).await?;

    let reply = recv_packet(&socket).await?;
    assert_eq!(
        reply.header.code,
        MessageClass::Response(ResponseType::Content)
    );
    assert_eq!(reply.payload, b"ok");

    let seen = tokio::time::timeout(RECV_TIMEOUT, requests.recv())
        .await?
        .expect("stub server dropped");
    assert!(seen.starts_with("POST /api/echo HTTP/1.1"));
    let lowercase = seen.to_lowercase();
    assert!(lowercase.contains("content-type: application/json"));
    assert!(seen.ends_with(r#"{"hello":true}"#));

    Ok(())
}
