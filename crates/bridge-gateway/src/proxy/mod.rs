//! CoAP→HTTP forwarding proxy
//!
//! The bridge's non-observe sibling: maps each CoAP request onto an HTTP
//! request against a fixed target, translating method, Uri-Path, and
//! Content-Format, and answers with the HTTP response body. No sessions,
//! no observe handling.

use bridge_common::AppError;
use coap_lite::{CoapOption, MessageClass, MessageType, Packet, RequestType, ResponseType};
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Largest datagram the proxy will read
const MAX_DATAGRAM: usize = 4096;

/// Plain CoAP→HTTP forwarder
pub struct HttpProxy {
    socket: UdpSocket,
    client: reqwest::Client,
    target: String,
}

impl HttpProxy {
    /// Bind the UDP socket; `target` is the HTTP base URL
    pub async fn bind(addr: &str, target: String) -> Result<Self, AppError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            client: reqwest::Client::new(),
            target: target.trim_end_matches('/').to_string(),
        })
    }

    /// Address the proxy is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve datagrams until the socket fails
    pub async fn run(self) -> Result<(), AppError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            match Packet::from_bytes(&buf[..len]) {
                Ok(packet) => self.forward(packet, peer).await,
                Err(e) => {
                    tracing::debug!(%peer, error = %e, "dropping undecodable datagram");
                }
            }
        }
    }

    async fn forward(&self, packet: Packet, peer: SocketAddr) {
        let MessageClass::Request(request_type) = packet.header.code else {
            return;
        };
        let Some(method) = http_method(request_type) else {
            self.respond(&packet, peer, ResponseType::MethodNotAllowed, Vec::new())
                .await;
            return;
        };

        let url = format!("{}{}", self.target, uri_path(&packet));
        tracing::debug!(%peer, %url, "forwarding request");

        let mut request = self
            .client
            .request(method, url.as_str())
            .body(packet.payload.clone());
        if let Some(content_type) = content_type(&packet) {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }

        match request.send().await {
            Ok(response) => {
                let code = if response.status().is_success() {
                    ResponseType::Content
                } else {
                    ResponseType::BadGateway
                };
                let body = response
                    .bytes()
                    .await
                    .map(|bytes| bytes.to_vec())
                    .unwrap_or_default();
                self.respond(&packet, peer, code, body).await;
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "http forward failed");
                self.respond(&packet, peer, ResponseType::BadGateway, Vec::new())
                    .await;
            }
        }
    }

    async fn respond(
        &self,
        request: &Packet,
        peer: SocketAddr,
        code: ResponseType,
        payload: Vec<u8>,
    ) {
        let mut reply = Packet::new();
        reply.header.set_type(MessageType::Acknowledgement);
        reply.header.message_id = request.header.message_id;
        reply.header.code = MessageClass::Response(code);
        reply.set_token(request.get_token().to_vec());
        reply.payload = payload;

        match reply.to_bytes() {
            Ok(bytes) => {
                if let Err(e) = self.socket.send_to(&bytes, peer).await {
                    tracing::debug!(%peer, error = %e, "failed to send reply");
                }
            }
            Err(e) => tracing::debug!(%peer, error = %e, "failed to encode reply"),
        }
    }
}

fn http_method(request_type: RequestType) -> Option<reqwest::Method> {
    match request_type {
        RequestType::Get => Some(reqwest::Method::GET),
        RequestType::Post => Some(reqwest::Method::POST),
        RequestType::Put => Some(reqwest::Method::PUT),
        RequestType::Delete => Some(reqwest::Method::DELETE),
        _ => None,
    }
}

/// Join Uri-Path options into an absolute path
fn uri_path(packet: &Packet) -> String {
    let mut path = String::new();
    if let Some(segments) = packet.get_option(CoapOption::UriPath) {
        for segment in segments {
            path.push('/');
            path.push_str(&String::from_utf8_lossy(segment));
        }
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

/// Map well-known Content-Format numbers to Content-Type headers
fn content_type(packet: &Packet) -> Option<&'static str> {
    let raw = packet.get_option(CoapOption::ContentFormat)?.front()?;
    let value = raw.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
    match value {
        0 => Some("text/plain; charset=utf-8"),
        40 => Some("application/link-format"),
        41 => Some("application/xml"),
        42 => Some("application/octet-stream"),
        50 => Some("application/json"),
        _ => None,
    }
}
