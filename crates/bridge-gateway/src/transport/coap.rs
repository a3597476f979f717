//! CoAP transport adapter
//!
//! UDP dispatch loop plus the reply side of each exchange. Wire encoding
//! and option handling come from `coap-lite`; this module only decides
//! which packets become exchanges and how replies are framed:
//!
//! - the first payload pushed on an observe exchange rides a piggybacked
//!   ACK, later pushes are NON notifications with an incrementing observe
//!   sequence;
//! - `abort` sends an RST referencing the last notification;
//! - observe deregisters and peer RSTs tear the matching session down.

use crate::protocol::SESSION_TOKEN_OPTION;
use crate::server::{BridgeServer, ExchangeOutcome};
use async_trait::async_trait;
use bridge_common::AppError;
use bridge_core::{ExchangeError, ExchangeResponder, InboundExchange, SessionToken};
use coap_lite::{CoapOption, MessageClass, MessageType, Packet, ResponseType};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::net::UdpSocket;

/// Largest datagram the listener will read
const MAX_DATAGRAM: usize = 4096;

/// Observe option value registering an observation
const OBSERVE_DEREGISTER: u32 = 1;

/// One registered observer, addressed by peer and CoAP token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ObserverKey {
    peer: SocketAddr,
    token: Vec<u8>,
}

struct ObserverEntry {
    session: SessionToken,
    last_mid: Arc<AtomicU16>,
}

/// CoAP/UDP listener feeding the bridge server
pub struct CoapListener {
    socket: Arc<UdpSocket>,
    bridge: Arc<BridgeServer>,
    observers: Arc<DashMap<ObserverKey, ObserverEntry>>,
    next_mid: Arc<AtomicU16>,
}

impl CoapListener {
    /// Bind the UDP socket
    pub async fn bind(addr: &str, bridge: Arc<BridgeServer>) -> Result<Self, AppError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            bridge,
            observers: Arc::new(DashMap::new()),
            next_mid: Arc::new(AtomicU16::new(1)),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve datagrams until the socket fails
    pub async fn run(self) -> Result<(), AppError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            match Packet::from_bytes(&buf[..len]) {
                Ok(packet) => self.dispatch(packet, peer).await,
                Err(e) => {
                    tracing::debug!(%peer, error = %e, "dropping undecodable datagram");
                }
            }
        }
    }

    async fn dispatch(&self, packet: Packet, peer: SocketAddr) {
        match packet.header.get_type() {
            MessageType::Reset => {
                self.handle_reset(&packet, peer);
                return;
            }
            MessageType::Acknowledgement => return,
            MessageType::Confirmable | MessageType::NonConfirmable => {}
        }

        if !matches!(packet.header.code, MessageClass::Request(_)) {
            return;
        }

        if observe_value(&packet) == Some(OBSERVE_DEREGISTER) {
            self.handle_deregister(&packet, peer).await;
        } else {
            self.handle_request(packet, peer).await;
        }
    }

    /// Turn a request into an exchange and hand it to the bridge
    async fn handle_request(&self, packet: Packet, peer: SocketAddr) {
        let subscribe = observe_value(&packet).is_some();
        let token = correlation_token(&packet);
        let coap_token = packet.get_token().to_vec();

        let reply = Arc::new(ObserveReply {
            socket: Arc::clone(&self.socket),
            peer,
            coap_token: coap_token.clone(),
            request_mid: packet.header.message_id,
            first_reply: AtomicBool::new(false),
            observe_seq: AtomicU32::new(0),
            last_mid: Arc::new(AtomicU16::new(packet.header.message_id)),
            next_mid: Arc::clone(&self.next_mid),
            aborted: AtomicBool::new(false),
            correlation: OnceLock::new(),
            observers: Arc::clone(&self.observers),
        });

        let exchange = InboundExchange {
            token,
            subscribe,
            payload: packet.payload,
            responder: Arc::clone(&reply) as Arc<dyn ExchangeResponder>,
        };

        if let ExchangeOutcome::SessionCreated { session } =
            self.bridge.handle_exchange(exchange).await
        {
            let _ = reply.correlation.set(session.clone());
            self.observers.insert(
                ObserverKey {
                    peer,
                    token: coap_token,
                },
                ObserverEntry {
                    session,
                    last_mid: Arc::clone(&reply.last_mid),
                },
            );
        }
    }

    /// Observe deregister: the peer ends its own session gracefully
    async fn handle_deregister(&self, packet: &Packet, peer: SocketAddr) {
        let key = ObserverKey {
            peer,
            token: packet.get_token().to_vec(),
        };
        if let Some((_, entry)) = self.observers.remove(&key) {
            tracing::debug!(session = %entry.session, %peer, "observe deregistered");
            self.bridge.terminate_session(&entry.session);
        }

        let mut reply = Packet::new();
        reply.header.set_type(MessageType::Acknowledgement);
        reply.header.message_id = packet.header.message_id;
        reply.header.code = MessageClass::Response(ResponseType::Content);
        reply.set_token(packet.get_token().to_vec());
        self.send(reply, peer).await;
    }

    /// RST from a peer rejecting a notification: abnormal local teardown
    fn handle_reset(&self, packet: &Packet, peer: SocketAddr) {
        let mid = packet.header.message_id;
        let mut matched = None;
        for entry in self.observers.iter() {
            if entry.key().peer == peer && entry.value().last_mid.load(Ordering::Acquire) == mid {
                matched = Some((entry.key().clone(), entry.value().session.clone()));
                break;
            }
        }

        if let Some((key, session)) = matched {
            self.observers.remove(&key);
            tracing::debug!(session = %session, %peer, "observe reset by peer");
            self.bridge.terminate_session(&session);
        }
    }

    async fn send(&self, packet: Packet, peer: SocketAddr) {
        match packet.to_bytes() {
            Ok(bytes) => {
                if let Err(e) = self.socket.send_to(&bytes, peer).await {
                    tracing::debug!(%peer, error = %e, "failed to send reply");
                }
            }
            Err(e) => tracing::debug!(%peer, error = %e, "failed to encode reply"),
        }
    }
}

/// Reply side of one CoAP exchange
struct ObserveReply {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    coap_token: Vec<u8>,
    request_mid: u16,
    first_reply: AtomicBool,
    observe_seq: AtomicU32,
    last_mid: Arc<AtomicU16>,
    next_mid: Arc<AtomicU16>,
    aborted: AtomicBool,
    correlation: OnceLock<SessionToken>,
    observers: Arc<DashMap<ObserverKey, ObserverEntry>>,
}

impl ObserveReply {
    fn allocate_mid(&self) -> u16 {
        self.next_mid.fetch_add(1, Ordering::AcqRel)
    }

    fn key(&self) -> ObserverKey {
        ObserverKey {
            peer: self.peer,
            token: self.coap_token.clone(),
        }
    }

    async fn transmit(&self, packet: Packet) -> Result<(), ExchangeError> {
        let bytes = packet
            .to_bytes()
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        self.socket
            .send_to(&bytes, self.peer)
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ExchangeResponder for ObserveReply {
    async fn push(&self, payload: &[u8]) -> Result<(), ExchangeError> {
        if self.aborted.load(Ordering::Acquire) {
            return Err(ExchangeError::PeerGone);
        }

        let mut packet = Packet::new();
        packet.header.code = MessageClass::Response(ResponseType::Content);

        // the first push rides the piggybacked ACK; later pushes are
        // standalone notifications
        let first = !self.first_reply.swap(true, Ordering::AcqRel);
        if first {
            packet.header.set_type(MessageType::Acknowledgement);
            packet.header.message_id = self.request_mid;
        } else {
            packet.header.set_type(MessageType::NonConfirmable);
            packet.header.message_id = self.allocate_mid();
        }
        packet.set_token(self.coap_token.clone());

        let seq = self.observe_seq.fetch_add(1, Ordering::AcqRel) + 1;
        packet.add_option(CoapOption::Observe, encode_observe(seq));
        if let Some(session) = self.correlation.get() {
            packet.add_option(
                CoapOption::Unknown(SESSION_TOKEN_OPTION),
                session.as_bytes().to_vec(),
            );
        }

        packet.payload = payload.to_vec();
        self.last_mid.store(packet.header.message_id, Ordering::Release);
        self.transmit(packet).await
    }

    async fn complete(&self, payload: &[u8]) -> Result<(), ExchangeError> {
        if self.aborted.load(Ordering::Acquire) {
            return Err(ExchangeError::PeerGone);
        }

        let mut packet = Packet::new();
        packet.header.set_type(MessageType::Acknowledgement);
        packet.header.message_id = self.request_mid;
        packet.header.code = MessageClass::Response(if payload.is_empty() {
            ResponseType::Changed
        } else {
            ResponseType::Content
        });
        packet.set_token(self.coap_token.clone());
        packet.payload = payload.to_vec();
        self.transmit(packet).await
    }

    async fn abort(&self) {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return;
        }
        self.observers.remove(&self.key());

        // RST referencing the last notification ends the observe
        // relationship on the peer
        let mut packet = Packet::new();
        packet.header.set_type(MessageType::Reset);
        packet.header.code = MessageClass::Empty;
        packet.header.message_id = self.last_mid.load(Ordering::Acquire);
        if let Err(e) = self.transmit(packet).await {
            tracing::debug!(peer = %self.peer, error = %e, "failed to send reset");
        }
    }
}

/// Decode the Observe option value, when present
fn observe_value(packet: &Packet) -> Option<u32> {
    let values = packet.get_option(CoapOption::Observe)?;
    let raw = values.front()?;
    if raw.len() > 3 {
        return None;
    }
    Some(raw.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
}

/// Encode an observe sequence number as its minimal big-endian form
fn encode_observe(seq: u32) -> Vec<u8> {
    let seq = seq & 0x00ff_ffff;
    if seq == 0 {
        return Vec::new();
    }
    let bytes = seq.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

/// Extract the correlation token from option 111, when present
fn correlation_token(packet: &Packet) -> Option<SessionToken> {
    let values = packet.get_option(CoapOption::Unknown(SESSION_TOKEN_OPTION))?;
    values.front().and_then(|raw| SessionToken::from_bytes(raw))
}
