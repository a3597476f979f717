//! Test helpers for integration tests
//!
//! In-memory implementations of both collaborator contracts, a
//! deterministic token source, and a bridge fixture that ties them
//! together.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_core::{
    AdmissionController, DuplexConnector, DuplexError, DuplexEvent, DuplexSink, DuplexStream,
    ExchangeError, ExchangeResponder, SessionIdGenerator, SessionToken,
};
use bridge_gateway::{BridgeServer, ExchangeOutcome};
use tokio::sync::mpsc;

/// How long test assertions wait for an async effect
pub const WAIT: Duration = Duration::from_secs(2);

/// Poll a condition until it holds, failing the test after a grace period
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within the grace period");
}

/// What a responder was asked to do, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    Push(Vec<u8>),
    Complete(Vec<u8>),
    Abort,
}

/// Exchange responder that records every reply
///
/// Closing the receiving end makes further pushes fail, modelling an
/// originating peer that is no longer reachable.
pub struct RecordingResponder {
    events: mpsc::UnboundedSender<ReplyEvent>,
}

impl RecordingResponder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ReplyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events: tx }), rx)
    }
}

#[async_trait]
impl ExchangeResponder for RecordingResponder {
    async fn push(&self, payload: &[u8]) -> Result<(), ExchangeError> {
        self.events
            .send(ReplyEvent::Push(payload.to_vec()))
            .map_err(|_| ExchangeError::PeerGone)
    }

    async fn complete(&self, payload: &[u8]) -> Result<(), ExchangeError> {
        self.events
            .send(ReplyEvent::Complete(payload.to_vec()))
            .map_err(|_| ExchangeError::PeerGone)
    }

    async fn abort(&self) {
        let _ = self.events.send(ReplyEvent::Abort);
    }
}

/// Await the next reply event, failing the test after a grace period
pub async fn next_reply(rx: &mut mpsc::UnboundedReceiver<ReplyEvent>) -> ReplyEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a reply event")
        .expect("reply stream ended")
}

/// Remote side of an in-memory duplex connection
pub struct RemoteEnd {
    /// Payloads the bridge sent toward the remote peer
    pub sent: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Injects events from the remote peer
    pub events: mpsc::UnboundedSender<DuplexEvent>,
    /// Set once the bridge closed its sending half
    pub closed: Arc<AtomicBool>,
}

impl RemoteEnd {
    /// Await the next payload the bridge sent here
    pub async fn recv(&mut self) -> Vec<u8> {
        tokio::time::timeout(WAIT, self.sent.recv())
            .await
            .expect("timed out waiting for a remote payload")
            .expect("remote stream ended")
    }

    /// True once the bridge closed its sending half
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

enum ConnectMode {
    Ready,
    Refuse,
    Stall,
}

/// Duplex connector whose connections are in-memory channel pairs
pub struct MemoryConnector {
    mode: ConnectMode,
    remotes: mpsc::UnboundedSender<RemoteEnd>,
}

impl MemoryConnector {
    /// Every connect succeeds; the test receives one `RemoteEnd` per session
    pub fn ready() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                mode: ConnectMode::Ready,
                remotes: tx,
            }),
            rx,
        )
    }

    /// Every connect fails immediately
    pub fn refusing() -> Arc<Self> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            mode: ConnectMode::Refuse,
            remotes: tx,
        })
    }

    /// Every connect hangs until cancelled
    pub fn stalling() -> Arc<Self> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            mode: ConnectMode::Stall,
            remotes: tx,
        })
    }
}

#[async_trait]
impl DuplexConnector for MemoryConnector {
    async fn connect(&self) -> Result<(Box<dyn DuplexSink>, Box<dyn DuplexStream>), DuplexError> {
        match self.mode {
            ConnectMode::Refuse => Err(DuplexError::Connect("connection refused".to_string())),
            ConnectMode::Stall => std::future::pending().await,
            ConnectMode::Ready => {
                let (sent_tx, sent_rx) = mpsc::unbounded_channel();
                let (event_tx, event_rx) = mpsc::unbounded_channel();
                let closed = Arc::new(AtomicBool::new(false));
                let _ = self.remotes.send(RemoteEnd {
                    sent: sent_rx,
                    events: event_tx,
                    closed: Arc::clone(&closed),
                });
                Ok((
                    Box::new(MemorySink {
                        sent: sent_tx,
                        closed,
                    }),
                    Box::new(MemoryStream { events: event_rx }),
                ))
            }
        }
    }
}

struct MemorySink {
    sent: mpsc::UnboundedSender<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl DuplexSink for MemorySink {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), DuplexError> {
        self.sent
            .send(payload)
            .map_err(|_| DuplexError::Send("remote receiver dropped".to_string()))
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

struct MemoryStream {
    events: mpsc::UnboundedReceiver<DuplexEvent>,
}

#[async_trait]
impl DuplexStream for MemoryStream {
    async fn next_event(&mut self) -> DuplexEvent {
        self.events.recv().await.unwrap_or(DuplexEvent::Closed)
    }
}

/// Deterministic token source: tok1, tok2, ...
pub struct SeqIdGenerator {
    counter: AtomicUsize,
}

impl SeqIdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for SeqIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionIdGenerator for SeqIdGenerator {
    fn generate(&self) -> SessionToken {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        SessionToken::new(format!("tok{n}"))
    }
}

/// A fully established in-memory session
pub struct OpenSession {
    pub token: SessionToken,
    pub replies: mpsc::UnboundedReceiver<ReplyEvent>,
    pub remote: RemoteEnd,
}

/// Bridge instance wired to in-memory transports
pub struct TestBridge {
    pub bridge: Arc<BridgeServer>,
    pub remotes: mpsc::UnboundedReceiver<RemoteEnd>,
}

impl TestBridge {
    /// Start a bridge with deterministic tokens and the given limit
    pub fn start(limit: usize) -> Self {
        let (connector, remotes) = MemoryConnector::ready();
        let bridge = Arc::new(BridgeServer::new(
            connector,
            AdmissionController::new(limit).expect("valid limit"),
            Arc::new(SeqIdGenerator::new()),
            Duration::from_secs(1),
        ));
        Self { bridge, remotes }
    }

    /// Start a bridge whose duplex connector uses the given implementation
    pub fn start_with_connector(limit: usize, connector: Arc<dyn DuplexConnector>) -> Self {
        let (_, remotes) = mpsc::unbounded_channel();
        let bridge = Arc::new(BridgeServer::new(
            connector,
            AdmissionController::new(limit).expect("valid limit"),
            Arc::new(SeqIdGenerator::new()),
            Duration::from_secs(1),
        ));
        Self { bridge, remotes }
    }

    /// Await the remote end of the next accepted duplex connection
    pub async fn next_remote(&mut self) -> RemoteEnd {
        tokio::time::timeout(WAIT, self.remotes.recv())
            .await
            .expect("timed out waiting for a duplex connect")
            .expect("connector dropped")
    }

    /// Drive a subscribe exchange through establishment
    ///
    /// Consumes the `{"id":…}` and `{"status":0}` pushes and returns the
    /// live session's handles.
    pub async fn open_session(&mut self) -> OpenSession {
        let (responder, mut replies) = RecordingResponder::new();
        let outcome = self
            .bridge
            .handle_exchange(crate::fixtures::subscribe_exchange(responder))
            .await;
        let ExchangeOutcome::SessionCreated { session: token } = outcome else {
            panic!("expected a new session, got {outcome:?}");
        };

        let remote = self.next_remote().await;
        assert_eq!(
            next_reply(&mut replies).await,
            ReplyEvent::Push(crate::fixtures::established_payload(&token))
        );
        assert_eq!(
            next_reply(&mut replies).await,
            ReplyEvent::Push(crate::fixtures::ready_payload())
        );

        OpenSession {
            token,
            replies,
            remote,
        }
    }
}
