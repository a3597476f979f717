//! Bridge server
//!
//! Classifies every inbound exchange and orchestrates the session
//! components: relay to an existing session, admit and establish a new
//! one, or answer inline with an error payload.

use crate::protocol::ErrorReply;
use crate::relay::{self, RelayChannel, OUTBOUND_BUFFER_SIZE};
use bridge_core::{
    AdmissionController, DuplexConnector, ExchangeResponder, InboundExchange, SessionIdGenerator,
    SessionRegistry, SessionToken,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Outcome of classifying one inbound exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Payload forwarded to an existing session
    Relayed { session: SessionToken },
    /// A new session was admitted, registered, and is establishing
    SessionCreated { session: SessionToken },
    /// Answered inline: the session limit is reached
    CapacityExceeded,
    /// Answered inline: neither correlated nor subscribe-style
    ProtocolViolation,
    /// A generated token collided with a live session; attempt dropped
    CollisionDropped,
}

/// The bridge: session registry, admission policy, and classification
pub struct BridgeServer {
    registry: Arc<SessionRegistry<RelayChannel>>,
    admission: AdmissionController,
    ids: Arc<dyn SessionIdGenerator>,
    connector: Arc<dyn DuplexConnector>,
    establish_timeout: Duration,
    // serializes "check capacity, then register" so concurrent
    // establishment attempts cannot over-admit
    admission_gate: Mutex<()>,
}

impl BridgeServer {
    /// Create a bridge server
    pub fn new(
        connector: Arc<dyn DuplexConnector>,
        admission: AdmissionController,
        ids: Arc<dyn SessionIdGenerator>,
        establish_timeout: Duration,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            admission,
            ids,
            connector,
            establish_timeout,
            admission_gate: Mutex::new(()),
        }
    }

    /// Get the session registry
    pub fn registry(&self) -> &SessionRegistry<RelayChannel> {
        &self.registry
    }

    /// Get the admission controller
    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.registry.size()
    }

    /// Classify and handle one inbound exchange
    pub async fn handle_exchange(&self, exchange: InboundExchange) -> ExchangeOutcome {
        let InboundExchange {
            token,
            subscribe,
            payload,
            responder,
        } = exchange;

        // A live correlation token always means relay, even when the
        // exchange also carries subscribe semantics.
        if let Some(token) = token {
            if let Some(channel) = self.registry.get(&token) {
                tracing::debug!(session = %token, len = payload.len(), "relaying payload");
                channel.forward_local(payload).await;
                let _ = responder.complete(&[]).await;
                return ExchangeOutcome::Relayed { session: token };
            }
            // A stale token never resurrects state: a subscribe-style
            // exchange establishes a fresh session, anything else is a
            // protocol violation.
            tracing::debug!(session = %token, "correlation token does not resolve to a live session");
        }

        if !subscribe {
            tracing::debug!("rejecting exchange: no live token and not subscribe-style");
            let _ = responder
                .complete(&ErrorReply::protocol_violation().to_bytes())
                .await;
            return ExchangeOutcome::ProtocolViolation;
        }

        self.establish_session(responder).await
    }

    /// Admit, register, and start establishing a new session
    async fn establish_session(&self, responder: Arc<dyn ExchangeResponder>) -> ExchangeOutcome {
        // Capacity check and registration are one critical section; no
        // awaits happen while the gate is held.
        let admitted = {
            let _gate = self.admission_gate.lock();
            if self.admission.has_capacity(&self.registry) {
                let token = self.ids.generate();
                let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER_SIZE);
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                let channel = Arc::new(RelayChannel::new(
                    token.clone(),
                    Arc::clone(&responder),
                    outbound_tx,
                    shutdown_tx,
                ));
                Some(
                    self.registry
                        .put(token.clone(), Arc::clone(&channel))
                        .map(|()| (token, channel, outbound_rx, shutdown_rx)),
                )
            } else {
                None
            }
        };

        match admitted {
            None => {
                tracing::warn!(
                    limit = self.admission.limit(),
                    "admission rejected: session limit reached"
                );
                let _ = responder
                    .complete(&ErrorReply::capacity_exceeded().to_bytes())
                    .await;
                ExchangeOutcome::CapacityExceeded
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "dropping establishment attempt");
                responder.abort().await;
                ExchangeOutcome::CollisionDropped
            }
            Some(Ok((token, channel, outbound_rx, shutdown_rx))) => {
                tracing::info!(
                    session = %token,
                    sessions = self.registry.size(),
                    "session admitted"
                );
                tokio::spawn(relay::run_session(
                    Arc::clone(&self.registry),
                    channel,
                    Arc::clone(&self.connector),
                    outbound_rx,
                    shutdown_rx,
                    self.establish_timeout,
                ));
                ExchangeOutcome::SessionCreated { session: token }
            }
        }
    }

    /// Tear down a session on behalf of the originating peer
    ///
    /// Idempotent: terminating an absent or already-closed session is a
    /// no-op. The registry entry is removed before the relay task is
    /// woken, so no observer sees a closed session as live.
    pub fn terminate_session(&self, token: &SessionToken) {
        let Some(channel) = self.registry.get(token) else {
            return;
        };
        if channel.mark_closed() {
            self.registry.remove(token);
            channel.signal_shutdown();
            tracing::info!(session = %token, "session torn down by originating peer");
        }
    }
}

impl std::fmt::Debug for BridgeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeServer")
            .field("sessions", &self.registry.size())
            .field("limit", &self.admission.limit())
            .finish()
    }
}
