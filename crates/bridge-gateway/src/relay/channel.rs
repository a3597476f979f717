//! Relay channel state
//!
//! Holds one session's lifecycle state, the reply handle back to the
//! originating exchange, the FIFO toward the remote peer, and the local
//! shutdown signal. Transitions are explicit test-and-set operations: the
//! first closer wins and every later termination signal is a no-op.

use bridge_core::{ExchangeResponder, SessionState, SessionToken};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// State and plumbing of one bridged session
pub struct RelayChannel {
    token: SessionToken,
    state: Mutex<SessionState>,
    responder: Arc<dyn ExchangeResponder>,
    outbound: mpsc::Sender<Vec<u8>>,
    shutdown: watch::Sender<bool>,
}

impl RelayChannel {
    /// Create a channel in the `Pending` state
    pub fn new(
        token: SessionToken,
        responder: Arc<dyn ExchangeResponder>,
        outbound: mpsc::Sender<Vec<u8>>,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Self {
            token,
            state: Mutex::new(SessionState::Pending),
            responder,
            outbound,
            shutdown,
        }
    }

    /// Get the session token
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Get the current state
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Get the reply handle to the originating exchange
    pub fn responder(&self) -> &Arc<dyn ExchangeResponder> {
        &self.responder
    }

    /// `Pending → Open`; false if the session was closed first
    ///
    /// Succeeds at most once over the channel's lifetime.
    pub(crate) fn transition_open(&self) -> bool {
        let mut state = self.state.lock();
        if *state == SessionState::Pending {
            *state = SessionState::Open;
            true
        } else {
            false
        }
    }

    /// Transition to `Closed`; true only for the caller that closed it
    pub(crate) fn mark_closed(&self) -> bool {
        let mut state = self.state.lock();
        if *state == SessionState::Closed {
            false
        } else {
            *state = SessionState::Closed;
            true
        }
    }

    /// Wake the relay task so it releases the duplex connection
    pub(crate) fn signal_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Close from the originating side and wake the relay task
    ///
    /// Returns false when the session was already closed, in which case
    /// the signal is ignored.
    pub fn begin_local_teardown(&self) -> bool {
        if self.mark_closed() {
            self.signal_shutdown();
            true
        } else {
            false
        }
    }

    /// Queue a payload toward the remote peer, preserving arrival order
    ///
    /// Payloads queued while the session is still `Pending` flush once the
    /// duplex connection opens. Payloads for a `Closed` session are
    /// dropped.
    pub async fn forward_local(&self, payload: Vec<u8>) {
        if self.state() == SessionState::Closed {
            tracing::debug!(session = %self.token, "dropping payload for closed session");
            return;
        }
        if self.outbound.send(payload).await.is_err() {
            tracing::debug!(session = %self.token, "relay task gone; payload dropped");
        }
    }
}

impl std::fmt::Debug for RelayChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayChannel")
            .field("token", &self.token)
            .field("state", &self.state())
            .finish()
    }
}
