//! Per-session relay task
//!
//! Owns the duplex connection halves for one session and drives every
//! transition of the `Pending → Open → Closed` lifecycle: connect with a
//! bounded wait, the two establishment pushes, the steady-state relay
//! loop, and all teardown paths. Whichever side terminates first drives
//! cleanup of the other; the registry entry is removed the moment the
//! session closes.

use super::RelayChannel;
use crate::protocol::{ChannelReady, ErrorReply, SessionEstablished};
use bridge_core::{DuplexConnector, DuplexEvent, DuplexSink, SessionRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Drive one session from `Pending` until it closes
pub(crate) async fn run_session(
    registry: Arc<SessionRegistry<RelayChannel>>,
    channel: Arc<RelayChannel>,
    connector: Arc<dyn DuplexConnector>,
    mut outbound_rx: mpsc::Receiver<Vec<u8>>,
    mut shutdown_rx: watch::Receiver<bool>,
    establish_timeout: Duration,
) {
    let token = channel.token().clone();

    let connected = tokio::select! {
        _ = shutdown_rx.changed() => {
            // local teardown while pending; the terminating caller already
            // removed the registry entry
            tracing::debug!(session = %token, "session cancelled before duplex open");
            return;
        }
        result = tokio::time::timeout(establish_timeout, connector.connect()) => result,
    };

    let (mut sink, mut stream) = match connected {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            fail_establish(&registry, &channel, &e.to_string()).await;
            return;
        }
        Err(_) => {
            fail_establish(&registry, &channel, "duplex connect timed out").await;
            return;
        }
    };

    if !channel.transition_open() {
        // closed while the connect was in flight
        sink.close().await;
        return;
    }

    tracing::info!(session = %token, "duplex connection open");

    // The token and the ready status are the first payloads the
    // originating peer observes, in that order.
    let established = SessionEstablished::new(token.clone());
    if channel.responder().push(&established.to_bytes()).await.is_err()
        || channel.responder().push(&ChannelReady::new().to_bytes()).await.is_err()
    {
        local_peer_lost(&registry, &channel, &mut sink).await;
        return;
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                tracing::debug!(session = %token, "closing duplex after local teardown");
                sink.close().await;
                break;
            }
            outbound = outbound_rx.recv() => {
                let Some(payload) = outbound else { break };
                tracing::trace!(session = %token, len = payload.len(), "forwarding payload to remote peer");
                if let Err(e) = sink.send(payload).await {
                    remote_failure(&registry, &channel, &mut sink, &e.to_string()).await;
                    break;
                }
            }
            event = stream.next_event() => match event {
                DuplexEvent::Message(payload) => {
                    tracing::trace!(session = %token, len = payload.len(), "forwarding payload to originating peer");
                    if channel.responder().push(&payload).await.is_err() {
                        local_peer_lost(&registry, &channel, &mut sink).await;
                        break;
                    }
                }
                DuplexEvent::Closed => {
                    if channel.mark_closed() {
                        registry.remove(&token);
                        channel.responder().abort().await;
                        tracing::info!(session = %token, "remote peer closed the session");
                    }
                    sink.close().await;
                    break;
                }
                DuplexEvent::Error(reason) => {
                    remote_failure(&registry, &channel, &mut sink, &reason).await;
                    break;
                }
            }
        }
    }
}

/// `Pending → Closed`: the duplex connection never opened
async fn fail_establish(
    registry: &SessionRegistry<RelayChannel>,
    channel: &RelayChannel,
    reason: &str,
) {
    if channel.mark_closed() {
        registry.remove(channel.token());
        tracing::warn!(session = %channel.token(), error = %reason, "duplex connect failed");
        let _ = channel
            .responder()
            .push(&ErrorReply::remote_transport().to_bytes())
            .await;
        channel.responder().abort().await;
    }
}

/// `Open → Closed`: the duplex connection failed while relaying
async fn remote_failure(
    registry: &SessionRegistry<RelayChannel>,
    channel: &RelayChannel,
    sink: &mut Box<dyn DuplexSink>,
    reason: &str,
) {
    if channel.mark_closed() {
        registry.remove(channel.token());
        tracing::warn!(session = %channel.token(), error = %reason, "duplex transport failed");
        let _ = channel
            .responder()
            .push(&ErrorReply::remote_transport().to_bytes())
            .await;
        channel.responder().abort().await;
    }
    sink.close().await;
}

/// The originating exchange became unreachable; tear down silently
async fn local_peer_lost(
    registry: &SessionRegistry<RelayChannel>,
    channel: &RelayChannel,
    sink: &mut Box<dyn DuplexSink>,
) {
    if channel.mark_closed() {
        registry.remove(channel.token());
        tracing::debug!(session = %channel.token(), "originating exchange unreachable; closing duplex");
    }
    sink.close().await;
}
