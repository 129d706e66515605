//! Connection agent lifecycle: one admitted transport from registration
//! through teardown.
//!
//! ```text
//! Admitted → Registered → Active (inbound ∥ outbound) → Closing → Unregistered
//! ```
//!
//! The inbound loop runs on the caller's task, the outbound loop on a
//! spawned one. Whichever side fails first records the close reason and
//! cancels the agent; the inbound side then unregisters exactly once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{self, error::Elapsed};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, instrument, trace, warn};

use super::config::AgentConfig;
use super::connection::{AgentHandle, CloseReason};
use super::heartbeat::{Liveness, ping_ticker};
use crate::envelope::{Envelope, Frame};
use crate::errors::{HubError, TransportError};
use crate::hub::{DispatchOutcome, Hub};
use crate::metrics::{
    CONNECTION_DURATION_SECONDS, CONNECTIONS_TOTAL, DISCONNECTIONS_TOTAL, FRAMES_MALFORMED_TOTAL,
};
use crate::transport::{FrameSink, FrameSource, InboundFrame, Transport};

/// What the admission layer knows about a connection before it starts.
#[derive(Clone, Debug, Default)]
pub struct Admission {
    /// Client id supplied by the peer; empty for anonymous connections.
    pub client_id: String,
    /// Metadata attached to the agent for status queries.
    pub metadata: HashMap<String, Value>,
}

impl Admission {
    /// Admit a connection under `client_id`.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata value.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.metadata.insert(key.into(), value);
        self
    }
}

/// Run one connection agent to completion.
///
/// Registers with `hub`, pumps frames in both directions until the
/// connection ends, unregisters, and returns why it ended. `shutdown` is the
/// server-wide token; the agent runs under a child of it.
#[instrument(
    skip_all,
    fields(client_id = %admission.client_id, connection_id = tracing::field::Empty)
)]
pub async fn run_agent<T: Transport>(
    hub: Hub,
    transport: T,
    admission: Admission,
    config: AgentConfig,
    shutdown: CancellationToken,
) -> CloseReason {
    let (handle, mailbox) = AgentHandle::new(
        admission.client_id,
        config.mailbox_capacity,
        shutdown.child_token(),
    );
    for (key, value) in admission.metadata {
        handle.set_metadata(key, value);
    }
    let _ = Span::current().record("connection_id", tracing::field::display(handle.id()));

    let (mut sink, source) = transport.split();

    if hub.register(handle.clone()).await.is_err() {
        warn!("hub stopped, refusing connection");
        send_close(&mut sink, config.write_wait).await;
        return CloseReason::HubStopped;
    }
    counter!(CONNECTIONS_TOTAL).increment(1);
    info!("client connected");

    let outbound = tokio::spawn(
        write_loop(handle.clone(), sink, mailbox, config.clone()).instrument(Span::current()),
    );

    let reason = read_loop(&hub, &handle, source, &config).await;
    let _ = handle.close(reason);
    if hub.unregister(handle.id()).await.is_err() {
        debug!("hub already stopped during teardown");
    }
    if let Err(e) = outbound.await {
        warn!(error = %e, "outbound loop did not finish cleanly");
    }

    let reason = handle.close_reason().unwrap_or(reason);
    info!(
        reason = %reason,
        dropped = handle.dropped_frames(),
        "client disconnected"
    );
    counter!(DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    histogram!(CONNECTION_DURATION_SECONDS).record(handle.age().as_secs_f64());
    reason
}

/// Inbound loop: decode, stamp, dispatch. Returns the reason it stopped.
async fn read_loop<S: FrameSource>(
    hub: &Hub,
    handle: &AgentHandle,
    mut source: S,
    config: &AgentConfig,
) -> CloseReason {
    let cancel = handle.cancel_token();
    let mut liveness = Liveness::new(config.pong_wait);

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                return handle.close_reason().unwrap_or(CloseReason::Shutdown);
            }
            next = time::timeout_at(liveness.deadline(), source.next_frame()) => next,
        };

        let frame = match next {
            Err(_) => {
                warn!(window = ?config.pong_wait, "no keepalive reply, disconnecting");
                return CloseReason::LivenessTimeout;
            }
            Ok(None) => return CloseReason::PeerClosed,
            Ok(Some(Err(e))) => {
                debug!(error = %e, "transport read failed");
                return CloseReason::ReadError;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let decoded = match frame {
            InboundFrame::Text(text) => {
                if text.len() > config.max_frame_size {
                    warn!(len = text.len(), limit = config.max_frame_size, "frame too large");
                    return CloseReason::FrameTooLarge;
                }
                Envelope::decode(&text)
            }
            InboundFrame::Binary(bytes) => {
                if bytes.len() > config.max_frame_size {
                    warn!(len = bytes.len(), limit = config.max_frame_size, "frame too large");
                    return CloseReason::FrameTooLarge;
                }
                Envelope::decode_bytes(&bytes)
            }
            InboundFrame::Ping | InboundFrame::Pong => {
                liveness.mark_alive();
                continue;
            }
            InboundFrame::Close => {
                debug!("client sent close frame");
                return CloseReason::PeerClosed;
            }
        };

        let envelope = match decoded {
            Ok(envelope) => envelope,
            Err(e) => {
                counter!(FRAMES_MALFORMED_TOTAL).increment(1);
                warn!(error = %e, "dropping undecodable frame");
                continue;
            }
        };

        if forward(hub, handle, envelope).await.is_err() {
            return CloseReason::HubStopped;
        }
    }
}

/// Stamp the sender and hand the envelope to the hub.
///
/// Empty target fans out to everyone but this agent; otherwise unicast.
async fn forward(hub: &Hub, handle: &AgentHandle, mut envelope: Envelope) -> Result<(), HubError> {
    envelope.stamp_sender(handle.client_id());
    let frame = match envelope.encode() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, kind = %envelope.kind, "failed to re-encode envelope");
            return Ok(());
        }
    };

    trace!(kind = %envelope.kind, target = %envelope.target, "routing frame");
    let outcome = if envelope.is_broadcast() {
        hub.broadcast_except(handle.id(), frame).await?
    } else {
        hub.send_to(&envelope.target, frame).await?
    };

    if let DispatchOutcome::NotDelivered(why) = outcome {
        debug!(
            kind = %envelope.kind,
            target = %envelope.target,
            reason = why.as_str(),
            "frame not delivered"
        );
    }
    Ok(())
}

/// Outbound loop: drain the mailbox in batches, probe on the ping ticker,
/// and send a close frame once the mailbox closes or the agent is cancelled.
///
/// A due probe is written before the next batch, so keepalives keep their
/// cadence under sustained traffic.
async fn write_loop<K: FrameSink>(
    handle: Arc<AgentHandle>,
    mut sink: K,
    mut mailbox: mpsc::Receiver<Frame>,
    config: AgentConfig,
) {
    let cancel = handle.cancel_token();
    let mut ping = ping_ticker(config.ping_period());
    let mut batch: Vec<Frame> = Vec::new();

    loop {
        tokio::select! {
            biased;

            _ = ping.tick() => {
                let result = time::timeout(config.write_wait, sink.send_ping()).await;
                if let Err(reason) = check_write(result) {
                    warn!(reason = %reason, "keepalive probe failed, closing connection");
                    let _ = handle.close(reason);
                    return;
                }
            }

            received = mailbox.recv() => {
                let Some(first) = received else {
                    send_close(&mut sink, config.write_wait).await;
                    return;
                };
                batch.push(first);
                while batch.len() < config.mailbox_capacity {
                    match mailbox.try_recv() {
                        Ok(next) => batch.push(next),
                        Err(_) => break,
                    }
                }

                let frames = batch.len();
                let result = time::timeout(config.write_wait, sink.send_frames(&batch)).await;
                batch.clear();
                if let Err(reason) = check_write(result) {
                    warn!(reason = %reason, frames, "write failed, closing connection");
                    let _ = handle.close(reason);
                    return;
                }
            }

            () = cancel.cancelled() => {
                send_close(&mut sink, config.write_wait).await;
                return;
            }
        }
    }
}

fn check_write(result: Result<Result<(), TransportError>, Elapsed>) -> Result<(), CloseReason> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!(error = %e, "transport write failed");
            Err(CloseReason::WriteFailed)
        }
        Err(_) => Err(CloseReason::WriteTimeout),
    }
}

async fn send_close<K: FrameSink>(sink: &mut K, deadline: Duration) {
    match time::timeout(deadline, sink.send_close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "close frame not sent"),
        Err(_) => debug!("close frame timed out"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
