//! Hub-side handle of a connection agent.
//!
//! The handle is what the hub stores in its registry. It exposes the
//! agent's mailbox as a non-blocking enqueue and lets the hub (or the agent
//! itself) begin teardown. The transport is never reachable from here.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::envelope::{Envelope, Frame};
use crate::errors::EnvelopeError;

/// Unique id of one admitted connection.
///
/// Distinct from the client id, which is supplied by the peer, may be empty,
/// and may be reused by a later connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh, time-ordered id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Why an agent left the `Active` state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame or hung up.
    PeerClosed,
    /// Transport read failed.
    ReadError,
    /// No keepalive reply within the liveness window.
    LivenessTimeout,
    /// Peer sent a frame above the size limit.
    FrameTooLarge,
    /// Transport write failed.
    WriteFailed,
    /// Transport write exceeded its deadline.
    WriteTimeout,
    /// Mailbox was full when the hub tried to enqueue.
    MailboxFull,
    /// A newer connection registered with the same client id.
    Replaced,
    /// Removed from the hub by an explicit unregister.
    Unregistered,
    /// Process or hub shutdown.
    Shutdown,
    /// The hub coordinator was gone before or during this connection.
    HubStopped,
}

impl CloseReason {
    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadError => "read_error",
            Self::LivenessTimeout => "liveness_timeout",
            Self::FrameTooLarge => "frame_too_large",
            Self::WriteFailed => "write_failed",
            Self::WriteTimeout => "write_timeout",
            Self::MailboxFull => "mailbox_full",
            Self::Replaced => "replaced",
            Self::Unregistered => "unregistered",
            Self::Shutdown => "shutdown",
            Self::HubStopped => "hub_stopped",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a non-blocking enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The frame is in the mailbox.
    Queued,
    /// The mailbox is at capacity; the frame was dropped.
    Full,
    /// The mailbox is closed; the agent is tearing down.
    Closed,
}

/// Point-in-time view of one registered connection.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    /// Connection id.
    pub connection_id: ConnectionId,
    /// Client id (empty for anonymous connections).
    pub client_id: String,
    /// When the connection was admitted.
    pub connected_at: DateTime<Utc>,
    /// Frames dropped because the mailbox was full.
    pub dropped_frames: u64,
    /// Metadata attached at admission.
    pub metadata: HashMap<String, Value>,
}

/// The hub's handle to one connection agent.
pub struct AgentHandle {
    id: ConnectionId,
    client_id: String,
    /// `None` once closed; dropping the sender ends the outbound loop.
    mailbox: Mutex<Option<mpsc::Sender<Frame>>>,
    connected_at: DateTime<Utc>,
    started: Instant,
    dropped_frames: AtomicU64,
    metadata: Mutex<HashMap<String, Value>>,
    close_reason: Mutex<Option<CloseReason>>,
    cancel: CancellationToken,
}

impl AgentHandle {
    /// Create a handle and the receiving end of its mailbox.
    ///
    /// `cancel` is the agent's own token; pass a child of the server's
    /// shutdown token so that shutdown reaches every agent.
    pub fn new(
        client_id: impl Into<String>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: ConnectionId::generate(),
            client_id: client_id.into(),
            mailbox: Mutex::new(Some(tx)),
            connected_at: Utc::now(),
            started: Instant::now(),
            dropped_frames: AtomicU64::new(0),
            metadata: Mutex::new(HashMap::new()),
            close_reason: Mutex::new(None),
            cancel,
        };
        (Arc::new(handle), rx)
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Client id (empty for anonymous connections).
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Enqueue a frame without waiting.
    pub fn try_deliver(&self, frame: Frame) -> Delivery {
        let guard = self.mailbox.lock();
        let Some(tx) = guard.as_ref() else {
            return Delivery::Closed;
        };
        match tx.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                Delivery::Full
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Send a server-originated envelope to this client.
    ///
    /// The target is the client id, or the connection id for anonymous
    /// clients, so a direct message never reads as a broadcast.
    pub fn send_message(&self, kind: &str, payload: Value) -> Result<Delivery, EnvelopeError> {
        let target = if self.client_id.is_empty() {
            self.id.to_string()
        } else {
            self.client_id.clone()
        };
        let frame = Envelope::new(kind, payload).with_target(target).encode()?;
        Ok(self.try_deliver(frame))
    }

    /// Begin teardown: record `reason`, close the mailbox, cancel the agent.
    ///
    /// Only the first reason is kept. Returns `true` if this call was the
    /// one that started the teardown.
    pub fn close(&self, reason: CloseReason) -> bool {
        let first = {
            let mut slot = self.close_reason.lock();
            if slot.is_some() {
                false
            } else {
                *slot = Some(reason);
                true
            }
        };
        drop(self.mailbox.lock().take());
        self.cancel.cancel();
        first
    }

    /// The reason recorded by the first [`close`](Self::close), if any.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    /// Whether teardown has begun.
    pub fn is_closing(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The agent's cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Attach a metadata value.
    pub fn set_metadata(&self, key: impl Into<String>, value: Value) {
        let _ = self.metadata.lock().insert(key.into(), value);
    }

    /// Read a metadata value.
    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.metadata.lock().get(key).cloned()
    }

    /// Frames dropped because the mailbox was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Time since admission.
    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    /// Snapshot for status endpoints.
    pub fn summary(&self) -> ClientSummary {
        ClientSummary {
            connection_id: self.id,
            client_id: self.client_id.clone(),
            connected_at: self.connected_at,
            dropped_frames: self.dropped_frames(),
            metadata: self.metadata.lock().clone(),
        }
    }
}

impl fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHandle")
            .field("id", &self.id)
            .field("client_id", &self.client_id)
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
