//! In-process transport backed by unbounded channels.
//!
//! The [`MemoryPeer`] plays the remote client: it injects inbound frames,
//! observes everything the agent writes, and can stall the write half to
//! simulate a peer that stopped reading.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{FrameSink, FrameSource, InboundFrame, Transport};
use crate::envelope::Frame;
use crate::errors::TransportError;

/// Something the agent wrote to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A routed frame.
    Text(Frame),
    /// A keepalive probe.
    Ping,
    /// A close frame.
    Close,
}

type Inbound = Result<InboundFrame, TransportError>;

/// Create a connected transport / peer pair.
pub fn pair() -> (MemoryTransport, MemoryPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let stalled = Arc::new(AtomicBool::new(false));
    let flushes = Arc::new(AtomicUsize::new(0));

    let transport = MemoryTransport {
        sink: MemorySink {
            outbound: outbound_tx,
            stalled: stalled.clone(),
            flushes: flushes.clone(),
        },
        source: MemorySource { inbound: inbound_rx },
    };
    let peer = MemoryPeer {
        inbound: Some(inbound_tx),
        outbound: outbound_rx,
        stalled,
        flushes,
    };
    (transport, peer)
}

/// Agent side of an in-memory connection.
pub struct MemoryTransport {
    sink: MemorySink,
    source: MemorySource,
}

impl Transport for MemoryTransport {
    type Sink = MemorySink;
    type Source = MemorySource;

    fn split(self) -> (MemorySink, MemorySource) {
        (self.sink, self.source)
    }
}

/// Write half of a [`MemoryTransport`].
pub struct MemorySink {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    stalled: Arc<AtomicBool>,
    flushes: Arc<AtomicUsize>,
}

impl MemorySink {
    async fn write(
        &self,
        frames: impl IntoIterator<Item = OutboundFrame>,
    ) -> Result<(), TransportError> {
        if self.stalled.load(Ordering::Acquire) {
            std::future::pending::<()>().await;
        }
        for frame in frames {
            self.outbound
                .send(frame)
                .map_err(|_| TransportError::Closed)?;
        }
        let _ = self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_frames(&mut self, frames: &[Frame]) -> Result<(), TransportError> {
        self.write(frames.iter().cloned().map(OutboundFrame::Text)).await
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.write([OutboundFrame::Ping]).await
    }

    async fn send_close(&mut self) -> Result<(), TransportError> {
        self.write([OutboundFrame::Close]).await
    }
}

/// Read half of a [`MemoryTransport`].
pub struct MemorySource {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }
}

/// Remote side of an in-memory connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    stalled: Arc<AtomicBool>,
    flushes: Arc<AtomicUsize>,
}

impl MemoryPeer {
    /// Deliver a frame to the agent. Returns `false` once the agent stopped reading.
    pub fn send(&self, frame: InboundFrame) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(frame)).is_ok())
    }

    /// Deliver a text frame to the agent.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(InboundFrame::Text(text.into()))
    }

    /// Make the agent's next read fail.
    pub fn fail_read(&self, err: TransportError) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Err(err)).is_ok())
    }

    /// Close the read side without a close frame.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Make every subsequent write from the agent hang.
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::Release);
    }

    /// Number of completed write flushes.
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Wait for the next thing the agent wrote. `None` once the agent dropped its sink.
    pub async fn recv(&mut self) -> Option<OutboundFrame> {
        self.outbound.recv().await
    }

    /// Wait for the next text frame, skipping keepalive probes.
    pub async fn recv_text(&mut self) -> Option<Frame> {
        loop {
            match self.outbound.recv().await? {
                OutboundFrame::Text(frame) => return Some(frame),
                OutboundFrame::Ping => {}
                OutboundFrame::Close => return None,
            }
        }
    }

    /// Take whatever the agent already wrote without waiting.
    pub fn try_recv(&mut self) -> Option<OutboundFrame> {
        self.outbound.try_recv().ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
