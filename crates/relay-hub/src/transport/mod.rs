//! Transport abstraction for a single admitted connection.
//!
//! An agent owns its transport exclusively and splits it into a read half
//! (driven by the inbound loop) and a write half (driven by the outbound
//! loop). The hub never touches either half.

pub mod memory;

use async_trait::async_trait;

use crate::envelope::Frame;
use crate::errors::TransportError;

/// A frame received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// UTF-8 text message.
    Text(String),
    /// Binary message (expected to carry UTF-8 JSON).
    Binary(Vec<u8>),
    /// Keepalive probe from the peer.
    Ping,
    /// Keepalive reply from the peer.
    Pong,
    /// The peer initiated a close.
    Close,
}

/// Write half of a transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Write a batch of frames and flush once.
    ///
    /// Each frame must go out as its own transport message so that message
    /// boundaries survive the batching.
    async fn send_frames(&mut self, frames: &[Frame]) -> Result<(), TransportError>;

    /// Send a keepalive probe.
    async fn send_ping(&mut self) -> Result<(), TransportError>;

    /// Send a close frame.
    async fn send_close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a transport.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame. `None` means the peer hung up.
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>>;
}

/// An already-admitted, bidirectional connection.
pub trait Transport: Send + 'static {
    /// Write half.
    type Sink: FrameSink + 'static;
    /// Read half.
    type Source: FrameSource + 'static;

    /// Split into independently owned halves.
    fn split(self) -> (Self::Sink, Self::Source);
}
