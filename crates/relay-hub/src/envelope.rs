//! Session envelope: the routed message unit.
//!
//! Wire shape is a JSON object with exactly four keys, always emitted in the
//! same order:
//!
//! ```json
//! {"kind":"chat","sender":"alice","target":"","payload":"hi"}
//! ```
//!
//! `kind` is mandatory on decode. `sender` is accepted on the wire but never
//! trusted: agents overwrite it with their own client id before routing.
//! An empty `target` means "broadcast".

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EnvelopeError;

/// A serialized frame ready for a mailbox.
///
/// One allocation is shared by every recipient of a fan-out.
pub type Frame = Arc<str>;

/// The routed message unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message kind. The only field a receiver needs to interpret `payload`.
    pub kind: String,
    /// Client id of the originating connection (empty for server-originated).
    #[serde(default)]
    pub sender: String,
    /// Client id of the intended recipient (empty for broadcast).
    #[serde(default)]
    pub target: String,
    /// Opaque payload; never inspected by the hub.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Build a server-originated broadcast envelope.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            sender: String::new(),
            target: String::new(),
            payload,
        }
    }

    /// Address this envelope to a single client.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Decode an envelope from a text frame.
    pub fn decode(text: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode an envelope from a binary frame carrying UTF-8 JSON.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let text = std::str::from_utf8(bytes)?;
        Self::decode(text)
    }

    /// Serialize into a shareable frame.
    pub fn encode(&self) -> Result<Frame, EnvelopeError> {
        let json = serde_json::to_string(self)?;
        Ok(Arc::from(json))
    }

    /// Overwrite the sender with the id of the connection that produced it.
    pub fn stamp_sender(&mut self, client_id: &str) {
        client_id.clone_into(&mut self.sender);
    }

    /// Whether this envelope fans out rather than targeting one client.
    pub fn is_broadcast(&self) -> bool {
        self.target.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
