//! Hub error types.
//!
//! Nothing in here is process-fatal. Envelope errors are local to a single
//! frame, transport errors end exactly one connection, and [`HubError`] only
//! surfaces once the coordinator has stopped.

use thiserror::Error;

/// A single inbound frame could not be decoded or a frame could not be encoded.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The frame is not a JSON object with a string `kind`.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A binary frame did not carry UTF-8 text.
    #[error("envelope is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
}

/// Failure reading from or writing to a connection's transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying connection is already closed.
    #[error("transport closed")]
    Closed,
    /// Error reported by the transport implementation.
    #[error("transport error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Wrap an implementation-specific error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// The hub coordinator is no longer accepting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HubError {
    /// The coordinator task has exited (shutdown or every handle dropped).
    #[error("hub coordinator has stopped")]
    Stopped,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err = EnvelopeError::from(json_err);
        assert!(err.to_string().starts_with("malformed envelope"));
    }

    #[test]
    fn backend_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err = TransportError::backend(io);
        assert!(err.to_string().contains("pipe gone"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn hub_stopped_display() {
        assert_eq!(HubError::Stopped.to_string(), "hub coordinator has stopped");
    }
}
