//! # relay-hub
//!
//! Real-time connection hub core.
//!
//! - [`envelope`]: the JSON message envelope and its encode/decode rules
//! - [`hub`]: the registry and routing authority ([`Hub`], [`HubCoordinator`])
//! - [`agent`]: per-connection agents with inbound and outbound loops
//! - [`transport`]: the framed-transport seam, plus an in-memory transport
//! - [`metrics`]: metric names recorded by the hub and its agents

#![deny(unsafe_code)]

pub mod agent;
pub mod envelope;
pub mod errors;
pub mod hub;
pub mod metrics;
pub mod transport;

pub use agent::{AgentConfig, AgentHandle, Admission, CloseReason, ConnectionId, run_agent};
pub use envelope::{Envelope, Frame};
pub use errors::{EnvelopeError, HubError, TransportError};
pub use hub::{DispatchOutcome, Hub, HubConfig, HubCoordinator, MessageHub, Route, Undelivered};
