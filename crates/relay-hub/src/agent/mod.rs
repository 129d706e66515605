//! Connection agents.
//!
//! One agent per admitted connection. The [`AgentHandle`] is the hub-facing
//! half (mailbox, identity, teardown). [`run_agent`] drives the transport.

mod config;
mod connection;
mod heartbeat;
mod session;

pub use config::{
    AgentConfig, DEFAULT_MAILBOX_CAPACITY, DEFAULT_MAX_FRAME_SIZE, DEFAULT_PONG_WAIT,
    DEFAULT_WRITE_WAIT,
};
pub use connection::{AgentHandle, ClientSummary, CloseReason, ConnectionId, Delivery};
pub use heartbeat::{Liveness, ping_ticker};
pub use session::{Admission, run_agent};
