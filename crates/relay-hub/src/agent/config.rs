//! Per-connection tuning.

use std::time::Duration;

/// Default mailbox capacity in frames.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;
/// Default deadline for a single transport write.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);
/// Default read-liveness window.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);
/// Default maximum inbound frame size in bytes (512 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024;

/// Runtime configuration shared by every connection agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentConfig {
    /// Outbound mailbox capacity in frames.
    pub mailbox_capacity: usize,
    /// Deadline for each transport write (frames, pings, close).
    pub write_wait: Duration,
    /// How long the peer may stay silent on the keepalive channel.
    pub pong_wait: Duration,
    /// Largest inbound frame accepted, in bytes.
    pub max_frame_size: usize,
}

impl AgentConfig {
    /// Keepalive probe interval: nine tenths of the liveness window.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait * 9 / 10
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            write_wait: DEFAULT_WRITE_WAIT,
            pong_wait: DEFAULT_PONG_WAIT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}
