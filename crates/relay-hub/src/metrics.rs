//! Metric names recorded by the hub.
//!
//! Recording goes through the `metrics` facade; installing a recorder is the
//! embedding process's job.

/// Connections admitted and registered (counter).
pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Connections torn down (counter, labels: reason).
pub const DISCONNECTIONS_TOTAL: &str = "relay_disconnections_total";
/// Currently registered connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Frames handed to mailboxes (counter, labels: route).
pub const FRAMES_ROUTED_TOTAL: &str = "relay_frames_routed_total";
/// Inbound frames that failed to decode (counter).
pub const FRAMES_MALFORMED_TOTAL: &str = "relay_frames_malformed_total";
/// Unicast dispatches whose target was not registered (counter).
pub const DISPATCH_MISSES_TOTAL: &str = "relay_dispatch_misses_total";
/// Agents evicted because their mailbox was full (counter).
pub const MAILBOX_EVICTIONS_TOTAL: &str = "relay_mailbox_evictions_total";
/// Connection lifetime in seconds (histogram).
pub const CONNECTION_DURATION_SECONDS: &str = "relay_connection_duration_seconds";
