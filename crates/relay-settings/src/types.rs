//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file may be partial: missing fields get their compiled default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the relay daemon.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "hub": { "mailboxCapacity": 512 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Listener and admission settings.
    pub server: ServerSettings,
    /// Hub and per-connection tuning.
    pub hub: HubSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.hub.validate()?;
        self.logging.validate()
    }
}

/// Listener and admission settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks an ephemeral port.
    pub port: u16,
    /// Connections admitted before new upgrades are refused.
    pub max_connections: usize,
    /// How long shutdown waits for background tasks, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 10_000,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl ServerSettings {
    /// Shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(invalid("server.host must not be empty"));
        }
        if self.max_connections == 0 {
            return Err(invalid("server.maxConnections must be at least 1"));
        }
        Ok(())
    }
}

/// Hub and per-connection tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Depth of the hub's command queue.
    pub command_capacity: usize,
    /// Per-connection outbound mailbox capacity, in frames.
    pub mailbox_capacity: usize,
    /// Deadline for each transport write, in milliseconds.
    pub write_wait_ms: u64,
    /// Liveness window, in milliseconds. Keepalive probes go out at 9/10 of it.
    pub pong_wait_ms: u64,
    /// Largest inbound frame accepted, in bytes.
    pub max_frame_bytes: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            command_capacity: 256,
            mailbox_capacity: 256,
            write_wait_ms: 10_000,
            pong_wait_ms: 60_000,
            max_frame_bytes: 512 * 1024,
        }
    }
}

impl HubSettings {
    /// Per-write deadline.
    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    /// Liveness window.
    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.command_capacity == 0 {
            return Err(invalid("hub.commandCapacity must be at least 1"));
        }
        if self.mailbox_capacity == 0 {
            return Err(invalid("hub.mailboxCapacity must be at least 1"));
        }
        if self.write_wait_ms == 0 {
            return Err(invalid("hub.writeWaitMs must be positive"));
        }
        if self.pong_wait_ms < 10 {
            return Err(invalid("hub.pongWaitMs must be at least 10"));
        }
        if self.write_wait_ms >= self.pong_wait_ms {
            return Err(invalid(format!(
                "hub.writeWaitMs ({}) must be below hub.pongWaitMs ({})",
                self.write_wait_ms, self.pong_wait_ms
            )));
        }
        if self.max_frame_bytes < 64 {
            return Err(invalid("hub.maxFrameBytes must be at least 64"));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingSettings {
    fn validate(&self) -> Result<()> {
        if self.level.trim().is_empty() {
            return Err(invalid("logging.level must not be empty"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> SettingsError {
    SettingsError::InvalidValue(msg.into())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_serialize_camel_case() {
        insta::assert_json_snapshot!(RelaySettings::default(), @r###"
        {
          "server": {
            "host": "0.0.0.0",
            "port": 8080,
            "maxConnections": 10000,
            "shutdownTimeoutMs": 5000
          },
          "hub": {
            "commandCapacity": 256,
            "mailboxCapacity": 256,
            "writeWaitMs": 10000,
            "pongWaitMs": 60000,
            "maxFrameBytes": 524288
          },
          "logging": {
            "level": "info"
          }
        }
        "###);
    }

    #[test]
    fn defaults_are_valid() {
        RelaySettings::default().validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: RelaySettings =
            serde_json::from_str(r#"{"hub": {"pongWaitMs": 30000}}"#).unwrap();
        assert_eq!(settings.hub.pong_wait(), Duration::from_secs(30));
        assert_eq!(settings.hub.mailbox_capacity, 256);
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn durations() {
        let hub = HubSettings::default();
        assert_eq!(hub.write_wait(), Duration::from_secs(10));
        assert_eq!(hub.pong_wait(), Duration::from_secs(60));
        assert_eq!(
            ServerSettings::default().shutdown_timeout(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn zero_mailbox_rejected() {
        let mut settings = RelaySettings::default();
        settings.hub.mailbox_capacity = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("mailboxCapacity"));
    }

    #[test]
    fn write_wait_must_be_below_pong_wait() {
        let mut settings = RelaySettings::default();
        settings.hub.write_wait_ms = 60_000;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn tiny_frame_limit_rejected() {
        let mut settings = RelaySettings::default();
        settings.hub.max_frame_bytes = 8;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn empty_host_rejected() {
        let mut settings = RelaySettings::default();
        settings.server.host = "  ".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_max_connections_rejected() {
        let mut settings = RelaySettings::default();
        settings.server.max_connections = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn empty_log_level_rejected() {
        let mut settings = RelaySettings::default();
        settings.logging.level = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn ephemeral_port_is_allowed() {
        let mut settings = RelaySettings::default();
        settings.server.port = 0;
        settings.validate().unwrap();
    }
}
