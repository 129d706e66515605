//! Server configuration.

use std::time::Duration;

use relay_hub::{AgentConfig, HubConfig};
use relay_settings::RelaySettings;

/// Runtime configuration for [`RelayServer`](crate::server::RelayServer).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Upgrades are refused with `503` once this many clients are connected.
    pub max_connections: usize,
    /// Grace period for background tasks at shutdown.
    pub shutdown_timeout: Duration,
    /// Hub coordinator tuning.
    pub hub: HubConfig,
    /// Per-connection agent tuning.
    pub agent: AgentConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 10_000,
            shutdown_timeout: Duration::from_secs(5),
            hub: HubConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl From<&RelaySettings> for ServerConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            shutdown_timeout: settings.server.shutdown_timeout(),
            hub: HubConfig {
                command_capacity: settings.hub.command_capacity,
            },
            agent: AgentConfig {
                mailbox_capacity: settings.hub.mailbox_capacity,
                write_wait: settings.hub.write_wait(),
                pong_wait: settings.hub.pong_wait(),
                max_frame_size: settings.hub.max_frame_bytes,
            },
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
