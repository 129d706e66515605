//! # relayd
//!
//! Relay daemon binary. Loads settings, starts the hub coordinator and the
//! HTTP/WebSocket server, then waits for Ctrl-C.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relay_hub::Hub;
use relay_server::{RelayServer, ServerConfig, ShutdownCoordinator};
use relay_settings::RelaySettings;

/// Relay hub daemon.
#[derive(Parser, Debug)]
#[command(name = "relayd", about = "Real-time message relay hub")]
struct Cli {
    /// Host to bind (overrides settings if specified).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings if specified).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file. Defaults to `~/.relay/settings.json`.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(relay_settings::settings_path)
    }

    /// Layer CLI flags over loaded settings and re-validate.
    fn apply(&self, mut settings: RelaySettings) -> Result<RelaySettings> {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        settings
            .validate()
            .context("Invalid command-line override")?;
        Ok(settings)
    }
}

fn resolve_settings(
    cli: &Cli,
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<RelaySettings> {
    let settings = relay_settings::load_with_env(path, env)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let path = args.settings_path();
    let settings = resolve_settings(&args, &path, |name| std::env::var(name).ok())?;

    relay_server::logging::init_subscriber(&settings.logging.level);
    let metrics = relay_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = ServerConfig::from(&settings);
    let shutdown = Arc::new(ShutdownCoordinator::new());
    let (hub, hub_task) = Hub::start(&config.hub, shutdown.child_token());
    let server = RelayServer::new(config.clone(), hub, shutdown.clone(), Some(metrics));

    let (addr, serve_task) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!(
        %addr,
        settings = %path.display(),
        max_connections = config.max_connections,
        "relay listening on ws://{addr}/ws"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let clean = shutdown
        .graceful_shutdown(vec![serve_task, hub_task], config.shutdown_timeout)
        .await;
    if !clean {
        tracing::warn!("some tasks did not stop within the shutdown timeout");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn cli_defaults_to_no_overrides() {
        let cli = Cli::parse_from(["relayd"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.settings.is_none());
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn cli_custom_port() {
        let cli = Cli::parse_from(["relayd", "--port", "9000"]);
        assert_eq!(cli.port, Some(9000));
    }

    #[test]
    fn cli_rejects_out_of_range_port() {
        assert!(Cli::try_parse_from(["relayd", "--port", "70000"]).is_err());
    }

    #[test]
    fn cli_settings_path() {
        let cli = Cli::parse_from(["relayd", "--settings", "/tmp/relay.json"]);
        assert_eq!(cli.settings_path(), PathBuf::from("/tmp/relay.json"));
    }

    #[test]
    fn default_settings_path_under_relay_dir() {
        let cli = Cli::parse_from(["relayd"]);
        let path = cli.settings_path();
        assert!(path.to_string_lossy().contains(".relay"));
        assert!(path.to_string_lossy().ends_with("settings.json"));
    }

    #[test]
    fn flags_override_file_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"host": "10.0.0.1", "port": 7000}, "logging": {"level": "warn"}}"#,
        )
        .unwrap();

        let cli = Cli::parse_from(["relayd", "--port", "7100", "--log-level", "debug"]);
        let settings = resolve_settings(&cli, &path, no_env).unwrap();
        assert_eq!(settings.server.host, "10.0.0.1");
        assert_eq!(settings.server.port, 7100);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn flags_override_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let env = |name: &str| (name == "RELAY_HOST").then(|| "192.168.1.5".to_string());

        let from_env = resolve_settings(&Cli::parse_from(["relayd"]), &path, env).unwrap();
        assert_eq!(from_env.server.host, "192.168.1.5");

        let cli = Cli::parse_from(["relayd", "--host", "127.0.0.1"]);
        let settings = resolve_settings(&cli, &path, env).unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
    }

    #[test]
    fn empty_host_flag_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from(["relayd", "--host", " "]);
        let err = resolve_settings(&cli, &dir.path().join("none.json"), no_env).unwrap_err();
        assert!(format!("{err:#}").contains("server.host"));
    }

    #[test]
    fn broken_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = resolve_settings(&Cli::parse_from(["relayd"]), &path, no_env).unwrap_err();
        assert!(err.to_string().contains("Failed to load settings"));
    }

    #[test]
    fn settings_feed_server_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"hub": {"mailboxCapacity": 32}}"#).unwrap();

        let settings = resolve_settings(&Cli::parse_from(["relayd"]), &path, no_env).unwrap();
        let config = ServerConfig::from(&settings);
        assert_eq!(config.agent.mailbox_capacity, 32);
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }
}
