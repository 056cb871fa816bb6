//! # switchboard
//!
//! Relay server binary: loads settings, initializes logging and metrics,
//! and serves the WebSocket relay until Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use switchboard_core::logging::init_subscriber;
use switchboard_server::config::ServerConfig;
use switchboard_server::metrics::install_recorder;
use switchboard_server::server::SwitchboardServer;
use switchboard_settings::{CONFIG_PATH_ENV, Environment, SwitchboardSettings, load_settings};
use tracing::{error, info, warn};

/// Time allowed for open sessions to close after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Switchboard real-time relay.
#[derive(Parser, Debug)]
#[command(name = "switchboard", about = "Real-time room relay over WebSocket")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (JSON). Falls back to `SWITCHBOARD_CONFIG`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Environment: `development` or `production`.
    #[arg(long)]
    env: Option<String>,
}

impl Cli {
    fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
    }

    /// Apply flags over loaded settings.
    fn apply(&self, settings: &mut SwitchboardSettings) -> Result<()> {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(env) = &self.env {
            settings.environment = Environment::parse(env)
                .ok_or_else(|| anyhow!("invalid --env '{env}' (expected development or production)"))?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config_path();
    let mut settings = load_settings(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("Failed to load settings from {}", path.display()),
        None => "Failed to load settings".to_string(),
    })?;
    cli.apply(&mut settings)?;

    init_subscriber(settings.log_level().as_filter_str(), settings.log_format());
    info!(
        environment = %settings.environment,
        config = ?config_path,
        "starting switchboard"
    );

    let metrics = match install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "metrics disabled");
            None
        }
    };

    let server = SwitchboardServer::new(ServerConfig::from(&settings.server), metrics);
    let (addr, handle) = match server.listen().await {
        Ok(bound) => bound,
        Err(e) => {
            error!(error = %e, "failed to start listener");
            return Err(e).context("Failed to start server");
        }
    };
    info!(%addr, ws = %format!("ws://{addr}/ws"), "switchboard ready");

    wait_for_signal().await;
    server.shutdown(handle, SHUTDOWN_GRACE).await;
    Ok(())
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                let _ = sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("switchboard").chain(args.iter().copied()))
    }

    #[test]
    fn no_flags_keep_settings() {
        let cli = parse(&[]);
        let mut settings = SwitchboardSettings::default();
        cli.apply(&mut settings).unwrap();
        assert_eq!(settings.server.port, 3001);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.environment, Environment::Development);
    }

    #[test]
    fn flags_override_settings() {
        let cli = parse(&["--host", "127.0.0.1", "--port", "8080", "--env", "production"]);
        let mut settings = SwitchboardSettings::default();
        cli.apply(&mut settings).unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.environment, Environment::Production);
    }

    #[test]
    fn invalid_env_flag_is_error() {
        let cli = parse(&["--env", "staging"]);
        let mut settings = SwitchboardSettings::default();
        assert!(cli.apply(&mut settings).is_err());
    }

    #[test]
    fn config_flag_wins() {
        let cli = parse(&["--config", "/etc/switchboard.json"]);
        assert_eq!(cli.config_path(), Some(PathBuf::from("/etc/switchboard.json")));
    }
}
