//! SoftAP onboarding CLI
//!
//! Talks to a device over its onboarding access point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use softap_onboard::config::Config;
use softap_onboard::network::{
    BypassConfigurator, GrantedPermission, HotspotJoiner, PollingPresenceMonitor,
    StaticWirelessInterface,
};
use softap_onboard::{ConnectionOrchestrator, ConnectionStatus};
use softap_protocol::{AccessPointDescriptor, ConnectionCommand, SocketEvent, WiFiCredentials};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// SoftAP onboarding - query and configure a device over its access point.
#[derive(Parser, Debug)]
#[command(name = "softap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Device address (overrides configuration)
    #[arg(long, global = true, value_name = "HOST")]
    pub host: Option<String>,

    /// Device port (overrides configuration)
    #[arg(long, global = true, value_name = "PORT")]
    pub port: Option<u16>,

    /// Name of the device access point
    #[arg(long, global = true, value_name = "SSID")]
    pub ap_ssid: Option<String>,

    /// Passphrase of the device access point
    #[arg(long, global = true, value_name = "PASSPHRASE")]
    pub ap_passphrase: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show whether the device is claimed
    ClaimStatus,

    /// List the Wi-Fi networks the device can see
    Networks,

    /// Show the device's backend registration status
    RegisterStatus,

    /// Show the device's connectivity status
    Connectivity,

    /// Ask the device to rescan and accept new credentials
    ChangeCredentials,

    /// Send Wi-Fi credentials to the device
    SetCredentials {
        /// Network the device should join
        #[arg(long)]
        ssid: String,

        /// Password for that network
        #[arg(long)]
        password: String,
    },

    /// Print inbound device events until interrupted
    Watch,
}

impl Commands {
    /// The device command a subcommand sends, if any.
    pub fn connection_command(&self) -> Option<ConnectionCommand> {
        match self {
            Commands::ClaimStatus => Some(ConnectionCommand::ClaimStatus),
            Commands::Networks => Some(ConnectionCommand::WiFiNetworks),
            Commands::RegisterStatus => Some(ConnectionCommand::RegisterStatus),
            Commands::Connectivity => Some(ConnectionCommand::ConnectivityStatus),
            Commands::ChangeCredentials => Some(ConnectionCommand::ChangeNetworkCredentials),
            Commands::SetCredentials { ssid, password } => Some(
                ConnectionCommand::SetWiFiCredentials(Some(WiFiCredentials::new(
                    ssid.as_str(),
                    password.as_str(),
                ))),
            ),
            Commands::Watch => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => Config::load(config_path)?,
        None => Config::load_default()?,
    };

    // Apply environment variable overrides, then command line overrides
    config.apply_env_overrides();
    if let Some(host) = &cli.host {
        config.device.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.device.port = port;
    }

    config.validate()?;

    // Initialize tracing
    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let ssid = cli.ap_ssid.clone().unwrap_or_default();
    let passphrase = cli.ap_passphrase.clone().unwrap_or_default();
    let access_point = AccessPointDescriptor::new(ssid.as_str(), passphrase.as_str());

    let monitor = PollingPresenceMonitor::new(
        Arc::new(StaticWirelessInterface::associated(ssid.as_str())),
        Arc::new(GrantedPermission),
    );
    let joiner = HotspotJoiner::new(
        &access_point,
        Arc::new(BypassConfigurator),
        Arc::new(monitor),
    );

    let orchestrator = ConnectionOrchestrator::new(access_point, Arc::new(joiner), &config)
        .context("Failed to set up device connection")?;

    tracing::info!(device = %config.socket_target(), "Connecting to device");
    orchestrator.join().await;

    let result = match cli.command.connection_command() {
        Some(command) => run_command(&orchestrator, &config, command).await,
        None => run_watch(&orchestrator).await,
    };

    orchestrator.disconnect().await;
    result
}

/// Send one command and print its response.
async fn run_command(
    orchestrator: &ConnectionOrchestrator,
    config: &Config,
    command: ConnectionCommand,
) -> anyhow::Result<()> {
    let wire_name = command.wire_name();
    let response = orchestrator.execute_and_return_response(command);
    let mut status = orchestrator.status();

    let event = tokio::select! {
        result = tokio::time::timeout(config.response_timeout(), response) => {
            result
                .with_context(|| format!("Timed out waiting for {wire_name} response"))?
                .with_context(|| format!("{wire_name} failed"))?
        }
        _ = status.wait_for(|s| matches!(
            s,
            ConnectionStatus::FailedConnection | ConnectionStatus::ConnectionDenied
        )) => {
            anyhow::bail!("Could not connect to device at {}", config.socket_target());
        }
    };

    print_event(&event)?;

    if !event.is_success() {
        let message = event
            .error_message()
            .map(|m| m.message.clone())
            .unwrap_or_default();
        anyhow::bail!("Device rejected {wire_name}: {message}");
    }

    Ok(())
}

/// Print inbound events until Ctrl-C.
async fn run_watch(orchestrator: &ConnectionOrchestrator) -> anyhow::Result<()> {
    let mut events = orchestrator.events();
    let mut status = orchestrator.status();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, disconnecting");
                return Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *status.borrow_and_update();
                tracing::info!(status = %current, "Access point status");
                if current.is_terminal() {
                    anyhow::bail!("Connection ended: {current}");
                }
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event)?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Dropped events while printing");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

fn print_event(event: &SocketEvent) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(event).context("Failed to render event")?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_claim_status_command() {
        let cli = Cli::try_parse_from(["softap", "claim-status"]).unwrap();
        assert!(matches!(cli.command, Commands::ClaimStatus));
        assert_eq!(
            cli.command.connection_command(),
            Some(ConnectionCommand::ClaimStatus)
        );
        assert!(cli.host.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "softap",
            "networks",
            "--host",
            "10.0.0.1",
            "--port",
            "6000",
            "--ap-ssid",
            "DeviceAP-1",
            "-v",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::Networks));
        assert_eq!(cli.host.as_deref(), Some("10.0.0.1"));
        assert_eq!(cli.port, Some(6000));
        assert_eq!(cli.ap_ssid.as_deref(), Some("DeviceAP-1"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_set_credentials_command() {
        let cli = Cli::try_parse_from([
            "softap",
            "set-credentials",
            "--ssid",
            "Home",
            "--password",
            "secret",
        ])
        .unwrap();

        match cli.command.connection_command() {
            Some(ConnectionCommand::SetWiFiCredentials(Some(credentials))) => {
                assert_eq!(credentials.ssid, "Home");
                assert_eq!(credentials.password, "secret");
            }
            other => panic!("Expected SetWiFiCredentials, got {other:?}"),
        }
    }

    #[test]
    fn test_set_credentials_requires_password() {
        let result = Cli::try_parse_from(["softap", "set-credentials", "--ssid", "Home"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_watch_has_no_command() {
        let cli = Cli::try_parse_from(["softap", "watch"]).unwrap();
        assert!(cli.command.connection_command().is_none());
    }

    #[test]
    fn test_invalid_port_rejected() {
        let result = Cli::try_parse_from(["softap", "connectivity", "--port", "70000"]);
        assert!(result.is_err());
    }
}
