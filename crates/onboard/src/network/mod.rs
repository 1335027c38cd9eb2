//! Network module for device onboarding.
//!
//! This module provides:
//! - The device socket channel and its stream lifecycle ([`socket`])
//! - Joining the device's temporary access point ([`hotspot`])
//! - Verifying the host is still associated with it ([`presence`])
//!
//! The platform's wireless stack is reached only through the traits
//! defined here, so every piece can be driven from tests.

pub mod hotspot;
pub mod presence;
pub mod socket;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use softap_protocol::{ConnectionCommand, Encryptor, Result, SocketEvent};
use tokio::sync::{broadcast, watch};

use crate::dispatcher::CommandDispatcher;

/// A boxed, sendable future borrowing from `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Status of the host's association with the device access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Nothing has been attempted yet.
    Starting,
    /// A join is in progress.
    Connecting,
    /// The host is associated with the access point.
    Connected,
    /// The association was dropped on purpose.
    Disconnected,
    /// The user refused to join the network.
    ConnectionDenied,
    /// Joining or reaching the device failed.
    FailedConnection,
}

impl ConnectionStatus {
    /// Whether no further progress will happen without a fresh join.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::ConnectionDenied | ConnectionStatus::FailedConnection
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Starting => "starting",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::ConnectionDenied => "connection denied",
            ConnectionStatus::FailedConnection => "failed connection",
        };
        f.write_str(name)
    }
}

/// Joins and leaves the device's access point.
pub trait AccessPointJoiner: Send + Sync {
    /// Start joining. Progress is reported through [`status`](Self::status).
    fn join(&self) -> BoxFuture<'_, ()>;

    /// Leave the access point and stop monitoring it.
    fn disconnect(&self) -> BoxFuture<'_, ()>;

    /// Subscribe to the join status.
    fn status(&self) -> watch::Receiver<ConnectionStatus>;

    /// Force the join status, as the orchestrator does on fatal failures.
    fn set_status(&self, status: ConnectionStatus);

    /// Name of the network being joined.
    fn network_name(&self) -> &str;
}

/// Result of a presence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceStatus {
    Connected,
    Disconnected,
    /// Presence could not be verified, e.g. without location permission.
    Unknown,
}

/// Watches whether the host is still on a given network.
pub trait NetworkPresenceMonitor: Send + Sync {
    /// Begin monitoring. `None` only checks that Wi-Fi is reachable.
    fn start(&self, target_network: Option<String>);

    /// Stop monitoring. Safe to call repeatedly.
    fn cancel(&self);

    /// Subscribe to presence updates.
    fn status(&self) -> watch::Receiver<PresenceStatus>;
}

/// Gate guarding access to the active network name.
pub trait LocationPermission: Send + Sync {
    fn permission_granted(&self) -> bool;
}

/// Read-only view of the host's Wi-Fi interface.
pub trait WirelessInterface: Send + Sync {
    /// Whether any Wi-Fi network is reachable.
    fn is_wifi_reachable(&self) -> bool;

    /// Name of the currently associated network, if it can be read.
    fn current_network_name(&self) -> Option<String>;
}

/// Capability interface over a device connection.
pub trait DeviceInteraction: Send + Sync {
    /// Open the connection. Returns `None` if one is already active.
    fn connect(&self) -> BoxFuture<'_, Option<socket::ChannelStatus>>;

    /// Close the connection.
    fn disconnect(&self) -> BoxFuture<'_, ()>;

    /// Send a command without waiting for its response.
    fn execute(&self, command: ConnectionCommand) -> BoxFuture<'_, Result<()>>;

    /// Send a command and resolve with the first event of the same type.
    fn execute_and_return_response(
        &self,
        command: ConnectionCommand,
    ) -> BoxFuture<'_, Result<SocketEvent>>;

    /// Subscribe to inbound events.
    fn events(&self) -> broadcast::Receiver<SocketEvent>;
}

/// Kind of connection to open against a device.
#[derive(Clone)]
pub enum ConnectionKind {
    /// Framed JSON over a raw byte stream.
    Socket {
        target: socket::SocketTarget,
        encryptor: Arc<dyn Encryptor>,
    },
}

impl ConnectionKind {
    /// Build the interaction for this kind of connection.
    pub fn interactor(self, settings: InteractionSettings) -> Arc<dyn DeviceInteraction> {
        match self {
            ConnectionKind::Socket { target, encryptor } => {
                let channel = socket::DeviceSocketChannel::new(settings.connector, settings.channel);
                Arc::new(CommandDispatcher::new(
                    channel,
                    target,
                    encryptor,
                    settings.encrypt_credentials,
                ))
            }
        }
    }
}

impl fmt::Debug for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionKind::Socket { target, .. } => f
                .debug_struct("Socket")
                .field("target", target)
                .finish_non_exhaustive(),
        }
    }
}

/// Runtime settings for building a [`DeviceInteraction`].
#[derive(Clone)]
pub struct InteractionSettings {
    /// Channel timing and codec.
    pub channel: socket::ChannelConfig,
    /// Whether credential fields are encrypted before sending.
    pub encrypt_credentials: bool,
    /// Transport used to reach the device.
    pub connector: Arc<dyn socket::StreamConnector>,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            channel: socket::ChannelConfig::default(),
            encrypt_credentials: false,
            connector: Arc::new(socket::TcpConnector),
        }
    }
}

// Re-export key types
pub use hotspot::{BypassConfigurator, HotspotConfigurator, HotspotError, HotspotJoiner};
pub use presence::{GrantedPermission, PollingPresenceMonitor, StaticWirelessInterface};
pub use socket::{
    ChannelConfig, ChannelStatus, DeviceSocketChannel, SocketTarget, StreamConnector, StreamState,
    TcpConnector,
};
