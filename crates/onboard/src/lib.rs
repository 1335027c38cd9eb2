//! # SoftAP Onboarding Library
//!
//! This crate connects to an IoT device over its own Wi-Fi access point
//! (SoftAP) and drives the onboarding conversation with it.
//!
//! ## Overview
//!
//! - **Access point join**: join the device network and follow presence
//! - **Device socket**: a framed JSON stream with a merged status stream
//! - **Command dispatch**: send commands and match responses by type
//! - **Orchestration**: bounded reconnection and availability tracking
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Connection Orchestrator                    │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  ┌─────────────────────┐        ┌──────────────────────────┐  │
//! │  │   HotspotJoiner     │        │    CommandDispatcher     │  │
//! │  │  (presence monitor) │        │  (encrypt, correlate)    │  │
//! │  └─────────────────────┘        └────────────┬─────────────┘  │
//! │                                              │                │
//! │                                 ┌────────────┴─────────────┐  │
//! │                                 │   DeviceSocketChannel    │  │
//! │                                 │  (MessageCodec framing)  │  │
//! │                                 └──────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use softap_onboard::network::{
//!     BypassConfigurator, GrantedPermission, HotspotJoiner, PollingPresenceMonitor,
//!     StaticWirelessInterface,
//! };
//! use softap_onboard::{Config, ConnectionOrchestrator};
//! use softap_protocol::{AccessPointDescriptor, ConnectionCommand};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let access_point = AccessPointDescriptor::new("DeviceAP-1", "passphrase");
//!
//!     let monitor = PollingPresenceMonitor::new(
//!         Arc::new(StaticWirelessInterface::associated("DeviceAP-1")),
//!         Arc::new(GrantedPermission),
//!     );
//!     let joiner = HotspotJoiner::new(
//!         &access_point,
//!         Arc::new(BypassConfigurator),
//!         Arc::new(monitor),
//!     );
//!
//!     let orchestrator = ConnectionOrchestrator::new(access_point, Arc::new(joiner), &config)?;
//!     orchestrator.join().await;
//!
//!     let status = orchestrator
//!         .execute_and_return_response(ConnectionCommand::ClaimStatus)
//!         .await?;
//!     println!("{:?}", status.data);
//!
//!     orchestrator.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`network`]: Access point join, presence and the device socket
//! - [`dispatcher`]: Command dispatch and response correlation
//! - [`orchestrator`]: Join, connect and reconnect coordination

pub mod config;
pub mod dispatcher;
pub mod network;
pub mod orchestrator;

// Re-export protocol for convenience
pub use softap_protocol as protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export dispatcher types for convenience
pub use dispatcher::CommandDispatcher;

// Re-export network types for convenience
pub use network::{
    AccessPointJoiner, ConnectionKind, ConnectionStatus, DeviceInteraction, InteractionSettings,
    PresenceStatus,
};

// Re-export orchestrator types for convenience
pub use orchestrator::{ConnectionOrchestrator, DEFAULT_MAX_RECONNECTION_ATTEMPTS};
