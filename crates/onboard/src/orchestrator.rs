//! Connection orchestrator for one onboarding attempt.
//!
//! This module provides the `ConnectionOrchestrator` that joins the device's
//! access point, opens the device socket once the join succeeds, and keeps
//! it open under a bounded reconnection policy:
//!
//! ```text
//! join() ──► AccessPointJoiner ── Connected ──► open socket (attempt n)
//!                                                  │
//!                      Disconnected / Timeout ◄────┘
//!                                │
//!            n <= max_attempts ──┴── n > max_attempts
//!                  │                        │
//!             open again          teardown, FailedConnection
//! ```
//!
//! The attempt counter only resets on a fresh `join()`.

use std::future::Future;
use std::sync::Arc;

use softap_protocol::{
    AccessPointDescriptor, ConnectionCommand, MessageEncryptor, ProtocolError, Result,
    SocketEvent,
};
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::network::socket::{ChannelStatus, StreamState};
use crate::network::{
    AccessPointJoiner, BoxFuture, ConnectionKind, ConnectionStatus, DeviceInteraction,
    InteractionSettings,
};

/// Reconnection attempts allowed after the first attempt.
pub const DEFAULT_MAX_RECONNECTION_ATTEMPTS: u32 = 3;

/// Drives the access point join and the device socket for one device.
pub struct ConnectionOrchestrator {
    shared: Arc<Shared>,
}

struct Shared {
    access_point: AccessPointDescriptor,
    joiner: Arc<dyn AccessPointJoiner>,
    interaction: Arc<dyn DeviceInteraction>,
    availability: watch::Sender<bool>,
    subscriptions: Mutex<Subscriptions>,
    max_attempts: u32,
    /// Cancelled when the orchestrator is dropped.
    root: CancellationToken,
}

#[derive(Default)]
struct Subscriptions {
    attempts: u32,
    network: Option<CancellationToken>,
    device: Option<CancellationToken>,
}

impl ConnectionOrchestrator {
    /// Creates an orchestrator talking TCP to the configured device address.
    ///
    /// The message key is derived from the access point's shared secret.
    pub fn new(
        access_point: AccessPointDescriptor,
        joiner: Arc<dyn AccessPointJoiner>,
        config: &Config,
    ) -> Result<Self> {
        Self::with_settings(access_point, joiner, config, config.interaction_settings())
    }

    /// Like [`new`](Self::new) with explicit interaction settings.
    pub fn with_settings(
        access_point: AccessPointDescriptor,
        joiner: Arc<dyn AccessPointJoiner>,
        config: &Config,
        settings: InteractionSettings,
    ) -> Result<Self> {
        if access_point.is_encrypted() {
            warn!(ssid = %access_point.network_name(), "Access point descriptor is still encrypted");
        }

        let encryptor = MessageEncryptor::new(&access_point.shared_secret())?;
        let interaction = ConnectionKind::Socket {
            target: config.socket_target(),
            encryptor: Arc::new(encryptor),
        }
        .interactor(settings);

        Ok(Self::with_interaction(
            access_point,
            joiner,
            interaction,
            config.connection.max_reconnection_attempts,
        ))
    }

    /// Creates an orchestrator over an existing interaction.
    pub fn with_interaction(
        access_point: AccessPointDescriptor,
        joiner: Arc<dyn AccessPointJoiner>,
        interaction: Arc<dyn DeviceInteraction>,
        max_attempts: u32,
    ) -> Self {
        let (availability, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                access_point,
                joiner,
                interaction,
                availability,
                subscriptions: Mutex::new(Subscriptions::default()),
                max_attempts,
                root: CancellationToken::new(),
            }),
        }
    }

    /// Join the access point and open the device socket once joined.
    ///
    /// Resets the reconnection counter.
    pub async fn join(&self) {
        let token = {
            let mut subs = self.shared.subscriptions.lock().await;
            subs.attempts = 0;
            if let Some(previous) = subs.network.take() {
                previous.cancel();
            }
            let token = self.shared.root.child_token();
            subs.network = Some(token.clone());
            token
        };

        info!(ssid = %self.shared.joiner.network_name(), "Starting onboarding connection");
        let status = self.shared.joiner.status();
        tokio::spawn(follow_access_point(Arc::clone(&self.shared), token, status));
        self.shared.joiner.join().await;
    }

    /// Tear down the device socket and leave the access point.
    pub async fn disconnect(&self) {
        info!(ssid = %self.shared.joiner.network_name(), "Disconnecting from device");
        self.shared.teardown().await;
        self.shared.joiner.disconnect().await;
    }

    /// Subscribe to the access point join status.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.joiner.status()
    }

    /// Subscribe to device socket availability.
    pub fn availability(&self) -> watch::Receiver<bool> {
        self.shared.availability.subscribe()
    }

    /// Whether the device socket is open right now.
    pub fn is_stream_available(&self) -> bool {
        *self.shared.availability.borrow()
    }

    /// Socket attempts made since the last `join()`.
    pub async fn attempts(&self) -> u32 {
        self.shared.subscriptions.lock().await.attempts
    }

    pub fn access_point(&self) -> &AccessPointDescriptor {
        &self.shared.access_point
    }

    /// Subscribe to inbound device events.
    pub fn events(&self) -> broadcast::Receiver<SocketEvent> {
        self.shared.interaction.events()
    }

    /// Resolves once the device socket is open.
    ///
    /// Fails with [`ProtocolError::InstanceDestroyed`] if the orchestrator is
    /// dropped first.
    pub fn wait_until_stream_available(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let shared = Arc::clone(&self.shared);
        async move { shared.wait_until_available().await }
    }

    /// Send `command` without waiting for a response.
    pub fn execute(
        &self,
        command: ConnectionCommand,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let shared = Arc::clone(&self.shared);
        async move { shared.interaction.execute(command).await }
    }

    /// Wait for the socket, send `command`, and resolve with its response.
    pub fn execute_and_return_response(
        &self,
        command: ConnectionCommand,
    ) -> impl Future<Output = Result<SocketEvent>> + Send + 'static {
        let shared = Arc::clone(&self.shared);
        async move {
            shared.wait_until_available().await?;
            tokio::select! {
                _ = shared.root.cancelled() => Err(ProtocolError::InstanceDestroyed),
                response = shared.interaction.execute_and_return_response(command) => response,
            }
        }
    }
}

impl Drop for ConnectionOrchestrator {
    fn drop(&mut self) {
        self.shared.root.cancel();

        // Release the socket and the network even if nobody called disconnect
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let shared = Arc::clone(&self.shared);
            handle.spawn(async move {
                shared.interaction.disconnect().await;
                shared.joiner.disconnect().await;
            });
        }
    }
}

impl Shared {
    async fn wait_until_available(&self) -> Result<()> {
        let mut availability = self.availability.subscribe();
        let ready = async move {
            if availability.wait_for(|available| *available).await.is_err() {
                return Err(ProtocolError::InstanceDestroyed);
            }
            Ok(())
        };

        tokio::select! {
            _ = self.root.cancelled() => Err(ProtocolError::InstanceDestroyed),
            ready = ready => ready,
        }
    }

    /// Open the device socket, or give up once attempts are exhausted.
    fn establish_device_connection(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let mut subs = self.subscriptions.lock().await;
            let previous = subs.device.take();

            if subs.attempts > self.max_attempts {
                let attempts = subs.attempts;
                drop(subs);
                if let Some(previous) = previous {
                    previous.cancel();
                }
                error!(attempts, max = self.max_attempts, "Device socket reconnection attempts exhausted");
                self.fail().await;
                return;
            }

            subs.attempts += 1;
            let attempt = subs.attempts;
            let token = self.root.child_token();
            subs.device = Some(token.clone());
            drop(subs);

            if let Some(previous) = previous {
                previous.cancel();
                self.interaction.disconnect().await;
            }

            self.availability.send_replace(false);
            info!(attempt, "Connecting to device socket");

            let status = self.interaction.connect().await;

            // A teardown may have run while the socket was opening
            let stale = {
                let _subs = self.subscriptions.lock().await;
                token.is_cancelled()
            };
            if stale {
                debug!(attempt, "Dropping device socket opened after teardown");
                if status.is_some() {
                    self.interaction.disconnect().await;
                }
                self.availability.send_replace(false);
                return;
            }

            match status {
                Some(status) => {
                    tokio::spawn(follow_device(Arc::clone(&self), token, status));
                }
                None => warn!(attempt, "Device socket already active"),
            }
        })
    }

    /// Cancel every subscription and close the socket.
    async fn teardown(&self) {
        {
            let mut subs = self.subscriptions.lock().await;
            for token in subs.network.take().into_iter().chain(subs.device.take()) {
                token.cancel();
            }
        }
        self.interaction.disconnect().await;
        self.availability.send_replace(false);
    }

    async fn fail(&self) {
        self.teardown().await;
        self.joiner.disconnect().await;
        self.joiner.set_status(ConnectionStatus::FailedConnection);
    }
}

async fn follow_access_point(
    shared: Arc<Shared>,
    token: CancellationToken,
    mut status: watch::Receiver<ConnectionStatus>,
) {
    let mut last = None;
    loop {
        let current = *status.borrow_and_update();
        if last != Some(current) {
            last = Some(current);
            debug!(status = %current, "Access point status");
            if current == ConnectionStatus::Connected {
                Arc::clone(&shared).establish_device_connection().await;
            }
        }

        tokio::select! {
            _ = token.cancelled() => return,
            changed = status.changed() => if changed.is_err() { return },
        }
    }
}

async fn follow_device(shared: Arc<Shared>, token: CancellationToken, mut status: ChannelStatus) {
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            next = status.next() => next,
        };
        if token.is_cancelled() {
            return;
        }

        match next {
            Some(state) if state.needs_reconnect() => {
                warn!(%state, "Device socket lost");
                break;
            }
            Some(state) => {
                debug!(%state, "Device socket status");
                shared.availability.send_replace(state == StreamState::Open);
                if state == StreamState::Closed {
                    return;
                }
            }
            None => {
                warn!("Device socket status ended without a final state");
                break;
            }
        }
    }

    shared.availability.send_replace(false);
    if !token.is_cancelled() {
        shared.establish_device_connection().await;
    }
}
