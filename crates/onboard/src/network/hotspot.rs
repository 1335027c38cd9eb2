//! Joining the device's temporary access point.
//!
//! [`HotspotJoiner`] asks a platform [`HotspotConfigurator`] to join the
//! network, then confirms the association with a
//! [`NetworkPresenceMonitor`] before reporting `Connected`.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use softap_protocol::AccessPointDescriptor;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{AccessPointJoiner, BoxFuture, ConnectionStatus, NetworkPresenceMonitor, PresenceStatus};

/// Delay between a successful join request and the first presence check.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Quiet period applied to presence updates.
pub const DEFAULT_PRESENCE_DEBOUNCE: Duration = Duration::from_secs(5);

/// Why the platform refused to join a network.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HotspotError {
    #[error("user denied joining the network")]
    UserDenied,

    #[error("hotspot configuration failed: {0}")]
    Failed(String),
}

/// Platform hook that associates the host with a Wi-Fi network.
pub trait HotspotConfigurator: Send + Sync {
    /// Ask the platform to join `ssid`.
    fn apply<'a>(
        &'a self,
        ssid: &'a str,
        passphrase: &'a str,
    ) -> BoxFuture<'a, Result<(), HotspotError>>;

    /// Forget any configuration stored for `ssid`.
    fn remove_configuration(&self, ssid: &str);

    /// Whether joins complete without any real association, as on a
    /// simulator or a host that is already on the network.
    fn is_bypass(&self) -> bool {
        false
    }
}

/// Configurator for hosts already on the device network.
#[derive(Debug, Clone, Copy, Default)]
pub struct BypassConfigurator;

impl HotspotConfigurator for BypassConfigurator {
    fn apply<'a>(
        &'a self,
        _ssid: &'a str,
        _passphrase: &'a str,
    ) -> BoxFuture<'a, Result<(), HotspotError>> {
        Box::pin(async { Ok(()) })
    }

    fn remove_configuration(&self, _ssid: &str) {}

    fn is_bypass(&self) -> bool {
        true
    }
}

/// [`AccessPointJoiner`] built on a [`HotspotConfigurator`].
pub struct HotspotJoiner {
    ssid: String,
    passphrase: String,
    configurator: Arc<dyn HotspotConfigurator>,
    monitor: Arc<dyn NetworkPresenceMonitor>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    settle_delay: Duration,
    presence_debounce: Duration,
    monitoring: StdMutex<Option<CancellationToken>>,
}

impl HotspotJoiner {
    /// Create a joiner for `access_point`.
    ///
    /// Stale configuration left for the same network is removed first.
    pub fn new(
        access_point: &AccessPointDescriptor,
        configurator: Arc<dyn HotspotConfigurator>,
        monitor: Arc<dyn NetworkPresenceMonitor>,
    ) -> Self {
        let ssid = access_point.network_name().to_string();
        configurator.remove_configuration(&ssid);

        let (status, _) = watch::channel(ConnectionStatus::Starting);
        Self {
            ssid,
            passphrase: access_point.passphrase().to_string(),
            configurator,
            monitor,
            status: Arc::new(status),
            settle_delay: DEFAULT_SETTLE_DELAY,
            presence_debounce: DEFAULT_PRESENCE_DEBOUNCE,
            monitoring: StdMutex::new(None),
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_presence_debounce(mut self, debounce: Duration) -> Self {
        self.presence_debounce = debounce;
        self
    }

    /// Current join status.
    pub fn current_status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    fn replace_monitoring(&self, token: Option<CancellationToken>) {
        let mut slot = self.monitoring.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = std::mem::replace(&mut *slot, token) {
            previous.cancel();
        }
    }

    fn start_monitoring(&self) {
        let token = CancellationToken::new();
        self.replace_monitoring(Some(token.clone()));

        tokio::spawn(follow_presence(
            Arc::clone(&self.monitor),
            Arc::clone(&self.status),
            self.ssid.clone(),
            self.settle_delay,
            self.presence_debounce,
            token,
        ));
    }
}

fn set_status(status: &watch::Sender<ConnectionStatus>, new_status: ConnectionStatus) {
    status.send_if_modified(|current| {
        if *current == new_status {
            return false;
        }
        debug!(from = %current, to = %new_status, "Access point status changed");
        *current = new_status;
        true
    });
}

/// Map presence updates for `ssid` onto the join status until cancelled.
async fn follow_presence(
    monitor: Arc<dyn NetworkPresenceMonitor>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    ssid: String,
    settle_delay: Duration,
    debounce: Duration,
    token: CancellationToken,
) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(settle_delay) => {}
    }

    let mut presence = monitor.status();
    // The value present at subscription time predates this join
    presence.borrow_and_update();
    monitor.start(Some(ssid.clone()));

    'outer: loop {
        tokio::select! {
            _ = token.cancelled() => break,
            changed = presence.changed() => if changed.is_err() { break },
        }

        // Settle: wait until updates stop for a full debounce window
        let mut deadline = Instant::now() + debounce;
        loop {
            tokio::select! {
                _ = token.cancelled() => break 'outer,
                changed = presence.changed() => match changed {
                    Ok(()) => deadline = Instant::now() + debounce,
                    Err(_) => break,
                },
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }

        let current = *presence.borrow_and_update();
        match current {
            PresenceStatus::Connected => set_status(&status, ConnectionStatus::Connected),
            PresenceStatus::Disconnected => {
                warn!(%ssid, "Host is no longer on the device network");
                set_status(&status, ConnectionStatus::FailedConnection);
            }
            PresenceStatus::Unknown => debug!(%ssid, "Network presence could not be verified"),
        }
    }

    monitor.cancel();
}

impl AccessPointJoiner for HotspotJoiner {
    fn join(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            info!(ssid = %self.ssid, "Joining device access point");
            set_status(&self.status, ConnectionStatus::Connecting);

            match self.configurator.apply(&self.ssid, &self.passphrase).await {
                Ok(()) if self.configurator.is_bypass() => {
                    set_status(&self.status, ConnectionStatus::Connected);
                }
                Ok(()) => self.start_monitoring(),
                Err(HotspotError::UserDenied) => {
                    warn!(ssid = %self.ssid, "User denied joining the access point");
                    set_status(&self.status, ConnectionStatus::ConnectionDenied);
                }
                Err(e) => {
                    warn!(ssid = %self.ssid, error = %e, "Failed to join the access point");
                    set_status(&self.status, ConnectionStatus::FailedConnection);
                }
            }
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            set_status(&self.status, ConnectionStatus::Disconnected);
            self.replace_monitoring(None);
            self.monitor.cancel();
            self.configurator.remove_configuration(&self.ssid);
            info!(ssid = %self.ssid, "Left device access point");
        })
    }

    fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    fn set_status(&self, status: ConnectionStatus) {
        set_status(&self.status, status);
    }

    fn network_name(&self) -> &str {
        &self.ssid
    }
}

impl Drop for HotspotJoiner {
    fn drop(&mut self) {
        self.replace_monitoring(None);
    }
}
