//! Polling network presence monitor.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{LocationPermission, NetworkPresenceMonitor, PresenceStatus, WirelessInterface};

/// Interval between presence checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(7);

/// [`NetworkPresenceMonitor`] that polls a [`WirelessInterface`].
///
/// Every check publishes a value, so subscribers see repeats.
pub struct PollingPresenceMonitor {
    interface: Arc<dyn WirelessInterface>,
    permission: Arc<dyn LocationPermission>,
    interval: Duration,
    status: Arc<watch::Sender<PresenceStatus>>,
    task: StdMutex<Option<CancellationToken>>,
}

impl PollingPresenceMonitor {
    pub fn new(
        interface: Arc<dyn WirelessInterface>,
        permission: Arc<dyn LocationPermission>,
    ) -> Self {
        let (status, _) = watch::channel(PresenceStatus::Unknown);
        Self {
            interface,
            permission,
            interval: DEFAULT_POLL_INTERVAL,
            status: Arc::new(status),
            task: StdMutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one presence check against `target`.
    pub fn check(&self, target: Option<&str>) -> PresenceStatus {
        evaluate(self.interface.as_ref(), self.permission.as_ref(), target)
    }

    fn replace_task(&self, token: Option<CancellationToken>) {
        let mut slot = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = std::mem::replace(&mut *slot, token) {
            previous.cancel();
        }
    }
}

fn evaluate(
    interface: &dyn WirelessInterface,
    permission: &dyn LocationPermission,
    target: Option<&str>,
) -> PresenceStatus {
    if !interface.is_wifi_reachable() {
        return PresenceStatus::Disconnected;
    }
    let Some(target) = target else {
        return PresenceStatus::Connected;
    };
    if !permission.permission_granted() {
        return PresenceStatus::Unknown;
    }
    match interface.current_network_name() {
        Some(name) if name == target => PresenceStatus::Connected,
        _ => PresenceStatus::Disconnected,
    }
}

impl NetworkPresenceMonitor for PollingPresenceMonitor {
    fn start(&self, target_network: Option<String>) {
        let token = CancellationToken::new();
        self.replace_task(Some(token.clone()));

        let interface = Arc::clone(&self.interface);
        let permission = Arc::clone(&self.permission);
        let status = Arc::clone(&self.status);
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let presence = evaluate(
                            interface.as_ref(),
                            permission.as_ref(),
                            target_network.as_deref(),
                        );
                        debug!(target = ?target_network, ?presence, "Network presence checked");
                        status.send_replace(presence);
                    }
                }
            }
        });
    }

    fn cancel(&self) {
        self.replace_task(None);
    }

    fn status(&self) -> watch::Receiver<PresenceStatus> {
        self.status.subscribe()
    }
}

impl Drop for PollingPresenceMonitor {
    fn drop(&mut self) {
        self.replace_task(None);
    }
}

/// A [`WirelessInterface`] with fixed answers.
///
/// Suits hosts that are already associated with the device network.
#[derive(Debug, Clone, Default)]
pub struct StaticWirelessInterface {
    pub reachable: bool,
    pub network_name: Option<String>,
}

impl StaticWirelessInterface {
    /// Interface reporting association with `network_name`.
    pub fn associated(network_name: impl Into<String>) -> Self {
        Self {
            reachable: true,
            network_name: Some(network_name.into()),
        }
    }
}

impl WirelessInterface for StaticWirelessInterface {
    fn is_wifi_reachable(&self) -> bool {
        self.reachable
    }

    fn current_network_name(&self) -> Option<String> {
        self.network_name.clone()
    }
}

/// Permission gate that is always open.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantedPermission;

impl LocationPermission for GrantedPermission {
    fn permission_granted(&self) -> bool {
        true
    }
}
