//! Connection state and update notifications for one device

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::lock::LockComponent;

/// Pending notifications before slow subscribers start lagging
const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// Tracks whether the device is reachable and tells entities when its
/// datapoints have changed.
#[derive(Debug)]
pub struct TuyaBleCoordinator {
    address: String,
    connected: AtomicBool,
    updates: broadcast::Sender<()>,
}

impl TuyaBleCoordinator {
    pub fn new(address: impl Into<String>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            address: address.into(),
            connected: AtomicBool::new(false),
            updates,
        }
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Record a connection change; subscribers are notified on transitions
    pub fn set_connected(&self, connected: bool) {
        if self.connected.swap(connected, Ordering::AcqRel) != connected {
            if connected {
                info!("{} connected", self.address);
            } else {
                warn!("{} disconnected", self.address);
            }
            self.async_set_updated_data();
        }
    }

    /// Announce fresh device data to all subscribers
    pub fn async_set_updated_data(&self) {
        if self.updates.send(()).is_err() {
            trace!("No listeners for {} updates", self.address);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.updates.subscribe()
    }

    /// Number of live update subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.updates.receiver_count()
    }
}

/// Rewrite the platform's lock states whenever the coordinator announces
/// an update. The task ends when the coordinator is dropped or when the
/// handle is passed to [`async_unload_entry`](super::lock::async_unload_entry).
pub fn track_coordinator_updates(
    coordinator: &TuyaBleCoordinator,
    component: Arc<LockComponent>,
    platform: String,
) -> JoinHandle<()> {
    let mut updates = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(()) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Coalescing coordinator updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
            let written = component.write_platform_states(&platform);
            debug!(platform = %platform, written, "Refreshed lock states");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_transitions_notify() {
        let coordinator = TuyaBleCoordinator::new("DC:23:4D:11:22:33");
        let mut rx = coordinator.subscribe();
        assert!(!coordinator.connected());

        coordinator.set_connected(true);
        assert!(coordinator.connected());
        rx.recv().await.unwrap();

        // Same state again does not notify
        coordinator.set_connected(true);
        assert!(rx.try_recv().is_err());

        coordinator.set_connected(false);
        rx.recv().await.unwrap();
        assert!(!coordinator.connected());
    }
}
