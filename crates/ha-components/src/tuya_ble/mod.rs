//! Tuya BLE integration
//!
//! Bluetooth LE devices speaking the Tuya datapoint protocol. The BLE
//! transport itself lives in a separate client; this module holds the
//! per-entry device data and the entity platforms built on top of it.

pub mod config;
pub mod coordinator;
pub mod datapoints;
pub mod device;
pub mod entity;
pub mod error;
pub mod lock;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

pub use config::TuyaBleConfig;
pub use coordinator::{track_coordinator_updates, TuyaBleCoordinator};
pub use datapoints::{
    DatapointCommand, DatapointType, DatapointValue, TuyaBleDatapoint, TuyaBleDatapoints,
};
pub use device::{TuyaBleDevice, TuyaBleProductInfo};
pub use entity::TuyaBleEntity;
pub use error::{TuyaBleError, TuyaBleResult};

pub const DOMAIN: &str = "tuya_ble";

/// Everything the platforms of one config entry need
#[derive(Debug)]
pub struct TuyaBleData {
    pub title: String,
    pub device: Arc<TuyaBleDevice>,
    pub product: TuyaBleProductInfo,
    pub coordinator: Arc<TuyaBleCoordinator>,
}

impl TuyaBleData {
    /// Build entry data from config.
    ///
    /// The returned receiver must be handed to the BLE client; datapoint
    /// writes wait on it for acknowledgement.
    pub fn from_config(
        title: impl Into<String>,
        config: &TuyaBleConfig,
    ) -> TuyaBleResult<(Self, mpsc::Receiver<DatapointCommand>)> {
        config.validate()?;

        let (device, commands) = TuyaBleDevice::from_config(config);
        let data = Self {
            title: title.into(),
            coordinator: Arc::new(TuyaBleCoordinator::new(config.address.clone())),
            device: Arc::new(device),
            product: config.product_info(),
        };
        Ok((data, commands))
    }
}

/// Per-entry data of the integration, keyed by config entry id
#[derive(Debug, Default)]
pub struct TuyaBleDataStore {
    entries: DashMap<String, Arc<TuyaBleData>>,
}

impl TuyaBleDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry_id: impl Into<String>, data: TuyaBleData) -> Arc<TuyaBleData> {
        let entry_id = entry_id.into();
        let data = Arc::new(data);
        debug!(entry_id = %entry_id, address = data.device.address(), "Storing entry data");
        self.entries.insert(entry_id, data.clone());
        data
    }

    pub fn get(&self, entry_id: &str) -> Option<Arc<TuyaBleData>> {
        self.entries.get(entry_id).map(|d| d.clone())
    }

    pub fn remove(&self, entry_id: &str) -> Option<Arc<TuyaBleData>> {
        self.entries.remove(entry_id).map(|(_, d)| d)
    }
}

/// Name under which an entry's entities are grouped by entity components
pub fn platform_name(entry_id: &str) -> String {
    format!("{}.{}", DOMAIN, entry_id)
}
