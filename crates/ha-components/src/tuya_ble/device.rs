//! Tuya BLE device and product descriptors

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::config::TuyaBleConfig;
use super::datapoints::{DatapointCommand, TuyaBleDatapoints};

/// Datapoint writes that may queue up before the BLE client picks them up
const COMMAND_QUEUE_SIZE: usize = 16;

/// What kind of device this is, per Tuya's taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuyaBleProductInfo {
    /// Category code, e.g. "ms" for locks
    pub category: String,
    /// Model identifier within the category
    pub product_id: String,
    pub name: String,
    pub manufacturer: String,
}

/// A paired Tuya BLE device.
///
/// The device owns the datapoint store. Writes made through it are queued
/// on a channel whose receiving end belongs to the BLE client.
#[derive(Debug)]
pub struct TuyaBleDevice {
    address: String,
    device_id: String,
    datapoints: TuyaBleDatapoints,
}

impl TuyaBleDevice {
    pub fn new(
        address: impl Into<String>,
        device_id: impl Into<String>,
    ) -> (Self, mpsc::Receiver<DatapointCommand>) {
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let device = Self {
            address: address.into(),
            device_id: device_id.into(),
            datapoints: TuyaBleDatapoints::new(commands),
        };
        (device, rx)
    }

    pub fn from_config(config: &TuyaBleConfig) -> (Self, mpsc::Receiver<DatapointCommand>) {
        Self::new(config.address.clone(), config.device_id.clone())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn datapoints(&self) -> &TuyaBleDatapoints {
        &self.datapoints
    }
}
