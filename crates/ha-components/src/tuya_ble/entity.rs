//! Base for Tuya BLE entities

use std::sync::Arc;

use ha_core::DeviceInfo;

use super::coordinator::TuyaBleCoordinator;
use super::device::{TuyaBleDevice, TuyaBleProductInfo};
use super::DOMAIN;

/// State shared by every entity of a Tuya BLE device
#[derive(Debug, Clone)]
pub struct TuyaBleEntity {
    coordinator: Arc<TuyaBleCoordinator>,
    device: Arc<TuyaBleDevice>,
    product: TuyaBleProductInfo,
    unique_id: String,
}

impl TuyaBleEntity {
    pub fn new(
        coordinator: Arc<TuyaBleCoordinator>,
        device: Arc<TuyaBleDevice>,
        product: TuyaBleProductInfo,
        key: &str,
    ) -> Self {
        let unique_id = format!("{}-{}", device.device_id(), key);
        Self {
            coordinator,
            device,
            product,
            unique_id,
        }
    }

    /// Entities follow the device's connection state
    pub fn available(&self) -> bool {
        self.coordinator.connected()
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn device(&self) -> &TuyaBleDevice {
        &self.device
    }

    pub fn product(&self) -> &TuyaBleProductInfo {
        &self.product
    }

    pub fn device_info(&self) -> DeviceInfo {
        let address = self.device.address().to_string();
        DeviceInfo {
            identifiers: vec![(DOMAIN.to_string(), address.clone())],
            connections: vec![("bluetooth".to_string(), address)],
            name: Some(self.product.name.clone()),
            manufacturer: Some(self.product.manufacturer.clone()),
            model: Some(self.product.product_id.clone()),
        }
    }
}
