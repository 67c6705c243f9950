//! Home Assistant Built-in Components
//!
//! Entity components and integrations implemented natively in Rust:
//! the `lock` entity domain and the Tuya BLE integration that provides
//! lock entities for Tuya Bluetooth devices.

pub mod lock;
pub mod tuya_ble;

pub use lock::{
    lock_state, register_lock_services, LockComponent, LockEntity, LockEntityDescription,
    LockEntityFeature, LockError, LockState,
};
