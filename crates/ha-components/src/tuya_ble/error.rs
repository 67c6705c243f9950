//! Error types for the Tuya BLE integration

use thiserror::Error;

use super::datapoints::DatapointType;
use crate::lock::LockError;

/// Errors raised by the Tuya BLE integration and its device layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TuyaBleError {
    /// The BLE client is gone or dropped the write before acknowledging it
    #[error("device is not connected")]
    NotConnected,

    /// The device did not acknowledge a datapoint write in time
    #[error("datapoint {0} write was not acknowledged")]
    NotAcknowledged(u8),

    #[error("datapoint {id} expects {expected:?}, got {found:?}")]
    TypeMismatch {
        id: u8,
        expected: DatapointType,
        found: DatapointType,
    },

    #[error("unknown datapoint type {0}")]
    UnknownDatapointType(u8),

    #[error("config entry {0} is not loaded")]
    EntryNotLoaded(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type TuyaBleResult<T> = Result<T, TuyaBleError>;

impl From<TuyaBleError> for LockError {
    fn from(err: TuyaBleError) -> Self {
        LockError::Device(Box::new(err))
    }
}
