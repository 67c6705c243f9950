//! Tuya datapoint store
//!
//! A Tuya device exposes its functions as numbered, typed datapoints. The
//! BLE client reports datapoint values as they arrive and drains the
//! command channel to deliver writes. Values are held here so entities can
//! read them synchronously.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, trace, warn};

use super::error::{TuyaBleError, TuyaBleResult};

/// Datapoint wire type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DatapointType {
    Raw = 0,
    Bool = 1,
    Value = 2,
    String = 3,
    Enum = 4,
    Bitmap = 5,
}

impl TryFrom<u8> for DatapointType {
    type Error = TuyaBleError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Raw,
            1 => Self::Bool,
            2 => Self::Value,
            3 => Self::String,
            4 => Self::Enum,
            5 => Self::Bitmap,
            other => return Err(TuyaBleError::UnknownDatapointType(other)),
        })
    }
}

/// Value held by a datapoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatapointValue {
    Raw(Vec<u8>),
    Bool(bool),
    Value(i32),
    String(String),
    Enum(u32),
    Bitmap(u32),
}

impl DatapointValue {
    pub fn dp_type(&self) -> DatapointType {
        match self {
            Self::Raw(_) => DatapointType::Raw,
            Self::Bool(_) => DatapointType::Bool,
            Self::Value(_) => DatapointType::Value,
            Self::String(_) => DatapointType::String,
            Self::Enum(_) => DatapointType::Enum,
            Self::Bitmap(_) => DatapointType::Bitmap,
        }
    }

    /// Truthiness: zero, false and empty values are false
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Raw(bytes) => !bytes.is_empty(),
            Self::Bool(b) => *b,
            Self::Value(v) => *v != 0,
            Self::String(s) => !s.is_empty(),
            Self::Enum(v) | Self::Bitmap(v) => *v != 0,
        }
    }

    /// Convert into the representation of `dp_type`.
    ///
    /// Numeric and boolean values convert between each other; strings and
    /// raw bytes only convert to themselves.
    pub fn coerce(self, dp_type: DatapointType) -> Option<Self> {
        if self.dp_type() == dp_type {
            return Some(self);
        }

        let numeric = match &self {
            Self::Bool(b) => i64::from(*b),
            Self::Value(v) => i64::from(*v),
            Self::Enum(v) | Self::Bitmap(v) => i64::from(*v),
            Self::Raw(_) | Self::String(_) => return None,
        };

        match dp_type {
            DatapointType::Bool => Some(Self::Bool(numeric != 0)),
            DatapointType::Value => i32::try_from(numeric).ok().map(Self::Value),
            DatapointType::Enum => u32::try_from(numeric).ok().map(Self::Enum),
            DatapointType::Bitmap => u32::try_from(numeric).ok().map(Self::Bitmap),
            DatapointType::Raw | DatapointType::String => None,
        }
    }
}

impl From<bool> for DatapointValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for DatapointValue {
    fn from(value: i32) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for DatapointValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<Vec<u8>> for DatapointValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Raw(value)
    }
}

/// A datapoint write waiting to be delivered by the BLE client
#[derive(Debug)]
pub struct DatapointCommand {
    pub id: u8,
    pub dp_type: DatapointType,
    pub value: DatapointValue,
    ack: oneshot::Sender<TuyaBleResult<()>>,
}

impl DatapointCommand {
    /// Report the outcome of the write back to the waiting caller
    pub fn acknowledge(self, result: TuyaBleResult<()>) {
        if self.ack.send(result).is_err() {
            trace!(dp_id = self.id, "Datapoint write caller went away");
        }
    }
}

#[derive(Debug, Clone)]
struct DatapointState {
    value: DatapointValue,
    timestamp: DateTime<Utc>,
    changed_by_device: bool,
    /// The device reported or acknowledged `value`
    confirmed: bool,
    /// Bumped on every local write and device report
    generation: u64,
}

/// A single datapoint of a device
#[derive(Debug)]
pub struct TuyaBleDatapoint {
    id: u8,
    dp_type: DatapointType,
    state: RwLock<DatapointState>,
    commands: mpsc::Sender<DatapointCommand>,
}

impl TuyaBleDatapoint {
    fn new(
        id: u8,
        value: DatapointValue,
        timestamp: DateTime<Utc>,
        changed_by_device: bool,
        commands: mpsc::Sender<DatapointCommand>,
    ) -> Self {
        Self {
            id,
            dp_type: value.dp_type(),
            state: RwLock::new(DatapointState {
                value,
                timestamp,
                changed_by_device,
                confirmed: changed_by_device,
                generation: 0,
            }),
            commands,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn dp_type(&self) -> DatapointType {
        self.dp_type
    }

    pub fn value(&self) -> DatapointValue {
        self.read().value
    }

    /// When the value was last set, by the device or by a write
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.read().timestamp
    }

    /// Whether the current value was reported by the device
    pub fn changed_by_device(&self) -> bool {
        self.read().changed_by_device
    }

    fn read(&self) -> DatapointState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write(&self) -> RwLockWriteGuard<'_, DatapointState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a value reported by the device; returns whether it changed
    fn report(&self, value: DatapointValue, timestamp: DateTime<Utc>) -> bool {
        let mut state = self.write();
        let changed = state.value != value;
        let generation = state.generation + 1;
        *state = DatapointState {
            value,
            timestamp,
            changed_by_device: true,
            confirmed: true,
            generation,
        };
        changed
    }

    /// Write a new value to the device.
    ///
    /// The value is stored locally, handed to the BLE client and the call
    /// waits for the client's acknowledgement. Nothing is sent when the
    /// device already reported or acknowledged the same value. If delivery
    /// fails the previous value is restored, unless a device report or
    /// another write has replaced it in the meantime.
    #[instrument(skip(self, value), fields(dp_id = self.id))]
    pub async fn set_value(&self, value: impl Into<DatapointValue>) -> TuyaBleResult<()> {
        let value = value.into();
        let found = value.dp_type();
        let value = value
            .coerce(self.dp_type)
            .ok_or(TuyaBleError::TypeMismatch {
                id: self.id,
                expected: self.dp_type,
                found,
            })?;

        let (previous, generation) = {
            let mut state = self.write();
            if state.confirmed && state.value == value {
                trace!("Datapoint value already confirmed, not sending");
                return Ok(());
            }

            let previous = state.clone();
            *state = DatapointState {
                value: value.clone(),
                timestamp: Utc::now(),
                changed_by_device: false,
                confirmed: false,
                generation: previous.generation + 1,
            };
            (previous, state.generation)
        };

        debug!(?value, "Sending datapoint");
        let (ack, ack_rx) = oneshot::channel();
        let command = DatapointCommand {
            id: self.id,
            dp_type: self.dp_type,
            value,
            ack,
        };

        let result = match self.commands.send(command).await {
            Ok(()) => ack_rx.await.unwrap_or(Err(TuyaBleError::NotConnected)),
            Err(_) => Err(TuyaBleError::NotConnected),
        };

        if let Err(e) = &result {
            warn!("Datapoint write failed: {}", e);
        }

        let mut state = self.write();
        if state.generation != generation {
            debug!("Datapoint replaced while writing, keeping newer value");
        } else if result.is_ok() {
            state.confirmed = true;
        } else {
            *state = DatapointState {
                generation: generation + 1,
                ..previous
            };
        }
        result
    }
}

/// The datapoints of one device, keyed by id
#[derive(Debug)]
pub struct TuyaBleDatapoints {
    datapoints: DashMap<u8, Arc<TuyaBleDatapoint>>,
    commands: mpsc::Sender<DatapointCommand>,
}

impl TuyaBleDatapoints {
    pub fn new(commands: mpsc::Sender<DatapointCommand>) -> Self {
        Self {
            datapoints: DashMap::new(),
            commands,
        }
    }

    /// Look up a datapoint without creating it
    pub fn get(&self, id: u8) -> Option<Arc<TuyaBleDatapoint>> {
        self.datapoints.get(&id).map(|dp| dp.clone())
    }

    /// Look up a datapoint, creating it with `default` if the device has
    /// not reported it yet.
    ///
    /// Returns `None` when an existing datapoint has another type or the
    /// default cannot be represented as `dp_type`.
    pub fn get_or_create(
        &self,
        id: u8,
        dp_type: DatapointType,
        default: impl Into<DatapointValue>,
    ) -> Option<Arc<TuyaBleDatapoint>> {
        match self.datapoints.entry(id) {
            Entry::Occupied(entry) => {
                let datapoint = entry.get();
                if datapoint.dp_type == dp_type {
                    Some(datapoint.clone())
                } else {
                    warn!(
                        "Datapoint {} is {:?}, requested as {:?}",
                        id, datapoint.dp_type, dp_type
                    );
                    None
                }
            }
            Entry::Vacant(entry) => {
                let value = default.into().coerce(dp_type)?;
                debug!(dp_id = id, ?dp_type, "Creating datapoint");
                let datapoint = Arc::new(TuyaBleDatapoint::new(
                    id,
                    value,
                    Utc::now(),
                    false,
                    self.commands.clone(),
                ));
                entry.insert(datapoint.clone());
                Some(datapoint)
            }
        }
    }

    /// Store a value reported by the device.
    ///
    /// The device is authoritative: a report with a different type replaces
    /// the datapoint. Returns whether the stored value changed.
    pub fn update_from_device(
        &self,
        id: u8,
        value: DatapointValue,
        timestamp: DateTime<Utc>,
    ) -> bool {
        if let Some(existing) = self.get(id) {
            if existing.dp_type == value.dp_type() {
                return existing.report(value, timestamp);
            }
            debug!(dp_id = id, "Datapoint type changed by device");
        }

        trace!(dp_id = id, ?value, "Datapoint reported by device");
        self.datapoints.insert(
            id,
            Arc::new(TuyaBleDatapoint::new(
                id,
                value,
                timestamp,
                true,
                self.commands.clone(),
            )),
        );
        true
    }

    /// Known datapoint ids, ascending
    pub fn ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.datapoints.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.datapoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datapoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (TuyaBleDatapoints, mpsc::Receiver<DatapointCommand>) {
        let (tx, rx) = mpsc::channel(4);
        (TuyaBleDatapoints::new(tx), rx)
    }

    #[test]
    fn test_datapoint_type_codes() {
        assert_eq!(DatapointType::try_from(1u8).unwrap(), DatapointType::Bool);
        assert_eq!(DatapointType::try_from(5u8).unwrap(), DatapointType::Bitmap);
        assert_eq!(
            DatapointType::try_from(9u8).unwrap_err(),
            TuyaBleError::UnknownDatapointType(9)
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(DatapointValue::Bool(true).as_bool());
        assert!(!DatapointValue::Value(0).as_bool());
        assert!(DatapointValue::Enum(2).as_bool());
        assert!(!DatapointValue::Raw(vec![]).as_bool());
        assert!(DatapointValue::String("x".into()).as_bool());
    }

    #[test]
    fn test_coerce() {
        assert_eq!(
            DatapointValue::Value(3).coerce(DatapointType::Bool),
            Some(DatapointValue::Bool(true))
        );
        assert_eq!(
            DatapointValue::Bool(true).coerce(DatapointType::Enum),
            Some(DatapointValue::Enum(1))
        );
        assert_eq!(DatapointValue::Value(-1).coerce(DatapointType::Bitmap), None);
        assert_eq!(DatapointValue::from("on").coerce(DatapointType::Bool), None);
    }

    #[test]
    fn test_get_does_not_create() {
        let (dps, _rx) = store();
        assert!(dps.get(33).is_none());
        assert!(dps.is_empty());
    }

    #[test]
    fn test_get_or_create() {
        let (dps, _rx) = store();

        let dp = dps.get_or_create(33, DatapointType::Bool, false).unwrap();
        assert_eq!(dp.value(), DatapointValue::Bool(false));
        assert!(!dp.changed_by_device());

        // Existing datapoint is returned, not recreated
        let again = dps.get_or_create(33, DatapointType::Bool, true).unwrap();
        assert!(Arc::ptr_eq(&dp, &again));
        assert_eq!(dps.len(), 1);

        // Conflicting type or unrepresentable default
        assert!(dps.get_or_create(33, DatapointType::Value, 0).is_none());
        assert!(dps.get_or_create(40, DatapointType::String, false).is_none());
        assert_eq!(dps.ids(), vec![33]);
    }

    #[test]
    fn test_update_from_device() {
        let (dps, _rx) = store();
        let now = Utc::now();

        assert!(dps.update_from_device(33, DatapointValue::Bool(true), now));
        assert!(!dps.update_from_device(33, DatapointValue::Bool(true), now));
        assert!(dps.update_from_device(33, DatapointValue::Bool(false), now));

        let dp = dps.get(33).unwrap();
        assert_eq!(dp.value(), DatapointValue::Bool(false));
        assert!(dp.changed_by_device());
        assert_eq!(dp.timestamp(), now);

        // Type change replaces the datapoint
        assert!(dps.update_from_device(33, DatapointValue::Enum(2), now));
        assert_eq!(dps.get(33).unwrap().dp_type(), DatapointType::Enum);
    }

    #[tokio::test]
    async fn test_set_value_waits_for_ack() {
        let (dps, mut rx) = store();
        let dp = dps.get_or_create(33, DatapointType::Bool, false).unwrap();

        let client = tokio::spawn(async move {
            let command = rx.recv().await.unwrap();
            assert_eq!(command.id, 33);
            assert_eq!(command.dp_type, DatapointType::Bool);
            assert_eq!(command.value, DatapointValue::Bool(true));
            command.acknowledge(Ok(()));
            rx
        });

        dp.set_value(true).await.unwrap();
        assert_eq!(dp.value(), DatapointValue::Bool(true));

        let mut rx = client.await.unwrap();
        // Unchanged value is not sent again
        dp.set_value(true).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_set_value_failure_restores_value() {
        let (dps, mut rx) = store();
        let dp = dps.get_or_create(33, DatapointType::Bool, false).unwrap();

        let client = tokio::spawn(async move {
            let command = rx.recv().await.unwrap();
            let id = command.id;
            command.acknowledge(Err(TuyaBleError::NotAcknowledged(id)));
        });

        let result = dp.set_value(true).await;
        client.await.unwrap();

        assert_eq!(result, Err(TuyaBleError::NotAcknowledged(33)));
        assert_eq!(dp.value(), DatapointValue::Bool(false));
    }

    #[tokio::test]
    async fn test_unreported_default_is_still_sent() {
        let (dps, mut rx) = store();
        let dp = dps.get_or_create(33, DatapointType::Bool, false).unwrap();

        let client = tokio::spawn(async move {
            let command = rx.recv().await.unwrap();
            assert_eq!(command.value, DatapointValue::Bool(false));
            command.acknowledge(Ok(()));
            rx
        });

        dp.set_value(false).await.unwrap();
        let mut rx = client.await.unwrap();

        // Acknowledged now, so the same value is not sent again
        dp.set_value(false).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_device_report_during_failed_write_is_kept() {
        let (dps, mut rx) = store();
        let dps = Arc::new(dps);
        let dp = dps.get_or_create(33, DatapointType::Bool, false).unwrap();

        let device = dps.clone();
        let client = tokio::spawn(async move {
            let command = rx.recv().await.unwrap();
            device.update_from_device(33, DatapointValue::Bool(true), Utc::now());
            command.acknowledge(Err(TuyaBleError::NotAcknowledged(33)));
        });

        assert_eq!(
            dp.set_value(true).await,
            Err(TuyaBleError::NotAcknowledged(33))
        );
        client.await.unwrap();

        assert_eq!(dp.value(), DatapointValue::Bool(true));
        assert!(dp.changed_by_device());
    }

    #[tokio::test]
    async fn test_overlapping_writes_wait_for_their_own_ack() {
        let (dps, mut rx) = store();
        let dp = dps.get_or_create(33, DatapointType::Bool, false).unwrap();

        let first = tokio::spawn({
            let dp = dp.clone();
            async move { dp.set_value(true).await }
        });
        let first_command = rx.recv().await.unwrap();

        // Same value while the first write is pending is sent again
        let second = tokio::spawn({
            let dp = dp.clone();
            async move { dp.set_value(true).await }
        });
        let second_command = rx.recv().await.unwrap();
        assert_eq!(second_command.value, DatapointValue::Bool(true));

        first_command.acknowledge(Err(TuyaBleError::NotAcknowledged(33)));
        assert_eq!(
            first.await.unwrap(),
            Err(TuyaBleError::NotAcknowledged(33))
        );
        // The later write still owns the value
        assert_eq!(dp.value(), DatapointValue::Bool(true));

        second_command.acknowledge(Ok(()));
        assert_eq!(second.await.unwrap(), Ok(()));
        assert_eq!(dp.value(), DatapointValue::Bool(true));
    }

    #[tokio::test]
    async fn test_set_value_without_client() {
        let (dps, rx) = store();
        drop(rx);
        let dp = dps.get_or_create(33, DatapointType::Bool, false).unwrap();

        assert_eq!(dp.set_value(true).await, Err(TuyaBleError::NotConnected));
        assert_eq!(
            dp.set_value("open").await,
            Err(TuyaBleError::TypeMismatch {
                id: 33,
                expected: DatapointType::Bool,
                found: DatapointType::String,
            })
        );
    }
}
