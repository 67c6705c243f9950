//! Tuya BLE lock platform
//!
//! Locks are described declaratively: a table keyed by category and
//! product id lists which boolean datapoint drives each lock entity.
//! Products with unusual datapoint semantics plug in getter, setter or
//! availability overrides instead of subclassing the entity.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use ha_core::{DeviceInfo, EntityDescription};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::coordinator::TuyaBleCoordinator;
use super::datapoints::DatapointType;
use super::device::{TuyaBleDevice, TuyaBleProductInfo};
use super::entity::TuyaBleEntity;
use super::error::{TuyaBleError, TuyaBleResult};
use super::{platform_name, TuyaBleData, TuyaBleDataStore};
use crate::lock::{LockComponent, LockEntity, LockEntityDescription, LockError};

/// Reads the lock state in place of the datapoint
pub type TuyaBleLockGetter = fn(&TuyaBleLock, &TuyaBleProductInfo) -> Option<bool>;

/// Writes the lock state in place of the datapoint
pub type TuyaBleLockSetter = fn(&TuyaBleLock, &TuyaBleProductInfo, bool);

/// Extra availability check applied while the device is connected
pub type TuyaBleLockIsAvailable = fn(&TuyaBleLock, &TuyaBleProductInfo) -> bool;

/// One lock entity of a product
#[derive(Clone)]
pub struct TuyaBleLockMapping {
    pub dp_id: u8,
    pub description: LockEntityDescription,
    pub getter: Option<TuyaBleLockGetter>,
    pub setter: Option<TuyaBleLockSetter>,
    pub is_available: Option<TuyaBleLockIsAvailable>,
}

impl TuyaBleLockMapping {
    pub const fn new(dp_id: u8, description: LockEntityDescription) -> Self {
        Self {
            dp_id,
            description,
            getter: None,
            setter: None,
            is_available: None,
        }
    }

    pub const fn with_getter(mut self, getter: TuyaBleLockGetter) -> Self {
        self.getter = Some(getter);
        self
    }

    pub const fn with_setter(mut self, setter: TuyaBleLockSetter) -> Self {
        self.setter = Some(setter);
        self
    }

    pub const fn with_is_available(mut self, is_available: TuyaBleLockIsAvailable) -> Self {
        self.is_available = Some(is_available);
        self
    }
}

impl fmt::Debug for TuyaBleLockMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TuyaBleLockMapping")
            .field("dp_id", &self.dp_id)
            .field("key", &self.description.key)
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .field("is_available", &self.is_available.is_some())
            .finish()
    }
}

/// Lock mappings of one category, keyed by product id
#[derive(Debug, Clone, Default)]
pub struct TuyaBleCategoryLockMapping {
    pub products: HashMap<&'static str, Vec<TuyaBleLockMapping>>,
}

/// Lock mappings keyed by category code
pub type LockRegistry = HashMap<&'static str, TuyaBleCategoryLockMapping>;

/// The supported lock products
pub fn lock_types() -> &'static LockRegistry {
    static LOCK_TYPES: OnceLock<LockRegistry> = OnceLock::new();

    LOCK_TYPES.get_or_init(|| {
        HashMap::from([(
            "ms",
            TuyaBleCategoryLockMapping {
                products: HashMap::from([(
                    // Drawer lock
                    "gumrixyt",
                    vec![TuyaBleLockMapping::new(
                        33,
                        EntityDescription::new("lock")
                            .with_name("Lock")
                            .with_icon("mdi:lock"),
                    )],
                )]),
            },
        )])
    })
}

/// Mappings for a product: exact category match, then exact product id.
/// Products listed without mappings count as unsupported.
pub fn product_mappings<'a>(
    registry: &'a LockRegistry,
    product: &TuyaBleProductInfo,
) -> Option<&'a [TuyaBleLockMapping]> {
    registry
        .get(product.category.as_str())?
        .products
        .get(product.product_id.as_str())
        .map(Vec::as_slice)
        .filter(|mappings| !mappings.is_empty())
}

/// Build the lock entities of an entry, in table order
pub fn setup_locks(registry: &LockRegistry, data: &TuyaBleData) -> Vec<TuyaBleLock> {
    let Some(mappings) = product_mappings(registry, &data.product) else {
        debug!(
            category = %data.product.category,
            product_id = %data.product.product_id,
            "No lock mappings for product"
        );
        return Vec::new();
    };

    mappings
        .iter()
        .map(|mapping| {
            TuyaBleLock::new(
                data.coordinator.clone(),
                data.device.clone(),
                data.product.clone(),
                mapping.clone(),
            )
        })
        .collect()
}

/// Set up the lock platform of a config entry.
///
/// `async_add_entities` is called once with every lock of the device;
/// the list is empty when the product has no locks.
#[instrument(skip(store, async_add_entities))]
pub fn async_setup_entry<F>(
    store: &TuyaBleDataStore,
    entry_id: &str,
    async_add_entities: F,
) -> TuyaBleResult<()>
where
    F: FnOnce(Vec<TuyaBleLock>),
{
    let data = store
        .get(entry_id)
        .ok_or_else(|| TuyaBleError::EntryNotLoaded(entry_id.to_string()))?;

    let entities = setup_locks(lock_types(), &data);
    debug!(count = entities.len(), "Setting up Tuya BLE locks");
    async_add_entities(entities);
    Ok(())
}

/// Stop the entry's update tracker, then remove its lock entities
pub async fn async_unload_entry(
    component: &LockComponent,
    entry_id: &str,
    tracker: JoinHandle<()>,
) -> usize {
    tracker.abort();
    if let Err(e) = tracker.await {
        if !e.is_cancelled() {
            warn!("Update tracker for entry {} failed: {}", entry_id, e);
        }
    }

    let removed = component.remove_platform(&platform_name(entry_id));
    info!("Unloaded {} Tuya BLE locks for entry {}", removed, entry_id);
    removed
}

/// Lock entity backed by a boolean datapoint
#[derive(Debug, Clone)]
pub struct TuyaBleLock {
    entity: TuyaBleEntity,
    mapping: TuyaBleLockMapping,
}

impl TuyaBleLock {
    pub fn new(
        coordinator: Arc<TuyaBleCoordinator>,
        device: Arc<TuyaBleDevice>,
        product: TuyaBleProductInfo,
        mapping: TuyaBleLockMapping,
    ) -> Self {
        let entity = TuyaBleEntity::new(coordinator, device, product, mapping.description.key);
        Self { entity, mapping }
    }

    pub fn entity(&self) -> &TuyaBleEntity {
        &self.entity
    }

    pub fn mapping(&self) -> &TuyaBleLockMapping {
        &self.mapping
    }

    pub fn available(&self) -> bool {
        let available = self.entity.available();
        match self.mapping.is_available {
            Some(is_available) if available => is_available(self, self.entity.product()),
            _ => available,
        }
    }

    /// `None` until the device has reported the datapoint
    pub fn is_locked(&self) -> Option<bool> {
        if let Some(getter) = self.mapping.getter {
            return getter(self, self.entity.product());
        }

        self.entity
            .device()
            .datapoints()
            .get(self.mapping.dp_id)
            .map(|datapoint| datapoint.value().as_bool())
    }

    pub async fn async_lock(&self) -> TuyaBleResult<()> {
        self.set_locked(true).await
    }

    pub async fn async_unlock(&self) -> TuyaBleResult<()> {
        self.set_locked(false).await
    }

    async fn set_locked(&self, locked: bool) -> TuyaBleResult<()> {
        if let Some(setter) = self.mapping.setter {
            setter(self, self.entity.product(), locked);
            return Ok(());
        }

        let datapoint = self.entity.device().datapoints().get_or_create(
            self.mapping.dp_id,
            DatapointType::Bool,
            false,
        );
        match datapoint {
            Some(datapoint) => datapoint.set_value(locked).await,
            None => {
                debug!(dp_id = self.mapping.dp_id, "Lock datapoint not ready");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl LockEntity for TuyaBleLock {
    fn entity_description(&self) -> &LockEntityDescription {
        &self.mapping.description
    }

    fn unique_id(&self) -> Option<String> {
        Some(self.entity.unique_id().to_string())
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(self.entity.device_info())
    }

    fn available(&self) -> bool {
        TuyaBleLock::available(self)
    }

    fn is_locked(&self) -> Option<bool> {
        TuyaBleLock::is_locked(self)
    }

    async fn async_lock(&self) -> Result<(), LockError> {
        Ok(TuyaBleLock::async_lock(self).await?)
    }

    async fn async_unlock(&self) -> Result<(), LockError> {
        Ok(TuyaBleLock::async_unlock(self).await?)
    }
}
