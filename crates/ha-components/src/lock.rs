//! Lock entity component
//!
//! Owns every `lock.*` entity added by integration platforms, derives
//! their state strings, writes them to the state machine and registers the
//! `lock.lock` / `lock.unlock` / `lock.open` services.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use ha_core::attributes::{
    ATTR_ENTITY_CATEGORY, ATTR_FRIENDLY_NAME, ATTR_ICON, ATTR_SUPPORTED_FEATURES,
};
use ha_core::{
    Context, DeviceInfo, EntityCategory, EntityDescription, EntityId, ServiceCall, State,
    STATE_UNAVAILABLE, STATE_UNKNOWN,
};
use ha_service_registry::{ServiceDescription, ServiceError, ServiceRegistry};
use ha_state_machine::StateMachine;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub const DOMAIN: &str = "lock";

pub const SERVICE_LOCK: &str = "lock";
pub const SERVICE_UNLOCK: &str = "unlock";
pub const SERVICE_OPEN: &str = "open";

/// Lock entities carry no metadata beyond the common description
pub type LockEntityDescription = EntityDescription;

/// Optional lock capabilities, reported as the `supported_features` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockEntityFeature(u32);

impl LockEntityFeature {
    pub const OPEN: Self = Self(1);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// State of a lock entity as shown to users
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Jammed,
    Opening,
    Locking,
    Open,
    Unlocking,
    Locked,
    Unlocked,
}

impl LockState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Jammed => "jammed",
            Self::Opening => "opening",
            Self::Locking => "locking",
            Self::Open => "open",
            Self::Unlocking => "unlocking",
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
        }
    }
}

/// Errors raised by lock entities while handling a command
#[derive(Debug, Error)]
pub enum LockError {
    #[error("{entity} does not support {operation}")]
    NotSupported {
        entity: String,
        operation: &'static str,
    },

    /// Failure reported by the integration's device layer
    #[error(transparent)]
    Device(Box<dyn std::error::Error + Send + Sync>),
}

/// A lock entity provided by an integration platform
#[async_trait]
pub trait LockEntity: Send + Sync {
    fn entity_description(&self) -> &LockEntityDescription;

    /// Registry-stable identifier; entities without one cannot be deduplicated
    fn unique_id(&self) -> Option<String> {
        None
    }

    /// Entity name, combined with the device name when one is present
    fn name(&self) -> Option<String> {
        self.entity_description().name.map(str::to_string)
    }

    fn icon(&self) -> Option<String> {
        self.entity_description().icon.map(str::to_string)
    }

    fn entity_category(&self) -> Option<EntityCategory> {
        self.entity_description().entity_category
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }

    fn available(&self) -> bool {
        true
    }

    /// `None` while the lock state has not been reported
    fn is_locked(&self) -> Option<bool>;

    fn is_locking(&self) -> Option<bool> {
        None
    }

    fn is_unlocking(&self) -> Option<bool> {
        None
    }

    fn is_jammed(&self) -> Option<bool> {
        None
    }

    fn is_opening(&self) -> Option<bool> {
        None
    }

    fn is_open(&self) -> Option<bool> {
        None
    }

    fn supported_features(&self) -> LockEntityFeature {
        LockEntityFeature::empty()
    }

    async fn async_lock(&self) -> Result<(), LockError>;

    async fn async_unlock(&self) -> Result<(), LockError>;

    async fn async_open(&self) -> Result<(), LockError> {
        Err(LockError::NotSupported {
            entity: self.name().unwrap_or_default(),
            operation: SERVICE_OPEN,
        })
    }
}

/// Derive the lock state, `None` meaning unknown
pub fn lock_state(entity: &dyn LockEntity) -> Option<LockState> {
    let checks = [
        (entity.is_jammed(), LockState::Jammed),
        (entity.is_opening(), LockState::Opening),
        (entity.is_locking(), LockState::Locking),
        (entity.is_open(), LockState::Open),
        (entity.is_unlocking(), LockState::Unlocking),
    ];
    if let Some((_, state)) = checks.into_iter().find(|(flag, _)| *flag == Some(true)) {
        return Some(state);
    }

    entity.is_locked().map(|locked| {
        if locked {
            LockState::Locked
        } else {
            LockState::Unlocked
        }
    })
}

/// Display name: "<device name> <entity name>" when both exist
fn friendly_name(entity: &dyn LockEntity) -> Option<String> {
    let device_name = entity.device_info().and_then(|info| info.name);
    match (device_name, entity.name()) {
        (Some(device), Some(name)) => Some(format!("{} {}", device, name)),
        (device, name) => name.or(device),
    }
}

struct RegisteredLock {
    platform: String,
    unique_id: Option<String>,
    entity_id: EntityId,
    entity: Arc<dyn LockEntity>,
}

/// Holds the lock entities of all platforms
pub struct LockComponent {
    states: Arc<StateMachine>,
    /// Entities keyed by entity_id string
    entities: DashMap<String, RegisteredLock>,
}

impl LockComponent {
    pub fn new(states: Arc<StateMachine>) -> Self {
        Self {
            states,
            entities: DashMap::new(),
        }
    }

    /// Add the entities of one platform and write their initial states.
    ///
    /// Entities whose unique id is already registered are skipped.
    /// Returns the entity ids that were assigned.
    #[instrument(skip(self, entities), fields(count = entities.len()))]
    pub fn add_entities<E>(&self, platform: &str, entities: Vec<E>) -> Vec<EntityId>
    where
        E: LockEntity + 'static,
    {
        let mut added = Vec::with_capacity(entities.len());

        for entity in entities {
            let unique_id = entity.unique_id();
            if let Some(uid) = &unique_id {
                if self.has_unique_id(uid) {
                    warn!(
                        "Platform {} does not generate unique IDs. ID {} already exists - ignoring",
                        platform, uid
                    );
                    continue;
                }
            }

            let name = friendly_name(&entity).unwrap_or_else(|| platform.to_string());
            let entity_id = match EntityId::generate(DOMAIN, &name, |id| {
                self.entities.contains_key(id) || self.states.get(id).is_some()
            }) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Cannot generate entity id for '{}': {}", name, e);
                    continue;
                }
            };

            let key = entity_id.to_string();
            self.entities.insert(
                key.clone(),
                RegisteredLock {
                    platform: platform.to_string(),
                    unique_id,
                    entity_id: entity_id.clone(),
                    entity: Arc::new(entity),
                },
            );
            self.write_state(&key, Context::new());
            debug!("Added {} from platform {}", key, platform);
            added.push(entity_id);
        }

        if !added.is_empty() {
            info!("Added {} lock entities from {}", added.len(), platform);
        }
        added
    }

    fn has_unique_id(&self, unique_id: &str) -> bool {
        self.entities
            .iter()
            .any(|r| r.unique_id.as_deref() == Some(unique_id))
    }

    pub fn entity(&self, entity_id: &str) -> Option<Arc<dyn LockEntity>> {
        self.entities.get(entity_id).map(|r| r.entity.clone())
    }

    /// All lock entity ids, sorted
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.entities.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Recompute one entity's state and write it to the state machine
    pub fn write_state(&self, entity_id: &str, context: Context) -> Option<State> {
        let (id, entity) = {
            let registered = self.entities.get(entity_id)?;
            (registered.entity_id.clone(), registered.entity.clone())
        };

        let state = if entity.available() {
            lock_state(entity.as_ref()).map_or(STATE_UNKNOWN, |s| s.as_str())
        } else {
            STATE_UNAVAILABLE
        };

        let mut attributes = HashMap::new();
        if let Some(name) = friendly_name(entity.as_ref()) {
            attributes.insert(ATTR_FRIENDLY_NAME.to_string(), json!(name));
        }
        if let Some(icon) = entity.icon() {
            attributes.insert(ATTR_ICON.to_string(), json!(icon));
        }
        if let Some(category) = entity.entity_category() {
            attributes.insert(ATTR_ENTITY_CATEGORY.to_string(), json!(category.as_str()));
        }
        attributes.insert(
            ATTR_SUPPORTED_FEATURES.to_string(),
            json!(entity.supported_features().bits()),
        );

        Some(self.states.set(id, state, attributes, context))
    }

    /// Rewrite the states of every entity added by `platform`
    pub fn write_platform_states(&self, platform: &str) -> usize {
        let ids: Vec<String> = self
            .entities
            .iter()
            .filter(|r| r.platform == platform)
            .map(|r| r.key().clone())
            .collect();

        ids.iter()
            .filter_map(|id| self.write_state(id, Context::new()))
            .count()
    }

    /// Drop the entities of a platform along with their states
    #[instrument(skip(self))]
    pub fn remove_platform(&self, platform: &str) -> usize {
        let removed: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|r| r.platform == platform)
            .map(|r| r.entity_id.clone())
            .collect();

        for entity_id in &removed {
            self.entities.remove(&entity_id.to_string());
            self.states.remove(entity_id, Context::new());
        }

        debug!(count = removed.len(), "Removed lock entities");
        removed.len()
    }

    /// Entities targeted by a service call, skipping unavailable ones
    fn service_targets(&self, call: &ServiceCall) -> Vec<(String, Arc<dyn LockEntity>)> {
        let ids = if call.targets_all() {
            self.entity_ids()
        } else {
            call.entity_ids()
        };

        ids.into_iter()
            .filter_map(|id| {
                let entity = self.entity(&id);
                if entity.is_none() {
                    debug!("Service target {} is not a lock entity", id);
                }
                entity.map(|e| (id, e))
            })
            .filter(|(_, entity)| entity.available())
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum LockAction {
    Lock,
    Unlock,
    Open,
}

impl LockAction {
    async fn apply(self, entity: &dyn LockEntity) -> Result<(), LockError> {
        match self {
            Self::Lock => entity.async_lock().await,
            Self::Unlock => entity.async_unlock().await,
            Self::Open => entity.async_open().await,
        }
    }
}

/// Run one action against every target, then refresh their states
async fn handle_lock_service(
    component: &LockComponent,
    call: ServiceCall,
    action: LockAction,
) -> Result<(), ServiceError> {
    let targets = component.service_targets(&call);
    debug!(service = %call.service_id(), targets = targets.len(), "Handling lock service");

    let results = join_all(
        targets
            .iter()
            .map(|(_, entity)| action.apply(entity.as_ref())),
    )
    .await;

    for (id, _) in &targets {
        component.write_state(id, call.context.clone());
    }

    for ((id, _), result) in targets.iter().zip(results) {
        if let Err(e) = result {
            warn!("{} failed for {}: {}", call.service_id(), id, e);
            return Err(ServiceError::CallFailed(format!("{}: {}", id, e)));
        }
    }
    Ok(())
}

/// Register the lock services
pub fn register_lock_services(component: Arc<LockComponent>, services: &ServiceRegistry) {
    let actions = [
        (SERVICE_LOCK, "Lock", LockAction::Lock),
        (SERVICE_UNLOCK, "Unlock", LockAction::Unlock),
        (SERVICE_OPEN, "Open", LockAction::Open),
    ];

    for (service, name, action) in actions {
        let component = component.clone();
        services.register_with_description(
            ServiceDescription::entity_service(DOMAIN, service, name),
            move |call: ServiceCall| {
                let component = component.clone();
                async move {
                    handle_lock_service(&component, call, action).await?;
                    Ok(None)
                }
            },
        );
    }

    info!("Lock services registered");
}
