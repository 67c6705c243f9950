//! State machine with domain indexing for Home Assistant
//!
//! This crate provides the StateMachine, which tracks the current state of
//! every entity. It keeps a per-domain index and publishes a
//! [`StateChangedData`] notification for every write and removal.

use dashmap::DashMap;
use ha_core::events::StateChangedData;
use ha_core::{Context, EntityId, State};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace};

/// Default capacity of the state-changed channel
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// The state machine tracks all entity states
pub struct StateMachine {
    /// All entity states keyed by entity_id string
    states: DashMap<String, State>,
    /// Index of entity_ids by domain
    domain_index: DashMap<String, Vec<String>>,
    /// Subscribers to state changes
    changes: broadcast::Sender<StateChangedData>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            states: DashMap::new(),
            domain_index: DashMap::new(),
            changes,
        }
    }

    /// Subscribe to state-changed notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StateChangedData> {
        self.changes.subscribe()
    }

    /// Set the state of an entity
    ///
    /// `last_changed` is only bumped when the state value differs from the
    /// stored one.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.get(&key);

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context),
            None => State::new(entity_id.clone(), state, attributes, context),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map_or(true, |s| s.state != new_state.state),
            "Setting entity state"
        );

        self.states.insert(key.clone(), new_state.clone());

        if old_state.is_none() {
            self.domain_index
                .entry(entity_id.domain().to_string())
                .or_default()
                .push(key);
        }

        // No receivers is fine
        let _ = self.changes.send(StateChangedData {
            entity_id,
            old_state,
            new_state: Some(new_state.clone()),
        });

        new_state
    }

    /// Get the current state of an entity
    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Get the state value as a string, or None if entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    /// Check if an entity is in a specific state
    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    /// Get all entity IDs for a domain
    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Get all states for a domain
    pub fn domain_states(&self, domain: &str) -> Vec<State> {
        self.entity_ids(domain)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Remove an entity's state, publishing a change with no new state
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let key = entity_id.to_string();
        let (_, old_state) = self.states.remove(&key)?;

        trace!(context = %context.id, "Removing entity state");
        if let Some(mut ids) = self.domain_index.get_mut(entity_id.domain()) {
            ids.retain(|id| id != &key);
        }

        let _ = self.changes.send(StateChangedData {
            entity_id: entity_id.clone(),
            old_state: Some(old_state.clone()),
            new_state: None,
        });

        Some(old_state)
    }

    /// Get the total number of entities
    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lock_id(object_id: &str) -> EntityId {
        EntityId::new("lock", object_id).unwrap()
    }

    #[test]
    fn test_set_and_get_state() {
        let sm = StateMachine::new();
        let attrs = HashMap::from([("icon".to_string(), json!("mdi:lock"))]);

        let state = sm.set(lock_id("drawer"), "locked", attrs.clone(), Context::new());
        assert_eq!(state.state, "locked");
        assert_eq!(state.attributes, attrs);

        assert!(sm.is_state("lock.drawer", "locked"));
        assert!(!sm.is_state("lock.drawer", "unlocked"));
        assert!(!sm.is_state("lock.missing", "locked"));
        assert_eq!(sm.entity_count(), 1);
    }

    #[test]
    fn test_domain_index() {
        let sm = StateMachine::new();
        sm.set(lock_id("drawer"), "locked", HashMap::new(), Context::new());
        sm.set(lock_id("front"), "unlocked", HashMap::new(), Context::new());
        sm.set(lock_id("drawer"), "unlocked", HashMap::new(), Context::new());
        sm.set(
            EntityId::new("sensor", "battery").unwrap(),
            "80",
            HashMap::new(),
            Context::new(),
        );

        let locks = sm.entity_ids("lock");
        assert_eq!(locks, vec!["lock.drawer".to_string(), "lock.front".to_string()]);
        assert_eq!(sm.domain_states("sensor").len(), 1);
        assert!(sm.entity_ids("light").is_empty());
    }

    #[test]
    fn test_remove_state() {
        let sm = StateMachine::new();
        let id = lock_id("drawer");
        sm.set(id.clone(), "locked", HashMap::new(), Context::new());

        let removed = sm.remove(&id, Context::new()).unwrap();
        assert_eq!(removed.state, "locked");
        assert!(sm.get("lock.drawer").is_none());
        assert!(sm.entity_ids("lock").is_empty());
        assert!(sm.remove(&id, Context::new()).is_none());
    }

    #[tokio::test]
    async fn test_state_changed_published() {
        let sm = StateMachine::new();
        let mut rx = sm.subscribe();

        sm.set(lock_id("drawer"), "unknown", HashMap::new(), Context::new());
        sm.set(lock_id("drawer"), "locked", HashMap::new(), Context::new());

        let first = rx.recv().await.unwrap();
        assert!(first.old_state.is_none());
        assert_eq!(first.new_state.unwrap().state, "unknown");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.entity_id.to_string(), "lock.drawer");
        assert_eq!(second.old_state.unwrap().state, "unknown");
        assert_eq!(second.new_state.unwrap().state, "locked");
    }
}
