//! Core types for Home Assistant
//!
//! This crate provides the fundamental types shared by the state machine,
//! the service registry and entity platforms: EntityId, State, Context,
//! ServiceCall and entity description metadata.

mod context;
mod entity;
mod entity_id;
mod service_call;
mod state;

pub use context::Context;
pub use entity::{DeviceInfo, EntityCategory, EntityDescription};
pub use entity_id::{slugify, EntityId, EntityIdError};
pub use service_call::{ServiceCall, SupportsResponse, ENTITY_MATCH_ALL};
pub use state::{State, STATE_UNAVAILABLE, STATE_UNKNOWN};

/// Standard attribute names written alongside entity states
pub mod attributes {
    pub const ATTR_FRIENDLY_NAME: &str = "friendly_name";
    pub const ATTR_ICON: &str = "icon";
    pub const ATTR_SUPPORTED_FEATURES: &str = "supported_features";
    pub const ATTR_ENTITY_CATEGORY: &str = "entity_category";
}

/// Notifications published by the state machine
pub mod events {
    use super::*;

    /// Published for every state write and removal
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }
}
