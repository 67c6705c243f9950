//! Entity description metadata shared by entity platforms

use serde::{Deserialize, Serialize};

/// Classification of a non-primary entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityCategory {
    /// Changes the configuration of a device (e.g. a child lock switch)
    Config,
    /// Exposes diagnostics of a device without allowing changes
    Diagnostic,
}

impl EntityCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Diagnostic => "diagnostic",
        }
    }
}

/// Static description of an entity, declared by the integration.
///
/// Integrations usually build these as constants in their mapping tables
/// and hand them to the entity constructor unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescription {
    /// Key unique within the device, used for the unique id
    pub key: &'static str,
    pub name: Option<&'static str>,
    pub icon: Option<&'static str>,
    pub entity_category: Option<EntityCategory>,
}

impl EntityDescription {
    /// Description with only the key set
    pub const fn new(key: &'static str) -> Self {
        Self {
            key,
            name: None,
            icon: None,
            entity_category: None,
        }
    }

    pub const fn with_name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub const fn with_icon(mut self, icon: &'static str) -> Self {
        self.icon = Some(icon);
        self
    }

    pub const fn with_entity_category(mut self, category: EntityCategory) -> Self {
        self.entity_category = Some(category);
        self
    }
}

/// Device metadata attached to the entities of one physical device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// (domain, id) pairs identifying the device
    pub identifiers: Vec<(String, String)>,
    /// (type, id) pairs such as ("bluetooth", "AA:BB:...")
    #[serde(default)]
    pub connections: Vec<(String, String)>,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_builder() {
        const DESC: EntityDescription = EntityDescription::new("child_lock")
            .with_name("Child lock")
            .with_icon("mdi:account-lock")
            .with_entity_category(EntityCategory::Config);

        assert_eq!(DESC.key, "child_lock");
        assert_eq!(DESC.name, Some("Child lock"));
        assert_eq!(DESC.icon, Some("mdi:account-lock"));
        assert_eq!(DESC.entity_category, Some(EntityCategory::Config));
    }

    #[test]
    fn test_entity_category_serde() {
        let json = serde_json::to_string(&EntityCategory::Diagnostic).unwrap();
        assert_eq!(json, "\"diagnostic\"");
        assert_eq!(EntityCategory::Config.as_str(), "config");
    }
}
