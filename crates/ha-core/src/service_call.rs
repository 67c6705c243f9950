//! Service call type for invoking Home Assistant services

use crate::Context;
use serde::{Deserialize, Serialize};

/// Target value meaning "every entity of the domain"
pub const ENTITY_MATCH_ALL: &str = "all";

/// A call to a service such as `lock.unlock`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,

    /// Data passed to the service (entity_id, code, ...)
    pub service_data: serde_json::Value,

    pub context: Context,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Full service identifier (domain.service)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Get a typed value from service_data
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Entity IDs targeted by the call; accepts a single string or a list
    pub fn entity_ids(&self) -> Vec<String> {
        match self.service_data.get("entity_id") {
            Some(serde_json::Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            Some(serde_json::Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => vec![],
        }
    }

    /// Whether the call targets every entity (`entity_id: all`)
    pub fn targets_all(&self) -> bool {
        self.entity_ids().iter().any(|id| id == ENTITY_MATCH_ALL)
    }
}

/// Whether a service supports returning a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportsResponse {
    #[default]
    None,
    Optional,
    Only,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_ids_string_and_list() {
        let call = ServiceCall::new(
            "lock",
            "lock",
            json!({"entity_id": "lock.front, lock.drawer"}),
            Context::new(),
        );
        assert_eq!(call.entity_ids(), vec!["lock.front", "lock.drawer"]);
        assert_eq!(call.service_id(), "lock.lock");

        let call = ServiceCall::new(
            "lock",
            "unlock",
            json!({"entity_id": ["lock.drawer"]}),
            Context::new(),
        );
        assert_eq!(call.entity_ids(), vec!["lock.drawer"]);
        assert!(!call.targets_all());
    }

    #[test]
    fn test_targets_all_and_get() {
        let call = ServiceCall::new(
            "lock",
            "open",
            json!({"entity_id": "all", "code": "1234"}),
            Context::new(),
        );
        assert!(call.targets_all());
        assert_eq!(call.get::<String>("code").as_deref(), Some("1234"));

        let call = ServiceCall::new("lock", "lock", json!({}), Context::new());
        assert!(call.entity_ids().is_empty());
    }
}
