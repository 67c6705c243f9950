//! Entity ID type representing a domain.object_id pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid entity IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id must contain exactly one '.' separator")]
    InvalidFormat,

    #[error("domain cannot be empty")]
    EmptyDomain,

    #[error("object_id cannot be empty")]
    EmptyObjectId,

    #[error("domain must be lowercase alphanumeric with single underscores")]
    InvalidDomainChars,

    #[error("object_id must be lowercase alphanumeric with underscores")]
    InvalidObjectIdChars,
}

/// A Home Assistant entity ID such as `lock.drawer_lock`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    /// Create a new EntityId from domain and object_id parts
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.into();
        let object_id = object_id.into();

        if domain.is_empty() {
            return Err(EntityIdError::EmptyDomain);
        }
        if object_id.is_empty() {
            return Err(EntityIdError::EmptyObjectId);
        }
        if domain.contains("__") || !is_slug(&domain) {
            return Err(EntityIdError::InvalidDomainChars);
        }
        if !is_slug(&object_id) {
            return Err(EntityIdError::InvalidObjectIdChars);
        }

        Ok(Self { domain, object_id })
    }

    /// Generate an entity ID for `domain` from a display name.
    ///
    /// The name is slugified; `taken` is consulted so the result does not
    /// collide with an existing entity (`_2`, `_3`, ... suffixes are tried).
    pub fn generate(
        domain: &str,
        name: &str,
        taken: impl Fn(&str) -> bool,
    ) -> Result<Self, EntityIdError> {
        let base = slugify(name);
        let mut candidate = Self::new(domain, base.clone())?;
        let mut suffix = 2;
        while taken(&candidate.to_string()) {
            candidate = Self::new(domain, format!("{}_{}", base, suffix))?;
            suffix += 1;
        }
        Ok(candidate)
    }

    /// Get the domain part of the entity ID
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Get the object_id part of the entity ID
    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

/// Lowercase alphanumerics and underscores, no leading/trailing underscore
fn is_slug(s: &str) -> bool {
    !s.starts_with('_')
        && !s.ends_with('_')
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Turn a display name into an object_id.
///
/// Runs of anything that is not an ASCII letter or digit collapse into a
/// single underscore. Empty results become `unknown`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => Self::new(domain, object_id),
            _ => Err(EntityIdError::InvalidFormat),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lock_entity_id() {
        let id: EntityId = "lock.drawer_lock".parse().unwrap();
        assert_eq!(id.domain(), "lock");
        assert_eq!(id.object_id(), "drawer_lock");
        assert_eq!(id.to_string(), "lock.drawer_lock");
    }

    #[test]
    fn test_invalid_entity_ids() {
        assert_eq!(
            "lock".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidFormat
        );
        assert_eq!(
            "lock.a.b".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidFormat
        );
        assert_eq!(
            ".drawer".parse::<EntityId>().unwrap_err(),
            EntityIdError::EmptyDomain
        );
        assert_eq!(
            "lock.Drawer".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidObjectIdChars
        );
        assert_eq!(
            "tuya__ble.x".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidDomainChars
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Drawer Lock"), "drawer_lock");
        assert_eq!(slugify("  Smart   Lock -- Lock "), "smart_lock_lock");
        assert_eq!(slugify("Lock #1"), "lock_1");
        assert_eq!(slugify("***"), "unknown");
    }

    #[test]
    fn test_generate_avoids_taken_ids() {
        let taken = ["lock.drawer_lock", "lock.drawer_lock_2"];
        let id = EntityId::generate("lock", "Drawer Lock", |id| taken.contains(&id)).unwrap();
        assert_eq!(id.to_string(), "lock.drawer_lock_3");

        let id = EntityId::generate("lock", "Drawer Lock", |_| false).unwrap();
        assert_eq!(id.to_string(), "lock.drawer_lock");
    }

    #[test]
    fn test_serde_as_string() {
        let id = EntityId::new("lock", "drawer").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"lock.drawer\"");
    }
}
