//! Config entry data for a Tuya BLE device

use serde::Deserialize;

use super::device::TuyaBleProductInfo;
use super::error::{TuyaBleError, TuyaBleResult};

/// Length of a Tuya local key
const LOCAL_KEY_LEN: usize = 16;

/// Per-device configuration, as stored in the config entry data
#[derive(Debug, Clone, Deserialize)]
pub struct TuyaBleConfig {
    /// Bluetooth MAC address (e.g. "DC:23:4D:11:22:33")
    pub address: String,
    /// Tuya cloud device id
    pub device_id: String,
    /// Key used to encrypt the BLE session
    pub local_key: String,
    #[serde(default)]
    pub uuid: Option<String>,
    /// Tuya category code (e.g. "ms")
    pub category: String,
    pub product_id: String,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,
}

fn default_manufacturer() -> String {
    "Tuya".to_string()
}

impl TuyaBleConfig {
    /// Check the fields the BLE client relies on
    pub fn validate(&self) -> TuyaBleResult<()> {
        if !is_mac_address(&self.address) {
            return Err(TuyaBleError::InvalidConfig(format!(
                "'{}' is not a bluetooth address",
                self.address
            )));
        }
        if self.local_key.len() != LOCAL_KEY_LEN {
            return Err(TuyaBleError::InvalidConfig(format!(
                "local_key must be {} characters",
                LOCAL_KEY_LEN
            )));
        }
        if self.category.is_empty() || self.product_id.is_empty() {
            return Err(TuyaBleError::InvalidConfig(
                "category and product_id are required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn product_info(&self) -> TuyaBleProductInfo {
        TuyaBleProductInfo {
            category: self.category.clone(),
            product_id: self.product_id.clone(),
            name: self
                .product_name
                .clone()
                .unwrap_or_else(|| format!("Tuya BLE {}", self.product_id)),
            manufacturer: self.manufacturer.clone(),
        }
    }
}

/// Six colon-separated hex octets
fn is_mac_address(address: &str) -> bool {
    let octets: Vec<&str> = address.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAWER_LOCK: &str = r#"
        address: "DC:23:4D:11:22:33"
        device_id: bf1234567890abcdef
        local_key: "0123456789abcdef"
        category: ms
        product_id: gumrixyt
        product_name: Drawer lock
    "#;

    #[test]
    fn test_config_deserialize() {
        let config: TuyaBleConfig = serde_yaml::from_str(DRAWER_LOCK).unwrap();
        assert_eq!(config.address, "DC:23:4D:11:22:33");
        assert_eq!(config.manufacturer, "Tuya");
        assert_eq!(config.uuid, None);
        assert!(config.validate().is_ok());

        let product = config.product_info();
        assert_eq!(product.category, "ms");
        assert_eq!(product.product_id, "gumrixyt");
        assert_eq!(product.name, "Drawer lock");
    }

    #[test]
    fn test_product_name_fallback() {
        let config: TuyaBleConfig = serde_json::from_value(serde_json::json!({
            "address": "DC:23:4D:11:22:33",
            "device_id": "bf00",
            "local_key": "0123456789abcdef",
            "category": "ms",
            "product_id": "gumrixyt",
            "manufacturer": "Acme"
        }))
        .unwrap();

        let product = config.product_info();
        assert_eq!(product.name, "Tuya BLE gumrixyt");
        assert_eq!(product.manufacturer, "Acme");
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut config: TuyaBleConfig = serde_yaml::from_str(DRAWER_LOCK).unwrap();
        config.address = "DC:23:4D:11:22".to_string();
        assert!(matches!(
            config.validate(),
            Err(TuyaBleError::InvalidConfig(_))
        ));

        let mut config: TuyaBleConfig = serde_yaml::from_str(DRAWER_LOCK).unwrap();
        config.local_key = "short".to_string();
        assert!(config.validate().is_err());

        let mut config: TuyaBleConfig = serde_yaml::from_str(DRAWER_LOCK).unwrap();
        config.product_id.clear();
        assert!(config.validate().is_err());
    }
}
