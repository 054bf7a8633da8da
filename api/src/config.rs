//! Server configuration module.
//!
//! Handles loading configuration from environment variables with sensible defaults.

use serde::Serialize;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised while reading the server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set to a value that cannot be parsed.
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue {
        /// The variable name.
        key: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Host and port do not form a socket address.
    #[error("Invalid socket address: {0}")]
    InvalidAddress(String),
}

/// Static shop identity stamped on every generated payment log.
///
/// Configuration values can be set via environment variables:
/// - `PAYLOG_SHOP_LEGACY_ID` (default: "7777")
/// - `PAYLOG_SHOP_NAME` (default: "PayRetailers Demo Shop")
/// - `PAYLOG_SHOP_COUNTRY` (default: "AR")
/// - `PAYLOG_SHOP_CURRENCY` (default: "ARS")
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShopSettings {
    /// Legacy shop identifier.
    pub legacy_id: String,
    /// Display name of the shop.
    pub name: String,
    /// ISO country code.
    pub country: String,
    /// ISO currency code.
    pub currency: String,
}

impl Default for ShopSettings {
    fn default() -> Self {
        Self {
            legacy_id: "7777".to_string(),
            name: "PayRetailers Demo Shop".to_string(),
            country: "AR".to_string(),
            currency: "ARS".to_string(),
        }
    }
}

impl ShopSettings {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            legacy_id: lookup("PAYLOG_SHOP_LEGACY_ID").unwrap_or(defaults.legacy_id),
            name: lookup("PAYLOG_SHOP_NAME").unwrap_or(defaults.name),
            country: lookup("PAYLOG_SHOP_COUNTRY").unwrap_or(defaults.country),
            currency: lookup("PAYLOG_SHOP_CURRENCY").unwrap_or(defaults.currency),
        }
    }
}

/// Server configuration.
///
/// Configuration values can be set via environment variables:
/// - `PAYLOG_HOST`: The host address to bind to (default: "0.0.0.0")
/// - `PAYLOG_PORT`: The port to listen on (default: 8080)
/// - `PAYLOG_SHOP_*`: see [`ShopSettings`]
#[derive(Debug, Clone)]
pub struct Config {
    /// The host address to bind to.
    pub host: String,
    /// The port to listen on.
    pub port: u16,
    /// Shop identity of generated payment logs.
    pub shop: ShopSettings,
}

impl Config {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `PAYLOG_PORT` is set but cannot be parsed as a valid port number
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a configuration through `lookup`, which maps a variable name
    /// to its value. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let host = lookup("PAYLOG_HOST").unwrap_or(defaults.host);

        let port = lookup("PAYLOG_PORT")
            .map(|p| {
                p.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                    key: "PAYLOG_PORT",
                    value: p,
                })
            })
            .transpose()?
            .unwrap_or(defaults.port);

        Ok(Self {
            host,
            port,
            shop: ShopSettings::from_lookup(&lookup),
        })
    }

    /// Returns the socket address for binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the host and port combination cannot be parsed as
    /// a valid socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::InvalidAddress(raw))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shop: ShopSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_default_values() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.shop, ShopSettings::default());
    }

    #[test]
    fn test_config_from_variables() {
        let config = config_from(&[
            ("PAYLOG_HOST", "127.0.0.1"),
            ("PAYLOG_PORT", "3000"),
            ("PAYLOG_SHOP_LEGACY_ID", "1234"),
            ("PAYLOG_SHOP_CURRENCY", "BRL"),
        ])
        .unwrap();

        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:3000");
        assert_eq!(config.shop.legacy_id, "1234");
        assert_eq!(config.shop.currency, "BRL");
        assert_eq!(config.shop.country, "AR");
    }

    #[test]
    fn test_invalid_port() {
        let err = config_from(&[("PAYLOG_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "PAYLOG_PORT", .. }));
    }

    #[test]
    fn test_invalid_socket_addr() {
        let config = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.socket_addr(), Err(ConfigError::InvalidAddress(_))));
    }
}
