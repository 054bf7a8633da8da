//! Resource descriptor: the static identity of the running process.
//!
//! The descriptor is built once at startup and attached read-only to every
//! exported span, log record, and metric batch. Cloning is cheap; all clones
//! share one attribute map.

use crate::error::TelemetryError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::Validate;

/// `service.name` attribute key.
pub const SERVICE_NAME: &str = "service.name";
/// `service.namespace` attribute key.
pub const SERVICE_NAMESPACE: &str = "service.namespace";
/// `service.version` attribute key.
pub const SERVICE_VERSION: &str = "service.version";
/// `service.instance.id` attribute key.
pub const SERVICE_INSTANCE_ID: &str = "service.instance.id";
/// `deployment.environment` attribute key.
pub const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";

/// Resource settings as read from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ResourceSettings {
    /// Logical service name. Required.
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
    /// Optional service namespace.
    pub namespace: Option<String>,
    /// Optional service version.
    pub version: Option<String>,
    /// Instance id; a UUID is generated when absent.
    pub instance_id: Option<String>,
    /// Deployment environment name.
    #[validate(length(min = 1, message = "Deployment environment cannot be empty"))]
    pub environment: String,
    /// Extra attributes attached verbatim.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            service_name: "paylog".to_string(),
            namespace: None,
            version: None,
            instance_id: None,
            environment: "development".to_string(),
            extra: BTreeMap::new(),
        }
    }
}

/// Immutable map of resource attributes.
///
/// # Example
///
/// ```
/// use telemetry::resource::{ResourceDescriptor, SERVICE_NAME};
///
/// let resource = ResourceDescriptor::build(
///     "paylog",
///     Some("payments"),
///     Some("1.0.0"),
///     Some("pod-1"),
///     Default::default(),
/// )
/// .unwrap();
///
/// assert_eq!(resource.get(SERVICE_NAME), Some("paylog"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct ResourceDescriptor {
    attributes: Arc<BTreeMap<String, String>>,
}

impl ResourceDescriptor {
    /// Builds a descriptor from the service identity and extra attributes.
    ///
    /// Explicit arguments take precedence over the same keys in `extra`.
    /// A missing instance id is replaced by a fresh UUID.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidConfig`] if `service_name` is empty.
    pub fn build(
        service_name: &str,
        namespace: Option<&str>,
        version: Option<&str>,
        instance_id: Option<&str>,
        extra: BTreeMap<String, String>,
    ) -> Result<Self, TelemetryError> {
        let service_name = service_name.trim();
        if service_name.is_empty() {
            return Err(TelemetryError::invalid_config("service name cannot be empty"));
        }

        let mut attributes = extra;
        attributes.insert(SERVICE_NAME.to_string(), service_name.to_string());
        if let Some(namespace) = namespace {
            attributes.insert(SERVICE_NAMESPACE.to_string(), namespace.to_string());
        }
        if let Some(version) = version {
            attributes.insert(SERVICE_VERSION.to_string(), version.to_string());
        }
        let instance_id = instance_id.map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
        attributes.insert(SERVICE_INSTANCE_ID.to_string(), instance_id);

        Ok(Self {
            attributes: Arc::new(attributes),
        })
    }

    /// Builds a descriptor from validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidConfig`] if the settings fail validation.
    pub fn from_settings(settings: &ResourceSettings) -> Result<Self, TelemetryError> {
        settings.validate()?;

        let mut extra = settings.extra.clone();
        extra.insert(
            DEPLOYMENT_ENVIRONMENT.to_string(),
            settings.environment.clone(),
        );

        Self::build(
            &settings.service_name,
            settings.namespace.as_deref(),
            settings.version.as_deref(),
            settings.instance_id.as_deref(),
            extra,
        )
    }

    /// Returns the value of an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns the service name.
    #[must_use]
    pub fn service_name(&self) -> &str {
        self.get(SERVICE_NAME).unwrap_or_default()
    }

    /// Iterates over all attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true if the descriptor has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl From<BTreeMap<String, String>> for ResourceDescriptor {
    fn from(attributes: BTreeMap<String, String>) -> Self {
        Self {
            attributes: Arc::new(attributes),
        }
    }
}

impl From<ResourceDescriptor> for BTreeMap<String, String> {
    fn from(resource: ResourceDescriptor) -> Self {
        Arc::unwrap_or_clone(resource.attributes)
    }
}

/// Parses a `key1=value1,key2=value2` attribute list.
///
/// Empty input yields an empty map; whitespace around keys and values is
/// trimmed.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidConfig`] for a pair without `=` or with
/// an empty key.
pub fn parse_resource_attributes(raw: &str) -> Result<BTreeMap<String, String>, TelemetryError> {
    let mut attributes = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(TelemetryError::invalid_config(format!(
                "malformed resource attribute '{pair}', expected key=value"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(TelemetryError::invalid_config(format!(
                "resource attribute '{pair}' has an empty key"
            )));
        }
        attributes.insert(key.to_string(), value.trim().to_string());
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_sets_identity_attributes() {
        let resource = ResourceDescriptor::build(
            "paylog",
            Some("payments"),
            Some("1.2.3"),
            Some("pod-7"),
            BTreeMap::new(),
        )
        .unwrap();

        assert_eq!(resource.service_name(), "paylog");
        assert_eq!(resource.get(SERVICE_NAMESPACE), Some("payments"));
        assert_eq!(resource.get(SERVICE_VERSION), Some("1.2.3"));
        assert_eq!(resource.get(SERVICE_INSTANCE_ID), Some("pod-7"));
        assert_eq!(resource.len(), 4);
    }

    #[test]
    fn test_build_rejects_empty_service_name() {
        let result = ResourceDescriptor::build("  ", None, None, None, BTreeMap::new());
        assert!(matches!(result, Err(TelemetryError::InvalidConfig(_))));
    }

    #[test]
    fn test_build_generates_instance_id() {
        let a = ResourceDescriptor::build("paylog", None, None, None, BTreeMap::new()).unwrap();
        let b = ResourceDescriptor::build("paylog", None, None, None, BTreeMap::new()).unwrap();

        let id = a.get(SERVICE_INSTANCE_ID).unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
        assert_ne!(a.get(SERVICE_INSTANCE_ID), b.get(SERVICE_INSTANCE_ID));
    }

    #[test]
    fn test_explicit_values_override_extra() {
        let extra = BTreeMap::from([
            (SERVICE_NAME.to_string(), "other".to_string()),
            ("team".to_string(), "checkout".to_string()),
        ]);
        let resource = ResourceDescriptor::build("paylog", None, None, Some("i"), extra).unwrap();

        assert_eq!(resource.service_name(), "paylog");
        assert_eq!(resource.get("team"), Some("checkout"));
    }

    #[test]
    fn test_from_settings_adds_environment() {
        let settings = ResourceSettings {
            environment: "staging".to_string(),
            ..ResourceSettings::default()
        };
        let resource = ResourceDescriptor::from_settings(&settings).unwrap();

        assert_eq!(resource.get(DEPLOYMENT_ENVIRONMENT), Some("staging"));
    }

    #[test]
    fn test_from_settings_validates() {
        let settings = ResourceSettings {
            service_name: String::new(),
            ..ResourceSettings::default()
        };
        assert!(matches!(
            ResourceDescriptor::from_settings(&settings),
            Err(TelemetryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_clones_share_attributes() {
        let resource = ResourceDescriptor::build("paylog", None, None, Some("i"), BTreeMap::new())
            .unwrap();
        let clone = resource.clone();
        assert!(Arc::ptr_eq(&resource.attributes, &clone.attributes));
    }

    #[test]
    fn test_parse_resource_attributes() {
        let attrs = parse_resource_attributes("service.name=OPENTEL, team = core ,").unwrap();
        assert_eq!(attrs.get("service.name"), Some(&"OPENTEL".to_string()));
        assert_eq!(attrs.get("team"), Some(&"core".to_string()));
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn test_parse_resource_attributes_malformed() {
        assert!(parse_resource_attributes("novalue").is_err());
        assert!(parse_resource_attributes("=value").is_err());
        assert!(parse_resource_attributes("").unwrap().is_empty());
    }

    #[test]
    fn test_resource_serializes_as_map() {
        let resource =
            ResourceDescriptor::build("paylog", None, None, Some("i-1"), BTreeMap::new()).unwrap();
        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(json["service.name"], "paylog");
        assert_eq!(json["service.instance.id"], "i-1");
    }
}
