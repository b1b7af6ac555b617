//! Parsed connector metadata.
//!
//! Equality on these types is deep structural equality. Two descriptors found
//! at different locations are semantic duplicates when their merged
//! definitions compare equal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Connector contract version declared by a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecVersion {
    #[serde(rename = "1.0")]
    V10,
    #[serde(rename = "1.5")]
    V15,
    #[serde(rename = "1.6")]
    V16,
}

/// Transaction level supported by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSupport {
    NoTransaction,
    LocalTransaction,
    XaTransaction,
}

/// Config properties, ordered for stable comparison.
pub type ConfigProperties = BTreeMap<String, String>;

/// A parsed connector definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorDefinition {
    pub spec_version: SpecVersion,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eis_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_class: Option<String>,

    #[serde(default)]
    pub config_properties: ConfigProperties,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_support: Option<TransactionSupport>,

    #[serde(default)]
    pub connection_definitions: Vec<ConnectionDefinition>,

    #[serde(default)]
    pub admin_objects: Vec<AdminObject>,
}

impl ConnectorDefinition {
    /// Minimal definition for a given version. Mostly useful in tests.
    pub fn new(spec_version: SpecVersion) -> Self {
        Self {
            spec_version,
            vendor_name: None,
            eis_type: None,
            adapter_class: None,
            config_properties: ConfigProperties::new(),
            transaction_support: None,
            connection_definitions: Vec::new(),
            admin_objects: Vec::new(),
        }
    }

    /// Whether this definition may be activated without an administrator.
    ///
    /// Anything with override metadata qualifies, as does every 1.0 adapter.
    /// Later versions qualify only when the choice of connection factory and
    /// admin object is unambiguous.
    pub fn is_auto_activatable(&self, has_override: bool) -> bool {
        if has_override || self.spec_version == SpecVersion::V10 {
            return true;
        }
        self.connection_definitions.len() <= 1 && self.admin_objects.len() <= 1
    }
}

/// An outbound connection definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDefinition {
    pub factory_interface: String,
    pub managed_factory_class: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jndi_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_name: Option<String>,

    #[serde(default)]
    pub config_properties: ConfigProperties,
}

/// An administered object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminObject {
    pub interface: String,
    pub class: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jndi_name: Option<String>,

    #[serde(default)]
    pub config_properties: ConfigProperties,
}

/// Override metadata attached to a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationOverride {
    #[serde(default)]
    pub config_properties: ConfigProperties,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_support: Option<TransactionSupport>,

    #[serde(default)]
    pub connection_definitions: Vec<ConnectionOverride>,

    #[serde(default)]
    pub admin_objects: Vec<AdminObjectOverride>,
}

/// Override for the connection definition whose managed factory is `class_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOverride {
    pub class_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jndi_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_name: Option<String>,

    #[serde(default)]
    pub config_properties: ConfigProperties,
}

/// Override for the admin object implemented by `class_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminObjectOverride {
    pub class_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jndi_name: Option<String>,

    #[serde(default)]
    pub config_properties: ConfigProperties,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cf(class: &str) -> ConnectionDefinition {
        ConnectionDefinition {
            factory_interface: "javax.resource.cci.ConnectionFactory".to_string(),
            managed_factory_class: class.to_string(),
            jndi_name: None,
            pool_name: None,
            config_properties: ConfigProperties::new(),
        }
    }

    #[test]
    fn test_single_factory_is_auto_activatable() {
        let mut def = ConnectorDefinition::new(SpecVersion::V16);
        assert!(def.is_auto_activatable(false));

        def.connection_definitions.push(cf("a.Mcf"));
        assert!(def.is_auto_activatable(false));

        def.connection_definitions.push(cf("b.Mcf"));
        assert!(!def.is_auto_activatable(false));
        assert!(def.is_auto_activatable(true));
    }

    #[test]
    fn test_v10_always_auto_activatable() {
        let mut def = ConnectorDefinition::new(SpecVersion::V10);
        def.connection_definitions.push(cf("a.Mcf"));
        def.connection_definitions.push(cf("b.Mcf"));

        assert!(def.is_auto_activatable(false));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let def: ConnectorDefinition = serde_json::from_value(serde_json::json!({
            "spec_version": "1.6",
            "vendor_name": "Acme",
            "connection_definitions": [{
                "factory_interface": "javax.sql.DataSource",
                "managed_factory_class": "acme.Mcf"
            }]
        }))
        .unwrap();

        assert_eq!(def.spec_version, SpecVersion::V16);
        assert_eq!(def.vendor_name.as_deref(), Some("Acme"));
        assert!(def.admin_objects.is_empty());
        assert_eq!(def.connection_definitions[0].jndi_name, None);
    }
}
