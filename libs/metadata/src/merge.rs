//! Merging override metadata onto a base connector definition.

use crate::error::MetadataError;
use crate::store::MetadataStore;
use crate::types::{ActivationOverride, ConnectorDefinition};

/// Merges override metadata onto a base definition. Must be pure.
pub trait Merger: Send + Sync {
    fn merge(&self, ov: &ActivationOverride, base: &ConnectorDefinition) -> ConnectorDefinition;
}

/// Default merger.
///
/// - Adapter config properties from the override win over the base.
/// - A transaction level in the override replaces the base one.
/// - Connection definitions and admin objects are matched by implementation
///   class; matched entries take the override's JNDI name, pool name, and
///   config properties. Overrides naming unknown classes are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverrideMerger;

impl Merger for OverrideMerger {
    fn merge(&self, ov: &ActivationOverride, base: &ConnectorDefinition) -> ConnectorDefinition {
        let mut merged = base.clone();

        merged
            .config_properties
            .extend(ov.config_properties.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(level) = ov.transaction_support {
            merged.transaction_support = Some(level);
        }

        for cd_override in &ov.connection_definitions {
            for cd in merged
                .connection_definitions
                .iter_mut()
                .filter(|cd| cd.managed_factory_class == cd_override.class_name)
            {
                if let Some(jndi_name) = &cd_override.jndi_name {
                    cd.jndi_name = Some(jndi_name.clone());
                }
                if let Some(pool_name) = &cd_override.pool_name {
                    cd.pool_name = Some(pool_name.clone());
                }
                cd.config_properties.extend(
                    cd_override
                        .config_properties
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone())),
                );
            }
        }

        for ao_override in &ov.admin_objects {
            for ao in merged
                .admin_objects
                .iter_mut()
                .filter(|ao| ao.class == ao_override.class_name)
            {
                if let Some(jndi_name) = &ao_override.jndi_name {
                    ao.jndi_name = Some(jndi_name.clone());
                }
                ao.config_properties.extend(
                    ao_override
                        .config_properties
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone())),
                );
            }
        }

        merged
    }
}

/// Load a location's connector definition with its override metadata applied.
///
/// Returns the merged definition and whether an override was present.
pub fn merged_definition(
    store: &dyn MetadataStore,
    merger: &dyn Merger,
    location: &str,
) -> Result<(ConnectorDefinition, bool), MetadataError> {
    let base = store.connector_metadata(location)?;
    match store.override_metadata(location)? {
        Some(ov) => Ok((merger.merge(&ov, &base), true)),
        None => Ok((base, false)),
    }
}
