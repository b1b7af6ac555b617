//! Metadata store contract and in-memory implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MetadataError;
use crate::types::{ActivationOverride, ConnectorDefinition};

/// Repository of discovered connector metadata.
pub trait MetadataStore: Send + Sync {
    /// Every known candidate location, packages and overrides alike.
    fn list_candidates(&self) -> Result<BTreeSet<String>, MetadataError>;

    /// Whether an administrator bound this location into the namespace.
    fn has_explicit_binding(&self, location: &str) -> bool;

    /// The connector definition stored for `location`.
    fn connector_metadata(&self, location: &str) -> Result<ConnectorDefinition, MetadataError>;

    /// Override metadata for `location`, if any.
    fn override_metadata(&self, location: &str)
        -> Result<Option<ActivationOverride>, MetadataError>;
}

/// Raw entry as stored. Documents are parsed on read so that a bad document
/// surfaces as a per-descriptor error.
#[derive(Debug, Clone, Default)]
struct StoredEntry {
    connector: Option<serde_json::Value>,
    override_metadata: Option<serde_json::Value>,
    bindings: BTreeSet<String>,
}

/// In-memory metadata store for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    entries: RwLock<BTreeMap<String, StoredEntry>>,
    unavailable: AtomicBool,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a seed document.
    pub fn from_seed(seed: MetadataSeed) -> Self {
        let store = Self::new();
        {
            let mut entries = store.write();
            for entry in seed.entries {
                entries.insert(
                    entry.location,
                    StoredEntry {
                        connector: entry.connector,
                        override_metadata: entry.override_metadata,
                        bindings: entry.bindings.into_iter().collect(),
                    },
                );
            }
        }
        store
    }

    /// Load a JSON seed document from disk.
    pub fn from_path(path: &Path) -> Result<Self, MetadataError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MetadataError::Seed(format!("{}: {e}", path.display())))?;
        let seed: MetadataSeed = serde_json::from_str(&raw)
            .map_err(|e| MetadataError::Seed(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), entries = seed.entries.len(), "Loaded metadata seed");
        Ok(Self::from_seed(seed))
    }

    /// Register a location with a parsed connector definition.
    pub fn insert_package(&self, location: &str, definition: &ConnectorDefinition) {
        let value = serde_json::to_value(definition).unwrap_or_default();
        self.insert_raw(location, value);
    }

    /// Register a location with an unparsed connector document.
    pub fn insert_raw(&self, location: &str, connector: serde_json::Value) {
        self.write()
            .entry(location.to_string())
            .or_default()
            .connector = Some(connector);
    }

    /// Attach override metadata to a location.
    pub fn set_override(&self, location: &str, ov: &ActivationOverride) {
        let value = serde_json::to_value(ov).unwrap_or_default();
        self.set_raw_override(location, value);
    }

    /// Attach an unparsed override document to a location.
    pub fn set_raw_override(&self, location: &str, ov: serde_json::Value) {
        self.write()
            .entry(location.to_string())
            .or_default()
            .override_metadata = Some(ov);
    }

    /// Record an explicit namespace binding for a location.
    pub fn bind(&self, location: &str, name: &str) {
        self.write()
            .entry(location.to_string())
            .or_default()
            .bindings
            .insert(name.to_string());
    }

    /// Remove every binding for a location.
    pub fn unbind_all(&self, location: &str) {
        if let Some(entry) = self.write().get_mut(location) {
            entry.bindings.clear();
        }
    }

    /// Forget a location entirely.
    pub fn remove(&self, location: &str) {
        self.write().remove(location);
    }

    /// Simulate the store being unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), MetadataError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MetadataError::Unavailable("store marked unavailable".to_string()));
        }
        Ok(())
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn list_candidates(&self) -> Result<BTreeSet<String>, MetadataError> {
        self.check_available()?;
        Ok(self.read().keys().cloned().collect())
    }

    fn has_explicit_binding(&self, location: &str) -> bool {
        self.read()
            .get(location)
            .is_some_and(|entry| !entry.bindings.is_empty())
    }

    fn connector_metadata(&self, location: &str) -> Result<ConnectorDefinition, MetadataError> {
        self.check_available()?;
        let value = self
            .read()
            .get(location)
            .and_then(|entry| entry.connector.clone())
            .ok_or_else(|| MetadataError::NotFound(location.to_string()))?;

        serde_json::from_value(value).map_err(|e| MetadataError::Malformed {
            location: location.to_string(),
            detail: e.to_string(),
        })
    }

    fn override_metadata(
        &self,
        location: &str,
    ) -> Result<Option<ActivationOverride>, MetadataError> {
        self.check_available()?;
        let Some(value) = self
            .read()
            .get(location)
            .and_then(|entry| entry.override_metadata.clone())
        else {
            return Ok(None);
        };

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| MetadataError::Malformed {
                location: location.to_string(),
                detail: e.to_string(),
            })
    }
}

/// Seed document for [`InMemoryMetadataStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataSeed {
    #[serde(default)]
    pub entries: Vec<SeedEntry>,
}

/// One location in a seed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEntry {
    pub location: String,

    #[serde(default)]
    pub connector: Option<serde_json::Value>,

    #[serde(default, rename = "override")]
    pub override_metadata: Option<serde_json::Value>,

    #[serde(default)]
    pub bindings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::types::SpecVersion;

    #[test]
    fn test_bindings() {
        let store = InMemoryMetadataStore::new();
        store.insert_package("a.rar", &ConnectorDefinition::new(SpecVersion::V16));

        assert!(!store.has_explicit_binding("a.rar"));
        store.bind("a.rar", "java:/eis/A");
        assert!(store.has_explicit_binding("a.rar"));
        store.unbind_all("a.rar");
        assert!(!store.has_explicit_binding("a.rar"));
        assert!(!store.has_explicit_binding("unknown.rar"));
    }

    #[test]
    fn test_malformed_documents() {
        let store = InMemoryMetadataStore::new();
        store.insert_raw("bad.rar", serde_json::json!({"spec_version": "9.9"}));
        store.insert_package("good.rar", &ConnectorDefinition::new(SpecVersion::V15));
        store.set_raw_override("good.rar", serde_json::json!({"config_properties": 7}));

        assert!(matches!(
            store.connector_metadata("bad.rar"),
            Err(MetadataError::Malformed { .. })
        ));
        assert!(store.connector_metadata("good.rar").is_ok());
        assert!(matches!(
            store.override_metadata("good.rar"),
            Err(MetadataError::Malformed { .. })
        ));
        assert_eq!(store.override_metadata("bad.rar"), Ok(None));
    }

    #[test]
    fn test_unavailable_store() {
        let store = InMemoryMetadataStore::new();
        store.insert_package("a.rar", &ConnectorDefinition::new(SpecVersion::V16));
        store.set_unavailable(true);

        let err = store.list_candidates().unwrap_err();
        assert!(!err.is_per_descriptor());

        store.set_unavailable(false);
        assert_eq!(store.list_candidates().unwrap().len(), 1);
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"entries": [
                {{"location": "file:/deploy/mail.rar", "connector": {{"spec_version": "1.6"}}, "bindings": ["java:/Mail"]}},
                {{"location": "file:/deploy/jms-ra.xml", "connector": {{"spec_version": "1.5"}}, "override": {{}}}}
            ]}}"#
        )
        .unwrap();

        let store = InMemoryMetadataStore::from_path(file.path()).unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.has_explicit_binding("file:/deploy/mail.rar"));
        assert_eq!(
            store.override_metadata("file:/deploy/jms-ra.xml").unwrap(),
            Some(ActivationOverride::default())
        );
    }

    #[test]
    fn test_from_path_rejects_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(matches!(
            InMemoryMetadataStore::from_path(file.path()),
            Err(MetadataError::Seed(_))
        ));
    }
}
