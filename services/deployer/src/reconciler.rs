//! Descriptor reconciler.
//!
//! Computes which discovered descriptors are already configured by an
//! administrator, either directly through a namespace binding or indirectly
//! through an override descriptor whose merged definition equals a package's.
//!
//! ## Ordering
//!
//! Descriptors are visited in the order of their `BTreeSet`, which is
//! lexicographic on location. The result does not depend on the order, but
//! the log output and the order of fingerprint index construction do, and
//! both must be stable across passes.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use ironworks_metadata::{
    merged_definition, ConnectorDefinition, DeploymentDescriptor, Merger, MetadataError,
    MetadataStore,
};
use ironworks_reconcile::Fingerprint;
use tracing::{debug, instrument, warn};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Locations treated as explicitly configured.
    pub configured: BTreeSet<String>,
    /// Locations whose metadata could not be read: overrides, and packages
    /// without an explicit binding.
    pub malformed: BTreeSet<String>,
}

/// Merged package definitions, bucketed by fingerprint.
///
/// Built once per pass. Packages whose metadata cannot be read are left out
/// of the buckets and remembered in `unreadable`.
struct PackageIndex {
    buckets: HashMap<Fingerprint, Vec<(String, ConnectorDefinition)>>,
    unreadable: BTreeSet<String>,
}

impl PackageIndex {
    fn build(
        store: &dyn MetadataStore,
        merger: &dyn Merger,
        descriptors: &BTreeSet<DeploymentDescriptor>,
    ) -> Self {
        let mut buckets: HashMap<Fingerprint, Vec<(String, ConnectorDefinition)>> =
            HashMap::new();
        let mut unreadable = BTreeSet::new();

        for descriptor in descriptors.iter().filter(|d| d.is_package()) {
            let definition = match merged_definition(store, merger, &descriptor.location) {
                Ok((definition, _)) => definition,
                Err(e) if e.is_per_descriptor() => {
                    debug!(
                        location = %descriptor.location,
                        error = %e,
                        "Package metadata unreadable, not indexed for equality"
                    );
                    unreadable.insert(descriptor.location.clone());
                    continue;
                }
                Err(e) => {
                    warn!(location = %descriptor.location, error = %e, "Metadata store unavailable");
                    continue;
                }
            };
            let fingerprint = match Fingerprint::of(&definition) {
                Ok(fingerprint) => fingerprint,
                Err(e) => {
                    debug!(location = %descriptor.location, error = %e, "Cannot fingerprint package");
                    continue;
                }
            };
            buckets
                .entry(fingerprint)
                .or_default()
                .push((descriptor.location.clone(), definition));
        }

        Self { buckets, unreadable }
    }

    /// Packages whose definition is deeply equal to `definition`.
    fn equal_to<'a>(
        &'a self,
        definition: &'a ConnectorDefinition,
    ) -> impl Iterator<Item = &'a str> + 'a {
        let bucket = Fingerprint::of(definition)
            .ok()
            .and_then(|fingerprint| self.buckets.get(&fingerprint));
        bucket
            .into_iter()
            .flatten()
            .filter(move |(_, candidate)| candidate == definition)
            .map(|(location, _)| location.as_str())
    }
}

/// Reconciles discovered descriptors against explicit configuration.
pub struct DescriptorReconciler {
    store: Arc<dyn MetadataStore>,
    merger: Arc<dyn Merger>,
}

impl DescriptorReconciler {
    pub fn new(store: Arc<dyn MetadataStore>, merger: Arc<dyn Merger>) -> Self {
        Self { store, merger }
    }

    /// Compute the configured set for `descriptors`.
    ///
    /// - A package is configured when the store reports an explicit binding.
    /// - An override is always configured. Its merged definition is compared
    ///   with every package's merged definition, and equal packages are
    ///   configured too.
    /// - An override whose metadata cannot be read is recorded as malformed
    ///   and does not stop the pass. So is an unbound package whose metadata
    ///   cannot be read.
    /// - A store outage is logged and leaves the package undecided here.
    ///
    /// Running this twice on the same input gives the same result.
    #[instrument(skip(self, descriptors), fields(descriptors = descriptors.len()))]
    pub fn reconcile(&self, descriptors: &BTreeSet<DeploymentDescriptor>) -> Reconciliation {
        let mut result = Reconciliation::default();
        let index = PackageIndex::build(self.store.as_ref(), self.merger.as_ref(), descriptors);

        for descriptor in descriptors {
            if descriptor.is_package() {
                if self.store.has_explicit_binding(&descriptor.location) {
                    debug!(location = %descriptor.location, "Package has explicit binding");
                    result.configured.insert(descriptor.location.clone());
                } else if index.unreadable.contains(&descriptor.location) {
                    warn!(
                        location = %descriptor.location,
                        "Skipping package with unreadable metadata"
                    );
                    result.malformed.insert(descriptor.location.clone());
                }
                continue;
            }

            let definition = match self.override_definition(&descriptor.location) {
                Ok(definition) => definition,
                Err(e) => {
                    warn!(
                        location = %descriptor.location,
                        error = %e,
                        "Skipping malformed override descriptor"
                    );
                    result.malformed.insert(descriptor.location.clone());
                    continue;
                }
            };
            result.configured.insert(descriptor.location.clone());

            for package in index.equal_to(&definition) {
                if result.configured.insert(package.to_string()) {
                    debug!(
                        package,
                        override_location = %descriptor.location,
                        "Package configured by equal override"
                    );
                }
            }
        }

        debug!(
            configured = result.configured.len(),
            malformed = result.malformed.len(),
            "Reconciliation complete"
        );
        result
    }

    fn override_definition(&self, location: &str) -> Result<ConnectorDefinition, MetadataError> {
        let (definition, _) = merged_definition(self.store.as_ref(), self.merger.as_ref(), location)?;
        Ok(definition)
    }
}
