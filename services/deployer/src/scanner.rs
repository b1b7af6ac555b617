//! Activation scanner.
//!
//! Enumerates candidate descriptors from the metadata store and assigns each
//! one a verdict for the current pass. The scanner has no side effects; the
//! plan it produces is computed from scratch every time.

use std::collections::BTreeSet;
use std::sync::Arc;

use ironworks_metadata::{DeploymentDescriptor, DescriptorKind, MetadataStore, SuffixConfig};
use ironworks_reconcile::{decide, ActivationDecision, ExclusionList};
use tracing::{debug, info, instrument};

use crate::error::DeployerError;
use crate::reconciler::DescriptorReconciler;

/// Verdicts for every descriptor discovered in one pass, in location order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationPlan {
    entries: Vec<(DeploymentDescriptor, ActivationDecision)>,
}

impl ActivationPlan {
    pub fn entries(&self) -> &[(DeploymentDescriptor, ActivationDecision)] {
        &self.entries
    }

    /// Packages that should be activated.
    pub fn candidates(&self) -> impl Iterator<Item = &DeploymentDescriptor> {
        self.entries
            .iter()
            .filter(|(descriptor, decision)| descriptor.is_package() && decision.is_candidate())
            .map(|(descriptor, _)| descriptor)
    }

    pub fn decision_for(&self, location: &str) -> Option<ActivationDecision> {
        self.entries
            .iter()
            .find(|(descriptor, _)| descriptor.location == location)
            .map(|(_, decision)| *decision)
    }

    /// Number of descriptors with the given verdict.
    pub fn count(&self, decision: ActivationDecision) -> usize {
        self.entries.iter().filter(|(_, d)| *d == decision).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Discovers descriptors and plans activation.
pub struct ActivationScanner {
    store: Arc<dyn MetadataStore>,
    reconciler: DescriptorReconciler,
    suffixes: SuffixConfig,
}

impl ActivationScanner {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        reconciler: DescriptorReconciler,
        suffixes: SuffixConfig,
    ) -> Self {
        Self {
            store,
            reconciler,
            suffixes,
        }
    }

    /// Every known location that is a package or an override, classified.
    ///
    /// Failure to enumerate the store fails the whole pass.
    pub fn discover(&self) -> Result<BTreeSet<DeploymentDescriptor>, DeployerError> {
        let locations = self.store.list_candidates().map_err(DeployerError::Scan)?;

        let descriptors = locations
            .into_iter()
            .filter_map(|location| match DescriptorKind::classify(&location, &self.suffixes) {
                Some(kind) => Some(DeploymentDescriptor::new(location, kind)),
                None => {
                    debug!(location = %location, "Ignoring unrelated entry");
                    None
                }
            })
            .collect();
        Ok(descriptors)
    }

    /// Discover, reconcile, and assign one verdict per descriptor.
    #[instrument(skip(self, exclusions))]
    pub fn plan(&self, exclusions: &ExclusionList) -> Result<ActivationPlan, DeployerError> {
        let descriptors = self.discover()?;
        let reconciliation = self.reconciler.reconcile(&descriptors);

        let entries: Vec<_> = descriptors
            .into_iter()
            .map(|descriptor| {
                let decision = if reconciliation.malformed.contains(&descriptor.location) {
                    ActivationDecision::Malformed
                } else {
                    decide(&descriptor.location, &reconciliation.configured, exclusions)
                };
                debug!(location = %descriptor.location, kind = %descriptor.kind, %decision, "Verdict");
                (descriptor, decision)
            })
            .collect();

        let plan = ActivationPlan { entries };
        info!(
            discovered = plan.len(),
            configured = plan.count(ActivationDecision::ExplicitlyConfigured),
            excluded = plan.count(ActivationDecision::Excluded),
            malformed = plan.count(ActivationDecision::Malformed),
            candidates = plan.candidates().count(),
            "Activation plan computed"
        );
        Ok(plan)
    }
}
