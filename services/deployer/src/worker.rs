//! Deployer background worker.
//!
//! Runs a deployment cycle (plan, then activate) on a periodic interval and
//! deactivates everything it activated once shutdown is signalled.

use std::sync::Arc;
use std::time::Duration;

use ironworks_reconcile::ExclusionList;
use tokio::sync::watch;
use tracing::{error, info, instrument};

use crate::driver::{ActivationDriver, ActivationReport, DeactivationReport};
use crate::error::DeployerError;
use crate::scanner::ActivationScanner;

/// Worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// When false, cycles do nothing.
    pub enabled: bool,
    pub exclusions: ExclusionList,
    pub interval: Duration,
}

/// Runs deployment cycles until shutdown.
pub struct DeployerWorker {
    scanner: ActivationScanner,
    driver: Arc<ActivationDriver>,
    config: WorkerConfig,
}

impl DeployerWorker {
    pub fn new(
        scanner: ActivationScanner,
        driver: Arc<ActivationDriver>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            scanner,
            driver,
            config,
        }
    }

    /// Run until shutdown is signalled, then deactivate everything.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> DeactivationReport {
        info!(
            enabled = self.config.enabled,
            interval_secs = self.config.interval.as_secs(),
            "Starting deployer worker"
        );

        // The first tick completes immediately, so packages come up at startup.
        let mut interval = tokio::time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_cycle(&shutdown).await {
                        error!(error = %e, reason = e.reason_code(), "Deployment cycle failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Deployer worker shutting down");
                        break;
                    }
                }
            }
        }

        self.driver.deactivate_all().await
    }

    /// Run a single cycle. Returns `None` when auto-activation is disabled.
    pub async fn run_cycle(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Option<ActivationReport>, DeployerError> {
        if !self.config.enabled {
            return Ok(None);
        }

        let plan = self.scanner.plan(&self.config.exclusions)?;
        let report = self.driver.activate_plan(&plan, shutdown).await;

        if !report.activated.is_empty() || !report.failed.is_empty() {
            info!(
                activated = report.activated.len(),
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                cancelled = report.cancelled,
                "Deployment cycle complete"
            );
        }
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use ironworks_metadata::{
        ConnectorDefinition, InMemoryMetadataStore, OverrideMerger, SpecVersion, SuffixConfig,
    };

    use super::*;
    use crate::context::MockContextProvider;
    use crate::deployment::DeploymentSet;
    use crate::driver::{Collaborators, DriverConfig};
    use crate::reconciler::DescriptorReconciler;
    use crate::runtime::{DefinitionAssembler, InMemoryRegistry};

    fn worker(store: Arc<InMemoryMetadataStore>, enabled: bool) -> DeployerWorker {
        let reconciler = DescriptorReconciler::new(store.clone(), Arc::new(OverrideMerger));
        let scanner = ActivationScanner::new(store.clone(), reconciler, SuffixConfig::default());
        let driver = ActivationDriver::new(
            DriverConfig::default(),
            Collaborators {
                store,
                merger: Arc::new(OverrideMerger),
                contexts: Arc::new(MockContextProvider::new()),
                assembler: Arc::new(DefinitionAssembler),
                registry: Arc::new(InMemoryRegistry::new()),
            },
            Arc::new(DeploymentSet::new()),
        );
        DeployerWorker::new(
            scanner,
            Arc::new(driver),
            WorkerConfig {
                enabled,
                exclusions: ExclusionList::default(),
                interval: Duration::from_millis(20),
            },
        )
    }

    #[tokio::test]
    async fn test_disabled_cycle_is_noop() {
        let store = Arc::new(InMemoryMetadataStore::new());
        store.insert_package("a.rar", &ConnectorDefinition::new(SpecVersion::V15));
        let worker = worker(store, false);

        let result = worker.run_cycle(&watch::channel(false).1).await.unwrap();

        assert!(result.is_none());
        assert!(worker.driver.deployments().is_empty().await);
    }

    #[tokio::test]
    async fn test_second_cycle_does_not_reactivate() {
        let store = Arc::new(InMemoryMetadataStore::new());
        store.insert_package("a.rar", &ConnectorDefinition::new(SpecVersion::V15));
        let worker = worker(store, true);
        let (_tx, rx) = watch::channel(false);

        let first = worker.run_cycle(&rx).await.unwrap().unwrap();
        let second = worker.run_cycle(&rx).await.unwrap().unwrap();

        assert_eq!(first.activated, ["a.rar"]);
        assert!(second.activated.is_empty());
        assert_eq!(second.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_run_deactivates_on_shutdown() {
        let store = Arc::new(InMemoryMetadataStore::new());
        store.insert_package("a.rar", &ConnectorDefinition::new(SpecVersion::V15));
        let worker = Arc::new(worker(store, true));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn({
            let worker = Arc::clone(&worker);
            async move { worker.run(rx).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let report = handle.await.unwrap();

        assert_eq!(report.deactivated, ["a.rar"]);
        assert!(worker.driver.deployments().is_empty().await);
    }
}
