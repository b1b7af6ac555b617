//! Activation driver.
//!
//! Turns an activation plan into live deployments and tears them down again.
//!
//! ## Per-candidate flow
//!
//! 1. Load the connector definition and merge override metadata
//! 2. Check the definition may be activated without an administrator
//! 3. Open an isolated execution context for the archive
//! 4. Assemble runtime objects inside that context
//! 5. Register the objects and record the deployment
//!
//! Every step of one candidate is bounded by the activation timeout. A
//! failure is reported against that candidate only; the rest of the plan
//! still runs.
//!
//! Registration runs in its own task under the same deadline. When the
//! deadline passes first, the driver keeps the task and unregisters whatever
//! it eventually returns, so a timed-out candidate leaves nothing registered.
//! Teardown waits for those rollbacks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ironworks_metadata::{
    merged_definition, DeploymentDescriptor, Merger, MetadataStore, SuffixConfig,
};
use ironworks_reconcile::DEFAULT_ACTIVATION_TIMEOUT;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::context::{
    in_context, ContextError, ContextHandle, ExecutionContextProvider, IsolationMode,
};
use crate::deployment::{Deployment, DeploymentSet};
use crate::error::{ActivationFailure, DeployerError};
use crate::runtime::{
    ActivationRequest, Assembler, RegistrationHandle, Registry, RuntimeError, RuntimeObjects,
};
use crate::scanner::ActivationPlan;

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Give each package a parent-last context.
    pub scope_deployment: bool,
    /// Upper bound on one candidate's activation.
    pub activation_timeout: Duration,
    pub suffixes: SuffixConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            scope_deployment: false,
            activation_timeout: DEFAULT_ACTIVATION_TIMEOUT,
            suffixes: SuffixConfig::default(),
        }
    }
}

/// Collaborators the driver delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn MetadataStore>,
    pub merger: Arc<dyn Merger>,
    pub contexts: Arc<dyn ExecutionContextProvider>,
    pub assembler: Arc<dyn Assembler>,
    pub registry: Arc<dyn Registry>,
}

/// Why a candidate was not activated although nothing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Already live from an earlier pass.
    AlreadyActive,
    /// The archive disappeared between discovery and activation.
    ArchiveMissing,
    /// Ambiguous definition that needs an administrator.
    NotActivatable,
}

/// Outcome of one activation pass.
#[derive(Debug, Default)]
pub struct ActivationReport {
    /// Locations activated in this pass.
    pub activated: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
    pub failed: Vec<DeployerError>,
    /// Shutdown was signalled before every candidate was attempted.
    pub cancelled: bool,
}

/// Outcome of a teardown.
#[derive(Debug, Default)]
pub struct DeactivationReport {
    /// Deployments whose registrations were all removed.
    pub deactivated: Vec<String>,
    /// One entry per registration that could not be removed.
    pub failed: Vec<DeployerError>,
}

enum Outcome {
    Activated(Deployment),
    Skipped(SkipReason),
}

/// A candidate ready to register.
struct Prepared {
    name: String,
    context: ContextHandle,
    objects: RuntimeObjects,
}

enum Stage {
    Ready(Prepared),
    Skipped(SkipReason),
}

type Registration = JoinHandle<Result<Vec<RegistrationHandle>, RuntimeError>>;

/// Activates planned candidates and deactivates live deployments.
pub struct ActivationDriver {
    config: DriverConfig,
    collaborators: Collaborators,
    deployments: Arc<DeploymentSet>,
    root: ContextHandle,
    /// Rollbacks of registrations that outlived their activation deadline.
    rollbacks: Mutex<JoinSet<Vec<DeployerError>>>,
}

impl ActivationDriver {
    pub fn new(
        config: DriverConfig,
        collaborators: Collaborators,
        deployments: Arc<DeploymentSet>,
    ) -> Self {
        Self {
            config,
            collaborators,
            deployments,
            root: ContextHandle::root(),
            rollbacks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn deployments(&self) -> &Arc<DeploymentSet> {
        &self.deployments
    }

    /// Activate the candidates of `plan`.
    pub async fn activate_plan(
        &self,
        plan: &ActivationPlan,
        shutdown: &watch::Receiver<bool>,
    ) -> ActivationReport {
        self.activate(plan.candidates(), shutdown).await
    }

    /// Activate every package in `candidates`, one at a time.
    ///
    /// Stops starting new activations once `shutdown` reads true.
    /// Deployments completed before that are recorded and stay live.
    #[instrument(skip_all)]
    pub async fn activate<'a, I>(
        &self,
        candidates: I,
        shutdown: &watch::Receiver<bool>,
    ) -> ActivationReport
    where
        I: IntoIterator<Item = &'a DeploymentDescriptor>,
    {
        let mut report = ActivationReport::default();

        for descriptor in candidates {
            if *shutdown.borrow() {
                info!("Shutdown signalled, no further activations");
                report.cancelled = true;
                break;
            }
            if !descriptor.is_package() {
                continue;
            }

            let location = descriptor.location.clone();
            match self.activate_one(descriptor).await {
                Ok(Outcome::Activated(deployment)) => {
                    info!(
                        location = %location,
                        deployment = %deployment.name,
                        registrations = deployment.registrations.len(),
                        "Activated deployment"
                    );
                    if let Some(replaced) = self.deployments.insert(deployment).await {
                        warn!(
                            location = %location,
                            replaced = %replaced.name,
                            "Replaced a live deployment, deactivating the old one"
                        );
                        report
                            .failed
                            .extend(self.deactivate(vec![replaced]).await.failed);
                    }
                    report.activated.push(location);
                }
                Ok(Outcome::Skipped(reason)) => {
                    debug!(location = %location, ?reason, "Skipped candidate");
                    report.skipped.push((location, reason));
                }
                Err(source) => {
                    let error = DeployerError::Activation { location, source };
                    warn!(
                        location = error.location().unwrap_or_default(),
                        reason = error.reason_code(),
                        error = %error,
                        "Activation failed"
                    );
                    report.failed.push(error);
                }
            }
        }

        report
    }

    async fn activate_one(
        &self,
        descriptor: &DeploymentDescriptor,
    ) -> Result<Outcome, ActivationFailure> {
        let location = descriptor.location.as_str();
        if self.deployments.contains(location).await {
            return Ok(Outcome::Skipped(SkipReason::AlreadyActive));
        }

        let timeout = self.config.activation_timeout;
        let deadline = Instant::now() + timeout;
        let prepared = match tokio::time::timeout_at(deadline, self.prepare(descriptor)).await {
            Ok(Ok(Stage::Ready(prepared))) => prepared,
            Ok(Ok(Stage::Skipped(reason))) => return Ok(Outcome::Skipped(reason)),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(ActivationFailure::Timeout(timeout)),
        };

        let registrations = self.register_until(deadline, location, &prepared.objects).await?;

        Ok(Outcome::Activated(Deployment {
            location: location.to_string(),
            name: prepared.name,
            context: prepared.context,
            objects: prepared.objects,
            registrations,
            activated_at: Utc::now(),
        }))
    }

    /// Everything up to registration. Nothing here needs undoing.
    async fn prepare(&self, descriptor: &DeploymentDescriptor) -> Result<Stage, ActivationFailure> {
        let location = descriptor.location.as_str();
        let c = &self.collaborators;
        let (definition, has_override) =
            merged_definition(c.store.as_ref(), c.merger.as_ref(), location)?;
        if !definition.is_auto_activatable(has_override) {
            return Ok(Stage::Skipped(SkipReason::NotActivatable));
        }

        let mode = IsolationMode::for_scope(self.config.scope_deployment);
        let context = match c.contexts.open(location, &self.root, mode).await {
            Ok(context) => context,
            Err(ContextError::ArchiveMissing(_)) => {
                return Ok(Stage::Skipped(SkipReason::ArchiveMissing));
            }
            Err(e) => return Err(e.into()),
        };

        let name = descriptor.deployment_name(&self.config.suffixes);
        let request = ActivationRequest {
            location,
            deployment_name: &name,
            definition: &definition,
        };
        let objects = in_context(context.clone(), c.assembler.assemble(&request, &context)).await?;

        Ok(Stage::Ready(Prepared {
            name,
            context,
            objects,
        }))
    }

    /// Register `objects`, giving up at `deadline`.
    ///
    /// On timeout the registration task keeps running and is handed to a
    /// rollback that unregisters its result.
    async fn register_until(
        &self,
        deadline: Instant,
        location: &str,
        objects: &RuntimeObjects,
    ) -> Result<Vec<RegistrationHandle>, ActivationFailure> {
        let registry = Arc::clone(&self.collaborators.registry);
        let owned = objects.clone();
        let mut registration: Registration =
            tokio::spawn(async move { registry.register(&owned).await });

        match tokio::time::timeout_at(deadline, &mut registration).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(e)) => {
                Err(RuntimeError::Registration(format!("registration task failed: {e}")).into())
            }
            Err(_) => {
                self.schedule_rollback(location, registration).await;
                Err(ActivationFailure::Timeout(self.config.activation_timeout))
            }
        }
    }

    async fn schedule_rollback(&self, location: &str, registration: Registration) {
        let registry = Arc::clone(&self.collaborators.registry);
        let location = location.to_string();

        let mut rollbacks = self.rollbacks.lock().await;
        while rollbacks.try_join_next().is_some() {}
        rollbacks.spawn(async move {
            let handles = match registration.await {
                Ok(Ok(handles)) => handles,
                _ => return Vec::new(),
            };

            let mut failed = Vec::new();
            for handle in &handles {
                if let Err(e) = registry.unregister(handle).await {
                    warn!(
                        location = %location,
                        handle = %handle,
                        error = %e,
                        "Rollback failed to unregister"
                    );
                    failed.push(DeployerError::Deactivation {
                        location: location.clone(),
                        source: e,
                    });
                }
            }
            info!(
                location = %location,
                registrations = handles.len(),
                "Rolled back registrations of timed-out activation"
            );
            failed
        });
    }

    /// Wait for outstanding rollbacks and collect their failures.
    async fn settle_rollbacks(&self) -> Vec<DeployerError> {
        let mut pending = std::mem::take(&mut *self.rollbacks.lock().await);
        let mut failed = Vec::new();
        while let Some(result) = pending.join_next().await {
            match result {
                Ok(errors) => failed.extend(errors),
                Err(e) => warn!(error = %e, "Rollback task failed"),
            }
        }
        failed
    }

    /// Unregister every registration of `deployments`.
    ///
    /// A failed removal is logged and reported; the remaining registrations
    /// and deployments are still attempted.
    pub async fn deactivate(&self, deployments: Vec<Deployment>) -> DeactivationReport {
        let mut report = DeactivationReport::default();

        for deployment in deployments {
            let mut clean = true;
            for handle in &deployment.registrations {
                if let Err(e) = self.collaborators.registry.unregister(handle).await {
                    warn!(
                        location = %deployment.location,
                        handle = %handle,
                        error = %e,
                        "Failed to unregister, continuing"
                    );
                    clean = false;
                    report.failed.push(DeployerError::Deactivation {
                        location: deployment.location.clone(),
                        source: e,
                    });
                }
            }
            if clean {
                debug!(location = %deployment.location, "Deactivated deployment");
                report.deactivated.push(deployment.location);
            }
        }

        report
    }

    /// Drain the deployment set and deactivate everything in it, after any
    /// pending rollbacks have finished.
    #[instrument(skip(self))]
    pub async fn deactivate_all(&self) -> DeactivationReport {
        let rollback_failures = self.settle_rollbacks().await;
        let deployments = self.deployments.take_all().await;
        let total = deployments.len();
        let mut report = self.deactivate(deployments).await;
        report.failed.extend(rollback_failures);
        info!(
            total,
            deactivated = report.deactivated.len(),
            failures = report.failed.len(),
            "Deactivation complete"
        );
        report
    }
}
