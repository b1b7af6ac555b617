//! # ironworks-deployer
//!
//! Automatic activation of connector packages that nobody configured.
//!
//! ## Architecture
//!
//! - **Scanner**: discovers descriptors and plans a verdict for each one
//! - **Reconciler**: finds descriptors already configured by an administrator,
//!   directly or through an equal override
//! - **Driver**: activates planned candidates inside isolated execution
//!   contexts and tears them down on shutdown
//! - **Worker**: runs scan and activation on an interval
//!
//! Collaborators (metadata store, merger, context provider, assembler,
//! registry) sit behind traits with in-process implementations for tests and
//! local runs.

pub mod config;
pub mod context;
pub mod deployment;
pub mod driver;
pub mod error;
pub mod reconciler;
pub mod runtime;
pub mod scanner;
pub mod worker;

pub use config::Config;
pub use context::{
    current_context, in_context, ContextError, ContextHandle, ExecutionContextProvider,
    IsolationMode, LocalContextProvider, MockContextProvider,
};
pub use deployment::{Deployment, DeploymentSet};
pub use driver::{
    ActivationDriver, ActivationReport, Collaborators, DeactivationReport, DriverConfig,
    SkipReason,
};
pub use error::{ActivationFailure, DeployerError};
pub use reconciler::{DescriptorReconciler, Reconciliation};
pub use runtime::{
    ActivationRequest, Assembler, DefinitionAssembler, InMemoryRegistry, RegistrationHandle,
    Registry, RuntimeError, RuntimeObjects,
};
pub use scanner::{ActivationPlan, ActivationScanner};
pub use worker::{DeployerWorker, WorkerConfig};
