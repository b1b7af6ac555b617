//! ironworks deployer
//!
//! Scans the metadata store on an interval, activates connector packages that
//! have no explicit configuration, and deactivates them on shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use ironworks_deployer::{
    ActivationDriver, ActivationScanner, Collaborators, Config, DefinitionAssembler,
    DeployerWorker, DeploymentSet, DescriptorReconciler, DriverConfig, InMemoryRegistry,
    LocalContextProvider, WorkerConfig,
};
use ironworks_metadata::{InMemoryMetadataStore, MetadataStore, OverrideMerger, SuffixConfig};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_str().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        enabled = config.enabled,
        scope_deployment = config.scope_deployment,
        excluded = config.exclusions.suffixes().len(),
        activation_timeout = ?config.activation_timeout,
        "Starting ironworks deployer"
    );

    let store = match &config.metadata_file {
        Some(path) => InMemoryMetadataStore::from_path(path)
            .with_context(|| format!("Failed to load metadata seed {}", path.display()))?,
        None => {
            warn!("IRONWORKS_METADATA_FILE not set, starting with an empty metadata store");
            InMemoryMetadataStore::new()
        }
    };
    let store: Arc<dyn MetadataStore> = Arc::new(store);
    let merger = Arc::new(OverrideMerger);
    let suffixes = SuffixConfig::default();

    let reconciler = DescriptorReconciler::new(Arc::clone(&store), merger.clone());
    let scanner = ActivationScanner::new(Arc::clone(&store), reconciler, suffixes.clone());

    let driver = ActivationDriver::new(
        DriverConfig {
            scope_deployment: config.scope_deployment,
            activation_timeout: config.activation_timeout,
            suffixes,
        },
        Collaborators {
            store,
            merger,
            contexts: Arc::new(LocalContextProvider::new()),
            assembler: Arc::new(DefinitionAssembler),
            registry: Arc::new(InMemoryRegistry::new()),
        },
        Arc::new(DeploymentSet::new()),
    );

    let worker = DeployerWorker::new(
        scanner,
        Arc::new(driver),
        WorkerConfig {
            enabled: config.enabled,
            exclusions: config.exclusions.clone(),
            interval: config.scan_interval,
        },
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    match worker_handle.await {
        Ok(report) if report.failed.is_empty() => {
            info!(deactivated = report.deactivated.len(), "Deployer stopped");
        }
        Ok(report) => {
            warn!(
                deactivated = report.deactivated.len(),
                failures = report.failed.len(),
                "Deployer stopped with deactivation failures"
            );
        }
        Err(e) => error!(error = %e, "Deployer worker panicked"),
    }

    Ok(())
}
