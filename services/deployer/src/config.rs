//! Deployer configuration.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use ironworks_reconcile::{ExclusionList, DEFAULT_ACTIVATION_TIMEOUT, DEFAULT_SCAN_INTERVAL};

/// Deployer configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Auto-activation on/off.
    pub enabled: bool,

    /// Archive suffixes never auto-activated.
    pub exclusions: ExclusionList,

    /// Parent-last isolation for activated packages.
    pub scope_deployment: bool,

    /// Upper bound on one candidate's activation.
    pub activation_timeout: Duration,

    /// Interval between deployment cycles.
    pub scan_interval: Duration,

    /// Optional JSON seed for the in-memory metadata store.
    pub metadata_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let enabled = lookup("IRONWORKS_ACTIVATOR_ENABLED")
            .map(|v| parse_bool(&v))
            .unwrap_or(true);

        let exclusions = lookup("IRONWORKS_EXCLUDE_ARCHIVES")
            .map(|v| ExclusionList::from_csv(&v))
            .unwrap_or_default();

        let scope_deployment = lookup("IRONWORKS_SCOPE_DEPLOYMENT")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        let activation_timeout_ms: Option<u64> = lookup("IRONWORKS_ACTIVATION_TIMEOUT_MS")
            .map(|v| v.parse())
            .transpose()
            .context("IRONWORKS_ACTIVATION_TIMEOUT_MS must be an integer (milliseconds).")?;
        let activation_timeout = activation_timeout_ms
            .map(|ms| Duration::from_millis(ms.max(10)))
            .unwrap_or(DEFAULT_ACTIVATION_TIMEOUT);

        let scan_interval_secs: Option<u64> = lookup("IRONWORKS_SCAN_INTERVAL_SECS")
            .map(|v| v.parse())
            .transpose()
            .context("IRONWORKS_SCAN_INTERVAL_SECS must be an integer (seconds).")?;
        let scan_interval = scan_interval_secs
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or(DEFAULT_SCAN_INTERVAL);

        let metadata_file = lookup("IRONWORKS_METADATA_FILE").map(PathBuf::from);

        let log_level = lookup("IRONWORKS_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            enabled,
            exclusions,
            scope_deployment,
            activation_timeout,
            scan_interval,
            metadata_file,
            log_level,
        })
    }
}
