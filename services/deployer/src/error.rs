//! Error types for the deployer.

use std::time::Duration;

use ironworks_metadata::MetadataError;
use thiserror::Error;

use crate::context::ContextError;
use crate::runtime::RuntimeError;

/// Deployer errors with standardized reason codes.
#[derive(Debug, Error)]
pub enum DeployerError {
    /// Candidates could not be enumerated; the whole pass fails.
    #[error("cannot enumerate deployment candidates: {0}")]
    Scan(#[source] MetadataError),

    /// One candidate failed to activate. Other candidates are unaffected.
    #[error("activation of {location} failed: {source}")]
    Activation {
        location: String,
        #[source]
        source: ActivationFailure,
    },

    /// One registration of a deployment could not be removed.
    #[error("deactivation of {location} failed: {source}")]
    Deactivation {
        location: String,
        #[source]
        source: RuntimeError,
    },
}

impl DeployerError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            DeployerError::Scan(_) => "scan_failed",
            DeployerError::Activation { source, .. } => source.reason_code(),
            DeployerError::Deactivation { .. } => "deactivation_failed",
        }
    }

    /// Archive location this error is tied to, if any.
    pub fn location(&self) -> Option<&str> {
        match self {
            DeployerError::Scan(_) => None,
            DeployerError::Activation { location, .. }
            | DeployerError::Deactivation { location, .. } => Some(location),
        }
    }
}

/// Why a single activation failed.
#[derive(Debug, Error)]
pub enum ActivationFailure {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ActivationFailure {
    pub fn reason_code(&self) -> &'static str {
        match self {
            ActivationFailure::Metadata(_) => "metadata_unreadable",
            ActivationFailure::Context(_) => "context_open_failed",
            ActivationFailure::Runtime(RuntimeError::Registration(_))
            | ActivationFailure::Runtime(RuntimeError::Conflict(_)) => "registration_failed",
            ActivationFailure::Runtime(_) => "assembly_failed",
            ActivationFailure::Timeout(_) => "activation_timeout",
        }
    }
}
