//! Error types for cluster selection.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when constructing an address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("node id cannot be empty")]
    Empty,

    #[error("node id contains whitespace: {0:?}")]
    Whitespace(String),
}

/// Errors from the cluster state provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// No distributed state could be read at all.
    #[error("cluster state unavailable: {0}")]
    Unavailable(String),

    /// The provider did not answer in time.
    #[error("cluster snapshot timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors from routing a work unit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// No peer has free capacity and local fallback is disabled.
    #[error("no work manager available for category {category}")]
    NoTarget { category: String },
}

/// A configuration string did not name a known variant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// A configuration value could not be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid value for {key}: {value:?}")]
pub struct InvalidSetting {
    pub key: &'static str,
    pub value: String,
}
