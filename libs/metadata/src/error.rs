//! Error types for metadata retrieval.

use thiserror::Error;

/// Errors returned by a metadata store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// Nothing is known about this location.
    #[error("no metadata for {0}")]
    NotFound(String),

    /// The stored descriptor could not be parsed.
    #[error("malformed descriptor {location}: {detail}")]
    Malformed { location: String, detail: String },

    /// The store could not be queried at all.
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),

    /// A seed document could not be loaded.
    #[error("invalid metadata seed: {0}")]
    Seed(String),
}

impl MetadataError {
    /// Returns true if this error concerns one descriptor rather than the store.
    pub fn is_per_descriptor(&self) -> bool {
        matches!(self, MetadataError::NotFound(_) | MetadataError::Malformed { .. })
    }
}
