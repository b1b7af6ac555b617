//! # ironworks-metadata
//!
//! Connector metadata model and the metadata store contract used by the
//! deployment scanner.
//!
//! ## Concepts
//!
//! - A **package** descriptor is a self-contained connector archive (`.rar`).
//! - An **override** descriptor (`-ra.xml`) configures an existing archive.
//! - Override metadata is merged onto a base [`ConnectorDefinition`] by a
//!   [`Merger`]; the merged definition is what equality checks look at.
//!
//! The store itself is a collaborator: this crate only defines the trait and
//! an in-memory implementation for tests and local runs.

mod descriptor;
mod error;
mod merge;
mod store;
mod types;

pub use descriptor::{DeploymentDescriptor, DescriptorKind, SuffixConfig};
pub use error::MetadataError;
pub use merge::{merged_definition, Merger, OverrideMerger};
pub use store::{InMemoryMetadataStore, MetadataSeed, MetadataStore, SeedEntry};
pub use types::*;
