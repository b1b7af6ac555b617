//! Discovered descriptors and their classification by suffix.

use serde::{Deserialize, Serialize};

/// Default suffix of a self-contained connector package.
pub const DEFAULT_PACKAGE_SUFFIX: &str = ".rar";

/// Default suffix of an override-only descriptor.
pub const DEFAULT_OVERRIDE_SUFFIX: &str = "-ra.xml";

/// Kind of a discovered descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    /// Self-contained connector archive.
    Package,
    /// Override-only descriptor referring to an existing archive.
    Override,
}

impl DescriptorKind {
    /// Classify a location by suffix. Returns `None` for unrelated entries.
    pub fn classify(location: &str, suffixes: &SuffixConfig) -> Option<Self> {
        if location.ends_with(suffixes.package.as_str()) {
            Some(Self::Package)
        } else if location.ends_with(suffixes.override_descriptor.as_str()) {
            Some(Self::Override)
        } else {
            None
        }
    }
}

impl std::fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Package => f.write_str("package"),
            Self::Override => f.write_str("override"),
        }
    }
}

/// Suffixes used to recognise descriptor kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixConfig {
    pub package: String,
    pub override_descriptor: String,
}

impl Default for SuffixConfig {
    fn default() -> Self {
        Self {
            package: DEFAULT_PACKAGE_SUFFIX.to_string(),
            override_descriptor: DEFAULT_OVERRIDE_SUFFIX.to_string(),
        }
    }
}

/// A discovered candidate, identified by its archive location.
///
/// Ordering is lexicographic on `location`. Scan passes rely on this order
/// so that equality-based duplicate detection resolves the same way on every
/// pass.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeploymentDescriptor {
    pub location: String,
    pub kind: DescriptorKind,
}

impl DeploymentDescriptor {
    pub fn new(location: impl Into<String>, kind: DescriptorKind) -> Self {
        Self {
            location: location.into(),
            kind,
        }
    }

    pub fn package(location: impl Into<String>) -> Self {
        Self::new(location, DescriptorKind::Package)
    }

    pub fn override_descriptor(location: impl Into<String>) -> Self {
        Self::new(location, DescriptorKind::Override)
    }

    pub fn is_package(&self) -> bool {
        self.kind == DescriptorKind::Package
    }

    /// Deployment name: the final path segment with the package suffix removed.
    ///
    /// `file:/opt/deploy/mail.rar` becomes `mail`.
    pub fn deployment_name(&self, suffixes: &SuffixConfig) -> String {
        let file_name = self
            .location
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.location.as_str());
        let suffix = match self.kind {
            DescriptorKind::Package => suffixes.package.as_str(),
            DescriptorKind::Override => suffixes.override_descriptor.as_str(),
        };
        file_name
            .strip_suffix(suffix)
            .unwrap_or(file_name)
            .to_string()
    }
}

impl std::fmt::Display for DeploymentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.location, self.kind)
    }
}
