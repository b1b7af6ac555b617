//! Cluster addresses and work units.

use std::hash::{Hash, Hasher};

use bytes::Bytes;

use crate::error::AddressError;

/// Stable identifier of a cluster node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Parse a node id. It must be non-empty and contain no whitespace.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        if s.chars().any(char::is_whitespace) {
            return Err(AddressError::Whitespace(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for NodeId {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A node hosting work-execution capacity.
///
/// Equality and hashing look at the node id only: the same node seen with a
/// different work manager id is still the same address.
#[derive(Debug, Clone)]
pub struct WorkManagerAddress {
    node_id: NodeId,
    work_manager_id: Option<String>,
}

impl WorkManagerAddress {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            work_manager_id: None,
        }
    }

    /// Parse a node id and build an address from it.
    pub fn parse(node_id: &str) -> Result<Self, AddressError> {
        NodeId::parse(node_id).map(Self::new)
    }

    #[must_use]
    pub fn with_work_manager(mut self, work_manager_id: impl Into<String>) -> Self {
        self.work_manager_id = Some(work_manager_id.into());
        self
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn work_manager_id(&self) -> Option<&str> {
        self.work_manager_id.as_deref()
    }
}

impl PartialEq for WorkManagerAddress {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id
    }
}

impl Eq for WorkManagerAddress {}

impl Hash for WorkManagerAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node_id.hash(state);
    }
}

impl std::fmt::Display for WorkManagerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.work_manager_id {
            Some(wm) => write!(f, "{}/{}", self.node_id, wm),
            None => write!(f, "{}", self.node_id),
        }
    }
}

/// A unit of work submitted for possibly-remote execution.
///
/// The payload is opaque to selection; only `category` is consulted.
#[derive(Debug, Clone)]
pub struct DistributableWork {
    pub origin: WorkManagerAddress,
    pub category: String,
    pub payload: Bytes,
}

impl DistributableWork {
    pub fn new(
        origin: WorkManagerAddress,
        category: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            origin,
            category: category.into(),
            payload: payload.into(),
        }
    }
}
