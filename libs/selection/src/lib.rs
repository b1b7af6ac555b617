//! # ironworks-selection
//!
//! Chooses the cluster node that should execute a distributable work unit.
//!
//! ```text
//! submit(work) ──► WorkRouter ──► Selector ──► ClusterView ──► ClusterStateProvider
//!                     │               │             │
//!                     │               │             └─ SelectionMap (best effort, may be stale)
//!                     │               └─ Option<WorkManagerAddress>
//!                     └─ Route::Remote | Route::Local | RouteError::NoTarget
//! ```
//!
//! Selection is stateless per call. The only shared state is whatever the
//! cluster state provider keeps, and the view reads it as a point-in-time
//! snapshot. A peer reported busy that has since freed capacity is simply
//! picked up on a later call.

mod address;
mod cluster;
mod error;
mod router;
mod selector;

pub use address::{DistributableWork, NodeId, WorkManagerAddress};
pub use cluster::{
    ClusterStateProvider, ClusterView, ClusterViewConfig, InMemoryClusterState, PeerCapacity,
    PeerReport, SelectionMap,
};
pub use error::{AddressError, ClusterError, InvalidSetting, RouteError, UnknownVariant};
pub use router::{NoTargetPolicy, Route, WorkRouter};
pub use selector::{first_available, FirstAvailable, Selector, SelectorKind};
