//! Cluster capacity view.
//!
//! The view turns whatever the distributed state provider reports into a
//! [`SelectionMap`] for one work category:
//! - Unreachable peers are omitted
//! - A provider that fails or stalls yields an empty map, never a hang
//!
//! Nothing here is strongly consistent. A snapshot reflects the provider's
//! best knowledge at the time of the call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::address::{NodeId, WorkManagerAddress};
use crate::error::{ClusterError, InvalidSetting};

/// Free capacity reported for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerCapacity {
    /// Number of free execution slots. May be zero or negative when stale.
    Free(i64),

    /// The peer is reachable but has not published a count.
    Unknown,

    /// The peer could not be reached.
    Unreachable,
}

/// One peer's entry in a provider report.
#[derive(Debug, Clone)]
pub struct PeerReport {
    pub address: WorkManagerAddress,
    pub capacity: PeerCapacity,
}

/// Source of distributed capacity information.
#[async_trait]
pub trait ClusterStateProvider: Send + Sync {
    /// Free capacity per peer for a work category, in the provider's order.
    async fn current_free_capacity(&self, category: &str)
        -> Result<Vec<PeerReport>, ClusterError>;
}

/// Free capacity per address, in snapshot order.
///
/// The order is whatever the provider reported and carries no ranking. The
/// requesting node's own address may be present; selectors must skip it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionMap {
    entries: Vec<(WorkManagerAddress, Option<i64>)>,
}

impl SelectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. An address already present keeps its position and
    /// takes the new value.
    pub fn insert(&mut self, address: WorkManagerAddress, free: Option<i64>) {
        match self.entries.iter_mut().find(|(a, _)| *a == address) {
            Some(entry) => entry.1 = free,
            None => self.entries.push((address, free)),
        }
    }

    /// Capacity for an address. `None` if absent, `Some(None)` if unknown.
    pub fn get(&self, address: &WorkManagerAddress) -> Option<Option<i64>> {
        self.entries
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, free)| *free)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WorkManagerAddress, Option<i64>)> {
        self.entries.iter().map(|(a, free)| (a, *free))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(WorkManagerAddress, Option<i64>)> for SelectionMap {
    fn from_iter<T: IntoIterator<Item = (WorkManagerAddress, Option<i64>)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (address, free) in iter {
            map.insert(address, free);
        }
        map
    }
}

/// Cluster view configuration.
#[derive(Debug, Clone)]
pub struct ClusterViewConfig {
    /// Upper bound on a single provider call.
    pub snapshot_timeout: Duration,
}

impl Default for ClusterViewConfig {
    fn default() -> Self {
        Self {
            snapshot_timeout: Duration::from_secs(2),
        }
    }
}

impl ClusterViewConfig {
    const SNAPSHOT_TIMEOUT_MS: &'static str = "IRONWORKS_SNAPSHOT_TIMEOUT_MS";

    pub fn from_env() -> Result<Self, InvalidSetting> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Read the view configuration through `lookup`.
    ///
    /// `IRONWORKS_SNAPSHOT_TIMEOUT_MS` is in milliseconds, at least 1.
    /// Unset keys keep their defaults.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, InvalidSetting> {
        let mut config = Self::default();
        if let Some(raw) = lookup(Self::SNAPSHOT_TIMEOUT_MS) {
            let ms: u64 = raw.trim().parse().map_err(|_| InvalidSetting {
                key: Self::SNAPSHOT_TIMEOUT_MS,
                value: raw.clone(),
            })?;
            config.snapshot_timeout = Duration::from_millis(ms.max(1));
        }
        Ok(config)
    }
}

/// Read-only view over the distributed capacity state.
pub struct ClusterView {
    provider: Arc<dyn ClusterStateProvider>,
    config: ClusterViewConfig,
}

impl ClusterView {
    pub fn new(provider: Arc<dyn ClusterStateProvider>, config: ClusterViewConfig) -> Self {
        Self { provider, config }
    }

    /// Best-known free capacity per peer. Never fails: a provider error or
    /// timeout yields an empty map.
    pub async fn snapshot(&self, category: &str) -> SelectionMap {
        match self.try_snapshot(category).await {
            Ok(map) => map,
            Err(e) => {
                warn!(category, error = %e, "Cluster snapshot unavailable, assuming no peers");
                SelectionMap::new()
            }
        }
    }

    /// Like [`snapshot`](Self::snapshot) but surfaces total failure.
    pub async fn try_snapshot(&self, category: &str) -> Result<SelectionMap, ClusterError> {
        let reports = tokio::time::timeout(
            self.config.snapshot_timeout,
            self.provider.current_free_capacity(category),
        )
        .await
        .map_err(|_| ClusterError::Timeout(self.config.snapshot_timeout))??;

        let mut map = SelectionMap::new();
        for report in reports {
            match report.capacity {
                PeerCapacity::Free(free) => map.insert(report.address, Some(free)),
                PeerCapacity::Unknown => map.insert(report.address, None),
                PeerCapacity::Unreachable => {
                    debug!(category, peer = %report.address, "Omitting unreachable peer");
                }
            }
        }

        Ok(map)
    }
}

#[derive(Debug, Default)]
struct ClusterTable {
    /// Members in join order.
    members: Vec<WorkManagerAddress>,
    /// category -> node -> capacity
    capacity: HashMap<String, HashMap<NodeId, PeerCapacity>>,
    unreachable: HashSet<NodeId>,
    unavailable: bool,
}

/// In-process cluster state, for tests and single-process wiring.
#[derive(Debug, Default)]
pub struct InMemoryClusterState {
    table: RwLock<ClusterTable>,
}

impl InMemoryClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the view. Joining twice is a no-op.
    pub async fn join(&self, address: WorkManagerAddress) {
        let mut table = self.table.write().await;
        if !table.members.contains(&address) {
            debug!(peer = %address, "Node joined");
            table.members.push(address);
        }
    }

    /// Remove a node and everything reported about it.
    pub async fn depart(&self, node_id: &NodeId) {
        let mut table = self.table.write().await;
        table.members.retain(|a| a.node_id() != node_id);
        for per_node in table.capacity.values_mut() {
            per_node.remove(node_id);
        }
        table.unreachable.remove(node_id);
        debug!(node_id = %node_id, "Node departed");
    }

    /// Publish a node's free capacity for a category.
    pub async fn update_capacity(&self, category: &str, node_id: &NodeId, capacity: PeerCapacity) {
        self.table
            .write()
            .await
            .capacity
            .entry(category.to_string())
            .or_default()
            .insert(node_id.clone(), capacity);
    }

    pub async fn set_reachable(&self, node_id: &NodeId, reachable: bool) {
        let mut table = self.table.write().await;
        if reachable {
            table.unreachable.remove(node_id);
        } else {
            table.unreachable.insert(node_id.clone());
        }
    }

    /// Simulate total loss of distributed state.
    pub async fn set_available(&self, available: bool) {
        self.table.write().await.unavailable = !available;
    }

    pub async fn member_count(&self) -> usize {
        self.table.read().await.members.len()
    }
}

#[async_trait]
impl ClusterStateProvider for InMemoryClusterState {
    async fn current_free_capacity(
        &self,
        category: &str,
    ) -> Result<Vec<PeerReport>, ClusterError> {
        let table = self.table.read().await;
        if table.unavailable {
            return Err(ClusterError::Unavailable("cluster state offline".to_string()));
        }

        let per_node = table.capacity.get(category);
        Ok(table
            .members
            .iter()
            .map(|address| {
                let capacity = if table.unreachable.contains(address.node_id()) {
                    PeerCapacity::Unreachable
                } else {
                    per_node
                        .and_then(|m| m.get(address.node_id()))
                        .copied()
                        .unwrap_or(PeerCapacity::Unknown)
                };
                PeerReport {
                    address: address.clone(),
                    capacity,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[rstest]
    #[case(&[], Duration::from_secs(2))]
    #[case(&[("IRONWORKS_SNAPSHOT_TIMEOUT_MS", "750")], Duration::from_millis(750))]
    #[case(&[("IRONWORKS_SNAPSHOT_TIMEOUT_MS", " 40 ")], Duration::from_millis(40))]
    #[case(&[("IRONWORKS_SNAPSHOT_TIMEOUT_MS", "0")], Duration::from_millis(1))]
    fn test_view_config_from_vars(
        #[case] pairs: &'static [(&'static str, &'static str)],
        #[case] expected: Duration,
    ) {
        let config = ClusterViewConfig::from_vars(vars(pairs)).unwrap();
        assert_eq!(config.snapshot_timeout, expected);
    }

    #[test]
    fn test_view_config_rejects_non_numeric_timeout() {
        let err = ClusterViewConfig::from_vars(vars(&[("IRONWORKS_SNAPSHOT_TIMEOUT_MS", "2s")]))
            .unwrap_err();
        assert_eq!(err.key, "IRONWORKS_SNAPSHOT_TIMEOUT_MS");
        assert_eq!(err.value, "2s");
    }

    fn addr(id: &str) -> WorkManagerAddress {
        WorkManagerAddress::parse(id).unwrap()
    }

    struct StalledProvider;

    #[async_trait]
    impl ClusterStateProvider for StalledProvider {
        async fn current_free_capacity(
            &self,
            _category: &str,
        ) -> Result<Vec<PeerReport>, ClusterError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_selection_map_keeps_insertion_order() {
        let mut map = SelectionMap::new();
        map.insert(addr("c"), Some(1));
        map.insert(addr("a"), None);
        map.insert(addr("b"), Some(0));
        map.insert(addr("a"), Some(4));

        let order: Vec<_> = map.iter().map(|(a, _)| a.node_id().as_str()).collect();
        assert_eq!(order, ["c", "a", "b"]);
        assert_eq!(map.get(&addr("a")), Some(Some(4)));
        assert_eq!(map.get(&addr("z")), None);
    }

    #[tokio::test]
    async fn test_snapshot_omits_unreachable_peers() {
        let state = Arc::new(InMemoryClusterState::new());
        for id in ["a", "b", "c"] {
            state.join(addr(id)).await;
        }
        state.update_capacity("batch", &NodeId::parse("a").unwrap(), PeerCapacity::Free(2)).await;
        state.update_capacity("batch", &NodeId::parse("b").unwrap(), PeerCapacity::Free(5)).await;
        state.set_reachable(&NodeId::parse("b").unwrap(), false).await;

        let view = ClusterView::new(state, ClusterViewConfig::default());
        let map = view.snapshot("batch").await;

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&addr("a")), Some(Some(2)));
        assert_eq!(map.get(&addr("b")), None);
        assert_eq!(map.get(&addr("c")), Some(None));
    }

    #[tokio::test]
    async fn test_snapshot_empty_when_unavailable() {
        let state = Arc::new(InMemoryClusterState::new());
        state.join(addr("a")).await;
        state.set_available(false).await;

        let view = ClusterView::new(state, ClusterViewConfig::default());

        assert!(view.snapshot("batch").await.is_empty());
        assert!(matches!(
            view.try_snapshot("batch").await,
            Err(ClusterError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_bounded_by_timeout() {
        let config = ClusterViewConfig {
            snapshot_timeout: Duration::from_millis(20),
        };
        let view = ClusterView::new(Arc::new(StalledProvider), config);

        assert!(view.snapshot("batch").await.is_empty());
        assert_eq!(
            view.try_snapshot("batch").await,
            Err(ClusterError::Timeout(Duration::from_millis(20)))
        );
    }

    #[tokio::test]
    async fn test_depart_removes_node() {
        let state = InMemoryClusterState::new();
        state.join(addr("a")).await;
        state.join(addr("a")).await;
        state.join(addr("b")).await;
        assert_eq!(state.member_count().await, 2);

        state.depart(&NodeId::parse("a").unwrap()).await;
        let reports = state.current_free_capacity("batch").await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].address, addr("b"));
    }
}
