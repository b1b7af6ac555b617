//! Pluggable work-manager selection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::address::{DistributableWork, WorkManagerAddress};
use crate::cluster::{ClusterView, SelectionMap};
use crate::error::UnknownVariant;

/// Policy choosing a destination node for a work unit.
///
/// Implementations must be safe to call concurrently and keep no mutable
/// state between calls.
#[async_trait]
pub trait Selector: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Pick a peer for `work`, or `None` if no peer qualifies.
    async fn select_target(
        &self,
        own: &WorkManagerAddress,
        work: &DistributableWork,
    ) -> Option<WorkManagerAddress>;
}

/// First entry, in snapshot order, that is not `own` and reports free
/// capacity strictly above zero.
///
/// Snapshot order is not a ranking, so which of several qualifying peers wins
/// is unspecified. Callers must not rely on it.
pub fn first_available(
    map: &SelectionMap,
    own: &WorkManagerAddress,
) -> Option<WorkManagerAddress> {
    map.iter()
        .filter(|(address, _)| *address != own)
        .find(|(_, free)| free.is_some_and(|n| n > 0))
        .map(|(address, _)| address.clone())
}

/// Satisfy-first selector. No load ranking.
pub struct FirstAvailable {
    view: Arc<ClusterView>,
}

impl FirstAvailable {
    pub fn new(view: Arc<ClusterView>) -> Self {
        Self { view }
    }
}

#[async_trait]
impl Selector for FirstAvailable {
    fn name(&self) -> &'static str {
        "first-available"
    }

    async fn select_target(
        &self,
        own: &WorkManagerAddress,
        work: &DistributableWork,
    ) -> Option<WorkManagerAddress> {
        trace!(own = %own, category = %work.category, "Selecting work manager");

        let map = self.view.snapshot(&work.category).await;
        trace!(entries = map.len(), "Selection map");

        let target = first_available(&map, own);
        match &target {
            Some(address) => trace!(target = %address, "Selected work manager"),
            None => trace!("No work manager selected"),
        }
        target
    }
}

/// Configured selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectorKind {
    #[default]
    FirstAvailable,
}

impl SelectorKind {
    /// Construct the selector for this policy over `view`.
    pub fn build(self, view: Arc<ClusterView>) -> Arc<dyn Selector> {
        match self {
            SelectorKind::FirstAvailable => Arc::new(FirstAvailable::new(view)),
        }
    }
}

impl std::str::FromStr for SelectorKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first-available" | "first_available" | "firstavailable" => Ok(Self::FirstAvailable),
            _ => Err(UnknownVariant {
                kind: "selector",
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn addr(id: &str) -> WorkManagerAddress {
        WorkManagerAddress::parse(id).unwrap()
    }

    fn map(entries: &[(&str, Option<i64>)]) -> SelectionMap {
        entries.iter().map(|(id, free)| (addr(id), *free)).collect()
    }

    #[test]
    fn test_skips_own_and_empty_peers() {
        let m = map(&[("A", Some(0)), ("B", Some(3)), ("C", None)]);
        assert_eq!(first_available(&m, &addr("A")), Some(addr("B")));
    }

    #[test]
    fn test_none_when_only_own_has_capacity() {
        let m = map(&[("A", Some(5)), ("B", Some(0))]);
        assert_eq!(first_available(&m, &addr("A")), None);
    }

    #[test]
    fn test_negative_capacity_never_selected() {
        let m = map(&[("B", Some(-2)), ("C", Some(1))]);
        assert_eq!(first_available(&m, &addr("A")), Some(addr("C")));
    }

    #[test]
    fn test_empty_map() {
        assert_eq!(first_available(&SelectionMap::new(), &addr("A")), None);
    }

    #[test]
    fn test_selector_kind_parse() {
        assert_eq!(
            "first-available".parse::<SelectorKind>(),
            Ok(SelectorKind::FirstAvailable)
        );
        assert_eq!(
            " First_Available ".parse::<SelectorKind>(),
            Ok(SelectorKind::FirstAvailable)
        );
        assert!("round-robin".parse::<SelectorKind>().is_err());
    }

    fn entries_strategy() -> impl Strategy<Value = (Vec<(u8, Option<i64>)>, u8)> {
        (
            prop::collection::vec((0u8..8, prop::option::of(-3i64..4)), 0..12),
            0u8..8,
        )
    }

    proptest! {
        #[test]
        fn prop_first_available((entries, own) in entries_strategy()) {
            let m: SelectionMap = entries
                .iter()
                .map(|(id, free)| (addr(&format!("n{id}")), *free))
                .collect();
            let own = addr(&format!("n{own}"));

            let qualifying: Vec<_> = m
                .iter()
                .filter(|(a, free)| *a != &own && free.is_some_and(|n| n > 0))
                .map(|(a, _)| a.clone())
                .collect();

            match first_available(&m, &own) {
                Some(selected) => {
                    prop_assert_ne!(&selected, &own);
                    let free = m.get(&selected).flatten();
                    prop_assert!(free.is_some_and(|n| n > 0));
                    prop_assert_eq!(Some(&selected), qualifying.first());
                }
                None => prop_assert!(qualifying.is_empty()),
            }
        }
    }
}
