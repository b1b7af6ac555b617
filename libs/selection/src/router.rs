//! Routing a work unit to a destination.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::address::{DistributableWork, WorkManagerAddress};
use crate::error::{RouteError, UnknownVariant};
use crate::selector::Selector;

/// What to do when the selector finds no peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoTargetPolicy {
    /// Run the work on the submitting node.
    #[default]
    ExecuteLocally,
    /// Fail the submission.
    Reject,
}

impl std::str::FromStr for NoTargetPolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "execute-locally" => Ok(Self::ExecuteLocally),
            "reject" => Ok(Self::Reject),
            _ => Err(UnknownVariant {
                kind: "no-target policy",
                value: s.to_string(),
            }),
        }
    }
}

/// Where a work unit should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Remote(WorkManagerAddress),
    Local,
}

/// Routes work units through a selector.
pub struct WorkRouter {
    selector: Arc<dyn Selector>,
    policy: NoTargetPolicy,
}

impl WorkRouter {
    pub fn new(selector: Arc<dyn Selector>, policy: NoTargetPolicy) -> Self {
        Self { selector, policy }
    }

    #[instrument(skip(self, work), fields(category = %work.category, selector = self.selector.name()))]
    pub async fn route(
        &self,
        own: &WorkManagerAddress,
        work: &DistributableWork,
    ) -> Result<Route, RouteError> {
        if let Some(target) = self.selector.select_target(own, work).await {
            debug!(target = %target, "Routing work to peer");
            return Ok(Route::Remote(target));
        }

        match self.policy {
            NoTargetPolicy::ExecuteLocally => {
                debug!("No peer available, executing locally");
                Ok(Route::Local)
            }
            NoTargetPolicy::Reject => Err(RouteError::NoTarget {
                category: work.category.clone(),
            }),
        }
    }
}
