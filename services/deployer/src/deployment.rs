//! Live deployments and the set that owns them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::context::ContextHandle;
use crate::runtime::{RegistrationHandle, RuntimeObjects};

/// A package that was activated and registered.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub location: String,
    pub name: String,
    pub context: ContextHandle,
    pub objects: RuntimeObjects,
    pub registrations: Vec<RegistrationHandle>,
    pub activated_at: DateTime<Utc>,
}

/// Live deployments keyed by location.
///
/// Insertions from an activation pass and a concurrent teardown serialize on
/// the same lock. Teardown drains the whole map at once, so it never sees a
/// partially appended set.
#[derive(Debug, Default)]
pub struct DeploymentSet {
    inner: Mutex<BTreeMap<String, Deployment>>,
}

impl DeploymentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deployment. Returns the one it replaced, if any.
    pub async fn insert(&self, deployment: Deployment) -> Option<Deployment> {
        self.inner
            .lock()
            .await
            .insert(deployment.location.clone(), deployment)
    }

    pub async fn contains(&self, location: &str) -> bool {
        self.inner.lock().await.contains_key(location)
    }

    pub async fn remove(&self, location: &str) -> Option<Deployment> {
        self.inner.lock().await.remove(location)
    }

    pub async fn locations(&self) -> Vec<String> {
        self.inner.lock().await.keys().cloned().collect()
    }

    /// Point-in-time copy of every deployment.
    pub async fn snapshot(&self) -> Vec<Deployment> {
        self.inner.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Remove and return every deployment.
    pub async fn take_all(&self) -> Vec<Deployment> {
        std::mem::take(&mut *self.inner.lock().await)
            .into_values()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(location: &str) -> Deployment {
        Deployment {
            location: location.to_string(),
            name: location.trim_end_matches(".rar").to_string(),
            context: ContextHandle::root(),
            objects: RuntimeObjects {
                deployment_name: location.to_string(),
                resource_adapter: None,
                connection_factories: Vec::new(),
                admin_objects: Vec::new(),
            },
            registrations: Vec::new(),
            activated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_take_all() {
        let set = DeploymentSet::new();
        assert!(set.insert(deployment("b.rar")).await.is_none());
        assert!(set.insert(deployment("a.rar")).await.is_none());
        assert!(set.insert(deployment("a.rar")).await.is_some());

        assert_eq!(set.len().await, 2);
        assert!(set.contains("a.rar").await);
        assert_eq!(set.locations().await, ["a.rar", "b.rar"]);

        let drained = set.take_all().await;
        assert_eq!(drained.len(), 2);
        assert!(set.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_insert_and_drain() {
        let set = std::sync::Arc::new(DeploymentSet::new());

        let writer = {
            let set = std::sync::Arc::clone(&set);
            tokio::spawn(async move {
                for i in 0..100 {
                    set.insert(deployment(&format!("{i:03}.rar"))).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut drained = 0;
        while !writer.is_finished() {
            drained += set.take_all().await.len();
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
        drained += set.take_all().await.len();

        assert_eq!(drained, 100);
    }
}
