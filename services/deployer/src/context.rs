//! Isolated execution contexts.
//!
//! Each activated package runs its construction inside its own execution
//! context. The provider opens one per archive; [`in_context`] makes it the
//! current context for the duration of a future and restores whatever was
//! current before on every exit path, including errors and cancellation.

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Lookup order of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationMode {
    /// Parent definitions win over the archive's own.
    ParentFirst,
    /// The archive's own definitions win (scoped deployment).
    ParentLast,
}

impl IsolationMode {
    pub fn for_scope(scope_deployment: bool) -> Self {
        if scope_deployment {
            IsolationMode::ParentLast
        } else {
            IsolationMode::ParentFirst
        }
    }
}

/// Handle to an opened execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextHandle {
    id: u64,
    archive: String,
    mode: IsolationMode,
    parent: Option<u64>,
}

impl ContextHandle {
    /// The process-wide root context.
    pub fn root() -> Self {
        Self {
            id: 0,
            archive: String::new(),
            mode: IsolationMode::ParentFirst,
            parent: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn archive(&self) -> &str {
        &self.archive
    }

    pub fn mode(&self) -> IsolationMode {
        self.mode
    }

    pub fn parent(&self) -> Option<u64> {
        self.parent
    }
}

/// Errors opening an execution context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// The archive no longer exists. Activation skips it.
    #[error("archive not found: {0}")]
    ArchiveMissing(String),

    #[error("cannot open context for {archive}: {detail}")]
    Open { archive: String, detail: String },
}

/// Opens isolated execution contexts for archives.
#[async_trait]
pub trait ExecutionContextProvider: Send + Sync {
    async fn open(
        &self,
        archive: &str,
        parent: &ContextHandle,
        mode: IsolationMode,
    ) -> Result<ContextHandle, ContextError>;
}

tokio::task_local! {
    static CURRENT_CONTEXT: ContextHandle;
}

/// The context current for this task, if any.
pub fn current_context() -> Option<ContextHandle> {
    CURRENT_CONTEXT.try_with(ContextHandle::clone).ok()
}

/// Run `fut` with `handle` as the current context.
pub async fn in_context<F: Future>(handle: ContextHandle, fut: F) -> F::Output {
    CURRENT_CONTEXT.scope(handle, fut).await
}

fn next_id(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

/// Opens contexts for archives on the local filesystem.
///
/// Accepts plain paths and `file:` locations. A location that does not exist
/// is reported as [`ContextError::ArchiveMissing`].
#[derive(Debug, Default)]
pub struct LocalContextProvider {
    counter: AtomicU64,
}

impl LocalContextProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionContextProvider for LocalContextProvider {
    async fn open(
        &self,
        archive: &str,
        parent: &ContextHandle,
        mode: IsolationMode,
    ) -> Result<ContextHandle, ContextError> {
        let path = archive.strip_prefix("file:").unwrap_or(archive);
        let exists = tokio::fs::try_exists(Path::new(path))
            .await
            .map_err(|e| ContextError::Open {
                archive: archive.to_string(),
                detail: e.to_string(),
            })?;
        if !exists {
            return Err(ContextError::ArchiveMissing(archive.to_string()));
        }

        let handle = ContextHandle {
            id: next_id(&self.counter),
            archive: archive.to_string(),
            mode,
            parent: Some(parent.id),
        };
        debug!(archive, context_id = handle.id, ?mode, "Opened execution context");
        Ok(handle)
    }
}

/// Mock provider for testing and development.
#[derive(Debug, Default)]
pub struct MockContextProvider {
    counter: AtomicU64,
    missing: HashSet<String>,
    failing: HashSet<String>,
    opened: Mutex<Vec<(String, IsolationMode)>>,
}

impl MockContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `archive` as missing.
    #[must_use]
    pub fn with_missing(mut self, archive: &str) -> Self {
        self.missing.insert(archive.to_string());
        self
    }

    /// Fail to open `archive`.
    #[must_use]
    pub fn with_failing(mut self, archive: &str) -> Self {
        self.failing.insert(archive.to_string());
        self
    }

    /// Archives opened so far, in order.
    pub fn opened(&self) -> Vec<(String, IsolationMode)> {
        self.opened.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ExecutionContextProvider for MockContextProvider {
    async fn open(
        &self,
        archive: &str,
        parent: &ContextHandle,
        mode: IsolationMode,
    ) -> Result<ContextHandle, ContextError> {
        if self.missing.contains(archive) {
            return Err(ContextError::ArchiveMissing(archive.to_string()));
        }
        if self.failing.contains(archive) {
            return Err(ContextError::Open {
                archive: archive.to_string(),
                detail: "mock provider configured to fail".to_string(),
            });
        }

        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((archive.to_string(), mode));

        Ok(ContextHandle {
            id: next_id(&self.counter),
            archive: archive.to_string(),
            mode,
            parent: Some(parent.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_mode_for_scope() {
        assert_eq!(IsolationMode::for_scope(true), IsolationMode::ParentLast);
        assert_eq!(IsolationMode::for_scope(false), IsolationMode::ParentFirst);
    }

    #[tokio::test]
    async fn test_scope_restores_previous_context() {
        let provider = MockContextProvider::new();
        let outer = provider
            .open("outer.rar", &ContextHandle::root(), IsolationMode::ParentFirst)
            .await
            .unwrap();
        let inner = provider
            .open("inner.rar", &outer, IsolationMode::ParentLast)
            .await
            .unwrap();

        assert_eq!(current_context(), None);

        let seen = in_context(outer.clone(), async {
            let before = current_context();
            let during = in_context(inner.clone(), async { current_context() }).await;
            let after = current_context();
            (before, during, after)
        })
        .await;

        assert_eq!(seen.0.as_ref(), Some(&outer));
        assert_eq!(seen.1.as_ref(), Some(&inner));
        assert_eq!(seen.2.as_ref(), Some(&outer));
        assert_eq!(inner.parent(), Some(outer.id()));
        assert_eq!(current_context(), None);
    }

    #[tokio::test]
    async fn test_scope_restored_after_error() {
        let handle = ContextHandle::root();

        let result: Result<(), &str> = in_context(handle, async { Err("boom") }).await;

        assert!(result.is_err());
        assert_eq!(current_context(), None);
    }

    #[tokio::test]
    async fn test_mock_provider_missing_and_failing() {
        let provider = MockContextProvider::new()
            .with_missing("gone.rar")
            .with_failing("bad.rar");
        let root = ContextHandle::root();

        assert_eq!(
            provider.open("gone.rar", &root, IsolationMode::ParentFirst).await,
            Err(ContextError::ArchiveMissing("gone.rar".to_string()))
        );
        assert!(matches!(
            provider.open("bad.rar", &root, IsolationMode::ParentFirst).await,
            Err(ContextError::Open { .. })
        ));
        assert!(provider.opened().is_empty());
    }

    #[tokio::test]
    async fn test_local_provider() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("mail.rar");
        std::fs::write(&archive, b"PK").unwrap();
        let provider = LocalContextProvider::new();
        let root = ContextHandle::root();

        let location = format!("file:{}", archive.display());
        let handle = provider
            .open(&location, &root, IsolationMode::ParentLast)
            .await
            .unwrap();
        assert_eq!(handle.archive(), location);
        assert_eq!(handle.mode(), IsolationMode::ParentLast);

        let missing = dir.path().join("gone.rar").display().to_string();
        assert!(matches!(
            provider.open(&missing, &root, IsolationMode::ParentFirst).await,
            Err(ContextError::ArchiveMissing(_))
        ));
    }
}
