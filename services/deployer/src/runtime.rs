//! Runtime construction and registration interfaces.
//!
//! - An [`Assembler`] builds the runtime objects of a package from its merged
//!   definition, inside the package's execution context.
//! - A [`Registry`] publishes those objects to the management and naming
//!   collaborators and hands back one handle per registration.
//!
//! In-process implementations are provided for testing and development.

use std::collections::{BTreeSet, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use ironworks_metadata::ConnectorDefinition;
use thiserror::Error;
use tracing::{debug, info};

use crate::context::{current_context, ContextHandle};

/// Errors raised while constructing or registering runtime objects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("assembly failed: {0}")]
    Assembly(String),

    #[error("assembly ran outside its execution context")]
    ContextMismatch,

    #[error("registration failed: {0}")]
    Registration(String),

    #[error("name already registered: {0}")]
    Conflict(String),
}

/// What an assembler needs to build one deployment.
#[derive(Debug, Clone)]
pub struct ActivationRequest<'a> {
    pub location: &'a str,
    pub deployment_name: &'a str,
    pub definition: &'a ConnectorDefinition,
}

/// Runtime objects constructed for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeObjects {
    pub deployment_name: String,
    pub resource_adapter: Option<String>,
    /// Bound names of the connection factories.
    pub connection_factories: Vec<String>,
    /// Bound names of the admin objects.
    pub admin_objects: Vec<String>,
}

/// Builds runtime objects from a merged definition.
#[async_trait]
pub trait Assembler: Send + Sync {
    async fn assemble(
        &self,
        request: &ActivationRequest<'_>,
        context: &ContextHandle,
    ) -> Result<RuntimeObjects, RuntimeError>;
}

/// Derives runtime objects directly from the definition.
///
/// Entries without a configured name get `java:/eis/<deployment>` for
/// connection factories and `java:/eis/ao/<deployment>` for admin objects,
/// with a numeric suffix after the first.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefinitionAssembler;

fn default_name(prefix: &str, deployment: &str, index: usize) -> String {
    if index == 0 {
        format!("{prefix}/{deployment}")
    } else {
        format!("{prefix}/{deployment}{index}")
    }
}

#[async_trait]
impl Assembler for DefinitionAssembler {
    async fn assemble(
        &self,
        request: &ActivationRequest<'_>,
        context: &ContextHandle,
    ) -> Result<RuntimeObjects, RuntimeError> {
        if current_context().as_ref() != Some(context) {
            return Err(RuntimeError::ContextMismatch);
        }

        let definition = request.definition;
        let connection_factories = definition
            .connection_definitions
            .iter()
            .enumerate()
            .map(|(i, cd)| {
                cd.jndi_name
                    .clone()
                    .unwrap_or_else(|| default_name("java:/eis", request.deployment_name, i))
            })
            .collect();
        let admin_objects = definition
            .admin_objects
            .iter()
            .enumerate()
            .map(|(i, ao)| {
                ao.jndi_name
                    .clone()
                    .unwrap_or_else(|| default_name("java:/eis/ao", request.deployment_name, i))
            })
            .collect();

        let objects = RuntimeObjects {
            deployment_name: request.deployment_name.to_string(),
            resource_adapter: definition.adapter_class.clone(),
            connection_factories,
            admin_objects,
        };
        debug!(
            location = request.location,
            context_id = context.id(),
            connection_factories = objects.connection_factories.len(),
            admin_objects = objects.admin_objects.len(),
            "Assembled runtime objects"
        );
        Ok(objects)
    }
}

/// Handle to one registration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationHandle(String);

impl RegistrationHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RegistrationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Management and naming registry.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn register(
        &self,
        objects: &RuntimeObjects,
    ) -> Result<Vec<RegistrationHandle>, RuntimeError>;

    async fn unregister(&self, handle: &RegistrationHandle) -> Result<(), RuntimeError>;
}

/// In-process registry.
///
/// Registers a management entry per deployment plus one naming entry per
/// bound object. Registration is all-or-nothing per deployment.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: Mutex<BTreeSet<RegistrationHandle>>,
    failing_register: HashSet<String>,
    failing_unregister: HashSet<String>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail registration of the deployment named `deployment`.
    #[must_use]
    pub fn with_failing_register(mut self, deployment: &str) -> Self {
        self.failing_register.insert(deployment.to_string());
        self
    }

    /// Fail removal of the registration named `handle`.
    #[must_use]
    pub fn with_failing_unregister(mut self, handle: &str) -> Self {
        self.failing_unregister.insert(handle.to_string());
        self
    }

    pub fn registered(&self) -> Vec<RegistrationHandle> {
        self.lock().iter().cloned().collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().contains(&RegistrationHandle::new(name))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<RegistrationHandle>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn register(
        &self,
        objects: &RuntimeObjects,
    ) -> Result<Vec<RegistrationHandle>, RuntimeError> {
        if self.failing_register.contains(&objects.deployment_name) {
            return Err(RuntimeError::Registration(format!(
                "registry rejected {}",
                objects.deployment_name
            )));
        }

        let handles: Vec<_> = std::iter::once(format!("mgmt:{}", objects.deployment_name))
            .chain(objects.connection_factories.iter().cloned())
            .chain(objects.admin_objects.iter().cloned())
            .map(RegistrationHandle::new)
            .collect();

        let mut entries = self.lock();
        if let Some(taken) = handles.iter().find(|h| entries.contains(*h)) {
            return Err(RuntimeError::Conflict(taken.to_string()));
        }
        entries.extend(handles.iter().cloned());

        info!(
            deployment = %objects.deployment_name,
            registrations = handles.len(),
            "Registered deployment"
        );
        Ok(handles)
    }

    async fn unregister(&self, handle: &RegistrationHandle) -> Result<(), RuntimeError> {
        if self.failing_unregister.contains(handle.as_str()) {
            return Err(RuntimeError::Registration(format!(
                "registry refused to remove {handle}"
            )));
        }
        self.lock().remove(handle);
        debug!(handle = %handle, "Unregistered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ironworks_metadata::{ConnectionDefinition, ConfigProperties, SpecVersion};

    use super::*;
    use crate::context::in_context;

    fn definition() -> ConnectorDefinition {
        let mut def = ConnectorDefinition::new(SpecVersion::V16);
        def.adapter_class = Some("acme.ResourceAdapter".to_string());
        for (class, jndi) in [("acme.A", Some("java:/eis/Primary")), ("acme.B", None)] {
            def.connection_definitions.push(ConnectionDefinition {
                factory_interface: "javax.resource.cci.ConnectionFactory".to_string(),
                managed_factory_class: class.to_string(),
                jndi_name: jndi.map(str::to_string),
                pool_name: None,
                config_properties: ConfigProperties::new(),
            });
        }
        def
    }

    #[tokio::test]
    async fn test_definition_assembler_names() {
        let def = definition();
        let request = ActivationRequest {
            location: "acme.rar",
            deployment_name: "acme",
            definition: &def,
        };
        let context = ContextHandle::root();

        let objects = in_context(context.clone(), DefinitionAssembler.assemble(&request, &context))
            .await
            .unwrap();

        assert_eq!(objects.connection_factories, ["java:/eis/Primary", "java:/eis/acme1"]);
        assert!(objects.admin_objects.is_empty());
        assert_eq!(objects.resource_adapter.as_deref(), Some("acme.ResourceAdapter"));
    }

    #[tokio::test]
    async fn test_definition_assembler_requires_context() {
        let def = definition();
        let request = ActivationRequest {
            location: "acme.rar",
            deployment_name: "acme",
            definition: &def,
        };

        let result = DefinitionAssembler
            .assemble(&request, &ContextHandle::root())
            .await;
        assert_eq!(result, Err(RuntimeError::ContextMismatch));
    }

    #[tokio::test]
    async fn test_registry_register_and_conflict() {
        let registry = InMemoryRegistry::new();
        let objects = RuntimeObjects {
            deployment_name: "acme".to_string(),
            resource_adapter: None,
            connection_factories: vec!["java:/eis/acme".to_string()],
            admin_objects: vec![],
        };

        let handles = registry.register(&objects).await.unwrap();
        assert_eq!(handles.len(), 2);
        assert!(registry.is_registered("mgmt:acme"));

        assert!(matches!(
            registry.register(&objects).await,
            Err(RuntimeError::Conflict(_))
        ));

        for handle in &handles {
            registry.unregister(handle).await.unwrap();
        }
        assert!(registry.registered().is_empty());
    }

    #[tokio::test]
    async fn test_registry_failure_modes() {
        let registry = InMemoryRegistry::new()
            .with_failing_register("bad")
            .with_failing_unregister("mgmt:stuck");
        let objects = |name: &str| RuntimeObjects {
            deployment_name: name.to_string(),
            resource_adapter: None,
            connection_factories: vec![],
            admin_objects: vec![],
        };

        assert!(registry.register(&objects("bad")).await.is_err());
        let handles = registry.register(&objects("stuck")).await.unwrap();
        assert!(registry.unregister(&handles[0]).await.is_err());
        assert!(registry.is_registered("mgmt:stuck"));
    }
}
