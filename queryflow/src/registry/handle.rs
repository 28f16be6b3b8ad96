//! Shared handle to one cached component instance.

use crate::components::{Component, ComponentMetadata, HealthStatus};
use crate::context::Context;
use crate::errors::ComponentExecutionError;
use serde::Serialize;
use std::fmt;
use tokio::sync::{Mutex, MutexGuard};

/// Identifies one configured instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceKey {
    /// The component type.
    pub component_type: String,
    /// The instance id.
    pub component_id: String,
}

impl InstanceKey {
    /// Creates a new key.
    #[must_use]
    pub fn new(component_type: impl Into<String>, component_id: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            component_id: component_id.into(),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.component_type, self.component_id)
    }
}

/// A cached component behind a per-instance lock.
///
/// Concurrent runs share handles, so every call goes through the lock and an
/// instance never executes twice at the same time.
pub struct ComponentHandle {
    key: InstanceKey,
    inner: Mutex<Box<dyn Component>>,
}

impl ComponentHandle {
    /// Wraps a freshly constructed component.
    #[must_use]
    pub fn new(key: InstanceKey, component: Box<dyn Component>) -> Self {
        Self {
            key,
            inner: Mutex::new(component),
        }
    }

    /// Returns the registry key.
    #[must_use]
    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    /// Returns the component type.
    #[must_use]
    pub fn component_type(&self) -> &str {
        &self.key.component_type
    }

    /// Returns the instance id.
    #[must_use]
    pub fn component_id(&self) -> &str {
        &self.key.component_id
    }

    /// Executes the component while holding its lock.
    pub async fn execute(&self, ctx: &Context) -> Result<Context, ComponentExecutionError> {
        self.inner.lock().await.execute(ctx).await
    }

    /// Re-runs the component's configuration check.
    pub async fn validate_config(&self) -> bool {
        self.inner.lock().await.validate_config()
    }

    /// Returns the component's metadata.
    pub async fn metadata(&self) -> ComponentMetadata {
        self.inner.lock().await.metadata()
    }

    /// Runs the component's health check.
    pub async fn health_check(&self) -> HealthStatus {
        self.inner.lock().await.health_check().await
    }

    /// Runs the component's shutdown hook.
    pub async fn shutdown(&self) -> Result<(), ComponentExecutionError> {
        self.inner.lock().await.shutdown().await
    }

    /// Locks the instance for direct access.
    pub async fn lock(&self) -> MutexGuard<'_, Box<dyn Component>> {
        self.inner.lock().await
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
