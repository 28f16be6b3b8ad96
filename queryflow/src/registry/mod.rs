//! Component registry: type bindings, instance configuration and the
//! instance cache.

mod handle;

pub use handle::{ComponentHandle, InstanceKey};

use crate::components::{Component, ComponentConfig, ComponentInit, ComponentMetadata};
use crate::errors::{
    ComponentConstructionError, ComponentNotFoundError, ComponentRegistryError,
    ConfigValidationError,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Constructor function type for building components.
///
/// Constructors run while the registry holds the cache slot for the new
/// instance, so they must not resolve other components through the registry.
pub type ComponentConstructor =
    Arc<dyn Fn(ComponentInit) -> anyhow::Result<Box<dyn Component>> + Send + Sync>;

/// Wraps a closure as a [`ComponentConstructor`].
pub fn constructor<F>(f: F) -> ComponentConstructor
where
    F: Fn(ComponentInit) -> anyhow::Result<Box<dyn Component>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Registry of component types, instance configurations and cached
/// instances.
///
/// One registry is created per application and shared explicitly (usually
/// as `Arc<ComponentRegistry>`) with the executor and with any component that
/// resolves siblings.
#[derive(Default)]
pub struct ComponentRegistry {
    constructors: RwLock<HashMap<String, ComponentConstructor>>,
    configs: DashMap<InstanceKey, ComponentConfig>,
    instances: DashMap<InstanceKey, Arc<ComponentHandle>>,
}

impl ComponentRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a type name to a constructor. The last registration wins.
    ///
    /// Instances already cached under the type are kept.
    pub fn register_type(&self, type_name: impl Into<String>, constructor: ComponentConstructor) {
        let type_name = type_name.into();
        let replaced = self
            .constructors
            .write()
            .insert(type_name.clone(), constructor)
            .is_some();
        debug!(component_type = %type_name, replaced, "Registered component type");
    }

    /// Stores the configuration for one instance without instantiating it.
    pub fn register_config(
        &self,
        component_type: impl Into<String>,
        component_id: impl Into<String>,
        config: ComponentConfig,
    ) {
        let key = InstanceKey::new(component_type, component_id);
        debug!(
            component_type = %key.component_type,
            component_id = %key.component_id,
            options = config.len(),
            "Registered component config"
        );
        self.configs.insert(key, config);
    }

    /// Returns true if a constructor is bound to the type.
    #[must_use]
    pub fn has_type(&self, type_name: &str) -> bool {
        self.constructors.read().contains_key(type_name)
    }

    /// Returns the constructor bound to a type.
    #[must_use]
    pub fn type_constructor(&self, type_name: &str) -> Option<ComponentConstructor> {
        self.constructors.read().get(type_name).cloned()
    }

    /// Returns the registered configuration for an instance.
    #[must_use]
    pub fn config(&self, component_type: &str, component_id: &str) -> Option<ComponentConfig> {
        self.configs
            .get(&InstanceKey::new(component_type, component_id))
            .map(|entry| entry.value().clone())
    }

    /// Returns the cached instance for `(type, id)`, constructing it on first
    /// use.
    ///
    /// The constructor runs at most once per key. A freshly built instance
    /// must pass [`Component::validate_config`] before it is cached; failed
    /// constructions and validations leave nothing behind in the cache.
    pub fn get(
        &self,
        component_type: &str,
        component_id: &str,
    ) -> Result<Arc<ComponentHandle>, ComponentRegistryError> {
        let key = InstanceKey::new(component_type, component_id);

        if let Some(handle) = self.instances.get(&key) {
            return Ok(Arc::clone(handle.value()));
        }

        let constructor = self
            .type_constructor(component_type)
            .ok_or_else(|| ComponentNotFoundError::new(component_type, component_id))?;

        match self.instances.entry(key) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let handle = Arc::new(self.instantiate(entry.key(), &constructor)?);
                entry.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    fn instantiate(
        &self,
        key: &InstanceKey,
        constructor: &ComponentConstructor,
    ) -> Result<ComponentHandle, ComponentRegistryError> {
        let config = self.configs.get(key).map(|c| c.value().clone()).unwrap_or_default();
        let init = ComponentInit::new(&key.component_type, &key.component_id, config);

        let component = constructor(init).map_err(|err| {
            warn!(
                component_type = %key.component_type,
                component_id = %key.component_id,
                error = %format!("{err:#}"),
                "Component construction failed"
            );
            ComponentConstructionError::new(
                &key.component_type,
                &key.component_id,
                format!("{err:#}"),
            )
        })?;

        if !component.validate_config() {
            let reason = component
                .config_violation()
                .unwrap_or_else(|| "validate_config returned false".to_string());
            warn!(
                component_type = %key.component_type,
                component_id = %key.component_id,
                %reason,
                "Component configuration rejected"
            );
            return Err(
                ConfigValidationError::new(&key.component_type, &key.component_id, reason).into(),
            );
        }

        info!(
            component_type = %key.component_type,
            component_id = %key.component_id,
            "Instantiated component"
        );
        Ok(ComponentHandle::new(key.clone(), component))
    }

    /// Lists registered type names, sorted.
    #[must_use]
    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Lists cached instances, sorted.
    #[must_use]
    pub fn list_instances(&self) -> Vec<InstanceKey> {
        let mut keys: Vec<InstanceKey> = self.instances.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Lists configured instance ids for a type, sorted.
    #[must_use]
    pub fn ids_for_type(&self, component_type: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .configs
            .iter()
            .filter(|e| e.key().component_type == component_type)
            .map(|e| e.key().component_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Lists every configured instance, sorted.
    #[must_use]
    pub fn configured_instances(&self) -> Vec<InstanceKey> {
        let mut keys: Vec<InstanceKey> = self.configs.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Returns true if the instance is cached.
    #[must_use]
    pub fn is_instantiated(&self, component_type: &str, component_id: &str) -> bool {
        self.instances
            .contains_key(&InstanceKey::new(component_type, component_id))
    }

    /// Resolves an instance and returns its metadata.
    pub async fn metadata(
        &self,
        component_type: &str,
        component_id: &str,
    ) -> Result<ComponentMetadata, ComponentRegistryError> {
        Ok(self.get(component_type, component_id)?.metadata().await)
    }

    /// Checks one instance.
    ///
    /// An instance that is not cached yet is constructed through [`get`]
    /// and stays cached afterwards, so the check covers the same instance
    /// later runs use. Components without a health check count as healthy.
    /// Resolution failures and failed checks count as unhealthy and are
    /// logged.
    ///
    /// [`get`]: Self::get
    pub async fn health_check(&self, component_type: &str, component_id: &str) -> bool {
        let handle = match self.get(component_type, component_id) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(component_type, component_id, error = %err, "Health check could not resolve component");
                return false;
            }
        };
        check_handle(&handle).await
    }

    /// Checks every cached instance.
    pub async fn health_check_all(&self) -> Vec<(InstanceKey, bool)> {
        let handles: Vec<Arc<ComponentHandle>> =
            self.instances.iter().map(|e| Arc::clone(e.value())).collect();

        let results = futures::future::join_all(handles.iter().map(|h| check_handle(h))).await;

        let mut report: Vec<(InstanceKey, bool)> = handles
            .iter()
            .map(|h| h.key().clone())
            .zip(results)
            .collect();
        report.sort();
        report
    }

    /// Runs every cached instance's shutdown hook, then clears the cache.
    ///
    /// Failures are logged and do not stop the remaining hooks.
    pub async fn shutdown_all(&self) {
        let handles: Vec<Arc<ComponentHandle>> =
            self.instances.iter().map(|e| Arc::clone(e.value())).collect();

        for handle in &handles {
            match handle.shutdown().await {
                Ok(()) => debug!(component = %handle.key(), "Component shut down"),
                Err(err) => warn!(component = %handle.key(), error = %err, "Component shutdown failed"),
            }
        }

        self.instances.clear();
        info!(count = handles.len(), "Registry shut down");
    }

    /// Drops every cached instance without running shutdown hooks.
    pub fn clear_instances(&self) {
        self.instances.clear();
    }

    /// Drops types, configurations and instances.
    pub fn clear_all(&self) {
        self.instances.clear();
        self.configs.clear();
        self.constructors.write().clear();
    }
}

async fn check_handle(handle: &ComponentHandle) -> bool {
    let status = handle.health_check().await;
    if !status.is_healthy() {
        warn!(component = %handle.key(), ?status, "Component reported unhealthy");
    }
    status.is_healthy()
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("types", &self.list_types())
            .field("configs", &self.configs.len())
            .field("instances", &self.instances.len())
            .finish()
    }
}
