//! Application bootstrap with startup verification.

use super::Application;
use crate::components::builtin::register_builtins;
use crate::components::search::RetryManagerComponent;
use crate::config::RuntimeConfig;
use crate::errors::{InitializationError, QueryflowError};
use crate::events::{EventSink, LoggingEventSink};
use crate::observability::init_tracing;
use crate::registry::{ComponentConstructor, ComponentRegistry, InstanceKey};
use crate::workflow::{ExecutorOptions, WorkflowExecutor};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds an [`Application`] from a [`RuntimeConfig`].
///
/// Code constructors are bound first, then the config's `class` aliases, then
/// instance configurations. [`ApplicationBuilder::build`] verifies workflows
/// against the registered types and instantiates every referenced component
/// so configuration errors surface before the first request.
pub struct ApplicationBuilder {
    config: RuntimeConfig,
    registry: Arc<ComponentRegistry>,
    event_sink: Option<Arc<dyn EventSink>>,
    options: ExecutorOptions,
    health_checks: bool,
    install_tracing: bool,
}

impl ApplicationBuilder {
    /// Creates a builder over `config` with an empty registry.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ComponentRegistry::new()),
            event_sink: None,
            options: ExecutorOptions::default(),
            health_checks: true,
            install_tracing: false,
        }
    }

    /// Returns the registry being populated, for constructors that need it.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Binds a constructor name. Config `class` entries refer to these names.
    #[must_use]
    pub fn with_component(self, name: &str, constructor: ComponentConstructor) -> Self {
        self.registry.register_type(name, constructor);
        self
    }

    /// Binds the `static` and `require_keys` components.
    #[must_use]
    pub fn with_builtin_components(self) -> Self {
        register_builtins(&self.registry);
        self
    }

    /// Binds the `retry_manager` component to this application's registry.
    #[must_use]
    pub fn with_retry_manager(self) -> Self {
        let constructor = RetryManagerComponent::constructor(&self.registry);
        self.with_component(RetryManagerComponent::TYPE_NAME, constructor)
    }

    /// Sets the executor's event sink. Defaults to a [`LoggingEventSink`].
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Sets the executor options.
    #[must_use]
    pub const fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Enables or disables startup health checks.
    #[must_use]
    pub const fn with_health_checks(mut self, enabled: bool) -> Self {
        self.health_checks = enabled;
        self
    }

    /// Installs the global tracing subscriber from the config's `logging`
    /// section during [`ApplicationBuilder::build`].
    #[must_use]
    pub const fn with_tracing(mut self, enabled: bool) -> Self {
        self.install_tracing = enabled;
        self
    }

    /// Registers everything, verifies it and returns the application.
    ///
    /// # Errors
    ///
    /// Returns [`QueryflowError::Initialization`] when a type binding or a
    /// workflow reference is unresolved or a required component is
    /// unhealthy, and [`QueryflowError::Registry`] when a configured
    /// component fails to construct or rejects its configuration.
    pub async fn build(self) -> Result<Application, QueryflowError> {
        if self.install_tracing {
            if let Err(err) = init_tracing(&self.config.logging()) {
                warn!(error = %err, "Tracing subscriber not installed");
            }
        }

        self.bind_classes()?;
        for (component_type, component_id, config) in self.config.instances() {
            self.registry
                .register_config(component_type, component_id, config.clone());
        }

        self.verify_workflows()?;
        self.instantiate_all()?;
        if self.health_checks {
            self.check_health().await?;
        }

        let executor = self.config.workflows.values().cloned().fold(
            WorkflowExecutor::new(Arc::clone(&self.registry))
                .with_event_sink(
                    self.event_sink
                        .unwrap_or_else(|| Arc::new(LoggingEventSink::new())),
                )
                .with_options(self.options),
            WorkflowExecutor::with_workflow,
        );

        info!(
            types = self.registry.list_types().len(),
            instances = self.registry.list_instances().len(),
            workflows = self.config.workflows.len(),
            "Application initialized"
        );
        Ok(Application::new(self.config, self.registry, executor))
    }

    fn bind_classes(&self) -> Result<(), InitializationError> {
        for component_type in self.config.components.keys() {
            let class = self.config.constructor_name(component_type);
            if class == component_type {
                if !self.registry.has_type(component_type) {
                    return Err(InitializationError::new(format!(
                        "no constructor registered for component type '{component_type}'"
                    )));
                }
                continue;
            }

            let constructor = self.registry.type_constructor(class).ok_or_else(|| {
                InitializationError::new(format!(
                    "component type '{component_type}' references unknown class '{class}'"
                ))
            })?;
            self.registry.register_type(component_type.as_str(), constructor);
            debug!(%component_type, class, "Bound component class");
        }
        Ok(())
    }

    fn verify_workflows(&self) -> Result<(), InitializationError> {
        for workflow in self.config.workflows.values() {
            for (index, step) in workflow.steps.iter().enumerate() {
                if !self.registry.has_type(&step.component_type) {
                    return Err(InitializationError::new(format!(
                        "workflow '{}' step '{}' references unregistered component type '{}'",
                        workflow.name,
                        workflow.step_id(index),
                        step.component_type
                    )));
                }
            }
        }

        if let Some(name) = &self.config.default_workflow {
            let workflow = self.config.workflows.get(name).ok_or_else(|| {
                InitializationError::new(format!("default workflow '{name}' is not defined"))
            })?;
            if workflow.steps.is_empty() {
                return Err(InitializationError::new(format!(
                    "default workflow '{name}' has no steps"
                )));
            }
        }
        Ok(())
    }

    fn instantiate_all(&self) -> Result<(), QueryflowError> {
        let mut keys: BTreeSet<InstanceKey> = self.registry.configured_instances().into_iter().collect();
        for workflow in self.config.workflows.values() {
            keys.extend(
                workflow
                    .steps
                    .iter()
                    .filter(|step| !step.disabled)
                    .map(|step| InstanceKey::new(&step.component_type, &step.component_id)),
            );
        }

        for key in &keys {
            self.registry.get(&key.component_type, &key.component_id)?;
        }
        debug!(count = keys.len(), "Instantiated configured components");
        Ok(())
    }

    async fn check_health(&self) -> Result<(), InitializationError> {
        let required = self.config.required_instances();
        for (component_type, component_id) in &required {
            if !self.registry.health_check(component_type, component_id).await {
                return Err(InitializationError::new(format!(
                    "required component {component_type}/{component_id} is unhealthy"
                )));
            }
        }

        for (key, healthy) in self.registry.health_check_all().await {
            let is_required = required
                .iter()
                .any(|(t, i)| *t == key.component_type && *i == key.component_id);
            if !healthy && !is_required {
                warn!(component = %key, "Optional component is unhealthy");
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("health_checks", &self.health_checks)
            .finish_non_exhaustive()
    }
}
