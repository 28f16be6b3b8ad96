//! Runtime-level components usable straight from declarative configuration.

use super::{check_rules, Component, ComponentConfig, ComponentInit, ComponentMetadata, ConfigRule};
use crate::context::{Context, Value};
use crate::errors::ComponentExecutionError;
use crate::registry::{constructor, ComponentRegistry};
use async_trait::async_trait;

/// Registers [`StaticComponent`] and [`RequireKeysComponent`] under their
/// default type names.
pub fn register_builtins(registry: &ComponentRegistry) {
    registry.register_type(
        StaticComponent::TYPE_NAME,
        constructor(|init| Ok(Box::new(StaticComponent::new(init)) as Box<dyn Component>)),
    );
    registry.register_type(
        RequireKeysComponent::TYPE_NAME,
        constructor(|init| Ok(Box::new(RequireKeysComponent::new(init)) as Box<dyn Component>)),
    );
}

/// Emits the configured `values` map on every call.
///
/// Handy for seeding defaults in a workflow or for stubbing an external step.
#[derive(Debug, Clone)]
pub struct StaticComponent {
    component_type: String,
    component_id: String,
    config: ComponentConfig,
}

impl StaticComponent {
    /// Type name this component is registered under by default.
    pub const TYPE_NAME: &'static str = "static";

    /// Creates the component from constructor input.
    #[must_use]
    pub fn new(init: ComponentInit) -> Self {
        Self {
            component_type: init.component_type,
            component_id: init.component_id,
            config: init.config,
        }
    }

    fn rules() -> [ConfigRule; 1] {
        [ConfigRule::map("values")]
    }
}

#[async_trait]
impl Component for StaticComponent {
    fn component_type(&self) -> &str {
        &self.component_type
    }

    fn component_id(&self) -> &str {
        &self.component_id
    }

    async fn execute(&mut self, _ctx: &Context) -> Result<Context, ComponentExecutionError> {
        Ok(self
            .config
            .map("values")
            .map(|values| Context::from(values.clone()))
            .unwrap_or_default())
    }

    fn config_violation(&self) -> Option<String> {
        check_rules(&self.config, &Self::rules()).err()
    }

    fn metadata(&self) -> ComponentMetadata {
        ComponentMetadata::new(&self.component_type, &self.component_id)
            .with_display_name("Static values")
    }
}

/// Reports a soft error when any of the configured `keys` is absent.
///
/// Null values count as absent. Marked `critical`, this turns a missing input
/// into an abort; otherwise the run carries on with a recorded error.
#[derive(Debug, Clone)]
pub struct RequireKeysComponent {
    component_type: String,
    component_id: String,
    config: ComponentConfig,
}

impl RequireKeysComponent {
    /// Type name this component is registered under by default.
    pub const TYPE_NAME: &'static str = "require_keys";

    /// Creates the component from constructor input.
    #[must_use]
    pub fn new(init: ComponentInit) -> Self {
        Self {
            component_type: init.component_type,
            component_id: init.component_id,
            config: init.config,
        }
    }

    fn rules() -> [ConfigRule; 2] {
        [ConfigRule::required("keys"), ConfigRule::non_empty_list("keys")]
    }
}

#[async_trait]
impl Component for RequireKeysComponent {
    fn component_type(&self) -> &str {
        &self.component_type
    }

    fn component_id(&self) -> &str {
        &self.component_id
    }

    async fn execute(&mut self, ctx: &Context) -> Result<Context, ComponentExecutionError> {
        let missing: Vec<String> = self
            .config
            .strings("keys")
            .into_iter()
            .filter(|key| ctx.get(key).map_or(true, Value::is_null))
            .collect();

        if missing.is_empty() {
            Ok(Context::new())
        } else {
            Ok(Context::failure(format!(
                "missing required keys: {}",
                missing.join(", ")
            )))
        }
    }

    fn config_violation(&self) -> Option<String> {
        check_rules(&self.config, &Self::rules()).err()
    }

    fn metadata(&self) -> ComponentMetadata {
        ComponentMetadata::new(&self.component_type, &self.component_id)
            .with_display_name("Required keys")
    }
}
