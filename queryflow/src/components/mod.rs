//! Component trait and implementations.
//!
//! Components are the processing units a workflow is composed of. Each one
//! reads what it needs from a [`Context`], does its work, and returns a
//! partial context for the executor to merge.

pub mod builtin;
mod config;
pub mod query_generator;
pub mod search;

pub use config::{check_rules, ComponentConfig, ConfigRule};

use crate::context::Context;
use crate::errors::ComponentExecutionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Result of a component's health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    /// The component has no health check.
    Unsupported,
    /// The check passed.
    Healthy,
    /// The check failed.
    Unhealthy(String),
}

impl HealthStatus {
    /// Returns true unless the check reported a failure.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        !matches!(self, Self::Unhealthy(_))
    }
}

/// Everything a constructor receives to build one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInit {
    /// The type the instance is registered under.
    pub component_type: String,
    /// The instance id.
    pub component_id: String,
    /// The registered options, or an empty configuration.
    pub config: ComponentConfig,
}

impl ComponentInit {
    /// Creates constructor input.
    #[must_use]
    pub fn new(
        component_type: impl Into<String>,
        component_id: impl Into<String>,
        config: ComponentConfig,
    ) -> Self {
        Self {
            component_type: component_type.into(),
            component_id: component_id.into(),
            config,
        }
    }
}

/// Descriptive information about a component instance.
///
/// Used for listing and introspection, never for control flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    /// The component type.
    pub component_type: String,
    /// The instance id.
    pub component_id: String,
    /// Human readable type name.
    pub display_name: String,
    /// Whether the component accepts options.
    pub configurable: bool,
    /// Optional description.
    pub description: Option<String>,
}

impl ComponentMetadata {
    /// Creates metadata with the display name defaulting to the type.
    #[must_use]
    pub fn new(component_type: impl Into<String>, component_id: impl Into<String>) -> Self {
        let component_type = component_type.into();
        Self {
            display_name: component_type.clone(),
            component_type,
            component_id: component_id.into(),
            configurable: true,
            description: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Sets the configurable flag.
    #[must_use]
    pub fn with_configurable(mut self, configurable: bool) -> Self {
        self.configurable = configurable;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "component_type": self.component_type,
            "component_id": self.component_id,
            "display_name": self.display_name,
            "configurable": self.configurable,
            "description": self.description,
        })
    }
}

/// Trait for workflow components.
///
/// Implementations are owned by the [`crate::registry::ComponentRegistry`],
/// which serializes calls per instance, so `execute` may freely update
/// internal state such as a lazily created client.
#[async_trait]
pub trait Component: Send + Sync + Debug {
    /// Returns the component type this instance was registered under.
    fn component_type(&self) -> &str;

    /// Returns the instance id.
    fn component_id(&self) -> &str;

    /// Executes the component.
    ///
    /// Missing inputs are not errors by themselves. Recoverable problems are
    /// returned as data under the `error` key; only unrecoverable ones are
    /// raised as [`ComponentExecutionError`].
    ///
    /// # Arguments
    ///
    /// * `ctx` - The accumulated context. It is never mutated in place.
    ///
    /// # Returns
    ///
    /// The keys to add or overwrite.
    async fn execute(&mut self, ctx: &Context) -> Result<Context, ComponentExecutionError>;

    /// Returns true if the configuration satisfies this type's constraints.
    ///
    /// Must be side-effect free so repeated calls agree.
    fn validate_config(&self) -> bool {
        self.config_violation().is_none()
    }

    /// Describes the first configuration constraint that is violated.
    fn config_violation(&self) -> Option<String> {
        None
    }

    /// Returns descriptive metadata.
    fn metadata(&self) -> ComponentMetadata {
        ComponentMetadata::new(self.component_type(), self.component_id())
    }

    /// Checks any external dependency.
    async fn health_check(&self) -> HealthStatus {
        HealthStatus::Unsupported
    }

    /// Releases resources created by this component.
    async fn shutdown(&mut self) -> Result<(), ComponentExecutionError> {
        Ok(())
    }
}

/// A closure-backed component.
pub struct FnComponent<F>
where
    F: Fn(&Context) -> Result<Context, ComponentExecutionError> + Send + Sync,
{
    component_type: String,
    component_id: String,
    func: F,
}

impl<F> FnComponent<F>
where
    F: Fn(&Context) -> Result<Context, ComponentExecutionError> + Send + Sync,
{
    /// Creates a new closure-backed component.
    pub fn new(component_type: impl Into<String>, component_id: impl Into<String>, func: F) -> Self {
        Self {
            component_type: component_type.into(),
            component_id: component_id.into(),
            func,
        }
    }
}

impl<F> Debug for FnComponent<F>
where
    F: Fn(&Context) -> Result<Context, ComponentExecutionError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnComponent")
            .field("component_type", &self.component_type)
            .field("component_id", &self.component_id)
            .finish()
    }
}

#[async_trait]
impl<F> Component for FnComponent<F>
where
    F: Fn(&Context) -> Result<Context, ComponentExecutionError> + Send + Sync,
{
    fn component_type(&self) -> &str {
        &self.component_type
    }

    fn component_id(&self) -> &str {
        &self.component_id
    }

    async fn execute(&mut self, ctx: &Context) -> Result<Context, ComponentExecutionError> {
        (self.func)(ctx)
    }

    fn metadata(&self) -> ComponentMetadata {
        ComponentMetadata::new(&self.component_type, &self.component_id).with_configurable(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_component_does_not_touch_input() {
        let mut component = FnComponent::new("emit", "a", |ctx: &Context| {
            Ok(Context::new().with("seen", ctx.len()))
        });
        let ctx = Context::new().with("x", 1);

        let partial = component.execute(&ctx).await.unwrap();

        assert_eq!(ctx, Context::new().with("x", 1));
        assert_eq!(partial.get_i64("seen"), Some(1));
    }

    #[tokio::test]
    async fn test_defaults() {
        let mut component = FnComponent::new("emit", "a", |_: &Context| Ok(Context::new()));

        assert!(component.validate_config());
        assert_eq!(component.health_check().await, HealthStatus::Unsupported);
        assert!(component.shutdown().await.is_ok());
        assert!(!component.metadata().configurable);
    }

    #[test]
    fn test_health_status() {
        assert!(HealthStatus::Unsupported.is_healthy());
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(!HealthStatus::Unhealthy("down".to_string()).is_healthy());
    }

    #[test]
    fn test_metadata_to_dict() {
        let meta = ComponentMetadata::new("search", "default")
            .with_display_name("Vector search")
            .with_description("Similarity search");
        let dict = meta.to_dict();

        assert_eq!(dict["component_id"], "default");
        assert_eq!(dict["display_name"], "Vector search");
        assert_eq!(dict["configurable"], true);
    }
}
