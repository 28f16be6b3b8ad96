//! Declarative workflow and step definitions.

use crate::components::ComponentConfig;
use crate::context::Context;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_component_id() -> String {
    "default".to_string()
}

const fn default_critical() -> bool {
    true
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step id; defaults to `step_<n>` (1-based) when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The component type to resolve.
    pub component_type: String,
    /// The component instance id.
    #[serde(default = "default_component_id")]
    pub component_id: String,
    /// Whether a soft `error` from this step aborts the run.
    #[serde(default = "default_critical")]
    pub critical: bool,
    /// Skipped when true.
    #[serde(default)]
    pub disabled: bool,
    /// Context keys the step expects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    /// Tool names handed to the component through `current_step`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    /// Step-scoped options, handed to the component as `current_step.config`.
    /// The instance's own configuration is never changed.
    #[serde(default, skip_serializing_if = "ComponentConfig::is_empty")]
    pub config: ComponentConfig,
}

impl StepDefinition {
    /// Creates a critical, enabled step.
    #[must_use]
    pub fn new(component_type: impl Into<String>, component_id: impl Into<String>) -> Self {
        Self {
            id: None,
            component_type: component_type.into(),
            component_id: component_id.into(),
            critical: true,
            disabled: false,
            inputs: Vec::new(),
            tools: Vec::new(),
            config: ComponentConfig::new(),
        }
    }

    /// Sets the step id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the critical flag.
    #[must_use]
    pub const fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Marks the step as disabled.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Sets the declared inputs.
    #[must_use]
    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the tool names.
    #[must_use]
    pub fn with_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the step-scoped options.
    #[must_use]
    pub fn with_config(mut self, config: ComponentConfig) -> Self {
        self.config = config;
        self
    }
}

/// A named, ordered list of steps. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name. Filled from the map key when loaded from config.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Values merged over the caller's context before the first step.
    #[serde(default, skip_serializing_if = "Context::is_empty")]
    pub initial_context: Context,
    /// Steps in execution order.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Creates an empty workflow.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the initial context.
    #[must_use]
    pub fn with_initial_context(mut self, initial_context: Context) -> Self {
        self.initial_context = initial_context;
        self
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Returns the id of the step at `index`.
    #[must_use]
    pub fn step_id(&self, index: usize) -> String {
        self.steps
            .get(index)
            .and_then(|step| step.id.clone())
            .unwrap_or_else(|| format!("step_{}", index + 1))
    }

    /// Returns every step id in order.
    #[must_use]
    pub fn step_ids(&self) -> Vec<String> {
        (0..self.steps.len()).map(|i| self.step_id(i)).collect()
    }

    /// Checks the definition is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty name, a step without a
    /// component type or id, or duplicate step ids.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("workflow name must not be empty"));
        }

        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            let id = self.step_id(index);
            if step.component_type.trim().is_empty() {
                return Err(ConfigError::invalid(format!(
                    "workflow '{}' step '{id}' has no component_type",
                    self.name
                )));
            }
            if step.component_id.trim().is_empty() {
                return Err(ConfigError::invalid(format!(
                    "workflow '{}' step '{id}' has no component_id",
                    self.name
                )));
            }
            if !seen.insert(id.clone()) {
                return Err(ConfigError::invalid(format!(
                    "workflow '{}' declares step '{id}' more than once",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_defaults_from_yaml() {
        let step: StepDefinition = serde_yaml::from_str("component_type: search").unwrap();

        assert_eq!(step.component_id, "default");
        assert!(step.critical);
        assert!(!step.disabled);
        assert!(step.inputs.is_empty());
    }

    #[test]
    fn test_step_ids_default_to_position() {
        let workflow = WorkflowDefinition::new("qa")
            .with_step(StepDefinition::new("a", "default"))
            .with_step(StepDefinition::new("b", "default").with_id("lookup"))
            .with_step(StepDefinition::new("c", "default"));

        assert_eq!(workflow.step_ids(), vec!["step_1", "lookup", "step_3"]);
    }

    #[test]
    fn test_duplicate_step_ids_rejected() {
        let workflow = WorkflowDefinition::new("qa")
            .with_step(StepDefinition::new("a", "default").with_id("step_2"))
            .with_step(StepDefinition::new("b", "default"));

        let err = workflow.validate().unwrap_err();
        assert!(err.to_string().contains("'step_2' more than once"));
    }

    #[test]
    fn test_empty_component_type_rejected() {
        let workflow = WorkflowDefinition::new("qa").with_step(StepDefinition::new(" ", "x"));
        assert!(workflow.validate().is_err());
        assert!(WorkflowDefinition::new("").validate().is_err());
    }

    #[test]
    fn test_workflow_from_yaml() {
        let yaml = r"
description: answer a question
initial_context:
  dialect: sqlite
steps:
  - component_type: query_generator
    inputs: [query, schema]
  - id: enrich
    component_type: search
    component_id: docs
    critical: false
    config:
      top_k: 3
";
        let workflow: WorkflowDefinition = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(workflow.initial_context.get_str("dialect"), Some("sqlite"));
        assert_eq!(workflow.steps.len(), 2);
        assert_eq!(workflow.steps[0].inputs, vec!["query", "schema"]);
        assert!(!workflow.steps[1].critical);
        assert_eq!(workflow.step_id(1), "enrich");
        assert!(workflow.steps[0].config.is_empty());
        assert_eq!(workflow.steps[1].config.int_or("top_k", 0), 3);
    }
}
