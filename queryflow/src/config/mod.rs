//! Declarative runtime configuration.
//!
//! A [`RuntimeConfig`] names the component instances to register and the
//! workflows to load. It can come from one YAML/JSON document or from a
//! directory of them (see [`RuntimeConfig::from_path`]).

mod loader;

pub use loader::{CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH};

use crate::components::ComponentConfig;
use crate::errors::ConfigError;
use crate::observability::LoggingConfig;
use crate::workflow::WorkflowDefinition;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// Registration record for one component type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentTypeConfig {
    /// Name of the registered constructor to bind. Defaults to the type name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Instance id to options.
    #[serde(default, deserialize_with = "instances_or_empty")]
    pub instances: IndexMap<String, ComponentConfig>,
}

impl ComponentTypeConfig {
    /// Adds an instance, builder style.
    #[must_use]
    pub fn with_instance(mut self, component_id: impl Into<String>, config: ComponentConfig) -> Self {
        self.instances.insert(component_id.into(), config);
        self
    }
}

// `instances: { default: }` leaves the options null in YAML.
fn instances_or_empty<'de, D>(deserializer: D) -> Result<IndexMap<String, ComponentConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<IndexMap<String, Option<ComponentConfig>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(id, config)| (id, config.unwrap_or_default()))
        .collect())
}

/// The complete declarative configuration of an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Workflow run by `process_query`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_workflow: Option<String>,
    /// Logging section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
    /// Instances (`type` or `type/id`) that must pass their health check at
    /// startup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_components: Vec<String>,
    /// Component type to registration record.
    #[serde(default)]
    pub components: IndexMap<String, ComponentTypeConfig>,
    /// Workflow name to definition.
    #[serde(default)]
    pub workflows: IndexMap<String, WorkflowDefinition>,
}

impl RuntimeConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default workflow.
    #[must_use]
    pub fn with_default_workflow(mut self, name: impl Into<String>) -> Self {
        self.default_workflow = Some(name.into());
        self
    }

    /// Adds a component instance.
    #[must_use]
    pub fn with_instance(
        mut self,
        component_type: impl Into<String>,
        component_id: impl Into<String>,
        config: ComponentConfig,
    ) -> Self {
        self.components
            .entry(component_type.into())
            .or_default()
            .instances
            .insert(component_id.into(), config);
        self
    }

    /// Adds a workflow under its own name.
    #[must_use]
    pub fn with_workflow(mut self, workflow: WorkflowDefinition) -> Self {
        self.workflows.insert(workflow.name.clone(), workflow);
        self
    }

    /// Returns the logging section, or the default.
    #[must_use]
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Returns the constructor name bound to a component type.
    #[must_use]
    pub fn constructor_name<'a>(&'a self, component_type: &'a str) -> &'a str {
        self.components
            .get(component_type)
            .and_then(|c| c.class.as_deref())
            .unwrap_or(component_type)
    }

    /// Iterates over `(type, id, options)` for every configured instance.
    pub fn instances(&self) -> impl Iterator<Item = (&str, &str, &ComponentConfig)> {
        self.components.iter().flat_map(|(ty, entry)| {
            entry
                .instances
                .iter()
                .map(move |(id, config)| (ty.as_str(), id.as_str(), config))
        })
    }

    /// Parses `required_components` into `(type, id)` pairs. A bare type
    /// means its `default` instance.
    #[must_use]
    pub fn required_instances(&self) -> Vec<(String, String)> {
        self.required_components
            .iter()
            .map(|entry| match entry.split_once('/') {
                Some((ty, id)) => (ty.trim().to_string(), id.trim().to_string()),
                None => (entry.trim().to_string(), "default".to_string()),
            })
            .collect()
    }

    /// Folds `other` into this configuration.
    ///
    /// Instances merge per type with `other` winning per id, a `class` in
    /// `other` replaces this one, and `default_workflow` and `logging` are
    /// replaced when `other` sets them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if both declare the same workflow.
    pub fn merge(&mut self, other: Self) -> Result<(), ConfigError> {
        if let Some(name) = other.workflows.keys().find(|n| self.workflows.contains_key(*n)) {
            return Err(ConfigError::invalid(format!(
                "workflow '{name}' is declared more than once"
            )));
        }

        if other.default_workflow.is_some() {
            self.default_workflow = other.default_workflow;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
        for entry in other.required_components {
            if !self.required_components.contains(&entry) {
                self.required_components.push(entry);
            }
        }
        for (component_type, incoming) in other.components {
            let existing = self.components.entry(component_type).or_default();
            if incoming.class.is_some() {
                existing.class = incoming.class;
            }
            existing.instances.extend(incoming.instances);
        }
        self.workflows.extend(other.workflows);
        Ok(())
    }

    /// Names each workflow after its key and validates it.
    ///
    /// # Errors
    ///
    /// Returns the first invalid workflow's error.
    pub fn finalize(mut self) -> Result<Self, ConfigError> {
        for (name, workflow) in &mut self.workflows {
            workflow.name.clone_from(name);
            workflow.validate()?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::StepDefinition;

    const YAML: &str = r"
default_workflow: answer
logging:
  level: debug
  format: json
required_components: [query_generator, search/docs]
components:
  query_generator:
    instances:
      default:
        max_attempts: 2
  search:
    class: vector_search
    instances:
      docs: { top_k: 3 }
      faq:
workflows:
  answer:
    steps:
      - component_type: query_generator
      - component_type: search
        component_id: docs
        critical: false
";

    #[test]
    fn test_parse_full_document() {
        let config = RuntimeConfig::from_yaml_str(YAML).unwrap();

        assert_eq!(config.default_workflow.as_deref(), Some("answer"));
        assert_eq!(config.logging().level, "debug");
        assert_eq!(config.workflows["answer"].name, "answer");
        assert_eq!(config.constructor_name("search"), "vector_search");
        assert_eq!(config.constructor_name("query_generator"), "query_generator");
        assert!(config.components["search"].instances["faq"].is_empty());

        let triples: Vec<_> = config.instances().map(|(t, i, _)| format!("{t}/{i}")).collect();
        assert_eq!(triples, vec!["query_generator/default", "search/docs", "search/faq"]);
        assert_eq!(
            config.required_instances(),
            vec![
                ("query_generator".to_string(), "default".to_string()),
                ("search".to_string(), "docs".to_string()),
            ]
        );
    }

    #[test]
    fn test_merge_instances_and_reject_duplicate_workflows() {
        let mut base = RuntimeConfig::new()
            .with_instance("search", "docs", ComponentConfig::new().with("top_k", 3))
            .with_workflow(WorkflowDefinition::new("a").with_step(StepDefinition::new("search", "docs")));
        let overlay = RuntimeConfig::new()
            .with_default_workflow("a")
            .with_instance("search", "docs", ComponentConfig::new().with("top_k", 9))
            .with_instance("search", "faq", ComponentConfig::new());

        base.merge(overlay).unwrap();
        assert_eq!(base.default_workflow.as_deref(), Some("a"));
        assert_eq!(base.components["search"].instances["docs"].int_or("top_k", 0), 9);
        assert_eq!(base.components["search"].instances.len(), 2);

        let clash = RuntimeConfig::new().with_workflow(WorkflowDefinition::new("a"));
        let err = base.merge(clash).unwrap_err();
        assert!(err.to_string().contains("'a' is declared more than once"));
    }

    #[test]
    fn test_finalize_rejects_bad_workflow() {
        let yaml = r"
workflows:
  broken:
    steps:
      - component_type: ''
";
        let err = RuntimeConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
