//! Error types for the queryflow runtime.
//!
//! Registry and executor failures are typed so the executor can map each one
//! onto a step failure kind. Workflow-level failures never escape a run; they
//! are reported through [`crate::workflow::WorkflowRun`] instead.

use serde_json::{json, Map, Value as JsonValue};
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for queryflow operations.
#[derive(Debug, Error)]
pub enum QueryflowError {
    /// A component lookup or instantiation failed.
    #[error("{0}")]
    Registry(#[from] ComponentRegistryError),

    /// A component raised during execution.
    #[error("{0}")]
    ComponentExecution(#[from] ComponentExecutionError),

    /// An unknown workflow was requested.
    #[error("{0}")]
    WorkflowNotFound(#[from] WorkflowNotFoundError),

    /// Declarative configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Application bootstrap failed.
    #[error("{0}")]
    Initialization(#[from] InitializationError),
}

impl From<ComponentNotFoundError> for QueryflowError {
    fn from(err: ComponentNotFoundError) -> Self {
        Self::Registry(err.into())
    }
}

impl From<ConfigValidationError> for QueryflowError {
    fn from(err: ConfigValidationError) -> Self {
        Self::Registry(err.into())
    }
}

/// No constructor is registered for the requested component type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Component not found: {component_type}/{component_id}")]
pub struct ComponentNotFoundError {
    /// The requested component type.
    pub component_type: String,
    /// The requested component id.
    pub component_id: String,
}

impl ComponentNotFoundError {
    /// Creates a new not-found error.
    #[must_use]
    pub fn new(component_type: impl Into<String>, component_id: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            component_id: component_id.into(),
        }
    }
}

/// A constructor failed while lazily instantiating a component.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to instantiate component {component_type}/{component_id}: {reason}")]
pub struct ComponentConstructionError {
    /// The component type.
    pub component_type: String,
    /// The component id.
    pub component_id: String,
    /// Why construction failed.
    pub reason: String,
}

impl ComponentConstructionError {
    /// Creates a new construction error.
    #[must_use]
    pub fn new(
        component_type: impl Into<String>,
        component_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            component_type: component_type.into(),
            component_id: component_id.into(),
            reason: reason.into(),
        }
    }
}

/// A component's configuration failed its own validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid configuration for component {component_type}/{component_id}: {reason}")]
pub struct ConfigValidationError {
    /// The component type.
    pub component_type: String,
    /// The component id.
    pub component_id: String,
    /// The first violated constraint.
    pub reason: String,
}

impl ConfigValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(
        component_type: impl Into<String>,
        component_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            component_type: component_type.into(),
            component_id: component_id.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by [`crate::registry::ComponentRegistry::get`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComponentRegistryError {
    /// No constructor registered for the type.
    #[error("{0}")]
    NotFound(#[from] ComponentNotFoundError),
    /// The constructor failed.
    #[error("{0}")]
    Construction(#[from] ComponentConstructionError),
    /// The freshly built instance rejected its configuration.
    #[error("{0}")]
    ConfigValidation(#[from] ConfigValidationError),
}

impl ComponentRegistryError {
    /// Returns the error type name used in rendered failures.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "ComponentNotFoundError",
            Self::Construction(_) => "ComponentConstructionError",
            Self::ConfigValidation(_) => "ConfigValidationError",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> Map<String, JsonValue> {
        let mut map = Map::new();
        map.insert("type".to_string(), json!(self.type_name()));
        match self {
            Self::NotFound(err) => {
                map.insert("component_type".to_string(), json!(err.component_type));
                map.insert("component_id".to_string(), json!(err.component_id));
            }
            Self::Construction(err) => {
                map.insert("component_type".to_string(), json!(err.component_type));
                map.insert("component_id".to_string(), json!(err.component_id));
                map.insert("reason".to_string(), json!(err.reason));
            }
            Self::ConfigValidation(err) => {
                map.insert("component_type".to_string(), json!(err.component_type));
                map.insert("component_id".to_string(), json!(err.component_id));
                map.insert("reason".to_string(), json!(err.reason));
            }
        }
        map.insert("message".to_string(), json!(self.to_string()));
        map
    }
}

/// Raised by [`crate::components::Component::execute`].
///
/// Recoverable conditions are not errors: components report those through an
/// `"error"` key in their partial context instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ComponentExecutionError {
    /// Human readable description.
    pub message: String,
}

impl ComponentExecutionError {
    /// Creates a new execution error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ComponentExecutionError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

/// The caller asked for a workflow that was never loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Workflow not found: {name}")]
pub struct WorkflowNotFoundError {
    /// The requested workflow name.
    pub name: String,
}

impl WorkflowNotFoundError {
    /// Creates a new workflow-not-found error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Errors raised while loading declarative configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file or directory could not be read.
    #[error("Failed to read configuration from {}: {source}", path.display())]
    Read {
        /// Path being read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The document did not parse.
    #[error("Failed to parse {format} configuration from {origin}: {message}")]
    Parse {
        /// `yaml` or `json`.
        format: &'static str,
        /// File path or `<inline>`.
        origin: String,
        /// Parser message.
        message: String,
    },

    /// The document parsed but is inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Creates an invalid-configuration error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Application bootstrap failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Initialization failed: {message}")]
pub struct InitializationError {
    /// What failed.
    pub message: String,
}

impl InitializationError {
    /// Creates a new initialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
