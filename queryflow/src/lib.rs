//! # Queryflow
//!
//! A component pipeline runtime for natural-language-to-query workflows.
//!
//! Queryflow wires independently configured components into named
//! workflows:
//!
//! - **Component registry**: constructors registered by type, instances
//!   created lazily per `(type, id)` and cached
//! - **Workflow executor**: sequential steps over a shared key/value context
//!   with soft errors, critical steps and early stop
//! - **Declarative configuration**: YAML or JSON documents naming instances
//!   and workflows
//! - **Validated generation**: retry with backoff until a generated query
//!   passes validation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use queryflow::prelude::*;
//!
//! let config = RuntimeConfig::from_path("config")?;
//! let app = Application::builder(config)
//!     .with_builtin_components()
//!     .with_component("query_generator", QueryGeneratorComponent::constructor(generator))
//!     .build()
//!     .await?;
//!
//! let run = app.process_query("how many orders shipped last week?", None, None).await?;
//! println!("{}", run.context.get_str("generated_query").unwrap_or_default());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod app;
pub mod components;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod observability;
pub mod registry;
pub mod retry;
pub mod testing;
pub mod validation;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::app::{Application, ApplicationBuilder};
    pub use crate::components::builtin::{RequireKeysComponent, StaticComponent};
    pub use crate::components::query_generator::{QueryGenerator, QueryGeneratorComponent};
    pub use crate::components::search::{RetryManagerComponent, SearchBackend, SearchComponent, SearchHit};
    pub use crate::components::{
        Component, ComponentConfig, ComponentInit, ComponentMetadata, FnComponent, HealthStatus,
    };
    pub use crate::config::RuntimeConfig;
    pub use crate::context::{Context, Value};
    pub use crate::errors::{
        ComponentExecutionError, ComponentRegistryError, ConfigError, InitializationError,
        QueryflowError, WorkflowNotFoundError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat, LoggingConfig};
    pub use crate::registry::{constructor, ComponentConstructor, ComponentRegistry, InstanceKey};
    pub use crate::retry::{BackoffStrategy, RetryConfig};
    pub use crate::validation::{QueryValidator, ValidationMode};
    pub use crate::workflow::{
        ExecutorOptions, RunOptions, RunStatus, StepDefinition, WorkflowDefinition,
        WorkflowExecutor, WorkflowRun,
    };
}
