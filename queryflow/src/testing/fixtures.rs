//! Test fixtures for building registries, workflows and executors.

use std::sync::Arc;

use crate::context::Context;
use crate::errors::WorkflowNotFoundError;
use crate::events::CollectingEventSink;
use crate::registry::{ComponentConstructor, ComponentRegistry};
use crate::workflow::{
    ExecutorOptions, StepDefinition, WorkflowDefinition, WorkflowExecutor, WorkflowRun,
};

/// Builder for linear test workflows.
#[derive(Debug, Clone)]
pub struct TestWorkflow {
    definition: WorkflowDefinition,
}

impl TestWorkflow {
    /// Creates an empty workflow.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            definition: WorkflowDefinition::new(name),
        }
    }

    /// Creates a workflow with one critical step per component type, all
    /// using the `default` instance.
    #[must_use]
    pub fn linear(name: impl Into<String>, component_types: &[&str]) -> Self {
        component_types
            .iter()
            .fold(Self::new(name), |workflow, ty| workflow.step(ty))
    }

    /// Appends a critical step on the `default` instance.
    #[must_use]
    pub fn step(self, component_type: &str) -> Self {
        self.with_step(StepDefinition::new(component_type, "default"))
    }

    /// Appends a non-critical step on the `default` instance.
    #[must_use]
    pub fn optional_step(self, component_type: &str) -> Self {
        self.with_step(StepDefinition::new(component_type, "default").with_critical(false))
    }

    /// Appends an arbitrary step.
    #[must_use]
    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.definition = self.definition.with_step(step);
        self
    }

    /// Returns the definition.
    #[must_use]
    pub fn build(self) -> WorkflowDefinition {
        self.definition
    }
}

/// A registry, an event collector and the workflows under test.
#[derive(Debug)]
pub struct TestHarness {
    registry: Arc<ComponentRegistry>,
    events: Arc<CollectingEventSink>,
    workflows: Vec<WorkflowDefinition>,
    options: ExecutorOptions,
}

impl TestHarness {
    /// Creates an empty harness.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ComponentRegistry::new()),
            events: Arc::new(CollectingEventSink::new()),
            workflows: Vec::new(),
            options: ExecutorOptions::default(),
        }
    }

    /// Registers a component type.
    #[must_use]
    pub fn with_component(self, type_name: &str, constructor: ComponentConstructor) -> Self {
        self.registry.register_type(type_name, constructor);
        self
    }

    /// Adds a workflow.
    #[must_use]
    pub fn with_workflow(mut self, workflow: impl Into<WorkflowDefinition>) -> Self {
        self.workflows.push(workflow.into());
        self
    }

    /// Sets the executor options.
    #[must_use]
    pub const fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the shared registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Returns the collected events.
    #[must_use]
    pub fn events(&self) -> &CollectingEventSink {
        &self.events
    }

    /// Builds an executor over the harness registry and workflows.
    #[must_use]
    pub fn executor(&self) -> WorkflowExecutor {
        self.workflows.iter().cloned().fold(
            WorkflowExecutor::new(Arc::clone(&self.registry))
                .with_event_sink(self.events.clone())
                .with_options(self.options),
            WorkflowExecutor::with_workflow,
        )
    }

    /// Runs a workflow on a fresh executor.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowNotFoundError`] for an unknown name.
    pub async fn run(&self, name: &str, ctx: Context) -> Result<WorkflowRun, WorkflowNotFoundError> {
        self.executor().run_workflow(name, ctx).await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl From<TestWorkflow> for WorkflowDefinition {
    fn from(workflow: TestWorkflow) -> Self {
        workflow.build()
    }
}
