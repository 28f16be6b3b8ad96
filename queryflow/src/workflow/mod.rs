//! Workflow definitions and the sequential executor.
//!
//! A workflow is a named, ordered list of steps, each naming a component
//! `(type, id)` resolved through the [`crate::registry::ComponentRegistry`].
//! The executor threads one [`crate::context::Context`] through the steps and
//! returns a [`WorkflowRun`] describing how far it got.

mod definition;
mod executor;
#[cfg(test)]
mod integration_tests;
mod run;

pub use definition::{StepDefinition, WorkflowDefinition};
pub use executor::{ExecutorOptions, RunOptions, WorkflowExecutor};
pub use run::{FailureKind, RunStatus, StepFailure, StepRecord, StepStatus, WorkflowRun};

/// Context key describing the running step, visible only to its component.
pub const CURRENT_STEP_KEY: &str = "current_step";

/// Context key added to an aborted run's context.
pub const FAILED_STEP_KEY: &str = "failed_step";
