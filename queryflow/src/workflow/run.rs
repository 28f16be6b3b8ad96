//! Results of a workflow run.

use crate::context::Context;
use crate::errors::ComponentRegistryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use uuid::Uuid;

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every selected step ran.
    Completed,
    /// A component set `workflow_stop`.
    Stopped,
    /// A fatal step failure ended the run.
    Aborted,
}

impl RunStatus {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one visited step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step ran and reported no error.
    Completed,
    /// The step failed; fatal or recorded depending on policy.
    Failed,
    /// The step was disabled or not selected.
    Skipped,
}

/// Why a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No constructor for the step's component type.
    ComponentNotFound,
    /// The constructor failed.
    Construction,
    /// The component rejected its configuration.
    ConfigValidation,
    /// `execute` returned an error.
    Execution,
    /// The component returned a non-empty `error` key.
    SoftError,
    /// A declared input was missing under strict inputs.
    MissingInput,
}

impl FailureKind {
    /// Returns the snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ComponentNotFound => "component_not_found",
            Self::Construction => "construction",
            Self::ConfigValidation => "config_validation",
            Self::Execution => "execution",
            Self::SoftError => "soft_error",
            Self::MissingInput => "missing_input",
        }
    }

    /// Returns true for failures that abort regardless of the step's
    /// `critical` flag.
    #[must_use]
    pub const fn always_fatal(self) -> bool {
        !matches!(self, Self::SoftError | Self::MissingInput)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ComponentRegistryError> for FailureKind {
    fn from(err: &ComponentRegistryError) -> Self {
        match err {
            ComponentRegistryError::NotFound(_) => Self::ComponentNotFound,
            ComponentRegistryError::Construction(_) => Self::Construction,
            ComponentRegistryError::ConfigValidation(_) => Self::ConfigValidation,
        }
    }
}

/// The step that ended a run, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    /// 0-based position in the workflow.
    pub step_index: usize,
    /// The step id.
    pub step_id: String,
    /// Component type of the step.
    pub component_type: String,
    /// Component id of the step.
    pub component_id: String,
    /// Failure category.
    pub kind: FailureKind,
    /// Human readable reason.
    pub message: String,
}

impl StepFailure {
    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> JsonValue {
        json!({
            "step_index": self.step_index,
            "step_id": self.step_id,
            "component_type": self.component_type,
            "component_id": self.component_id,
            "kind": self.kind.as_str(),
            "message": self.message,
        })
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step '{}' ({}/{}) failed: {}",
            self.step_id, self.component_type, self.component_id, self.message
        )
    }
}

/// History entry for one visited step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// The step id.
    pub id: String,
    /// 0-based position in the workflow.
    pub index: usize,
    /// Component type of the step.
    pub component_type: String,
    /// Component id of the step.
    pub component_id: String,
    /// What happened.
    pub status: StepStatus,
    /// When the step started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Failure or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Structured result of [`crate::workflow::WorkflowExecutor::run_workflow`].
///
/// Failed runs are results, not errors: `context` holds everything merged
/// before the failing step plus a `failed_step` marker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRun {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// The workflow name.
    pub workflow: String,
    /// Final status.
    pub status: RunStatus,
    /// The accumulated context.
    pub context: Context,
    /// Every visited step in order.
    pub steps: Vec<StepRecord>,
    /// The fatal failure, when aborted.
    pub failure: Option<StepFailure>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration_ms: u64,
}

impl WorkflowRun {
    /// Returns true unless the run aborted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status != RunStatus::Aborted
    }

    /// Returns the ids of steps that were executed (not skipped).
    #[must_use]
    pub fn executed_step_ids(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.status != StepStatus::Skipped)
            .map(|s| s.id.as_str())
            .collect()
    }

    /// Returns the record for a step id.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Consumes the run and returns its context.
    #[must_use]
    pub fn into_context(self) -> Context {
        self.context
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> JsonValue {
        json!({
            "run_id": self.run_id.to_string(),
            "workflow": self.workflow,
            "status": self.status.as_str(),
            "success": self.is_success(),
            "started_at": self.started_at.to_rfc3339(),
            "duration_ms": self.duration_ms,
            "executed_steps": self.executed_step_ids(),
            "steps": serde_json::to_value(&self.steps).unwrap_or(JsonValue::Null),
            "failure": self.failure.as_ref().map(StepFailure::to_dict),
            "context": self.context.to_json(),
        })
    }
}
