//! Sequential workflow executor.

use super::definition::{StepDefinition, WorkflowDefinition};
use super::run::{FailureKind, RunStatus, StepFailure, StepRecord, StepStatus, WorkflowRun};
use super::{CURRENT_STEP_KEY, FAILED_STEP_KEY};
use crate::context::{Context, Value};
use crate::errors::WorkflowNotFoundError;
use crate::events::{
    EventSink, NoOpEventSink, STEP_COMPLETED, STEP_FAILED, STEP_SKIPPED, STEP_STARTED,
    WORKFLOW_ABORTED, WORKFLOW_COMPLETED, WORKFLOW_STARTED, WORKFLOW_STOPPED,
};
use crate::observability::SpanTimer;
use crate::registry::ComponentRegistry;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Executor-wide behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Fail a step whose declared inputs are missing instead of only
    /// logging them.
    pub strict_inputs: bool,
}

impl ExecutorOptions {
    /// Sets strict input checking.
    #[must_use]
    pub const fn with_strict_inputs(mut self, strict: bool) -> Self {
        self.strict_inputs = strict;
        self
    }
}

/// Per-run options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// When set, only steps with these ids run; the rest are skipped.
    pub selected_steps: Option<Vec<String>>,
    /// Use this run id instead of a fresh one.
    pub run_id: Option<Uuid>,
}

impl RunOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the run to the given step ids.
    #[must_use]
    pub fn with_selected_steps(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.selected_steps = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Fixes the run id.
    #[must_use]
    pub const fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    fn selects(&self, step_id: &str) -> bool {
        self.selected_steps
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|id| id == step_id))
    }
}

enum StepOutcome {
    Output(Context),
    Failed { kind: FailureKind, message: String },
}

/// Runs named workflows against a context.
///
/// Steps run strictly in order on the calling task. Each step's partial
/// result is shallow-merged into the run context before the next step sees
/// it. Registry errors and execution errors always abort the run; a soft
/// `error` key or a missing strict input aborts only if the step is
/// critical, and is otherwise recorded as `step_<n>_error`.
pub struct WorkflowExecutor {
    registry: Arc<ComponentRegistry>,
    workflows: IndexMap<String, Arc<WorkflowDefinition>>,
    event_sink: Arc<dyn EventSink>,
    options: ExecutorOptions,
}

impl WorkflowExecutor {
    /// Creates an executor with no workflows and a no-op event sink.
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            workflows: IndexMap::new(),
            event_sink: Arc::new(NoOpEventSink),
            options: ExecutorOptions::default(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Sets the executor options.
    #[must_use]
    pub const fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Adds a workflow, builder style.
    #[must_use]
    pub fn with_workflow(mut self, workflow: WorkflowDefinition) -> Self {
        self.register_workflow(workflow);
        self
    }

    /// Adds or replaces a workflow, returning the replaced definition.
    pub fn register_workflow(
        &mut self,
        workflow: WorkflowDefinition,
    ) -> Option<Arc<WorkflowDefinition>> {
        debug!(workflow = %workflow.name, steps = workflow.steps.len(), "Registered workflow");
        self.workflows
            .insert(workflow.name.clone(), Arc::new(workflow))
    }

    /// Returns the shared registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Returns the executor options.
    #[must_use]
    pub const fn options(&self) -> ExecutorOptions {
        self.options
    }

    /// Returns a workflow by name.
    #[must_use]
    pub fn workflow(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.get(name).cloned()
    }

    /// Returns true if the workflow is known.
    #[must_use]
    pub fn has_workflow(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    /// Returns workflow names in registration order.
    #[must_use]
    pub fn workflow_names(&self) -> Vec<&str> {
        self.workflows.keys().map(String::as_str).collect()
    }

    /// Runs a workflow by name.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowNotFoundError`] if the name is unknown. Step failures
    /// are reported through the returned [`WorkflowRun`].
    pub async fn run_workflow(
        &self,
        name: &str,
        initial: Context,
    ) -> Result<WorkflowRun, WorkflowNotFoundError> {
        self.run_workflow_with(name, initial, &RunOptions::default())
            .await
    }

    /// Runs a workflow by name with per-run options.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowNotFoundError`] if the name is unknown.
    pub async fn run_workflow_with(
        &self,
        name: &str,
        initial: Context,
        options: &RunOptions,
    ) -> Result<WorkflowRun, WorkflowNotFoundError> {
        let workflow = self
            .workflow(name)
            .ok_or_else(|| WorkflowNotFoundError::new(name))?;
        Ok(self.execute(&workflow, initial, options).await)
    }

    /// Runs an arbitrary definition, registered or not.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        initial: Context,
        options: &RunOptions,
    ) -> WorkflowRun {
        let run_id = options.run_id.unwrap_or_else(Uuid::new_v4);
        let started_at = Utc::now();
        let timer = SpanTimer::start(&workflow.name);

        let mut ctx = initial;
        ctx.merge(workflow.initial_context.clone());

        info!(workflow = %workflow.name, %run_id, steps = workflow.steps.len(), "Workflow started");
        self.event_sink.try_emit(
            WORKFLOW_STARTED,
            Some(json!({
                "run_id": run_id.to_string(),
                "workflow": workflow.name,
                "steps": workflow.steps.len(),
            })),
        );

        let mut records = Vec::with_capacity(workflow.steps.len());
        let mut failure = None;
        let mut status = RunStatus::Completed;

        for (index, step) in workflow.steps.iter().enumerate() {
            let step_id = workflow.step_id(index);
            let step_started_at = Utc::now();

            if let Some(reason) = skip_reason(step, &step_id, options) {
                debug!(workflow = %workflow.name, step = %step_id, reason, "Step skipped");
                self.event_sink.try_emit(
                    STEP_SKIPPED,
                    Some(json!({"run_id": run_id.to_string(), "step": step_id, "reason": reason})),
                );
                records.push(step_record(
                    index,
                    &step_id,
                    step,
                    StepStatus::Skipped,
                    step_started_at,
                    0,
                    Some(reason.to_string()),
                ));
                continue;
            }

            self.event_sink.try_emit(
                STEP_STARTED,
                Some(json!({
                    "run_id": run_id.to_string(),
                    "step": step_id,
                    "index": index,
                    "component_type": step.component_type,
                    "component_id": step.component_id,
                })),
            );
            let step_timer = SpanTimer::start(&step_id);

            let mut stop = false;
            let failed = match self.invoke_step(index, &step_id, step, &ctx).await {
                StepOutcome::Output(partial) => {
                    let soft_error = partial.error_message();
                    stop = partial.stop_requested();
                    ctx.merge(partial);
                    soft_error.map(|message| (FailureKind::SoftError, message))
                }
                StepOutcome::Failed { kind, message } => Some((kind, message)),
            };
            let duration_ms = step_timer.finish();

            match failed {
                None => {
                    debug!(workflow = %workflow.name, step = %step_id, duration_ms, "Step completed");
                    self.event_sink.try_emit(
                        STEP_COMPLETED,
                        Some(json!({
                            "run_id": run_id.to_string(),
                            "step": step_id,
                            "duration_ms": duration_ms,
                        })),
                    );
                    records.push(step_record(
                        index,
                        &step_id,
                        step,
                        StepStatus::Completed,
                        step_started_at,
                        duration_ms,
                        None,
                    ));
                }
                Some((kind, message)) => {
                    let fatal = step.critical || kind.always_fatal();
                    self.event_sink.try_emit(
                        STEP_FAILED,
                        Some(json!({
                            "run_id": run_id.to_string(),
                            "step": step_id,
                            "kind": kind.as_str(),
                            "error": message,
                            "fatal": fatal,
                            "duration_ms": duration_ms,
                        })),
                    );
                    records.push(step_record(
                        index,
                        &step_id,
                        step,
                        StepStatus::Failed,
                        step_started_at,
                        duration_ms,
                        Some(message.clone()),
                    ));

                    if fatal {
                        warn!(
                            workflow = %workflow.name,
                            step = %step_id,
                            %kind,
                            error = %message,
                            "Step failed; aborting workflow"
                        );
                        let step_failure = StepFailure {
                            step_index: index,
                            step_id,
                            component_type: step.component_type.clone(),
                            component_id: step.component_id.clone(),
                            kind,
                            message,
                        };
                        ctx.insert(FAILED_STEP_KEY, Value::from(step_failure.to_dict()));
                        failure = Some(step_failure);
                        status = RunStatus::Aborted;
                        break;
                    }

                    warn!(
                        workflow = %workflow.name,
                        step = %step_id,
                        %kind,
                        error = %message,
                        "Non-critical step failed; continuing"
                    );
                    ctx.insert(format!("step_{}_error", index + 1), message);
                }
            }

            if stop {
                info!(workflow = %workflow.name, step = %step_id, "Workflow stop requested");
                status = RunStatus::Stopped;
                break;
            }
        }

        let duration_ms = timer.finish();
        let event_type = match status {
            RunStatus::Completed => WORKFLOW_COMPLETED,
            RunStatus::Stopped => WORKFLOW_STOPPED,
            RunStatus::Aborted => WORKFLOW_ABORTED,
        };
        self.event_sink.try_emit(
            event_type,
            Some(json!({
                "run_id": run_id.to_string(),
                "workflow": workflow.name,
                "status": status.as_str(),
                "duration_ms": duration_ms,
                "failure": failure.as_ref().map(StepFailure::to_dict),
            })),
        );
        match status {
            RunStatus::Aborted => warn!(workflow = %workflow.name, %run_id, duration_ms, "Workflow aborted"),
            _ => info!(workflow = %workflow.name, %run_id, %status, duration_ms, "Workflow finished"),
        }

        WorkflowRun {
            run_id,
            workflow: workflow.name.clone(),
            status,
            context: ctx,
            steps: records,
            failure,
            started_at,
            duration_ms,
        }
    }

    async fn invoke_step(
        &self,
        index: usize,
        step_id: &str,
        step: &StepDefinition,
        ctx: &Context,
    ) -> StepOutcome {
        let handle = match self.registry.get(&step.component_type, &step.component_id) {
            Ok(handle) => handle,
            Err(err) => {
                return StepOutcome::Failed {
                    kind: FailureKind::from(&err),
                    message: err.to_string(),
                }
            }
        };

        let missing: Vec<&str> = step
            .inputs
            .iter()
            .filter(|key| ctx.get(key).map_or(true, Value::is_null))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            if self.options.strict_inputs {
                return StepOutcome::Failed {
                    kind: FailureKind::MissingInput,
                    message: format!("missing declared inputs: {}", missing.join(", ")),
                };
            }
            debug!(step = %step_id, ?missing, "Declared inputs not present");
        }

        match handle.execute(&step_view(ctx, index, step_id, step)).await {
            Ok(partial) => StepOutcome::Output(partial),
            Err(err) => StepOutcome::Failed {
                kind: FailureKind::Execution,
                message: err.message,
            },
        }
    }
}

impl fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("workflows", &self.workflow_names())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn skip_reason(step: &StepDefinition, step_id: &str, options: &RunOptions) -> Option<&'static str> {
    if step.disabled {
        Some("disabled")
    } else if !options.selects(step_id) {
        Some("not selected")
    } else {
        None
    }
}

/// The component sees the run context plus a `current_step` description.
fn step_view(ctx: &Context, index: usize, step_id: &str, step: &StepDefinition) -> Context {
    ctx.clone().with(
        CURRENT_STEP_KEY,
        json!({
            "id": step_id,
            "index": index,
            "component_type": step.component_type,
            "component_id": step.component_id,
            "inputs": step.inputs,
            "tools": step.tools,
            "config": step.config.to_dict(),
        }),
    )
}

fn step_record(
    index: usize,
    step_id: &str,
    step: &StepDefinition,
    status: StepStatus,
    started_at: DateTime<Utc>,
    duration_ms: u64,
    error: Option<String>,
) -> StepRecord {
    StepRecord {
        id: step_id.to_string(),
        index,
        component_type: step.component_type.clone(),
        component_id: step.component_id.clone(),
        status,
        started_at,
        duration_ms,
        error,
    }
}
