//! Event sinks for workflow observability.
//!
//! The executor reports run and step transitions to an [`EventSink`] it owns.
//! There is no process-wide sink; each executor is handed one explicitly.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

/// A run began.
pub const WORKFLOW_STARTED: &str = "workflow.started";
/// Every selected step ran.
pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
/// A component asked to end the run early.
pub const WORKFLOW_STOPPED: &str = "workflow.stopped";
/// A step failure ended the run.
pub const WORKFLOW_ABORTED: &str = "workflow.aborted";
/// A step is about to execute.
pub const STEP_STARTED: &str = "step.started";
/// A step finished without a fatal failure.
pub const STEP_COMPLETED: &str = "step.completed";
/// A step failed, fatally or not.
pub const STEP_FAILED: &str = "step.failed";
/// A step was disabled or not selected.
pub const STEP_SKIPPED: &str = "step.skipped";
