//! Test assertions for workflow runs and contexts.

use crate::context::{Context, Value};
use crate::workflow::{RunStatus, WorkflowRun};

/// Asserts that every selected step ran.
pub fn assert_run_completed(run: &WorkflowRun) {
    assert_eq!(
        run.status,
        RunStatus::Completed,
        "Expected completed run, got {:?} (failure: {:?})",
        run.status,
        run.failure
    );
}

/// Asserts that the run aborted at the given step id.
pub fn assert_run_aborted_at(run: &WorkflowRun, step_id: &str) {
    assert_eq!(
        run.status,
        RunStatus::Aborted,
        "Expected aborted run, got {:?}",
        run.status
    );
    let failed_at = run.failure.as_ref().map(|f| f.step_id.as_str());
    assert_eq!(
        failed_at,
        Some(step_id),
        "Expected failure at step '{step_id}', got {failed_at:?}"
    );
}

/// Asserts which steps executed, in order.
pub fn assert_steps_executed(run: &WorkflowRun, expected: &[&str]) {
    assert_eq!(
        run.executed_step_ids(),
        expected,
        "Unexpected executed steps"
    );
}

/// Asserts that the context contains a key.
pub fn assert_context_contains(ctx: &Context, key: &str) {
    assert!(
        ctx.contains_key(key),
        "Expected context to contain key '{key}'. Keys: {:?}",
        ctx.keys().collect::<Vec<_>>()
    );
}

/// Asserts that a context key holds the expected value.
pub fn assert_context_value(ctx: &Context, key: &str, expected: impl Into<Value>) {
    let expected = expected.into();
    let actual = ctx.get(key);
    assert_eq!(
        actual,
        Some(&expected),
        "Expected value {expected:?} for key '{key}', got {actual:?}"
    );
}
