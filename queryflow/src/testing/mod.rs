//! Testing utilities for queryflow workflows.
//!
//! This module provides:
//! - Mock components with scripted responses
//! - Assertions for workflow runs and contexts
//! - A harness wiring a registry, an event collector and an executor

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_context_contains, assert_context_value, assert_run_aborted_at, assert_run_completed,
    assert_steps_executed,
};
pub use fixtures::{TestHarness, TestWorkflow};
pub use mocks::{MockComponent, MockResponse};
